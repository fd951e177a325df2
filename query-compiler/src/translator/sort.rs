use crate::{
    expression::Expr,
    pipeline::Pipeline,
    translator::{not_supported, not_supported_because, utils::ROOT, Error, QueryTranslator, Result},
};
use linked_hash_map::LinkedHashMap;
use pipeline_ast::definitions::{Expression, Project, ProjectItem, SortField, SortOrder, Stage};

const DOCUMENT_FIELD: &str = "_document";
const KEY_FIELD_PREFIX: &str = "_key";

/// SortKey is a translated ordering key. Keys that read a field sort on it
/// directly; any other key must first be computed into a field.
enum SortKey {
    Path(String),
    Computed(Expression),
}

/// The shape of the sort that ends a pipeline, which a ThenBy extends.
enum PriorSort {
    /// A single $sort on document fields.
    Fields(Vec<SortField>),
    /// A $project that keeps the document under `_document` next to the
    /// computed keys, a $sort, and a $replaceRoot restoring the document.
    Computed {
        keys: LinkedHashMap<String, ProjectItem>,
        fields: Vec<SortField>,
    },
}

impl<'a> QueryTranslator<'a> {
    pub(crate) fn translate_order_by(
        &self,
        expr: &Expr,
        pipeline: Pipeline,
        args: &[Expr],
        descending: bool,
        then_by: bool,
    ) -> Result<Pipeline> {
        let [key_selector] = args else {
            return Err(not_supported(expr));
        };
        let serializer = pipeline.output_serializer().clone();
        let (translator, lambda) = self.bind_lambda_to_output(key_selector, &serializer)?;
        let key = match translator.resolve_field_path(&lambda.body) {
            Some((path, _)) => SortKey::Path(path),
            None => SortKey::Computed(translator.translate_expression(&lambda.body)?.ast),
        };
        let order = if descending {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };

        if !then_by {
            let stages = match key {
                SortKey::Path(path) => vec![Stage::Sort(vec![SortField { path, order }])],
                SortKey::Computed(key) => {
                    let mut keys = LinkedHashMap::new();
                    keys.insert(key_field(1), ProjectItem::Assignment(key));
                    computed_sort_stages(keys, vec![SortField {
                        path: key_field(1),
                        order,
                    }])
                }
            };
            return Ok(pipeline.add_stages(stages, serializer));
        }

        let prior = prior_sort(pipeline.stages()).ok_or_else(|| {
            not_supported_because(expr, "ThenBy must follow OrderBy or another ThenBy")
        })?;
        match (prior, key) {
            (PriorSort::Fields(mut fields), SortKey::Path(path)) => {
                check_duplicate(&fields, &path)?;
                fields.push(SortField { path, order });
                Ok(pipeline.replace_last_stages(1, vec![Stage::Sort(fields)], serializer))
            }
            (PriorSort::Fields(fields), SortKey::Computed(key)) => {
                let mut fields: Vec<SortField> = fields
                    .into_iter()
                    .map(|f| SortField {
                        path: document_path(&f.path),
                        order: f.order,
                    })
                    .collect();
                let mut keys = LinkedHashMap::new();
                keys.insert(key_field(1), ProjectItem::Assignment(key));
                fields.push(SortField {
                    path: key_field(1),
                    order,
                });
                Ok(pipeline.replace_last_stages(1, computed_sort_stages(keys, fields), serializer))
            }
            (PriorSort::Computed { keys, mut fields }, SortKey::Path(path)) => {
                let path = document_path(&path);
                check_duplicate(&fields, &path)?;
                fields.push(SortField { path, order });
                Ok(pipeline.replace_last_stages(3, computed_sort_stages(keys, fields), serializer))
            }
            (PriorSort::Computed { mut keys, mut fields }, SortKey::Computed(key)) => {
                if keys
                    .values()
                    .any(|k| matches!(k, ProjectItem::Assignment(e) if *e == key))
                {
                    return Err(Error::DuplicateSortKey(expr.to_string()));
                }
                let name = key_field(keys.len() + 1);
                keys.insert(name.clone(), ProjectItem::Assignment(key));
                fields.push(SortField { path: name, order });
                Ok(pipeline.replace_last_stages(3, computed_sort_stages(keys, fields), serializer))
            }
        }
    }
}

fn key_field(n: usize) -> String {
    format!("{KEY_FIELD_PREFIX}{n}")
}

fn document_path(path: &str) -> String {
    format!("{DOCUMENT_FIELD}.{path}")
}

fn check_duplicate(fields: &[SortField], path: &str) -> Result<()> {
    if fields.iter().any(|f| f.path == path) {
        return Err(Error::DuplicateSortKey(path.to_string()));
    }
    Ok(())
}

fn computed_sort_stages(keys: LinkedHashMap<String, ProjectItem>, fields: Vec<SortField>) -> Vec<Stage> {
    let mut specifications = LinkedHashMap::new();
    specifications.insert("_id".to_string(), ProjectItem::Exclusion);
    specifications.insert(DOCUMENT_FIELD.to_string(), ProjectItem::Assignment(ROOT.clone()));
    specifications.extend(keys);
    vec![
        Stage::Project(Project { specifications }),
        Stage::Sort(fields),
        Stage::ReplaceRoot(Expression::FieldPath(format!("${DOCUMENT_FIELD}"))),
    ]
}

/// Recognizes the sort a ThenBy extends from the trailing stages.
fn prior_sort(stages: &[Stage]) -> Option<PriorSort> {
    match stages {
        [.., Stage::Project(p), Stage::Sort(fields), Stage::ReplaceRoot(Expression::FieldPath(root))]
            if root.as_str() == "$_document"
                && matches!(p.specifications.get(DOCUMENT_FIELD), Some(ProjectItem::Assignment(e)) if e.is_root()) =>
        {
            let keys = p
                .specifications
                .iter()
                .filter(|(k, _)| k.starts_with(KEY_FIELD_PREFIX))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Some(PriorSort::Computed {
                keys,
                fields: fields.clone(),
            })
        }
        [.., Stage::Sort(fields)] => Some(PriorSort::Fields(fields.clone())),
        _ => None,
    }
}
