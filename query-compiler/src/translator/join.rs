use crate::{
    expression::Expr,
    pipeline::Pipeline,
    serializer::{DocumentSerializer, MemberSerializer, Serializer},
    translator::{
        not_supported, not_supported_because,
        stages::project_value,
        utils::{join_path, output_symbol, output_value, output_value_serializer, ROOT},
        QueryTranslator, Result, Symbol,
    },
};
use pipeline_ast::definitions::{
    BinaryOperator, Expression, Filter, Lookup, Project, ProjectItem, Stage, Unwind, VarBinding,
};

const OUTER_FIELD: &str = "_outer";
const INNER_FIELD: &str = "_inner";
const LOCAL_FIELD: &str = "_local";
const RESULTS_FIELD: &str = "_results";
const KEY_VAR: &str = "key";
const LOCAL_VAR: &str = "local";
const INNER_ITEM_VAR: &str = "inner";

pub(crate) const LOOKUP_RESULT_TYPE_NAME: &str = "LookupResult";

impl<'a> QueryTranslator<'a> {
    /// Translates Join and GroupJoin. The outer document is moved under
    /// `_outer` and the matching inner documents are looked up into `_inner`.
    pub(crate) fn translate_join(
        &self,
        expr: &Expr,
        pipeline: Pipeline,
        args: &[Expr],
        group: bool,
    ) -> Result<Pipeline> {
        let [inner, outer_key, inner_key, result_selector] = args else {
            return Err(not_supported(expr));
        };
        let from = inner
            .root_collection()
            .ok_or_else(|| not_supported_because(inner, "the inner query must read a collection"))?
            .to_string();
        let outer_serializer = output_value_serializer(pipeline.output_serializer());
        let outer_stage = wrap_stage(OUTER_FIELD, output_value(pipeline.output_serializer()));
        let outer_symbol = |name: &str| Symbol {
            name: name.to_string(),
            ast: Expression::get_field(ROOT.clone(), OUTER_FIELD),
            serializer: outer_serializer.clone(),
            filter_path: Some(OUTER_FIELD.to_string()),
        };

        let outer_key = outer_key
            .as_lambda(1)
            .ok_or_else(|| not_supported_because(outer_key, "a single parameter lambda is required"))?;
        let outer_translator = self.with_symbols(vec![outer_symbol(&outer_key.parameters[0])]);

        // $lookup compares foreignField against the documents of the
        // collection before any sub-pipeline runs, so the field form is only
        // valid when the inner query is the collection itself.
        let inner_is_collection = matches!(inner, Expr::Source(_));
        let inner = self.translate_pipeline(inner)?;
        let (inner_translator, inner_key) =
            self.bind_lambda_to_output(inner_key, inner.output_serializer())?;

        let lookup = match (
            outer_translator.resolve_field_path(&outer_key.body),
            inner_translator.resolve_field_path(&inner_key.body),
        ) {
            (Some((local, _)), Some((foreign, _))) if inner_is_collection => Lookup {
                from: Some(from),
                local_field: Some(local),
                foreign_field: Some(foreign),
                let_vars: vec![],
                pipeline: None,
                as_field: INNER_FIELD.to_string(),
            },
            _ => {
                let local = outer_translator.translate_expression(&outer_key.body)?;
                let foreign = inner_translator.translate_expression(&inner_key.body)?;
                let (mut stages, _) = inner.clone().into_parts();
                stages.push(Stage::Match(Filter::Expr(Expression::binary(
                    BinaryOperator::Eq,
                    foreign.ast,
                    Expression::var(KEY_VAR),
                ))));
                Lookup {
                    from: Some(from),
                    local_field: None,
                    foreign_field: None,
                    let_vars: vec![VarBinding {
                        name: KEY_VAR.to_string(),
                        value: local.ast,
                    }],
                    pipeline: Some(stages),
                    as_field: INNER_FIELD.to_string(),
                }
            }
        };

        let mut stages = vec![outer_stage, Stage::Lookup(lookup)];
        if !group {
            stages.push(Stage::Unwind(Unwind {
                path: INNER_FIELD.to_string(),
                include_array_index: None,
                preserve_null_and_empty_arrays: false,
            }));
        }

        let result = result_selector.as_lambda(2).ok_or_else(|| {
            not_supported_because(result_selector, "a two parameter lambda is required")
        })?;
        let inner_symbol = inner_symbol(
            &result.parameters[1],
            inner.output_serializer(),
            group,
        );
        let translator = self.with_symbols(vec![outer_symbol(&result.parameters[0]), inner_symbol]);
        let projected = translator.translate_expression(&result.body)?;
        let (project, serializer) = project_value(projected);
        stages.push(project);
        Ok(pipeline.add_stages(stages, serializer))
    }

    /// Translates the Lookup operator, which pairs each source value with the
    /// array of matching documents of another collection.
    pub(crate) fn translate_lookup(
        &self,
        expr: &Expr,
        pipeline: Pipeline,
        args: &[Expr],
    ) -> Result<Pipeline> {
        let (inner_query, rest) = args.split_first().ok_or_else(|| not_supported(expr))?;
        let from = inner_query
            .root_collection()
            .ok_or_else(|| {
                not_supported_because(inner_query, "the looked up query must read a collection")
            })?
            .to_string();
        let local_serializer = output_value_serializer(pipeline.output_serializer());
        let local_stage = wrap_stage(LOCAL_FIELD, output_value(pipeline.output_serializer()));
        let inner = self.translate_pipeline(inner_query)?;
        if matches!(inner.output_serializer(), Serializer::Wrapped(_)) {
            return Err(not_supported_because(
                inner_query,
                "the looked up query must produce documents",
            ));
        }
        let (inner_stages, inner_serializer) = inner.into_parts();

        let lookup = match rest {
            [local_key, foreign_key] if matches!(inner_query, Expr::Source(_)) => {
                let local_key = local_key.as_lambda(1).ok_or_else(|| {
                    not_supported_because(local_key, "a single parameter lambda is required")
                })?;
                let translator = self.with_symbols(vec![Symbol {
                    name: local_key.parameters[0].clone(),
                    ast: Expression::get_field(ROOT.clone(), LOCAL_FIELD),
                    serializer: local_serializer.clone(),
                    filter_path: Some(LOCAL_FIELD.to_string()),
                }]);
                let (local, _) = translator
                    .resolve_field_path(&local_key.body)
                    .ok_or_else(|| not_supported_because(expr, "the local key must be a field"))?;
                let (foreign_translator, foreign_key) =
                    self.bind_lambda_to_output(foreign_key, &inner_serializer)?;
                let (foreign, _) = foreign_translator
                    .resolve_field_path(&foreign_key.body)
                    .ok_or_else(|| not_supported_because(expr, "the foreign key must be a field"))?;
                Lookup {
                    from: Some(from),
                    local_field: Some(local),
                    foreign_field: Some(foreign),
                    let_vars: vec![],
                    pipeline: None,
                    as_field: RESULTS_FIELD.to_string(),
                }
            }
            [] => Lookup {
                from: Some(from),
                local_field: None,
                foreign_field: None,
                let_vars: vec![],
                pipeline: Some(inner_stages),
                as_field: RESULTS_FIELD.to_string(),
            },
            [predicate] => {
                let predicate = predicate.as_lambda(2).ok_or_else(|| {
                    not_supported_because(predicate, "a two parameter lambda is required")
                })?;
                let translator = self.with_symbols(vec![
                    Symbol {
                        name: predicate.parameters[0].clone(),
                        ast: Expression::var(LOCAL_VAR),
                        serializer: local_serializer.clone(),
                        filter_path: None,
                    },
                    output_symbol(&predicate.parameters[1], &inner_serializer),
                ]);
                let condition = translator.translate_expression(&predicate.body)?;
                let mut stages = inner_stages;
                stages.push(Stage::Match(Filter::Expr(condition.ast)));
                Lookup {
                    from: Some(from),
                    local_field: None,
                    foreign_field: None,
                    let_vars: vec![VarBinding {
                        name: LOCAL_VAR.to_string(),
                        value: Expression::get_field(ROOT.clone(), LOCAL_FIELD),
                    }],
                    pipeline: Some(stages),
                    as_field: RESULTS_FIELD.to_string(),
                }
            }
            _ => return Err(not_supported(expr)),
        };

        let serializer = Serializer::Document(DocumentSerializer {
            type_name: LOOKUP_RESULT_TYPE_NAME.to_string(),
            members: vec![
                MemberSerializer {
                    member_name: "Local".to_string(),
                    element_name: LOCAL_FIELD.to_string(),
                    serializer: local_serializer,
                },
                MemberSerializer {
                    member_name: "Results".to_string(),
                    element_name: RESULTS_FIELD.to_string(),
                    serializer: Serializer::array_of(inner_serializer),
                },
            ],
        });
        Ok(pipeline.add_stages(vec![local_stage, Stage::Lookup(lookup)], serializer))
    }
}

/// `{$project: {<field>: <value>, _id: 0}}`
fn wrap_stage(field: &str, value: Expression) -> Stage {
    Stage::Project(Project {
        specifications: pipeline_ast::map! {
            field.to_string() => ProjectItem::Assignment(value),
            "_id".to_string() => ProjectItem::Exclusion,
        },
    })
}

/// Binds the inner parameter of a join result selector. After a Join the
/// field holds one inner document; after a GroupJoin it holds all of them.
fn inner_symbol(name: &str, inner: &Serializer, group: bool) -> Symbol {
    let field = Expression::get_field(ROOT.clone(), INNER_FIELD);
    let (ast, serializer, filter_path) = match (inner, group) {
        (Serializer::Wrapped(w), false) => (
            Expression::get_field(field, w.field_name.clone()),
            (*w.value).clone(),
            Some(join_path(INNER_FIELD, &w.field_name)),
        ),
        (Serializer::Wrapped(w), true) => (
            Expression::map(
                field,
                INNER_ITEM_VAR,
                Expression::get_field(Expression::var(INNER_ITEM_VAR), w.field_name.clone()),
            ),
            Serializer::array_of((*w.value).clone()),
            None,
        ),
        (_, false) => (field, inner.clone(), Some(INNER_FIELD.to_string())),
        (_, true) => (
            field,
            Serializer::array_of(inner.clone()),
            Some(INNER_FIELD.to_string()),
        ),
    };
    Symbol {
        name: name.to_string(),
        ast,
        serializer,
        filter_path,
    }
}
