use crate::{
    expression::{Call, Expr, Method},
    pipeline::Pipeline,
    serializer::{
        ClientSideProjectionSerializer, GroupingSerializer, Serializer,
    },
    translator::{
        not_supported, not_supported_because,
        utils::{constant_i64, join_path, output_symbol, output_value, output_value_serializer, ROOT, VALUE_FIELD},
        Error, QueryTranslator, Result, Symbol, TranslatedExpression,
    },
};
use bson::Bson;
use linked_hash_map::LinkedHashMap;
use log::trace;
use pipeline_ast::{
    definitions::{
        AccumulatorExpression, AccumulatorField, AccumulatorOperator, Bucket, BucketAuto,
        ComparisonOperator, Densify, Expression, Filter, Group, Project, ProjectItem, Stage,
        Unwind, UnionWith,
    },
    ELEMENTS_FIELD,
};

impl<'a> QueryTranslator<'a> {
    pub(crate) fn translate_pipeline(&self, expr: &Expr) -> Result<Pipeline> {
        let call = match expr {
            Expr::Source(s) => return Ok(Pipeline::new(self.serializer_for_type(&s.document_type)?)),
            Expr::Documents(d) => {
                let serializer = self.serializer_for_type(&d.document_type)?;
                let documents = d.documents.iter().cloned().map(Bson::Document).collect();
                return Ok(Pipeline::new(serializer.clone())
                    .add_stage(Stage::Documents(documents), serializer));
            }
            Expr::Call(c) if expr.is_query() => c,
            _ => return Err(not_supported_because(expr, "the expression is not a query")),
        };
        let (source, args) = call
            .arguments
            .split_first()
            .ok_or_else(|| not_supported(expr))?;

        trace!("translating {} operator", call.method.name());
        let pipeline = self.translate_pipeline(source)?;
        match &call.method {
            Method::Where => self.translate_where(expr, pipeline, args),
            Method::Select => self.translate_select(expr, pipeline, args),
            Method::SelectMany => self.translate_select_many(expr, pipeline, args),
            Method::GroupBy => self.translate_group_by(expr, pipeline, args),
            Method::Join => self.translate_join(expr, pipeline, args, false),
            Method::GroupJoin => self.translate_join(expr, pipeline, args, true),
            Method::Lookup => self.translate_lookup(expr, pipeline, args),
            Method::OrderBy => self.translate_order_by(expr, pipeline, args, false, false),
            Method::OrderByDescending => {
                self.translate_order_by(expr, pipeline, args, true, false)
            }
            Method::ThenBy => self.translate_order_by(expr, pipeline, args, false, true),
            Method::ThenByDescending => self.translate_order_by(expr, pipeline, args, true, true),
            Method::Skip | Method::Take | Method::Sample => {
                let n = match args {
                    [n] => constant_i64(n)?,
                    _ => return Err(not_supported(expr)),
                };
                let stage = match call.method {
                    Method::Skip => Stage::Skip(n),
                    Method::Take => Stage::Limit(n),
                    _ => Stage::Sample(n),
                };
                let serializer = pipeline.output_serializer().clone();
                Ok(pipeline.add_stage(stage, serializer))
            }
            Method::Distinct => match args {
                [] => {
                    let serializer = pipeline.output_serializer().clone();
                    Ok(pipeline.add_stages(distinct_stages(), serializer))
                }
                _ => Err(not_supported(expr)),
            },
            Method::Union | Method::Concat => {
                self.translate_union(expr, pipeline, args, call.method == Method::Union)
            }
            Method::OfType(type_name) => self.translate_of_type(pipeline, type_name),
            Method::AppendStage(append) => {
                let serializer = match &append.output_type {
                    Some(t) => self.serializer_for_type(t)?,
                    None => pipeline.output_serializer().clone(),
                };
                Ok(pipeline.add_stage(Stage::Universal(append.stage.clone()), serializer))
            }
            Method::Densify(range) => {
                let serializer = pipeline.output_serializer().clone();
                let (field, partitions) = args.split_first().ok_or_else(|| not_supported(expr))?;
                let field = self.translate_field_selector(field, &serializer)?;
                let partition_by_fields = partitions
                    .iter()
                    .map(|p| self.translate_field_selector(p, &serializer))
                    .collect::<Result<Vec<_>>>()?;
                Ok(pipeline.add_stage(
                    Stage::Densify(Densify {
                        field,
                        partition_by_fields,
                        range: range.clone(),
                    }),
                    serializer,
                ))
            }
            Method::Bucket(options) => {
                let (group_by, grouping) = self.translate_bucket_key(expr, &pipeline, args)?;
                let output = elements_output(pipeline.output_serializer());
                Ok(pipeline.add_stage(
                    Stage::Bucket(Bucket {
                        group_by,
                        boundaries: options.boundaries.clone(),
                        default: options.default.clone(),
                        output,
                    }),
                    grouping,
                ))
            }
            Method::BucketAuto(options) => {
                let (group_by, grouping) = self.translate_bucket_key(expr, &pipeline, args)?;
                let grouping = match grouping {
                    Serializer::Grouping(g) => Serializer::Grouping(GroupingSerializer {
                        key: Box::new(Serializer::anonymous(vec![
                            ("min".to_string(), (*g.key).clone()),
                            ("max".to_string(), (*g.key).clone()),
                        ])),
                        element: g.element,
                    }),
                    other => other,
                };
                let output = elements_output(pipeline.output_serializer());
                Ok(pipeline.add_stage(
                    Stage::BucketAuto(BucketAuto {
                        group_by,
                        buckets: options.buckets,
                        granularity: options.granularity.clone(),
                        output,
                    }),
                    grouping,
                ))
            }
            _ => Err(not_supported(expr)),
        }
    }

    fn translate_where(&self, expr: &Expr, pipeline: Pipeline, args: &[Expr]) -> Result<Pipeline> {
        let [predicate] = args else {
            return Err(not_supported(expr));
        };
        let serializer = pipeline.output_serializer().clone();
        let (translator, lambda) = self.bind_lambda_to_output(predicate, &serializer)?;
        let filter = translator.translate_filter(&lambda.body)?;
        Ok(pipeline.add_stage(Stage::Match(filter), serializer))
    }

    fn translate_select(&self, expr: &Expr, pipeline: Pipeline, args: &[Expr]) -> Result<Pipeline> {
        let [selector] = args else {
            return Err(not_supported(expr));
        };
        let (translator, lambda) = self.bind_lambda_to_output(selector, pipeline.output_serializer())?;
        if lambda.is_identity() {
            return Ok(pipeline);
        }
        let projected = translator.translate_expression(&lambda.body)?;
        let (stage, serializer) = project_value(projected);
        Ok(pipeline.add_stage(stage, serializer))
    }

    /// The caller evaluates the final projection on documents of the source
    /// shape. Returns None when the query does not end in a projection or
    /// its source cannot be translated.
    pub(crate) fn translate_client_side_projection(&self, query: &Expr) -> Option<Pipeline> {
        let Expr::Call(Call {
            method: Method::Select,
            arguments,
        }) = query
        else {
            return None;
        };
        let [source, selector] = arguments.as_slice() else {
            return None;
        };
        let Expr::Lambda(projector) = selector else {
            return None;
        };
        let pipeline = self.translate_pipeline(source).ok()?;
        let (stages, source_serializer) = pipeline.into_parts();
        trace!("falling back to a client side projection");
        Some(Pipeline::with_stages(
            stages,
            Serializer::ClientSideProjection(ClientSideProjectionSerializer {
                source: Box::new(source_serializer),
                projector: projector.clone(),
            }),
        ))
    }

    fn translate_select_many(
        &self,
        expr: &Expr,
        pipeline: Pipeline,
        args: &[Expr],
    ) -> Result<Pipeline> {
        let (collection_selector, result_selector) = match args {
            [c] => (c, None),
            [c, r] => (c, Some(r)),
            _ => return Err(not_supported(expr)),
        };
        let serializer = pipeline.output_serializer().clone();
        let (translator, lambda) = self.bind_lambda_to_output(collection_selector, &serializer)?;
        let collection = translator.translate_enumerable(&lambda.body)?;
        let item = collection
            .serializer
            .item_serializer()
            .cloned()
            .ok_or_else(|| not_supported(expr))?;

        let (value, value_serializer) = match result_selector {
            None => (collection.ast, item),
            Some(result_selector) => {
                let result = result_selector.as_lambda(2).ok_or_else(|| {
                    not_supported_because(result_selector, "a two parameter lambda is required")
                })?;
                let item_name = result.parameters[1].clone();
                let translator = self.with_symbols(vec![
                    output_symbol(&result.parameters[0], &serializer),
                    Symbol {
                        name: item_name.clone(),
                        ast: Expression::var(item_name.clone()),
                        serializer: item,
                        filter_path: None,
                    },
                ]);
                let body = translator.translate_expression(&result.body)?;
                (
                    Expression::map(collection.ast, item_name, body.ast),
                    body.serializer,
                )
            }
        };

        let stages = vec![
            Stage::Project(Project {
                specifications: pipeline_ast::map! {
                    VALUE_FIELD.to_string() => ProjectItem::Assignment(value),
                    "_id".to_string() => ProjectItem::Exclusion,
                },
            }),
            Stage::Unwind(Unwind {
                path: VALUE_FIELD.to_string(),
                include_array_index: None,
                preserve_null_and_empty_arrays: false,
            }),
        ];
        Ok(pipeline.add_stages(stages, Serializer::wrapped(VALUE_FIELD, value_serializer)))
    }

    fn translate_group_by(&self, expr: &Expr, pipeline: Pipeline, args: &[Expr]) -> Result<Pipeline> {
        let (key_selector, element_selector, result_selector) = match args {
            [k] => (k, None, None),
            [k, r] if r.as_lambda(2).is_some() => (k, None, Some(r)),
            [k, e] => (k, Some(e), None),
            [k, e, r] => (k, Some(e), Some(r)),
            _ => return Err(not_supported(expr)),
        };
        let serializer = pipeline.output_serializer().clone();
        let (translator, lambda) = self.bind_lambda_to_output(key_selector, &serializer)?;
        let key = translator.translate_expression(&lambda.body)?;
        let element = match element_selector {
            Some(e) => {
                let (translator, lambda) = self.bind_lambda_to_output(e, &serializer)?;
                translator.translate_expression(&lambda.body)?
            }
            None => TranslatedExpression {
                ast: output_value(&serializer),
                serializer: output_value_serializer(&serializer),
            },
        };

        let group = Stage::Group(Group {
            id: key.ast,
            fields: vec![AccumulatorField {
                name: ELEMENTS_FIELD.to_string(),
                value: AccumulatorExpression::unary(AccumulatorOperator::Push, element.ast),
            }],
        });
        let grouping = GroupingSerializer {
            key: Box::new(key.serializer),
            element: Box::new(element.serializer),
        };
        let result_selector = match result_selector {
            None => return Ok(pipeline.add_stage(group, Serializer::Grouping(grouping))),
            Some(r) => r,
        };

        let result = result_selector.as_lambda(2).ok_or_else(|| {
            not_supported_because(result_selector, "a two parameter lambda is required")
        })?;
        let translator = self.with_symbols(vec![
            Symbol {
                name: result.parameters[0].clone(),
                ast: Expression::get_field(ROOT.clone(), "_id"),
                serializer: (*grouping.key).clone(),
                filter_path: Some("_id".to_string()),
            },
            Symbol {
                name: result.parameters[1].clone(),
                ast: Expression::get_field(ROOT.clone(), ELEMENTS_FIELD),
                serializer: Serializer::Array(grouping.element.clone()),
                filter_path: Some(ELEMENTS_FIELD.to_string()),
            },
        ]);
        let projected = translator.translate_expression(&result.body)?;
        let (project, serializer) = project_value(projected);
        Ok(pipeline.add_stages(vec![group, project], serializer))
    }

    fn translate_union(
        &self,
        expr: &Expr,
        pipeline: Pipeline,
        args: &[Expr],
        distinct: bool,
    ) -> Result<Pipeline> {
        let [other] = args else {
            return Err(not_supported(expr));
        };
        let collection = other
            .root_collection()
            .ok_or_else(|| not_supported_because(other, "the other query must read a collection"))?
            .to_string();
        let other = self.translate_pipeline(other)?;
        if other.output_serializer() != pipeline.output_serializer() {
            return Err(not_supported_because(
                expr,
                "both queries must produce documents of the same shape",
            ));
        }
        let (other_stages, _) = other.into_parts();
        let serializer = pipeline.output_serializer().clone();
        let mut stages = vec![Stage::UnionWith(UnionWith {
            collection,
            pipeline: if other_stages.is_empty() {
                None
            } else {
                Some(other_stages)
            },
        })];
        if distinct {
            stages.extend(distinct_stages());
        }
        Ok(pipeline.add_stages(stages, serializer))
    }

    fn translate_of_type(&self, pipeline: Pipeline, type_name: &str) -> Result<Pipeline> {
        let convention = self
            .registry
            .lookup_discriminator_convention(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))?;
        let value = convention
            .discriminator(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))?;
        let candidates = convention.types_for(value);
        if candidates.len() > 1 {
            return Err(Error::AmbiguousDiscriminator {
                type_name: type_name.to_string(),
                value: value.to_string(),
                candidates: candidates.into_iter().map(String::from).collect(),
            });
        }

        let target = self.serializer_for_type(type_name)?;
        let (prefix, serializer) = match pipeline.output_serializer() {
            Serializer::Wrapped(w) => (
                w.field_name.clone(),
                Serializer::wrapped(w.field_name.clone(), target),
            ),
            _ => (String::new(), target),
        };
        let filter = Filter::compare(
            join_path(&prefix, &convention.element_name),
            ComparisonOperator::Eq,
            value.clone(),
        );
        Ok(pipeline.add_stage(Stage::Match(filter), serializer))
    }

    /// Translates a lambda that selects a field of the output documents to
    /// the path of that field.
    fn translate_field_selector(&self, selector: &Expr, serializer: &Serializer) -> Result<String> {
        let (translator, lambda) = self.bind_lambda_to_output(selector, serializer)?;
        translator
            .resolve_field_path(&lambda.body)
            .map(|(path, _)| path)
            .ok_or_else(|| not_supported_because(selector, "a field is required"))
    }

    fn translate_bucket_key(
        &self,
        expr: &Expr,
        pipeline: &Pipeline,
        args: &[Expr],
    ) -> Result<(Expression, Serializer)> {
        let [group_by] = args else {
            return Err(not_supported(expr));
        };
        let serializer = pipeline.output_serializer();
        let (translator, lambda) = self.bind_lambda_to_output(group_by, serializer)?;
        let key = translator.translate_expression(&lambda.body)?;
        Ok((
            key.ast,
            Serializer::Grouping(GroupingSerializer {
                key: Box::new(key.serializer),
                element: Box::new(output_value_serializer(serializer)),
            }),
        ))
    }
}

/// Builds the $project stage for a projected value. Documents become the
/// output documents; any other value is stored under `_v`.
pub(crate) fn project_value(projected: TranslatedExpression) -> (Stage, Serializer) {
    match projected.ast {
        Expression::ComputedDocument(fields)
            if matches!(projected.serializer, Serializer::Document(_)) =>
        {
            let mut specifications: LinkedHashMap<String, ProjectItem> = fields
                .into_iter()
                .map(|(k, e)| (k, ProjectItem::Assignment(e)))
                .collect();
            if !specifications.contains_key("_id") {
                specifications.insert("_id".to_string(), ProjectItem::Exclusion);
            }
            (
                Stage::Project(Project { specifications }),
                projected.serializer,
            )
        }
        ast => (
            Stage::Project(Project {
                specifications: pipeline_ast::map! {
                    VALUE_FIELD.to_string() => ProjectItem::Assignment(ast),
                    "_id".to_string() => ProjectItem::Exclusion,
                },
            }),
            Serializer::wrapped(VALUE_FIELD, projected.serializer),
        ),
    }
}

fn distinct_stages() -> Vec<Stage> {
    vec![
        Stage::Group(Group {
            id: ROOT.clone(),
            fields: vec![],
        }),
        Stage::ReplaceRoot(Expression::FieldPath("$_id".to_string())),
    ]
}

fn elements_output(serializer: &Serializer) -> Vec<AccumulatorField> {
    vec![AccumulatorField {
        name: ELEMENTS_FIELD.to_string(),
        value: AccumulatorExpression::unary(AccumulatorOperator::Push, output_value(serializer)),
    }]
}
