use crate::{
    compile_query,
    expression::{builder::*, AppendStage, BucketOptions, Expr, Method},
    options::TranslationOptions,
    result,
    serializer::Serializer,
    test::registry,
    translator::Error,
};
use bson::{doc, Bson, Regex};
use pipeline_ast::definitions::{DensifyBounds, DensifyRange};

macro_rules! test_compile {
    ($func_name:ident, expected = $expected:expr, input = $input:expr, $(options = $options:expr,)?) => {
        #[test]
        fn $func_name() {
            #[allow(unused_mut, unused_assignments)]
            let mut options = TranslationOptions::default();
            $(options = $options;)?
            let registry = registry();
            let actual = compile_query(&$input, &registry, options).map(|t| t.pipeline);
            assert_eq!($expected, actual);
        }
    };
}

macro_rules! test_compile_error {
    ($func_name:ident, expected_pat = $expected_pat:pat, input = $input:expr,) => {
        #[test]
        fn $func_name() {
            let registry = registry();
            let actual = compile_query(&$input, &registry, TranslationOptions::default());
            assert!(matches!(actual, $expected_pat), "{actual:?}");
        }
    };
}

fn orders() -> Expr {
    source("orders", "Order")
}

fn customers() -> Expr {
    source("customers", "Customer")
}

fn animals() -> Expr {
    source("animals", "Animal")
}

fn x() -> Expr {
    param("x")
}

fn field(name: &str) -> Expr {
    lambda(&["x"], x().member(name))
}

fn unoptimized() -> TranslationOptions {
    TranslationOptions::new(false, false)
}

mod sources {
    use super::*;

    test_compile!(
        collection_alone_is_empty,
        expected = Ok(vec![]),
        input = orders(),
    );

    test_compile!(
        inline_documents,
        expected = Ok(vec![
            doc! {"$documents": [{"A": "x", "Name": "n"}]},
            doc! {"$match": {"A": "x"}},
        ]),
        input = documents(vec![doc! {"A": "x", "Name": "n"}], "Customer")
            .where_(lambda(&["x"], x().member("A").equal(constant("x")))),
    );

    test_compile_error!(
        unregistered_type,
        expected_pat = Err(result::Error::Translator(Error::UnknownType(_))),
        input = source("orders", "Invoice"),
    );

    #[test]
    fn translation_carries_collection_and_serializer() {
        let registry = registry();
        let translation = compile_query(
            &orders().select(field("B")),
            &registry,
            TranslationOptions::default(),
        )
        .unwrap();
        assert_eq!(Some("orders".to_string()), translation.collection);
        assert!(matches!(
            translation.output_serializer,
            Serializer::Wrapped(ref w) if w.field_name == "_v"
        ));

        let inline = compile_query(
            &documents(vec![], "Customer"),
            &registry,
            TranslationOptions::default(),
        )
        .unwrap();
        assert_eq!(None, inline.collection);
    }
}

mod filters {
    use super::*;

    test_compile!(
        comparison,
        expected = Ok(vec![doc! {"$match": {"U": {"$gt": 5}}}]),
        input = orders().where_(lambda(&["x"], x().member("U").greater_than(constant(5)))),
    );

    test_compile!(
        constant_on_the_left_is_flipped,
        expected = Ok(vec![doc! {"$match": {"U": {"$lt": 5}}}]),
        input = orders().where_(lambda(&["x"], constant(5).greater_than(x().member("U")))),
    );

    test_compile!(
        equality_is_implied,
        expected = Ok(vec![doc! {"$match": {"A": "x", "U": {"$gte": 2}}}]),
        input = orders().where_(lambda(
            &["x"],
            x().member("A")
                .equal(constant("x"))
                .and_also(x().member("U").greater_than_or_equal(constant(2)))
        )),
    );

    test_compile!(
        negated_equality_is_ne,
        expected = Ok(vec![doc! {"$match": {"A": {"$ne": "x"}}}]),
        input = orders().where_(lambda(&["x"], x().member("A").equal(constant("x")).not())),
    );

    test_compile!(
        boolean_member,
        expected = Ok(vec![doc! {"$match": {"Paid": true}}]),
        input = orders().where_(field("Paid")),
    );

    test_compile!(
        disjunction,
        expected = Ok(vec![doc! {"$match": {"$or": [{"A": "x"}, {"U": {"$lte": 3}}]}}]),
        input = orders().where_(lambda(
            &["x"],
            x().member("A")
                .equal(constant("x"))
                .or_else(x().member("U").less_than_or_equal(constant(3)))
        )),
    );

    test_compile!(
        constant_array_membership,
        expected = Ok(vec![doc! {"$match": {"A": {"$in": ["x", "y"]}}}]),
        input = orders().where_(lambda(
            &["x"],
            constant(bson::bson!(["x", "y"])).call(Method::Contains, vec![x().member("A")])
        )),
    );

    test_compile!(
        starts_with_is_an_escaped_regex,
        expected = Ok(vec![doc! {"$match": {"B": Bson::RegularExpression(Regex {
            pattern: "^b\\.1".to_string(),
            options: String::new(),
        })}}]),
        input = orders().where_(lambda(
            &["x"],
            x().member("B").call(Method::StartsWith, vec![constant("b.1")])
        )),
    );

    test_compile!(
        array_contains_value,
        expected = Ok(vec![doc! {"$match": {"Tags": "all"}}]),
        input = orders().where_(lambda(
            &["x"],
            x().member("Tags").call(Method::Contains, vec![constant("all")])
        )),
    );

    test_compile!(
        any_with_predicate_is_elem_match,
        expected = Ok(vec![doc! {"$match": {"Items": {"$elemMatch": {"P": {"$gt": 5}}}}}]),
        input = orders().where_(lambda(
            &["x"],
            x().member("Items").call(
                Method::Any,
                vec![lambda(&["i"], param("i").member("P").greater_than(constant(5)))]
            )
        )),
    );

    test_compile!(
        elem_match_on_scalar_elements,
        expected = Ok(vec![doc! {"$match": {"Tags": {"$elemMatch": {"$gt": "a", "$lt": "u"}}}}]),
        input = orders().where_(lambda(
            &["x"],
            x().member("Tags").call(
                Method::Any,
                vec![lambda(
                    &["t"],
                    param("t")
                        .greater_than(constant("a"))
                        .and_also(param("t").less_than(constant("u")))
                )]
            )
        )),
    );

    test_compile!(
        array_count_is_size,
        expected = Ok(vec![doc! {"$match": {"Items": {"$size": 2}}}]),
        input = orders().where_(lambda(
            &["x"],
            x().member("Items").member("Count").equal(constant(2))
        )),
    );

    test_compile!(
        computed_predicate_uses_expr,
        expected = Ok(vec![doc! {"$match": {"$expr": {"$eq": [{"$mod": ["$U", 2]}, 0]}}}]),
        input = orders().where_(lambda(
            &["x"],
            x().member("U").modulo(constant(2)).equal(constant(0))
        )),
    );

    test_compile!(
        always_true_predicate_is_removed,
        expected = Ok(vec![]),
        input = orders().where_(lambda(&["x"], constant(true))),
    );

    test_compile!(
        elem_match_with_disjunction_falls_back_to_expr,
        expected = Ok(vec![doc! {"$match": {"$expr": {"$anyElementTrue": {"$map": {
            "input": "$Tags",
            "as": "t",
            "in": {"$or": [{"$eq": ["$$t", "a"]}, {"$eq": ["$$t", "b"]}]},
        }}}}}]),
        input = orders().where_(lambda(
            &["x"],
            x().member("Tags").call(
                Method::Any,
                vec![lambda(
                    &["t"],
                    param("t")
                        .equal(constant("a"))
                        .or_else(param("t").equal(constant("b")))
                )]
            )
        )),
    );
}

mod projections {
    use super::*;

    test_compile!(
        scalar_is_wrapped,
        expected = Ok(vec![doc! {"$project": {"_v": "$B", "_id": 0}}]),
        input = orders().select(field("B")),
    );

    test_compile!(
        identity_select_is_elided,
        expected = Ok(vec![doc! {"$match": {"U": {"$gt": 5}}}]),
        input = orders()
            .where_(lambda(&["x"], x().member("U").greater_than(constant(5))))
            .select(lambda(&["x"], x())),
    );

    test_compile!(
        new_object_becomes_the_document,
        expected = Ok(vec![doc! {"$project": {
            "Label": "$B",
            "Double": {"$multiply": ["$U", 2]},
            "_id": 0,
        }}]),
        input = orders().select(lambda(
            &["x"],
            new_object(vec![
                ("Label", x().member("B")),
                ("Double", x().member("U").times(constant(2))),
            ])
        )),
    );

    test_compile!(
        constants_are_literal,
        expected = Ok(vec![doc! {"$project": {"Zero": {"$literal": 0}, "_id": 0}}]),
        input = orders().select(lambda(&["x"], new_object(vec![("Zero", constant(0))]))),
    );

    test_compile!(
        unoptimized_field_access_is_get_field,
        expected = Ok(vec![doc! {"$project": {
            "_v": {"$getField": {"field": "B", "input": "$$ROOT"}},
            "_id": 0,
        }}]),
        input = orders().select(field("B")),
        options = unoptimized(),
    );

    test_compile_error!(
        dotted_member_name,
        expected_pat = Err(result::Error::Translator(Error::InvalidFieldName(_))),
        input = orders().select(lambda(&["x"], new_object(vec![("a.b", x().member("B"))]))),
    );

    test_compile_error!(
        unbound_parameter,
        expected_pat = Err(result::Error::Translator(Error::ParameterNotFound(_))),
        input = orders().select(lambda(&["x"], param("y").member("B"))),
    );

    test_compile!(
        select_many_unwinds,
        expected = Ok(vec![
            doc! {"$project": {"_v": "$Items", "_id": 0}},
            doc! {"$unwind": "$_v"},
        ]),
        input = orders().select_many(field("Items")),
    );

    test_compile!(
        select_many_then_filter_on_the_element,
        expected = Ok(vec![
            doc! {"$project": {"_v": "$Items", "_id": 0}},
            doc! {"$unwind": "$_v"},
            doc! {"$match": {"_v.P": {"$gt": 3}}},
        ]),
        input = orders()
            .select_many(field("Items"))
            .where_(lambda(&["i"], param("i").member("P").greater_than(constant(3)))),
    );

    #[test]
    fn untranslatable_projection_runs_client_side_when_enabled() {
        let registry = registry();
        let query = orders()
            .where_(lambda(&["x"], x().member("U").greater_than(constant(5))))
            .select(lambda(&["x"], new_object(vec![("M", x().member("Missing"))])));

        let translation = compile_query(&query, &registry, TranslationOptions::new(true, true))
            .unwrap();
        assert_eq!(vec![doc! {"$match": {"U": {"$gt": 5}}}], translation.pipeline);
        assert!(matches!(
            translation.output_serializer,
            Serializer::ClientSideProjection(_)
        ));

        let disabled = compile_query(&query, &registry, TranslationOptions::default());
        assert!(matches!(
            disabled,
            Err(result::Error::Translator(Error::ExpressionNotSupported { .. }))
        ));
    }
}

mod ordering {
    use super::*;

    test_compile!(
        then_by_extends_the_sort,
        expected = Ok(vec![doc! {"$sort": {"A": 1, "B": 1, "U": -1}}]),
        input = orders()
            .order_by(field("A"))
            .then_by(field("B"))
            .then_by_descending(field("U")),
    );

    test_compile!(
        computed_key_keeps_the_document,
        expected = Ok(vec![
            doc! {"$project": {"_id": 0, "_document": "$$ROOT", "_key1": {"$mod": ["$U", 3]}}},
            doc! {"$sort": {"_key1": 1, "_document.A": -1}},
            doc! {"$replaceRoot": {"newRoot": "$_document"}},
        ]),
        input = orders()
            .order_by(lambda(&["x"], x().member("U").modulo(constant(3))))
            .then_by_descending(field("A")),
    );

    test_compile!(
        computed_then_by_after_field_sort,
        expected = Ok(vec![
            doc! {"$project": {"_id": 0, "_document": "$$ROOT", "_key1": {"$strLenCP": "$B"}}},
            doc! {"$sort": {"_document.A": 1, "_key1": 1}},
            doc! {"$replaceRoot": {"newRoot": "$_document"}},
        ]),
        input = orders()
            .order_by(field("A"))
            .then_by(lambda(&["x"], x().member("B").member("Length"))),
    );

    test_compile!(
        duplicate_sort_key,
        expected = Err(result::Error::Translator(Error::DuplicateSortKey("A".to_string()))),
        input = orders().order_by(field("A")).then_by_descending(field("A")),
    );

    test_compile_error!(
        then_by_without_order_by,
        expected_pat = Err(result::Error::Translator(Error::ExpressionNotSupported {
            reason: Some(_),
            ..
        })),
        input = orders().then_by(field("A")),
    );

    test_compile!(
        skip_take_and_sample,
        expected = Ok(vec![
            doc! {"$skip": 1},
            doc! {"$limit": 2},
            doc! {"$sample": {"size": 3}},
        ]),
        input = orders()
            .skip(constant(1))
            .take(constant(2))
            .call(Method::Sample, vec![constant(3)]),
    );

    test_compile_error!(
        take_requires_a_constant,
        expected_pat = Err(result::Error::Translator(Error::ExpressionNotSupported { .. })),
        input = orders().take(param("n")),
    );
}

mod grouping {
    use super::*;

    fn g() -> Expr {
        param("g")
    }

    test_compile!(
        accumulators_are_hoisted_into_the_group,
        expected = Ok(vec![
            doc! {"$group": {"_id": "$A", "__agg0": {"$sum": 1}, "__agg1": {"$min": "$U"}}},
            doc! {"$project": {"A": "$_id", "Count": "$__agg0", "Min": "$__agg1", "_id": 0}},
        ]),
        input = orders().group_by(field("A")).select(lambda(
            &["g"],
            new_object(vec![
                ("A", g().member("Key")),
                ("Count", g().call(Method::Count, vec![])),
                ("Min", g().call(Method::Min, vec![field("U")])),
            ])
        )),
    );

    test_compile!(
        unoptimized_group_pushes_elements,
        expected = Ok(vec![
            doc! {"$group": {
                "_id": {"$getField": {"field": "A", "input": "$$ROOT"}},
                "_elements": {"$push": "$$ROOT"},
            }},
            doc! {"$project": {
                "A": {"$getField": {"field": "_id", "input": "$$ROOT"}},
                "Count": {"$size": {"$getField": {"field": "_elements", "input": "$$ROOT"}}},
                "_id": 0,
            }},
        ]),
        input = orders().group_by(field("A")).select(lambda(
            &["g"],
            new_object(vec![
                ("A", g().member("Key")),
                ("Count", g().call(Method::Count, vec![])),
            ])
        )),
        options = unoptimized(),
    );

    test_compile!(
        bucket,
        expected = Ok(vec![doc! {"$bucket": {
            "groupBy": {"$getField": {"field": "U", "input": "$$ROOT"}},
            "boundaries": [0, 5, 10],
            "default": "other",
            "output": {"_elements": {"$push": "$$ROOT"}},
        }}]),
        input = orders().call(
            Method::Bucket(BucketOptions {
                boundaries: vec![Bson::Int32(0), Bson::Int32(5), Bson::Int32(10)],
                default: Some(Bson::String("other".to_string())),
            }),
            vec![field("U")]
        ),
        options = unoptimized(),
    );

    test_compile!(
        scalar_result_selector_is_projected_under_v,
        expected = Ok(vec![
            doc! {"$group": {"_id": "$A", "__agg0": {"$sum": 1}}},
            doc! {"$project": {"_v": "$__agg0", "_id": 0}},
        ]),
        input = orders().call(
            Method::GroupBy,
            vec![
                field("A"),
                lambda(&["k", "xs"], param("xs").call(Method::Count, vec![])),
            ]
        ),
    );

    test_compile!(
        median_and_percentile_are_hoisted_into_the_group,
        expected = Ok(vec![
            doc! {"$group": {
                "_id": "$A",
                "__agg0": {"$median": {"input": "$U", "method": "approximate"}},
                "__agg1": {"$percentile": {"input": "$U", "p": [0.95], "method": "approximate"}},
            }},
            doc! {"$project": {"A": "$_id", "Median": "$__agg0", "P95": "$__agg1", "_id": 0}},
        ]),
        input = orders().group_by(field("A")).select(lambda(
            &["g"],
            new_object(vec![
                ("A", g().member("Key")),
                ("Median", g().call(Method::Median, vec![field("U")])),
                (
                    "P95",
                    g().call(Method::Percentile, vec![field("U"), constant(bson::bson!([0.95]))])
                ),
            ])
        )),
    );

    test_compile!(
        median_of_an_array_member,
        expected = Ok(vec![doc! {"$project": {
            "_v": {"$median": {
                "input": {"$map": {"input": "$Items", "as": "i", "in": "$$i.P"}},
                "method": "approximate",
            }},
            "_id": 0,
        }}]),
        input = orders().select(lambda(
            &["x"],
            x().member("Items").call(
                Method::Median,
                vec![lambda(&["i"], param("i").member("P"))]
            )
        )),
    );

    test_compile!(
        distinct,
        expected = Ok(vec![
            doc! {"$project": {"_v": "$A", "_id": 0}},
            doc! {"$group": {"_id": "$$ROOT"}},
            doc! {"$replaceRoot": {"newRoot": "$_id"}},
        ]),
        input = orders().select(field("A")).call(Method::Distinct, vec![]),
    );
}

mod joins {
    use super::*;

    test_compile!(
        join_on_fields,
        expected = Ok(vec![
            doc! {"$project": {"_outer": "$$ROOT", "_id": 0}},
            doc! {"$lookup": {
                "from": "customers",
                "localField": "_outer.A",
                "foreignField": "A",
                "as": "_inner",
            }},
            doc! {"$unwind": "$_inner"},
            doc! {"$project": {"B": "$_outer.B", "Name": "$_inner.Name", "_id": 0}},
        ]),
        input = orders().call(
            Method::Join,
            vec![
                customers(),
                field("A"),
                lambda(&["c"], param("c").member("A")),
                lambda(
                    &["o", "c"],
                    new_object(vec![
                        ("B", param("o").member("B")),
                        ("Name", param("c").member("Name")),
                    ])
                ),
            ]
        ),
    );

    test_compile!(
        lookup_on_fields,
        expected = Ok(vec![
            doc! {"$project": {"_local": "$$ROOT", "_id": 0}},
            doc! {"$lookup": {
                "from": "customers",
                "localField": "_local.A",
                "foreignField": "A",
                "as": "_results",
            }},
        ]),
        input = orders().call(
            Method::Lookup,
            vec![customers(), field("A"), lambda(&["c"], param("c").member("A"))]
        ),
    );

    test_compile!(
        group_join_keeps_all_matches,
        expected = Ok(vec![
            doc! {"$project": {"_outer": "$$ROOT", "_id": 0}},
            doc! {"$lookup": {
                "from": "customers",
                "localField": "_outer.A",
                "foreignField": "A",
                "as": "_inner",
            }},
            doc! {"$project": {
                "B": "$_outer.B",
                "Names": {"$map": {"input": "$_inner", "as": "c", "in": "$$c.Name"}},
                "_id": 0,
            }},
        ]),
        input = orders().call(
            Method::GroupJoin,
            vec![
                customers(),
                field("A"),
                lambda(&["c"], param("c").member("A")),
                lambda(
                    &["o", "cs"],
                    new_object(vec![
                        ("B", param("o").member("B")),
                        (
                            "Names",
                            param("cs").select(lambda(&["c"], param("c").member("Name")))
                        ),
                    ])
                ),
            ]
        ),
    );

    test_compile!(
        join_on_computed_key_uses_let,
        expected = Ok(vec![
            doc! {"$project": {"_outer": "$$ROOT", "_id": 0}},
            doc! {"$lookup": {
                "from": "customers",
                "let": {"key": {"$toLower": "$_outer.B"}},
                "pipeline": [{"$match": {"$expr": {"$eq": ["$A", "$$key"]}}}],
                "as": "_inner",
            }},
            doc! {"$unwind": "$_inner"},
            doc! {"$project": {"B": "$_outer.B", "Name": "$_inner.Name", "_id": 0}},
        ]),
        input = orders().call(
            Method::Join,
            vec![
                customers(),
                lambda(&["x"], x().member("B").call(Method::ToLower, vec![])),
                lambda(&["c"], param("c").member("A")),
                lambda(
                    &["o", "c"],
                    new_object(vec![
                        ("B", param("o").member("B")),
                        ("Name", param("c").member("Name")),
                    ])
                ),
            ]
        ),
    );

    test_compile!(
        join_on_projected_inner_query_uses_let,
        expected = Ok(vec![
            doc! {"$project": {"_outer": "$$ROOT", "_id": 0}},
            doc! {"$lookup": {
                "from": "customers",
                "let": {"key": "$_outer.A"},
                "pipeline": [
                    {"$project": {"Key": "$A", "N": "$Name", "_id": 0}},
                    {"$match": {"$expr": {"$eq": ["$Key", "$$key"]}}},
                ],
                "as": "_inner",
            }},
            doc! {"$unwind": "$_inner"},
            doc! {"$project": {"B": "$_outer.B", "N": "$_inner.N", "_id": 0}},
        ]),
        input = orders().call(
            Method::Join,
            vec![
                customers().select(lambda(
                    &["c"],
                    new_object(vec![
                        ("Key", param("c").member("A")),
                        ("N", param("c").member("Name")),
                    ])
                )),
                field("A"),
                lambda(&["k"], param("k").member("Key")),
                lambda(
                    &["o", "k"],
                    new_object(vec![
                        ("B", param("o").member("B")),
                        ("N", param("k").member("N")),
                    ])
                ),
            ]
        ),
    );

    test_compile!(
        lookup_of_filtered_query,
        expected = Ok(vec![
            doc! {"$project": {"_local": "$$ROOT", "_id": 0}},
            doc! {"$lookup": {
                "from": "customers",
                "pipeline": [{"$match": {"Name": "n"}}],
                "as": "_results",
            }},
        ]),
        input = orders().call(
            Method::Lookup,
            vec![customers().where_(lambda(
                &["c"],
                param("c").member("Name").equal(constant("n"))
            ))]
        ),
    );

    test_compile!(
        lookup_with_predicate_binds_local,
        expected = Ok(vec![
            doc! {"$project": {"_local": "$$ROOT", "_id": 0}},
            doc! {"$lookup": {
                "from": "customers",
                "let": {"local": "$_local"},
                "pipeline": [{"$match": {"$expr": {"$eq": ["$$local.A", "$A"]}}}],
                "as": "_results",
            }},
        ]),
        input = orders().call(
            Method::Lookup,
            vec![
                customers(),
                lambda(
                    &["o", "c"],
                    param("o").member("A").equal(param("c").member("A"))
                ),
            ]
        ),
    );

    test_compile!(
        union_removes_duplicates,
        expected = Ok(vec![
            doc! {"$unionWith": "archive"},
            doc! {"$group": {"_id": "$$ROOT"}},
            doc! {"$replaceRoot": {"newRoot": "$_id"}},
        ]),
        input = orders().call(Method::Union, vec![source("archive", "Order")]),
    );

    test_compile!(
        concat_with_filtered_pipeline,
        expected = Ok(vec![doc! {"$unionWith": {
            "coll": "archive",
            "pipeline": [{"$match": {"Paid": true}}],
        }}]),
        input = orders().call(
            Method::Concat,
            vec![source("archive", "Order").where_(field("Paid"))]
        ),
    );

    test_compile_error!(
        union_of_different_shapes,
        expected_pat = Err(result::Error::Translator(Error::ExpressionNotSupported { .. })),
        input = orders().call(Method::Union, vec![customers()]),
    );
}

mod stages {
    use super::*;

    test_compile!(
        of_type_matches_the_discriminator,
        expected = Ok(vec![doc! {"$match": {"_t": "dog"}}]),
        input = animals().call(Method::OfType("Dog".to_string()), vec![]),
    );

    test_compile!(
        of_type_with_shared_discriminator,
        expected = Err(result::Error::Translator(Error::AmbiguousDiscriminator {
            type_name: "Cat".to_string(),
            value: Bson::String("cat".to_string()).to_string(),
            candidates: vec!["Cat".to_string(), "Lion".to_string()],
        })),
        input = animals().call(Method::OfType("Cat".to_string()), vec![]),
    );

    test_compile!(
        of_type_without_convention,
        expected = Err(result::Error::Translator(Error::UnknownType("Order".to_string()))),
        input = animals().call(Method::OfType("Order".to_string()), vec![]),
    );

    test_compile!(
        appended_stage_is_passed_through,
        expected = Ok(vec![
            doc! {"$match": {"Paid": true}},
            doc! {"$setWindowFields": {"output": {"n": {"$count": {}}}}},
        ]),
        input = orders().where_(field("Paid")).call(
            Method::AppendStage(AppendStage {
                stage: doc! {"$setWindowFields": {"output": {"n": {"$count": {}}}}},
                output_type: None,
            }),
            vec![]
        ),
    );

    test_compile!(
        densify_on_a_field,
        expected = Ok(vec![doc! {"$densify": {
            "field": "U",
            "partitionByFields": ["A"],
            "range": {"step": 1, "bounds": "full"},
        }}]),
        input = orders().call(
            Method::Densify(DensifyRange {
                step: Bson::Int32(1),
                unit: None,
                bounds: DensifyBounds::Full,
            }),
            vec![field("U"), field("A")]
        ),
    );
}

#[test]
fn options_deserialize_with_defaults() {
    let options: TranslationOptions =
        bson::from_document(doc! {"enableClientSideProjection": true}).unwrap();
    assert_eq!(TranslationOptions::new(true, true), options);
    let options: TranslationOptions = bson::from_document(doc! {}).unwrap();
    assert_eq!(TranslationOptions::default(), options);
}
