use crate::optimizer::simplifier::SimplifierOptimizer;
use bson::{bson, Bson, Regex};
use pipeline_ast::{definitions::*, map};

fn simplify_expression(e: Expression) -> Expression {
    match SimplifierOptimizer::simplify(vec![Stage::ReplaceRoot(e)]).as_slice() {
        [Stage::ReplaceRoot(e)] => e.clone(),
        other => panic!("unexpected stages {other:?}"),
    }
}

fn simplify_filter(f: Filter) -> Filter {
    match SimplifierOptimizer::simplify(vec![Stage::Match(f), Stage::Limit(1)]).as_slice() {
        [Stage::Match(f), Stage::Limit(1)] => f.clone(),
        [Stage::Limit(1)] => Filter::MatchesEverything,
        other => panic!("unexpected stages {other:?}"),
    }
}

macro_rules! test_simplify_expr {
    ($func_name:ident, expected = $expected:expr, input = $input:expr,) => {
        #[test]
        fn $func_name() {
            let expected: Expression = $expected;
            let actual = simplify_expression($input);
            assert_eq!(expected, actual);
            assert_eq!(actual, simplify_expression(actual.clone()));
        }
    };
}

macro_rules! test_simplify_filter {
    ($func_name:ident, expected = $expected:expr, input = $input:expr,) => {
        #[test]
        fn $func_name() {
            let expected: Filter = $expected;
            let actual = simplify_filter($input);
            assert_eq!(expected, actual);
            assert_eq!(actual, simplify_filter(actual.clone()));
        }
    };
}

macro_rules! test_simplify_stages {
    ($func_name:ident, expected = $expected:expr, input = $input:expr,) => {
        #[test]
        fn $func_name() {
            let expected: Vec<Stage> = $expected;
            let actual = SimplifierOptimizer::simplify($input);
            assert_eq!(expected, actual);
            assert_eq!(actual, SimplifierOptimizer::simplify(actual.clone()));
        }
    };
}

fn path(p: &str) -> Expression {
    Expression::FieldPath(p.to_string())
}

fn int(i: i32) -> Expression {
    Expression::Constant(Bson::Int32(i))
}

fn null() -> Expression {
    Expression::Constant(Bson::Null)
}

fn boolean(b: bool) -> Expression {
    Expression::Constant(Bson::Boolean(b))
}

fn slice(array: Expression, position: Option<i32>, n: i32) -> Expression {
    Expression::Slice(Slice {
        array: Box::new(array),
        position: position.map(|p| Box::new(int(p))),
        n: Box::new(int(n)),
    })
}

fn skip(array: Expression, n: i32) -> Expression {
    slice(array, Some(n), i32::MAX)
}

fn take(array: Expression, n: i32) -> Expression {
    slice(array, None, n)
}

fn ten_numbers() -> Expression {
    Expression::Constant(Bson::Array((0..10).map(Bson::Int32).collect()))
}

mod if_null {
    use super::*;

    test_simplify_expr!(
        null_left_returns_right,
        expected = path("$b"),
        input = Expression::binary(BinaryOperator::IfNull, null(), path("$b")),
    );

    test_simplify_expr!(
        non_null_constant_left_returns_left,
        expected = int(1),
        input = Expression::binary(BinaryOperator::IfNull, int(1), path("$b")),
    );

    test_simplify_expr!(
        null_right_returns_left,
        expected = path("$a"),
        input = Expression::binary(BinaryOperator::IfNull, path("$a"), null()),
    );

    test_simplify_expr!(
        field_paths_are_kept,
        expected = Expression::binary(BinaryOperator::IfNull, path("$a"), path("$b")),
        input = Expression::binary(BinaryOperator::IfNull, path("$a"), path("$b")),
    );
}

mod cond {
    use super::*;

    fn null_check(tested: Expression, else_branch: Expression) -> Expression {
        Expression::Cond(Cond {
            condition: Box::new(Expression::binary(BinaryOperator::Eq, tested, null())),
            then_branch: Box::new(null()),
            else_branch: Box::new(else_branch),
        })
    }

    test_simplify_expr!(
        null_check_of_same_value_collapses,
        expected = path("$a"),
        input = null_check(path("$a"), path("$a")),
    );

    test_simplify_expr!(
        null_check_of_conversion_collapses,
        expected = Expression::unary(UnaryOperator::ToString, path("$a")),
        input = null_check(path("$a"), Expression::unary(UnaryOperator::ToString, path("$a"))),
    );

    test_simplify_expr!(
        null_check_of_other_value_is_kept,
        expected = null_check(path("$a"), path("$b")),
        input = null_check(path("$a"), path("$b")),
    );

    test_simplify_expr!(
        constant_condition_selects_branch,
        expected = path("$b"),
        input = Expression::Cond(Cond {
            condition: Box::new(boolean(false)),
            then_branch: Box::new(path("$a")),
            else_branch: Box::new(path("$b")),
        }),
    );
}

mod get_field {
    use super::*;

    test_simplify_expr!(
        field_of_root_becomes_field_path,
        expected = path("$a"),
        input = Expression::get_field(Expression::root(), "a"),
    );

    test_simplify_expr!(
        nested_fields_become_dotted_path,
        expected = path("$a.b"),
        input = Expression::get_field(Expression::get_field(Expression::root(), "a"), "b"),
    );

    test_simplify_expr!(
        field_of_variable_becomes_variable_path,
        expected = path("$$x.a"),
        input = Expression::get_field(Expression::var("x"), "a"),
    );

    test_simplify_expr!(
        unsafe_field_name_is_kept,
        expected = Expression::get_field(Expression::root(), "$price"),
        input = Expression::get_field(Expression::root(), "$price"),
    );

    test_simplify_expr!(
        field_of_computed_document_is_the_field_value,
        expected = path("$b"),
        input = Expression::get_field(
            Expression::ComputedDocument(map! {
                "x".to_string() => path("$a"),
                "y".to_string() => path("$b"),
            }),
            "y"
        ),
    );

    test_simplify_expr!(
        field_of_computed_value_lowers_to_let,
        expected = Expression::Let(Let {
            vars: vec![VarBinding {
                name: "this".to_string(),
                value: Expression::binary(BinaryOperator::ArrayElemAt, path("$a"), int(0)),
            }],
            inside: Box::new(path("$$this.x")),
        }),
        input = Expression::get_field(Expression::unary(UnaryOperator::First, path("$a")), "x"),
    );
}

mod let_and_map {
    use super::*;

    test_simplify_expr!(
        let_returning_its_binding_collapses,
        expected = path("$a"),
        input = Expression::Let(Let {
            vars: vec![VarBinding {
                name: "v".to_string(),
                value: path("$a"),
            }],
            inside: Box::new(Expression::var("v")),
        }),
    );

    test_simplify_expr!(
        identity_map_collapses,
        expected = path("$a"),
        input = Expression::map(path("$a"), "x", Expression::var("x")),
    );

    test_simplify_expr!(
        field_of_mapped_documents_fuses,
        expected = Expression::map(path("$a"), "x", path("$$x.g")),
        input = Expression::map(
            Expression::map(
                path("$a"),
                "x",
                Expression::ComputedDocument(map! {
                    "f".to_string() => Expression::get_field(Expression::var("x"), "g"),
                    "h".to_string() => int(1),
                })
            ),
            "y",
            Expression::get_field(Expression::var("y"), "f")
        ),
    );

    test_simplify_expr!(
        field_of_literal_documents_fuses,
        expected = Expression::ComputedArray(vec![int(1), path("$b")]),
        input = Expression::map(
            Expression::ComputedArray(vec![
                Expression::ComputedDocument(map! { "f".to_string() => int(1) }),
                Expression::ComputedDocument(map! { "f".to_string() => path("$b") }),
            ]),
            "y",
            Expression::get_field(Expression::var("y"), "f")
        ),
    );

    test_simplify_expr!(
        filter_with_true_condition_is_its_input,
        expected = path("$a"),
        input = Expression::Filter(FilterExpression {
            input: Box::new(path("$a")),
            as_var: "x".to_string(),
            cond: Box::new(boolean(true)),
            limit: None,
        }),
    );

    test_simplify_expr!(
        filter_with_false_condition_is_empty,
        expected = Expression::Constant(Bson::Array(vec![])),
        input = Expression::Filter(FilterExpression {
            input: Box::new(path("$a")),
            as_var: "x".to_string(),
            cond: Box::new(boolean(false)),
            limit: None,
        }),
    );
}

mod slice {
    use super::*;

    test_simplify_expr!(
        skip_zero_is_identity,
        expected = path("$a"),
        input = skip(path("$a"), 0),
    );

    test_simplify_expr!(
        constant_slice_is_evaluated,
        expected = Expression::Constant(bson!([1, 2])),
        input = slice(ten_numbers(), Some(1), 2),
    );

    test_simplify_expr!(
        negative_take_of_constant_takes_from_end,
        expected = Expression::Constant(bson!([8, 9])),
        input = take(ten_numbers(), -2),
    );

    test_simplify_expr!(
        nested_skips_and_takes_fuse,
        expected = slice(path("$a"), Some(3), 2),
        input = take(skip(take(skip(path("$a"), 2), 5), 1), 2),
    );

    test_simplify_expr!(
        fused_slice_matches_skip_and_take_on_literal,
        expected = Expression::Constant(bson!([3, 4])),
        input = take(skip(take(skip(ten_numbers(), 2), 5), 1), 2),
    );

    test_simplify_expr!(
        take_beyond_inner_take_is_bounded,
        expected = slice(path("$a"), Some(4), 1),
        input = take(skip(take(path("$a"), 5), 4), 3),
    );

    test_simplify_expr!(
        empty_fusion_is_kept,
        expected = take(skip(path("$a"), 2), 0),
        input = take(skip(path("$a"), 2), 0),
    );

    fn long_slice(array: Expression, position: Option<i64>, n: i64) -> Expression {
        Expression::Slice(Slice {
            array: Box::new(array),
            position: position.map(|p| Box::new(Expression::Constant(Bson::Int64(p)))),
            n: Box::new(Expression::Constant(Bson::Int64(n))),
        })
    }

    test_simplify_expr!(
        take_of_most_negative_count_is_kept,
        expected = long_slice(ten_numbers(), None, i64::MIN),
        input = long_slice(ten_numbers(), None, i64::MIN),
    );

    test_simplify_expr!(
        fusion_with_overflowing_position_is_kept,
        expected = Expression::Slice(Slice {
            array: Box::new(long_slice(path("$a"), Some(i64::MAX), 5)),
            position: Some(Box::new(Expression::Constant(Bson::Int64(i64::MAX)))),
            n: Box::new(int(2)),
        }),
        input = Expression::Slice(Slice {
            array: Box::new(long_slice(path("$a"), Some(i64::MAX), 5)),
            position: Some(Box::new(Expression::Constant(Bson::Int64(i64::MAX)))),
            n: Box::new(int(2)),
        }),
    );

    #[test]
    fn fused_parameters_match_direct_evaluation() {
        let nested = take(skip(take(skip(ten_numbers(), 2), 5), 1), 2);
        let fused = match simplify_expression(take(skip(take(skip(path("$a"), 2), 5), 1), 2)) {
            Expression::Slice(s) => Expression::Slice(Slice {
                array: Box::new(ten_numbers()),
                ..s
            }),
            other => panic!("expected a slice, found {other:?}"),
        };
        assert_eq!(simplify_expression(nested), simplify_expression(fused));
    }
}

mod operators {
    use super::*;

    test_simplify_expr!(
        first_becomes_element_zero,
        expected = Expression::binary(BinaryOperator::ArrayElemAt, path("$a"), int(0)),
        input = Expression::unary(UnaryOperator::First, path("$a")),
    );

    test_simplify_expr!(
        last_becomes_element_minus_one,
        expected = Expression::binary(BinaryOperator::ArrayElemAt, path("$a"), int(-1)),
        input = Expression::unary(UnaryOperator::Last, path("$a")),
    );

    test_simplify_expr!(
        not_of_constant_folds,
        expected = boolean(false),
        input = Expression::unary(UnaryOperator::Not, boolean(true)),
    );

    test_simplify_expr!(
        not_of_equality_flips,
        expected = Expression::binary(BinaryOperator::Ne, path("$a"), int(1)),
        input = Expression::unary(
            UnaryOperator::Not,
            Expression::binary(BinaryOperator::Eq, path("$a"), int(1))
        ),
    );

    test_simplify_expr!(
        array_to_object_of_literal_pairs,
        expected = Expression::ComputedDocument(map! {
            "a".to_string() => int(1),
            "b".to_string() => Expression::Constant(Bson::String("x".to_string())),
        }),
        input = Expression::unary(
            UnaryOperator::ArrayToObject,
            Expression::Constant(bson!([{ "k": "a", "v": 1 }, { "k": "b", "v": "x" }]))
        ),
    );

    test_simplify_expr!(
        and_drops_true_and_flattens,
        expected = Expression::nary(NaryOperator::And, vec![path("$a"), path("$b"), path("$c")]),
        input = Expression::nary(
            NaryOperator::And,
            vec![
                boolean(true),
                path("$a"),
                Expression::nary(NaryOperator::And, vec![path("$b"), path("$c")]),
            ]
        ),
    );

    test_simplify_expr!(
        and_with_false_is_false,
        expected = boolean(false),
        input = Expression::nary(NaryOperator::And, vec![path("$a"), boolean(false)]),
    );

    test_simplify_expr!(
        or_with_true_is_true,
        expected = boolean(true),
        input = Expression::nary(NaryOperator::Or, vec![path("$a"), boolean(true)]),
    );
}

mod filter {
    use super::*;

    test_simplify_filter!(
        eq_becomes_implied_equality,
        expected = Filter::field("a", FilterOperation::ImpliedEquality("x".into())),
        input = Filter::compare("a", ComparisonOperator::Eq, "x"),
    );

    test_simplify_filter!(
        eq_of_regex_is_kept,
        expected = Filter::compare(
            "a",
            ComparisonOperator::Eq,
            Bson::RegularExpression(Regex {
                pattern: "^x".to_string(),
                options: String::new(),
            })
        ),
        input = Filter::compare(
            "a",
            ComparisonOperator::Eq,
            Bson::RegularExpression(Regex {
                pattern: "^x".to_string(),
                options: String::new(),
            })
        ),
    );

    test_simplify_filter!(
        eq_of_operator_document_is_kept,
        expected = Filter::compare("a", ComparisonOperator::Eq, bson!({ "$gt": 1 })),
        input = Filter::compare("a", ComparisonOperator::Eq, bson!({ "$gt": 1 })),
    );

    test_simplify_filter!(
        regex_becomes_regular_expression_value,
        expected = Filter::field(
            "a",
            FilterOperation::ImpliedEquality(Bson::RegularExpression(Regex {
                pattern: "^x".to_string(),
                options: "im".to_string(),
            }))
        ),
        input = Filter::field(
            "a",
            FilterOperation::Regex(RegexOperation {
                pattern: "^x".to_string(),
                options: "mi".to_string(),
            })
        ),
    );

    test_simplify_filter!(
        not_eq_becomes_ne,
        expected = Filter::compare("a", ComparisonOperator::Ne, 1),
        input = Filter::field(
            "a",
            FilterOperation::Not(Box::new(FilterOperation::Comparison(Comparison {
                op: ComparisonOperator::Eq,
                value: 1.into(),
            })))
        ),
    );

    test_simplify_filter!(
        not_ne_becomes_implied_equality,
        expected = Filter::field("a", FilterOperation::ImpliedEquality(1.into())),
        input = Filter::field(
            "a",
            FilterOperation::Not(Box::new(FilterOperation::Comparison(Comparison {
                op: ComparisonOperator::Ne,
                value: 1.into(),
            })))
        ),
    );

    test_simplify_filter!(
        not_regex_is_kept,
        expected = Filter::field(
            "a",
            FilterOperation::Not(Box::new(FilterOperation::ImpliedEquality(
                Bson::RegularExpression(Regex {
                    pattern: "x".to_string(),
                    options: String::new(),
                })
            )))
        ),
        input = Filter::field(
            "a",
            FilterOperation::Not(Box::new(FilterOperation::Regex(RegexOperation {
                pattern: "x".to_string(),
                options: String::new(),
            })))
        ),
    );

    test_simplify_filter!(
        elem_match_of_scalar_equality_becomes_implied_equality,
        expected = Filter::field("tags", FilterOperation::ImpliedEquality("red".into())),
        input = Filter::field(
            "tags",
            FilterOperation::ElemMatch(Box::new(Filter::element(
                FilterOperation::Comparison(Comparison {
                    op: ComparisonOperator::Eq,
                    value: "red".into(),
                })
            )))
        ),
    );

    test_simplify_filter!(
        elem_match_of_fields_is_kept,
        expected = Filter::field(
            "items",
            FilterOperation::ElemMatch(Box::new(Filter::field(
                "x",
                FilterOperation::ImpliedEquality(1.into())
            )))
        ),
        input = Filter::field(
            "items",
            FilterOperation::ElemMatch(Box::new(Filter::compare("x", ComparisonOperator::Eq, 1)))
        ),
    );

    test_simplify_filter!(
        and_flattens_and_drops_matches_everything,
        expected = Filter::And(vec![
            Filter::compare("a", ComparisonOperator::Gt, 1),
            Filter::compare("b", ComparisonOperator::Lt, 2),
            Filter::compare("c", ComparisonOperator::Lt, 3),
        ]),
        input = Filter::And(vec![
            Filter::compare("a", ComparisonOperator::Gt, 1),
            Filter::MatchesEverything,
            Filter::And(vec![
                Filter::compare("b", ComparisonOperator::Lt, 2),
                Filter::compare("c", ComparisonOperator::Lt, 3),
            ]),
        ]),
    );

    test_simplify_filter!(
        and_of_one_filter_is_that_filter,
        expected = Filter::compare("a", ComparisonOperator::Gt, 1),
        input = Filter::And(vec![
            Filter::Expr(boolean(true)),
            Filter::compare("a", ComparisonOperator::Gt, 1),
        ]),
    );

    test_simplify_filter!(
        or_with_matches_everything_matches_everything,
        expected = Filter::MatchesEverything,
        input = Filter::Or(vec![
            Filter::compare("a", ComparisonOperator::Gt, 1),
            Filter::MatchesEverything,
        ]),
    );

    test_simplify_filter!(
        membership_in_constant_array_becomes_in,
        expected = Filter::field("a", FilterOperation::In(vec![1.into(), 2.into()])),
        input = Filter::Expr(Expression::unary(
            UnaryOperator::AnyElementTrue,
            Expression::map(
                Expression::Constant(bson!([1, 2])),
                "v",
                Expression::binary(
                    BinaryOperator::Eq,
                    Expression::get_field(Expression::root(), "a"),
                    Expression::var("v")
                )
            )
        )),
    );

    test_simplify_filter!(
        membership_with_reversed_comparison_becomes_in,
        expected = Filter::field("a.b", FilterOperation::In(vec!["x".into()])),
        input = Filter::Expr(Expression::unary(
            UnaryOperator::AnyElementTrue,
            Expression::map(
                Expression::Constant(bson!(["x"])),
                "v",
                Expression::binary(BinaryOperator::Eq, Expression::var("v"), path("$a.b"))
            )
        )),
    );

    #[test]
    fn explicit_and_implied_equality_render_identically() {
        let explicit = simplify_filter(Filter::compare("a", ComparisonOperator::Eq, "x"));
        let implied = simplify_filter(Filter::field(
            "a",
            FilterOperation::ImpliedEquality("x".into()),
        ));
        let explicit = bson::to_vec(&explicit.render()).expect("explicit filter serializes");
        let implied = bson::to_vec(&implied.render()).expect("implied filter serializes");
        assert_eq!(explicit, implied);
    }
}

mod stages {
    use super::*;

    test_simplify_stages!(
        matches_everything_stage_is_removed,
        expected = vec![Stage::Limit(1)],
        input = vec![
            Stage::Match(Filter::MatchesEverything),
            Stage::Match(Filter::Expr(boolean(true))),
            Stage::Limit(1),
        ],
    );

    test_simplify_stages!(
        lookup_pipeline_is_simplified,
        expected = vec![Stage::Lookup(Lookup {
            from: Some("b".to_string()),
            local_field: None,
            foreign_field: None,
            let_vars: vec![VarBinding {
                name: "key".to_string(),
                value: path("$_outer.k"),
            }],
            pipeline: Some(vec![Stage::Match(Filter::Expr(Expression::binary(
                BinaryOperator::Eq,
                path("$k"),
                Expression::var("key")
            )))]),
            as_field: "_inner".to_string(),
        })],
        input = vec![Stage::Lookup(Lookup {
            from: Some("b".to_string()),
            local_field: None,
            foreign_field: None,
            let_vars: vec![VarBinding {
                name: "key".to_string(),
                value: Expression::get_field(
                    Expression::get_field(Expression::root(), "_outer"),
                    "k"
                ),
            }],
            pipeline: Some(vec![
                Stage::Match(Filter::MatchesEverything),
                Stage::Match(Filter::Expr(Expression::binary(
                    BinaryOperator::Eq,
                    Expression::get_field(Expression::root(), "k"),
                    Expression::var("key")
                ))),
            ]),
            as_field: "_inner".to_string(),
        })],
    );
}
