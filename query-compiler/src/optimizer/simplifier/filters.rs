use bson::{Bson, Regex};
use pipeline_ast::{
    definitions::{
        BinaryExpression, BinaryOperator, Comparison, ComparisonOperator, Expression,
        FieldFilter, Filter, FilterOperation, Map, UnaryExpression, UnaryOperator,
    },
    ELEMENT_SENTINEL,
};

use crate::optimizer::util::split_variable_path;

/// Whether `{ field : value }` means the same as `{ field : { $eq : value } }`.
/// A regular expression matches instead of comparing, and a document whose
/// first key starts with `$` would be read as an operator document.
fn is_implied_equality_safe(value: &Bson) -> bool {
    match value {
        Bson::RegularExpression(_) => false,
        Bson::Document(d) => !d.keys().any(|k| k.starts_with('$')),
        _ => true,
    }
}

fn equality(value: Bson) -> FilterOperation {
    if is_implied_equality_safe(&value) {
        FilterOperation::ImpliedEquality(value)
    } else {
        FilterOperation::Comparison(Comparison {
            op: ComparisonOperator::Eq,
            value,
        })
    }
}

fn sorted_options(options: &str) -> String {
    let mut options: Vec<char> = options.chars().collect();
    options.sort_unstable();
    options.into_iter().collect()
}

/// Applies the filter operation rules to a node whose children are already
/// simplified.
pub(super) fn simplify_filter_operation(node: FilterOperation) -> FilterOperation {
    match node {
        FilterOperation::Comparison(Comparison {
            op: ComparisonOperator::Eq,
            value,
        }) => equality(value),
        FilterOperation::Regex(r) => FilterOperation::ImpliedEquality(Bson::RegularExpression(Regex {
            pattern: r.pattern,
            options: sorted_options(&r.options),
        })),
        FilterOperation::Not(op) => match *op {
            FilterOperation::Comparison(Comparison {
                op: ComparisonOperator::Eq,
                value,
            }) => FilterOperation::Comparison(Comparison {
                op: ComparisonOperator::Ne,
                value,
            }),
            FilterOperation::ImpliedEquality(value) if is_implied_equality_safe(&value) => {
                FilterOperation::Comparison(Comparison {
                    op: ComparisonOperator::Ne,
                    value,
                })
            }
            FilterOperation::Comparison(Comparison {
                op: ComparisonOperator::Ne,
                value,
            }) => equality(value),
            FilterOperation::Not(inner) => *inner,
            op => FilterOperation::Not(Box::new(op)),
        },
        FilterOperation::ElemMatch(filter) => match *filter {
            Filter::Field(FieldFilter {
                path,
                operation: FilterOperation::ImpliedEquality(value),
            }) if path == ELEMENT_SENTINEL && is_scalar(&value) => {
                FilterOperation::ImpliedEquality(value)
            }
            filter => FilterOperation::ElemMatch(Box::new(filter)),
        },
        op => op,
    }
}

fn is_scalar(value: &Bson) -> bool {
    !matches!(
        value,
        Bson::Document(_) | Bson::Array(_) | Bson::RegularExpression(_) | Bson::Null
    )
}

/// Applies the filter rules to a node whose children are already simplified.
pub(super) fn simplify_filter(node: Filter) -> Filter {
    match node {
        Filter::And(filters) => {
            let mut flattened = Vec::with_capacity(filters.len());
            for f in filters {
                match f {
                    Filter::MatchesEverything => {}
                    Filter::And(inner) => flattened.extend(inner),
                    f => flattened.push(f),
                }
            }
            match flattened.len() {
                0 => Filter::MatchesEverything,
                1 => flattened.pop().unwrap_or(Filter::MatchesEverything),
                _ => Filter::And(flattened),
            }
        }
        Filter::Or(filters) => {
            if filters.contains(&Filter::MatchesEverything) {
                return Filter::MatchesEverything;
            }
            let mut flattened = Vec::with_capacity(filters.len());
            for f in filters {
                match f {
                    Filter::Or(inner) => flattened.extend(inner),
                    f => flattened.push(f),
                }
            }
            match flattened.len() {
                1 => flattened.pop().unwrap_or(Filter::MatchesEverything),
                _ => Filter::Or(flattened),
            }
        }
        Filter::Expr(Expression::Constant(Bson::Boolean(true))) => Filter::MatchesEverything,
        Filter::Expr(e) => match constant_membership(&e) {
            Some((path, values)) => Filter::field(path, FilterOperation::In(values)),
            None => Filter::Expr(e),
        },
        node => node,
    }
}

/// Matches
/// `{ $anyElementTrue : { $map : { input : [..], as : v, in : { $eq : ["$path", "$$v"] } } } }`
/// with the comparison in either order.
fn constant_membership(e: &Expression) -> Option<(String, Vec<Bson>)> {
    let Expression::Unary(UnaryExpression {
        op: UnaryOperator::AnyElementTrue,
        arg,
    }) = e
    else {
        return None;
    };
    let Expression::Map(Map {
        input,
        as_var,
        inside,
    }) = arg.as_ref()
    else {
        return None;
    };
    let Expression::Constant(Bson::Array(values)) = input.as_ref() else {
        return None;
    };
    let Expression::Binary(BinaryExpression {
        op: BinaryOperator::Eq,
        left,
        right,
    }) = inside.as_ref()
    else {
        return None;
    };
    let path = match (document_path(left), document_path(right)) {
        (Some(path), None) if is_variable(right, as_var) => path,
        (None, Some(path)) if is_variable(left, as_var) => path,
        _ => return None,
    };
    Some((path.to_string(), values.clone()))
}

/// Returns the path of a `$path` field path on the current document.
fn document_path(e: &Expression) -> Option<&str> {
    match e {
        Expression::FieldPath(p) if !p.starts_with("$$") => p.strip_prefix('$'),
        _ => None,
    }
}

fn is_variable(e: &Expression, name: &str) -> bool {
    match e {
        Expression::Variable(v) => !v.is_current && v.name == name,
        Expression::FieldPath(p) => matches!(split_variable_path(p), Some((n, None)) if n == name),
        _ => false,
    }
}
