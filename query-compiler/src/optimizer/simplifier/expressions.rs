use crate::optimizer::util::{count_variable_uses, split_variable_path};
use bson::Bson;
use linked_hash_map::LinkedHashMap;
use pipeline_ast::definitions::{
    BinaryExpression, BinaryOperator, Cond, Expression, FilterExpression, GetField, Let, Map,
    NaryExpression, NaryOperator, Slice, UnaryExpression, UnaryOperator, VarBinding,
};

/// Variable bound by the $let that a field access on a computed value
/// lowers to.
const THIS_VAR: &str = "this";

/// Applies the expression rules to a node whose children are already
/// simplified. Rules that build a new node apply the rules to it again.
pub(super) fn simplify_expression(node: Expression) -> Expression {
    match node {
        Expression::Binary(b) => simplify_binary(b),
        Expression::Unary(u) => simplify_unary(u),
        Expression::Nary(n) => simplify_nary(n),
        Expression::Cond(c) => simplify_cond(c),
        Expression::GetField(g) => simplify_get_field(g),
        Expression::Let(l) => simplify_let(l),
        Expression::Map(m) => simplify_map(m),
        Expression::Filter(f) => simplify_filter_expression(f),
        Expression::Slice(s) => simplify_slice(s),
        node => node,
    }
}

fn is_non_null_constant(e: &Expression) -> bool {
    matches!(e, Expression::Constant(c) if *c != Bson::Null && *c != Bson::Undefined)
}

fn simplify_binary(b: BinaryExpression) -> Expression {
    match b.op {
        BinaryOperator::IfNull if b.left.is_null_constant() => *b.right,
        BinaryOperator::IfNull if is_non_null_constant(&b.left) => *b.left,
        BinaryOperator::IfNull if b.right.is_null_constant() => *b.left,
        _ => Expression::Binary(b),
    }
}

fn simplify_unary(u: UnaryExpression) -> Expression {
    match (u.op, *u.arg) {
        (UnaryOperator::First, arg) => Expression::binary(
            BinaryOperator::ArrayElemAt,
            arg,
            Expression::Constant(Bson::Int32(0)),
        ),
        (UnaryOperator::Last, arg) => Expression::binary(
            BinaryOperator::ArrayElemAt,
            arg,
            Expression::Constant(Bson::Int32(-1)),
        ),
        (UnaryOperator::Not, Expression::Constant(Bson::Boolean(b))) => {
            Expression::Constant(Bson::Boolean(!b))
        }
        (UnaryOperator::Not, Expression::Binary(b)) if b.op.comparison_inverse().is_some() => {
            match b.op.comparison_inverse() {
                Some(op) => Expression::Binary(BinaryExpression { op, ..b }),
                None => Expression::unary(UnaryOperator::Not, Expression::Binary(b)),
            }
        }
        (UnaryOperator::ArrayToObject, arg) => match array_to_object(&arg) {
            Some(document) => Expression::ComputedDocument(document),
            None => Expression::unary(UnaryOperator::ArrayToObject, arg),
        },
        (op, arg) => Expression::unary(op, arg),
    }
}

/// Evaluates $arrayToObject on a literal array of `{ k, v }` documents.
fn array_to_object(arg: &Expression) -> Option<LinkedHashMap<String, Expression>> {
    let pairs: Vec<(String, Expression)> = match arg {
        Expression::Constant(Bson::Array(items)) => items
            .iter()
            .map(|item| match item {
                Bson::Document(d) if d.len() == 2 => match (d.get("k"), d.get("v")) {
                    (Some(Bson::String(k)), Some(v)) => {
                        Some((k.clone(), Expression::Constant(v.clone())))
                    }
                    _ => None,
                },
                _ => None,
            })
            .collect::<Option<_>>()?,
        Expression::ComputedArray(items) => items
            .iter()
            .map(|item| match item {
                Expression::ComputedDocument(d) if d.len() == 2 => {
                    match (d.get("k"), d.get("v")) {
                        (Some(Expression::Constant(Bson::String(k))), Some(v)) => {
                            Some((k.clone(), v.clone()))
                        }
                        _ => None,
                    }
                }
                _ => None,
            })
            .collect::<Option<_>>()?,
        _ => return None,
    };
    let mut document = LinkedHashMap::new();
    for (k, v) in pairs {
        if document.insert(k, v).is_some() {
            return None;
        }
    }
    Some(document)
}

fn simplify_nary(n: NaryExpression) -> Expression {
    let (identity, absorbing) = match n.op {
        NaryOperator::And => (true, false),
        NaryOperator::Or => (false, true),
        _ => return Expression::Nary(n),
    };
    let mut args = Vec::with_capacity(n.args.len());
    for arg in n.args {
        match arg {
            Expression::Constant(Bson::Boolean(b)) if b == identity => {}
            Expression::Constant(Bson::Boolean(b)) if b == absorbing => {
                return Expression::Constant(Bson::Boolean(absorbing))
            }
            Expression::Nary(inner) if inner.op == n.op => args.extend(inner.args),
            arg => args.push(arg),
        }
    }
    if args.is_empty() {
        return Expression::Constant(Bson::Boolean(identity));
    }
    Expression::Nary(NaryExpression { op: n.op, args })
}

/// Matches `{ $eq : [expr, null] }` in either order and returns `expr`.
fn null_test_operand(condition: &Expression) -> Option<&Expression> {
    match condition {
        Expression::Binary(b) if b.op == BinaryOperator::Eq => {
            if b.right.is_null_constant() {
                Some(&b.left)
            } else if b.left.is_null_constant() {
                Some(&b.right)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn simplify_cond(c: Cond) -> Expression {
    if let Expression::Constant(Bson::Boolean(b)) = c.condition.as_ref() {
        return if *b { *c.then_branch } else { *c.else_branch };
    }
    let collapses = match null_test_operand(&c.condition) {
        Some(tested) if c.then_branch.is_null_constant() => {
            *c.else_branch == *tested
                || matches!(
                    c.else_branch.as_ref(),
                    Expression::Unary(u) if u.op.is_null_preserving_conversion() && *u.arg == *tested
                )
        }
        _ => false,
    };
    if collapses {
        *c.else_branch
    } else {
        Expression::Cond(c)
    }
}

/// Whether a field name can be written as part of a field path.
fn is_path_safe(name: &str) -> bool {
    !name.is_empty() && !name.contains('.') && !name.starts_with('$')
}

fn simplify_get_field(g: GetField) -> Expression {
    let name = match g.field.as_ref() {
        Expression::Constant(Bson::String(name)) if is_path_safe(name) => name.clone(),
        _ => return Expression::GetField(g),
    };
    match *g.input {
        Expression::Variable(v) if v.is_current => Expression::FieldPath(format!("${name}")),
        Expression::Variable(v) => Expression::FieldPath(format!("$${}.{name}", v.name)),
        Expression::FieldPath(p) => Expression::FieldPath(format!("{p}.{name}")),
        Expression::ComputedDocument(mut fields) if fields.contains_key(&name) => {
            match fields.remove(&name) {
                Some(field) => field,
                None => Expression::get_field(Expression::ComputedDocument(fields), name),
            }
        }
        input => Expression::Let(Let {
            vars: vec![VarBinding {
                name: THIS_VAR.to_string(),
                value: input,
            }],
            inside: Box::new(Expression::FieldPath(format!("$${THIS_VAR}.{name}"))),
        }),
    }
}

/// Whether the expression is exactly a reference to the variable.
fn is_variable_reference(e: &Expression, name: &str) -> bool {
    match e {
        Expression::Variable(v) => !v.is_current && v.name == name,
        Expression::FieldPath(p) => matches!(split_variable_path(p), Some((n, None)) if n == name),
        _ => false,
    }
}

fn simplify_let(mut l: Let) -> Expression {
    let (returns_binding, unused) = match l.vars.as_slice() {
        [binding] => (
            is_variable_reference(&l.inside, &binding.name),
            count_variable_uses(&l.inside, &binding.name) == 0,
        ),
        _ => (false, false),
    };
    if unused {
        return *l.inside;
    }
    match l.vars.pop() {
        Some(binding) if returns_binding => binding.value,
        Some(binding) => {
            l.vars.push(binding);
            Expression::Let(l)
        }
        None => Expression::Let(l),
    }
}

/// Matches `$$name.field` and returns the field.
fn variable_field<'a>(e: &'a Expression, name: &str) -> Option<&'a str> {
    match e {
        Expression::FieldPath(p) => match split_variable_path(p) {
            Some((n, Some(field))) if n == name && !field.contains('.') => Some(field),
            _ => None,
        },
        _ => None,
    }
}

fn simplify_map(m: Map) -> Expression {
    if is_variable_reference(&m.inside, &m.as_var) {
        return *m.input;
    }
    let field = match variable_field(&m.inside, &m.as_var) {
        Some(field) => field.to_string(),
        None => return Expression::Map(m),
    };
    match *m.input {
        // { $map : { input : { $map : { input : X, as : a, in : { f : e } } }, as : b, in : "$$b.f" } }
        //   => { $map : { input : X, as : a, in : e } }
        Expression::Map(inner) if computed_field(&inner.inside, &field).is_some() => {
            match computed_field(&inner.inside, &field) {
                Some(e) => {
                    let e = e.clone();
                    simplify_map(Map {
                        inside: Box::new(e),
                        ..inner
                    })
                }
                None => Expression::map(Expression::Map(inner), m.as_var, *m.inside),
            }
        }
        // { $map : { input : [{ f : e1 }, { f : e2 }], as : b, in : "$$b.f" } } => [e1, e2]
        Expression::ComputedArray(items)
            if items.iter().all(|i| computed_field(i, &field).is_some()) =>
        {
            Expression::ComputedArray(
                items
                    .iter()
                    .filter_map(|i| computed_field(i, &field).cloned())
                    .collect(),
            )
        }
        input => Expression::map(input, m.as_var, *m.inside),
    }
}

fn computed_field<'a>(e: &'a Expression, field: &str) -> Option<&'a Expression> {
    match e {
        Expression::ComputedDocument(fields) => fields.get(field),
        _ => None,
    }
}

fn simplify_filter_expression(f: FilterExpression) -> Expression {
    let constant = match (f.cond.as_ref(), &f.limit) {
        (Expression::Constant(Bson::Boolean(b)), None) => Some(*b),
        _ => None,
    };
    match constant {
        Some(true) => *f.input,
        Some(false) => Expression::Constant(Bson::Array(vec![])),
        None => Expression::Filter(f),
    }
}

fn constant_int(e: &Expression) -> Option<i64> {
    match e {
        Expression::Constant(Bson::Int32(i)) => Some(i64::from(*i)),
        Expression::Constant(Bson::Int64(i)) => Some(*i),
        _ => None,
    }
}

fn int_constant(i: i64) -> Expression {
    match i32::try_from(i) {
        Ok(i) => Expression::Constant(Bson::Int32(i)),
        Err(_) => Expression::Constant(Bson::Int64(i)),
    }
}

const UNBOUNDED: i64 = i32::MAX as i64;

/// Reads a slice with a non-negative constant position and length.
fn bounded_slice(s: &Slice) -> Option<(i64, i64)> {
    let position = match &s.position {
        Some(p) => constant_int(p)?,
        None => 0,
    };
    let n = constant_int(&s.n)?;
    if position < 0 || n < 0 {
        return None;
    }
    Some((position, n))
}

/// Evaluates $slice on a literal array.
fn evaluate_slice(items: &[Bson], position: Option<i64>, n: i64) -> Option<Vec<Bson>> {
    let len = items.len() as i64;
    let (start, count) = match position {
        None if n >= 0 => (0, n),
        None => ((len + n).max(0), n.checked_neg()?),
        Some(_) if n <= 0 => return None,
        Some(p) if p >= 0 => (p.min(len), n),
        Some(p) => ((len + p).max(0), n),
    };
    let end = start.saturating_add(count).min(len);
    Some(items[start as usize..end as usize].to_vec())
}

fn simplify_slice(s: Slice) -> Expression {
    if let Some((0, UNBOUNDED)) = bounded_slice(&s) {
        return *s.array;
    }

    if let Expression::Constant(Bson::Array(items)) = s.array.as_ref() {
        let position = match &s.position {
            Some(p) => constant_int(p).map(Some),
            None => Some(None),
        };
        if let (Some(position), Some(n)) = (position, constant_int(&s.n)) {
            if let Some(items) = evaluate_slice(items, position, n) {
                return Expression::Constant(Bson::Array(items));
            }
        }
    }

    let fused = match (s.array.as_ref(), bounded_slice(&s)) {
        (Expression::Slice(inner), Some((outer_position, outer_n))) => bounded_slice(inner)
            .and_then(|(inner_position, inner_n)| {
                let position = inner_position.checked_add(outer_position)?;
                let n = match (inner_n == UNBOUNDED, outer_n == UNBOUNDED) {
                    (true, _) => outer_n,
                    (false, true) => (inner_n - outer_position).max(0),
                    (false, false) => outer_n.min((inner_n - outer_position).max(0)),
                };
                Some((inner.array.clone(), position, n))
            }),
        _ => None,
    };
    match fused {
        Some((array, position, n)) if n > 0 => simplify_slice(Slice {
            array,
            position: if position == 0 {
                None
            } else {
                Some(Box::new(int_constant(position)))
            },
            n: Box::new(int_constant(n)),
        }),
        _ => Expression::Slice(s),
    }
}
