use crate::{
    expression::Expr,
    serializer::Serializer,
    translator::{not_supported_because, Error, Result, Symbol},
};
use bson::Bson;
use lazy_static::lazy_static;
use pipeline_ast::{definitions::Expression, ELEMENT_SENTINEL};

lazy_static! {
    pub static ref ROOT: Expression = Expression::root();
}

/// Field under which non-document projection results are stored.
pub(crate) const VALUE_FIELD: &str = "_v";

/// Returns the symbol for a parameter bound to each document produced by a
/// pipeline. Wrapped values are unwrapped so that the parameter denotes the
/// value itself.
pub(crate) fn output_symbol(name: &str, serializer: &Serializer) -> Symbol {
    match serializer {
        Serializer::Wrapped(w) => Symbol {
            name: name.to_string(),
            ast: Expression::get_field(ROOT.clone(), w.field_name.clone()),
            serializer: (*w.value).clone(),
            filter_path: Some(w.field_name.clone()),
        },
        _ => Symbol {
            name: name.to_string(),
            ast: ROOT.clone(),
            serializer: serializer.clone(),
            filter_path: Some(String::new()),
        },
    }
}

/// Returns the expression for the value each output document of a pipeline
/// stands for.
pub(crate) fn output_value(serializer: &Serializer) -> Expression {
    output_symbol("", serializer).ast
}

/// Returns the serializer of the value each output document of a pipeline
/// stands for.
pub(crate) fn output_value_serializer(serializer: &Serializer) -> Serializer {
    match serializer {
        Serializer::Wrapped(w) => (*w.value).clone(),
        _ => serializer.clone(),
    }
}

/// Appends a field to a match-language path. Children of the current
/// document or of an $elemMatch element have no prefix.
pub(crate) fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() || prefix == ELEMENT_SENTINEL {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

pub(crate) fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('.') || name.starts_with('$') {
        return Err(Error::InvalidFieldName(name.to_string()));
    }
    Ok(())
}

pub(crate) fn escape_regex(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Reads an integer constant argument, such as the count of a Skip.
pub(crate) fn constant_i64(expr: &Expr) -> Result<i64> {
    match expr {
        Expr::Constant(Bson::Int32(i)) => Ok(i64::from(*i)),
        Expr::Constant(Bson::Int64(i)) => Ok(*i),
        _ => Err(not_supported_because(expr, "an integer constant is required")),
    }
}

pub(crate) fn constant_string(expr: &Expr) -> Result<&str> {
    match expr {
        Expr::Constant(Bson::String(s)) => Ok(s.as_str()),
        _ => Err(not_supported_because(expr, "a string constant is required")),
    }
}
