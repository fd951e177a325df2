use crate::{
    expression::{Expr, Lambda},
    options::TranslationOptions,
    pipeline::Pipeline,
    serializer::{Serializer, SerializerRegistry},
};
use pipeline_ast::definitions::Expression;
use thiserror::Error;

#[cfg(test)]
mod test;

mod expressions;
mod filters;
mod join;
mod methods;
mod sort;
mod stages;
mod utils;

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("expression not supported: {expression}{}", .reason.as_ref().map(|r| format!(" because {r}")).unwrap_or_default())]
    ExpressionNotSupported {
        expression: String,
        reason: Option<String>,
    },
    #[error("discriminator {value} for type {type_name} is shared by types {candidates:?}")]
    AmbiguousDiscriminator {
        type_name: String,
        value: String,
        candidates: Vec<String>,
    },
    #[error("no serializer registered for type {0}")]
    UnknownType(String),
    #[error("parameter {0} is not bound in this scope")]
    ParameterNotFound(String),
    #[error("sort key {0} is already part of the sort")]
    DuplicateSortKey(String),
    #[error("invalid field name '{0}': field names may not be empty, contain dots, or start with dollars")]
    InvalidFieldName(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub(crate) fn not_supported(expr: &Expr) -> Error {
    Error::ExpressionNotSupported {
        expression: expr.to_string(),
        reason: None,
    }
}

pub(crate) fn not_supported_because(expr: &Expr, reason: impl Into<String>) -> Error {
    Error::ExpressionNotSupported {
        expression: expr.to_string(),
        reason: Some(reason.into()),
    }
}

/// Symbol binds a lambda parameter to the expression it denotes in the
/// pipeline and the serializer of its value. `filter_path` is the dotted
/// match-language path of the value when it is addressable as a field; it is
/// empty for the current document itself.
#[derive(Debug, Clone)]
pub(crate) struct Symbol {
    pub name: String,
    pub ast: Expression,
    pub serializer: Serializer,
    pub filter_path: Option<String>,
}

/// An expression translated to its pipeline form and the serializer of the
/// value it produces.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TranslatedExpression {
    pub ast: Expression,
    pub serializer: Serializer,
}

#[derive(Clone)]
pub struct QueryTranslator<'a> {
    registry: &'a dyn SerializerRegistry,
    options: TranslationOptions,
    symbols: Vec<Symbol>,
}

impl<'a> QueryTranslator<'a> {
    pub fn new(registry: &'a dyn SerializerRegistry, options: TranslationOptions) -> Self {
        Self {
            registry,
            options,
            symbols: Vec::new(),
        }
    }

    /// translate_query is the entry point. A final projection that cannot
    /// be translated falls back to a client side projection when the options
    /// allow it.
    pub fn translate_query(&self, query: &Expr) -> Result<Pipeline> {
        match self.translate_pipeline(query) {
            Err(e @ Error::ExpressionNotSupported { .. })
                if self.options.enable_client_side_projection =>
            {
                self.translate_client_side_projection(query).ok_or(e)
            }
            result => result,
        }
    }

    /// Returns a translator in which the given symbols shadow any existing
    /// symbols of the same name.
    pub(crate) fn with_symbols(&self, symbols: Vec<Symbol>) -> Self {
        let mut translator = self.clone();
        translator.symbols.extend(symbols);
        translator
    }

    pub(crate) fn lookup_symbol(&self, name: &str) -> Result<&Symbol> {
        self.symbols
            .iter()
            .rev()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::ParameterNotFound(name.to_string()))
    }

    pub(crate) fn serializer_for_type(&self, type_name: &str) -> Result<Serializer> {
        self.registry
            .get_serializer(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))
    }

    /// Binds the single parameter of a lambda to the documents produced by a
    /// pipeline with the given output serializer.
    pub(crate) fn bind_lambda_to_output<'l>(
        &self,
        expr: &'l Expr,
        output_serializer: &Serializer,
    ) -> Result<(Self, &'l Lambda)> {
        let lambda = expr
            .as_lambda(1)
            .ok_or_else(|| not_supported_because(expr, "a single parameter lambda is required"))?;
        let symbol = utils::output_symbol(&lambda.parameters[0], output_serializer);
        Ok((self.with_symbols(vec![symbol]), lambda))
    }
}
