pub mod expression;
pub mod optimizer;
pub mod options;
pub mod pipeline;
pub mod result;
pub mod serializer;
#[cfg(test)]
mod test;
pub mod translator;

pub use optimizer::optimize_pipeline;

use crate::{
    expression::Expr, options::TranslationOptions, result::Result,
    serializer::{Serializer, SerializerRegistry}, translator::QueryTranslator,
};
use bson::Document;

/// Contains everything needed to run a compiled query and read its results.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// The collection the pipeline runs against. None when the query starts
    /// from inline documents.
    pub collection: Option<String>,
    pub pipeline: Vec<Document>,
    pub output_serializer: Serializer,
}

/// Returns the aggregation pipeline for the provided query.
pub fn compile_query(
    query: &Expr,
    registry: &dyn SerializerRegistry,
    options: TranslationOptions,
) -> Result<Translation> {
    let translator = QueryTranslator::new(registry, options);
    let (stages, output_serializer) = translator.translate_query(query)?.into_parts();

    let stages = if options.optimize {
        optimize_pipeline(stages)
    } else {
        stages
    };

    Ok(Translation {
        collection: query.root_collection().map(String::from),
        pipeline: pipeline_ast::render::render_pipeline(&stages),
        output_serializer,
    })
}
