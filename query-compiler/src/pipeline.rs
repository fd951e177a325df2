use crate::serializer::Serializer;
use bson::Document;
use pipeline_ast::{definitions::Stage, render::render_pipeline};

/// Pipeline is the translated form of a query: its stages and the serializer
/// of the documents the last stage produces. Every operation consumes the
/// pipeline and returns a new one, so the stages and the serializer always
/// change together.
#[derive(PartialEq, Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
    output_serializer: Serializer,
}

impl Pipeline {
    pub fn new(output_serializer: Serializer) -> Self {
        Self {
            stages: Vec::new(),
            output_serializer,
        }
    }

    pub fn with_stages(stages: Vec<Stage>, output_serializer: Serializer) -> Self {
        Self {
            stages,
            output_serializer,
        }
    }

    pub fn add_stage(self, stage: Stage, output_serializer: Serializer) -> Self {
        self.add_stages(vec![stage], output_serializer)
    }

    pub fn add_stages(mut self, stages: Vec<Stage>, output_serializer: Serializer) -> Self {
        self.stages.extend(stages);
        Self {
            stages: self.stages,
            output_serializer,
        }
    }

    /// Replaces the last `count` stages.
    pub fn replace_last_stages(
        mut self,
        count: usize,
        stages: Vec<Stage>,
        output_serializer: Serializer,
    ) -> Self {
        let keep = self.stages.len().saturating_sub(count);
        self.stages.truncate(keep);
        self.add_stages(stages, output_serializer)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn output_serializer(&self) -> &Serializer {
        &self.output_serializer
    }

    pub fn into_parts(self) -> (Vec<Stage>, Serializer) {
        (self.stages, self.output_serializer)
    }

    pub fn render(&self) -> Vec<Document> {
        render_pipeline(&self.stages)
    }
}
