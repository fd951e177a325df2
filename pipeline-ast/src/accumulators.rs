use crate::definitions::{AccumulatorExpression, AccumulatorField};
use bson::Bson;

/// AccumulatorSet collects the accumulators hoisted into a grouping stage.
/// Structurally equal accumulators share one output field. Fields are
/// named `__agg0`, `__agg1`, ... in the order they are first added.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AccumulatorSet {
    fields: Vec<AccumulatorField>,
    rendered: Vec<Bson>,
}

impl AccumulatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an accumulator and returns the name of the field holding its
    /// value.
    pub fn add(&mut self, accumulator: AccumulatorExpression) -> String {
        let rendered = accumulator.render();
        if let Some(i) = self.rendered.iter().position(|r| *r == rendered) {
            return self.fields[i].name.clone();
        }
        let name = format!("__agg{}", self.fields.len());
        self.fields.push(AccumulatorField {
            name: name.clone(),
            value: accumulator,
        });
        self.rendered.push(rendered);
        name
    }

    pub fn into_fields(self) -> Vec<AccumulatorField> {
        self.fields
    }
}
