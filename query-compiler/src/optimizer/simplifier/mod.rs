///
/// Simplifier
///
/// The simplifier is a single bottom-up rewrite of every stage, filter and
/// expression. Each rule looks only at a node whose children have already
/// been simplified, so the pass is idempotent: simplifying a simplified tree
/// returns it unchanged. The rules never change which documents a pipeline
/// selects or produces.
///
/// Rules that build a new node apply the rules to that node again, e.g. two
/// nested $slice operators that fuse into one are checked for further
/// fusion with the slice below them.
///
#[cfg(test)]
mod test;

mod expressions;
mod filters;

use super::Optimizer;
use pipeline_ast::{
    definitions::{Expression, Filter, FilterOperation, Stage},
    visitor::Visitor,
};

pub(crate) struct SimplifierOptimizer {}

impl Optimizer for SimplifierOptimizer {
    fn name(&self) -> &'static str {
        "simplifier"
    }

    fn optimize(&self, stages: Vec<Stage>) -> Vec<Stage> {
        SimplifierOptimizer::simplify(stages)
    }
}

impl SimplifierOptimizer {
    pub(crate) fn simplify(stages: Vec<Stage>) -> Vec<Stage> {
        let mut v = SimplifierVisitor;
        v.visit_stages(stages)
    }
}

#[derive(Default)]
struct SimplifierVisitor;

impl Visitor for SimplifierVisitor {
    fn visit_stages(&mut self, node: Vec<Stage>) -> Vec<Stage> {
        node.into_iter()
            .map(|s| self.visit_stage(s))
            .filter(|s| *s != Stage::Match(Filter::MatchesEverything))
            .collect()
    }

    fn visit_filter(&mut self, node: Filter) -> Filter {
        let node = node.walk(self);
        filters::simplify_filter(node)
    }

    fn visit_filter_operation(&mut self, node: FilterOperation) -> FilterOperation {
        let node = node.walk(self);
        filters::simplify_filter_operation(node)
    }

    fn visit_expression(&mut self, node: Expression) -> Expression {
        let node = node.walk(self);
        expressions::simplify_expression(node)
    }
}
