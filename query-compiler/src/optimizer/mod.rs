use log::trace;
use pipeline_ast::definitions::Stage;

mod grouping;
mod simplifier;
mod util;

pub(crate) trait Optimizer {
    fn name(&self) -> &'static str;
    fn optimize(&self, stages: Vec<Stage>) -> Vec<Stage>;
}

// Avoiding lifetime hacking by using a fn
// Optimizers must be added to this vec in the order they should be applied
static OPTIMIZERS: fn() -> Vec<Box<dyn Optimizer>> = || {
    vec![
        Box::new(grouping::GroupingOptimizer {}),
        Box::new(simplifier::SimplifierOptimizer {}),
    ]
};

/// Optimizes the provided pipeline stages. The result selects and produces
/// the same documents as the input.
pub fn optimize_pipeline(stages: Vec<Stage>) -> Vec<Stage> {
    OPTIMIZERS().into_iter().fold(stages, |acc, opt| {
        trace!("running optimizer {}", opt.name());
        opt.optimize(acc)
    })
}
