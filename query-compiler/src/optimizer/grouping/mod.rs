
use super::{util::substitute_variable, Optimizer};
use log::debug;
use pipeline_ast::{
    accumulators::AccumulatorSet,
    definitions::{
        AccumulatorExpression, AccumulatorField, AccumulatorOperator, Bucket, BucketAuto,
        Expression, FieldFilter, Filter, FilterOperation, Group, PickAccumulator, ProjectItem,
        Quantile, Stage, UnaryAccumulator, UnaryOperator,
    },
    visitor::Visitor,
    ELEMENTS_FIELD,
};
use thiserror::Error;

/// Field under which a computed sort keeps the document it sorts.
const SORTED_DOCUMENT_FIELD: &str = "_document";

#[derive(Debug, Error, PartialEq, Eq)]
enum Error {
    #[error("a reference to _elements cannot be rewritten as an accumulator")]
    UnableToRemoveReference,
}

pub(crate) struct GroupingOptimizer {}

impl Optimizer for GroupingOptimizer {
    fn name(&self) -> &'static str {
        "grouping"
    }

    fn optimize(&self, stages: Vec<Stage>) -> Vec<Stage> {
        GroupingOptimizer::hoist_accumulators(stages)
    }
}

impl GroupingOptimizer {
    fn hoist_accumulators(mut stages: Vec<Stage>) -> Vec<Stage> {
        for i in 0..stages.len() {
            let element = match elements_push(&stages[i]) {
                Some(element) => element.clone(),
                None => continue,
            };
            let end = match following_stages_end(&stages, i + 1) {
                Some(end) => end,
                None => {
                    debug!("grouping stage {i} is not followed by a final projection, leaving it unoptimized");
                    continue;
                }
            };
            match optimize_grouping_stage(&stages[i], &stages[i + 1..end], element) {
                Ok(replacement) => {
                    debug!(
                        "moved {} accumulators into grouping stage {i}",
                        grouping_fields(&replacement[0]).map(|f| f.len()).unwrap_or_default()
                    );
                    for (k, stage) in replacement.into_iter().enumerate() {
                        stages[i + k] = stage;
                    }
                }
                Err(e) => debug!("grouping stage {i} left unoptimized: {e}"),
            }
        }
        stages
    }
}

fn grouping_fields(stage: &Stage) -> Option<&Vec<AccumulatorField>> {
    match stage {
        Stage::Group(g) => Some(&g.fields),
        Stage::Bucket(b) => Some(&b.output),
        Stage::BucketAuto(b) => Some(&b.output),
        _ => None,
    }
}

/// Returns the pushed element if the stage is a grouping stage whose only
/// field is `_elements: { $push : element }`.
fn elements_push(stage: &Stage) -> Option<&Expression> {
    match grouping_fields(stage)?.as_slice() {
        [AccumulatorField {
            name,
            value:
                AccumulatorExpression::Unary(UnaryAccumulator {
                    op: AccumulatorOperator::Push,
                    arg,
                }),
        }] if name == ELEMENTS_FIELD => Some(arg.as_ref()),
        _ => None,
    }
}

/// Finds the end of the run of stages that can be rewritten, which must
/// close with a projection that does not keep `$$ROOT`.
fn following_stages_end(stages: &[Stage], from: usize) -> Option<usize> {
    for (j, stage) in stages.iter().enumerate().skip(from) {
        match stage {
            Stage::Project(p) => {
                let projects_root = p
                    .specifications
                    .values()
                    .any(|s| matches!(s, ProjectItem::Assignment(e) if e.is_root()));
                if !projects_root {
                    return Some(j + 1);
                }
            }
            Stage::ReplaceRoot(_) if restores_sorted_document(stages, j) => {}
            Stage::Limit(_) | Stage::Match(_) | Stage::Sample(_) | Stage::Skip(_) | Stage::Sort(_) => {}
            _ => return None,
        }
    }
    None
}

/// Whether the $replaceRoot at `j` closes the
/// `{ $project : { _document : $$ROOT, ... } }`, `$sort` sequence of a
/// computed sort, and so puts back the document the $project saved.
fn restores_sorted_document(stages: &[Stage], j: usize) -> bool {
    let saved = format!("${SORTED_DOCUMENT_FIELD}");
    match (j.checked_sub(2).map(|i| &stages[i..=j]), &stages[j]) {
        (
            Some([Stage::Project(p), Stage::Sort(_), _]),
            Stage::ReplaceRoot(Expression::FieldPath(root)),
        ) => {
            *root == saved
                && matches!(
                    p.specifications.get(SORTED_DOCUMENT_FIELD),
                    Some(ProjectItem::Assignment(e)) if e.is_root()
                )
        }
        _ => false,
    }
}

fn optimize_grouping_stage(
    grouping: &Stage,
    following: &[Stage],
    element: Expression,
) -> Result<Vec<Stage>, Error> {
    let mut mover = AccumulatorMover {
        accumulators: AccumulatorSet::new(),
        element,
        error: None,
    };
    let following = mover.visit_stages(following.to_vec());
    if let Some(e) = mover.error {
        return Err(e);
    }
    let fields = mover.accumulators.into_fields();
    let grouping = match grouping.clone() {
        Stage::Group(g) => Stage::Group(Group { fields, ..g }),
        Stage::Bucket(b) => Stage::Bucket(Bucket { output: fields, ..b }),
        Stage::BucketAuto(b) => Stage::BucketAuto(BucketAuto { output: fields, ..b }),
        other => other,
    };
    Ok(std::iter::once(grouping).chain(following).collect())
}

fn is_elements(expr: &Expression) -> bool {
    matches!(expr, Expression::GetField(g) if g.input.is_root())
        && expr.get_field_name() == Some(ELEMENTS_FIELD)
}

fn is_elements_or_map_of_elements(expr: &Expression) -> bool {
    match expr {
        Expression::Map(m) => is_elements(&m.input),
        e => is_elements(e),
    }
}

fn is_elements_path(path: &str) -> bool {
    path.split('.').any(|field| field == ELEMENTS_FIELD)
}

/// AccumulatorMover rewrites the stages after a grouping stage, collecting
/// the accumulators that replace references to `_elements`. It records an
/// error when it meets a reference it cannot rewrite.
struct AccumulatorMover {
    accumulators: AccumulatorSet,
    element: Expression,
    error: Option<Error>,
}

impl AccumulatorMover {
    fn field(&mut self, accumulator: AccumulatorExpression) -> Expression {
        let name = self.accumulators.add(accumulator);
        Expression::get_field(Expression::root(), name)
    }

    fn fail<T>(&mut self, node: T) -> T {
        self.error = Some(Error::UnableToRemoveReference);
        node
    }
}

impl Visitor for AccumulatorMover {
    fn visit_stage(&mut self, node: Stage) -> Stage {
        if self.error.is_some() {
            return node;
        }
        let keeps_elements = match &node {
            Stage::Sort(fields) => fields.iter().any(|f| is_elements_path(&f.path)),
            Stage::Project(p) => p
                .specifications
                .iter()
                .any(|(k, v)| k == ELEMENTS_FIELD && *v == ProjectItem::Inclusion),
            _ => false,
        };
        if keeps_elements {
            return self.fail(node);
        }
        node.walk(self)
    }

    fn visit_filter(&mut self, node: Filter) -> Filter {
        if self.error.is_some() {
            return node;
        }
        match node {
            Filter::Field(f) => {
                let first = format!("{ELEMENTS_FIELD}.0");
                let rest = if f.path == first {
                    Some(None)
                } else {
                    f.path
                        .strip_prefix(&format!("{first}."))
                        .map(|rest| Some(rest.to_string()))
                };
                match rest {
                    Some(rest) => {
                        let name = self.accumulators.add(AccumulatorExpression::unary(
                            AccumulatorOperator::First,
                            self.element.clone(),
                        ));
                        let path = match rest {
                            Some(rest) => format!("{name}.{rest}"),
                            None => name,
                        };
                        Filter::Field(FieldFilter {
                            path,
                            operation: self.visit_filter_operation(f.operation),
                        })
                    }
                    None if is_elements_path(&f.path) => self.fail(Filter::Field(f)),
                    None => Filter::Field(f).walk(self),
                }
            }
            node => node.walk(self),
        }
    }

    fn visit_filter_operation(&mut self, node: FilterOperation) -> FilterOperation {
        match node {
            // paths inside an $elemMatch are relative to the array element
            op @ FilterOperation::ElemMatch(_) => op,
            op => op.walk(self),
        }
    }

    fn visit_expression(&mut self, node: Expression) -> Expression {
        if self.error.is_some() {
            return node;
        }
        match node {
            Expression::Unary(u) if u.op == UnaryOperator::Size && is_elements(&u.arg) => {
                self.field(AccumulatorExpression::unary(
                    AccumulatorOperator::Sum,
                    Expression::constant(1),
                ))
            }
            Expression::Unary(u) if u.op.accumulator_operator().is_some() => {
                let op = match u.op.accumulator_operator() {
                    Some(op) => op,
                    None => return Expression::Unary(u).walk(self),
                };
                match *u.arg {
                    arg if is_elements(&arg) => {
                        let element = self.element.clone();
                        self.field(AccumulatorExpression::unary(op, element))
                    }
                    Expression::Map(m) if is_elements(&m.input) => {
                        let arg = substitute_variable(*m.inside, &m.as_var, &self.element);
                        let arg = self.visit_expression(arg);
                        self.field(AccumulatorExpression::unary(op, arg))
                    }
                    arg => Expression::unary(u.op, self.visit_expression(arg)),
                }
            }
            Expression::Map(m) if is_elements(&m.input) => {
                let arg = substitute_variable(*m.inside, &m.as_var, &self.element);
                let arg = self.visit_expression(arg);
                self.field(AccumulatorExpression::unary(AccumulatorOperator::Push, arg))
            }
            Expression::Pick(p) if is_elements(&p.source) => {
                let selector = substitute_variable(*p.selector, &p.as_var, &self.element);
                let selector = self.visit_expression(selector);
                let n = p.n.map(|n| Box::new(self.visit_expression(*n)));
                self.field(AccumulatorExpression::Pick(PickAccumulator {
                    op: p.op,
                    sort_by: p.sort_by,
                    selector: Box::new(selector),
                    n,
                }))
            }
            Expression::Quantile(q) if is_elements_or_map_of_elements(&q.input) => {
                let input = match *q.input {
                    Expression::Map(m) => {
                        let arg = substitute_variable(*m.inside, &m.as_var, &self.element);
                        self.visit_expression(arg)
                    }
                    _ => self.element.clone(),
                };
                let p = q.p.map(|p| Box::new(self.visit_expression(*p)));
                self.field(AccumulatorExpression::Quantile(Quantile {
                    op: q.op,
                    input: Box::new(input),
                    p,
                }))
            }
            node if is_elements(&node) => self.fail(node),
            // `_elements` of some other document, e.g. of a projected $$ROOT
            node if node.get_field_name() == Some(ELEMENTS_FIELD) => self.fail(node),
            Expression::FieldPath(p) if p.strip_prefix('$').map(is_elements_path).unwrap_or(false) => {
                self.fail(Expression::FieldPath(p))
            }
            node => node.walk(self),
        }
    }
}
