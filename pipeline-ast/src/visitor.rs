use crate::definitions::*;

/// Visitor is an owning, rewriting visitor over the pipeline syntax tree.
/// Every method consumes a node and returns its replacement. The default
/// implementations just walk the children, so an implementation only
/// overrides the node kinds it cares about and calls `node.walk(self)`
/// wherever it wants to keep descending.
pub trait Visitor: Sized {
    fn visit_stages(&mut self, node: Vec<Stage>) -> Vec<Stage> {
        node.into_iter().map(|s| self.visit_stage(s)).collect()
    }

    fn visit_stage(&mut self, node: Stage) -> Stage {
        node.walk(self)
    }

    fn visit_filter(&mut self, node: Filter) -> Filter {
        node.walk(self)
    }

    fn visit_filter_operation(&mut self, node: FilterOperation) -> FilterOperation {
        node.walk(self)
    }

    fn visit_expression(&mut self, node: Expression) -> Expression {
        node.walk(self)
    }

    fn visit_accumulator_expression(
        &mut self,
        node: AccumulatorExpression,
    ) -> AccumulatorExpression {
        node.walk(self)
    }
}

fn visit_box<V: Visitor>(e: Box<Expression>, v: &mut V) -> Box<Expression> {
    Box::new(v.visit_expression(*e))
}

fn visit_opt_box<V: Visitor>(e: Option<Box<Expression>>, v: &mut V) -> Option<Box<Expression>> {
    e.map(|e| visit_box(e, v))
}

fn visit_fields<V: Visitor>(fields: Vec<AccumulatorField>, v: &mut V) -> Vec<AccumulatorField> {
    fields
        .into_iter()
        .map(|f| AccumulatorField {
            name: f.name,
            value: v.visit_accumulator_expression(f.value),
        })
        .collect()
}

fn visit_bindings<V: Visitor>(vars: Vec<VarBinding>, v: &mut V) -> Vec<VarBinding> {
    vars.into_iter()
        .map(|b| VarBinding {
            name: b.name,
            value: v.visit_expression(b.value),
        })
        .collect()
}

impl Stage {
    pub fn walk<V: Visitor>(self, v: &mut V) -> Self {
        match self {
            Stage::Match(f) => Stage::Match(v.visit_filter(f)),
            Stage::Project(p) => Stage::Project(Project {
                specifications: p
                    .specifications
                    .into_iter()
                    .map(|(k, item)| {
                        let item = match item {
                            ProjectItem::Assignment(e) => {
                                ProjectItem::Assignment(v.visit_expression(e))
                            }
                            other => other,
                        };
                        (k, item)
                    })
                    .collect(),
            }),
            Stage::Group(g) => Stage::Group(Group {
                id: v.visit_expression(g.id),
                fields: visit_fields(g.fields, v),
            }),
            Stage::Lookup(l) => Stage::Lookup(Lookup {
                let_vars: visit_bindings(l.let_vars, v),
                pipeline: l.pipeline.map(|p| v.visit_stages(p)),
                ..l
            }),
            Stage::Bucket(b) => Stage::Bucket(Bucket {
                group_by: v.visit_expression(b.group_by),
                output: visit_fields(b.output, v),
                ..b
            }),
            Stage::BucketAuto(b) => Stage::BucketAuto(BucketAuto {
                group_by: v.visit_expression(b.group_by),
                output: visit_fields(b.output, v),
                ..b
            }),
            Stage::ReplaceRoot(e) => Stage::ReplaceRoot(v.visit_expression(e)),
            Stage::UnionWith(u) => Stage::UnionWith(UnionWith {
                collection: u.collection,
                pipeline: u.pipeline.map(|p| v.visit_stages(p)),
            }),
            s @ (Stage::Sort(_)
            | Stage::Limit(_)
            | Stage::Skip(_)
            | Stage::Sample(_)
            | Stage::Unwind(_)
            | Stage::Densify(_)
            | Stage::Documents(_)
            | Stage::Universal(_)) => s,
        }
    }
}

impl Filter {
    pub fn walk<V: Visitor>(self, v: &mut V) -> Self {
        match self {
            Filter::Field(f) => Filter::Field(FieldFilter {
                path: f.path,
                operation: v.visit_filter_operation(f.operation),
            }),
            Filter::And(fs) => Filter::And(fs.into_iter().map(|f| v.visit_filter(f)).collect()),
            Filter::Or(fs) => Filter::Or(fs.into_iter().map(|f| v.visit_filter(f)).collect()),
            Filter::Nor(fs) => Filter::Nor(fs.into_iter().map(|f| v.visit_filter(f)).collect()),
            Filter::Expr(e) => Filter::Expr(v.visit_expression(e)),
            Filter::MatchesEverything => Filter::MatchesEverything,
        }
    }
}

impl FilterOperation {
    pub fn walk<V: Visitor>(self, v: &mut V) -> Self {
        match self {
            FilterOperation::ElemMatch(f) => FilterOperation::ElemMatch(Box::new(v.visit_filter(*f))),
            FilterOperation::Not(op) => {
                FilterOperation::Not(Box::new(v.visit_filter_operation(*op)))
            }
            op => op,
        }
    }
}

impl AccumulatorExpression {
    pub fn walk<V: Visitor>(self, v: &mut V) -> Self {
        match self {
            AccumulatorExpression::Unary(u) => AccumulatorExpression::Unary(UnaryAccumulator {
                op: u.op,
                arg: visit_box(u.arg, v),
            }),
            AccumulatorExpression::Pick(p) => AccumulatorExpression::Pick(PickAccumulator {
                op: p.op,
                sort_by: p.sort_by,
                selector: visit_box(p.selector, v),
                n: visit_opt_box(p.n, v),
            }),
            AccumulatorExpression::Quantile(q) => AccumulatorExpression::Quantile(q.walk(v)),
        }
    }
}

impl Quantile {
    pub fn walk<V: Visitor>(self, v: &mut V) -> Self {
        Quantile {
            op: self.op,
            input: visit_box(self.input, v),
            p: visit_opt_box(self.p, v),
        }
    }
}

impl Expression {
    pub fn walk<V: Visitor>(self, v: &mut V) -> Self {
        match self {
            e @ (Expression::Constant(_) | Expression::FieldPath(_) | Expression::Variable(_)) => {
                e
            }
            Expression::GetField(g) => Expression::GetField(GetField {
                input: visit_box(g.input, v),
                field: visit_box(g.field, v),
            }),
            Expression::Unary(u) => Expression::Unary(UnaryExpression {
                op: u.op,
                arg: visit_box(u.arg, v),
            }),
            Expression::Binary(b) => Expression::Binary(BinaryExpression {
                op: b.op,
                left: visit_box(b.left, v),
                right: visit_box(b.right, v),
            }),
            Expression::Nary(n) => Expression::Nary(NaryExpression {
                op: n.op,
                args: n.args.into_iter().map(|a| v.visit_expression(a)).collect(),
            }),
            Expression::Cond(c) => Expression::Cond(Cond {
                condition: visit_box(c.condition, v),
                then_branch: visit_box(c.then_branch, v),
                else_branch: visit_box(c.else_branch, v),
            }),
            Expression::Map(m) => Expression::Map(Map {
                input: visit_box(m.input, v),
                as_var: m.as_var,
                inside: visit_box(m.inside, v),
            }),
            Expression::Filter(f) => Expression::Filter(FilterExpression {
                input: visit_box(f.input, v),
                as_var: f.as_var,
                cond: visit_box(f.cond, v),
                limit: visit_opt_box(f.limit, v),
            }),
            Expression::Let(l) => Expression::Let(Let {
                vars: visit_bindings(l.vars, v),
                inside: visit_box(l.inside, v),
            }),
            Expression::ComputedDocument(d) => Expression::ComputedDocument(
                d.into_iter()
                    .map(|(k, e)| (k, v.visit_expression(e)))
                    .collect(),
            ),
            Expression::ComputedArray(a) => {
                Expression::ComputedArray(a.into_iter().map(|e| v.visit_expression(e)).collect())
            }
            Expression::Slice(s) => Expression::Slice(Slice {
                array: visit_box(s.array, v),
                position: visit_opt_box(s.position, v),
                n: visit_box(s.n, v),
            }),
            Expression::Pick(p) => Expression::Pick(Pick {
                op: p.op,
                source: visit_box(p.source, v),
                sort_by: p.sort_by,
                as_var: p.as_var,
                selector: visit_box(p.selector, v),
                n: visit_opt_box(p.n, v),
            }),
            Expression::Quantile(q) => Expression::Quantile(q.walk(v)),
        }
    }
}
