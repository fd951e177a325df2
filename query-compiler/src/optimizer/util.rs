use pipeline_ast::{
    definitions::{Expression, FilterExpression, Let, Map, Pick, VarBinding},
    visitor::Visitor,
};

/// Replaces every free reference to the variable `name` with `replacement`.
/// References nested under an operator that rebinds the same name are left
/// alone.
pub(crate) fn substitute_variable(expr: Expression, name: &str, replacement: &Expression) -> Expression {
    let mut v = SubstituteVariableVisitor { name, replacement };
    v.visit_expression(expr)
}

/// Counts the free references to the variable `name`, both as variable
/// nodes and as `$$name` field paths.
pub(crate) fn count_variable_uses(expr: &Expression, name: &str) -> usize {
    let mut v = VariableUseVisitor { name, uses: 0 };
    v.visit_expression(expr.clone());
    v.uses
}

/// Splits a `$$name.a.b` field path into the variable name and the fields.
pub(crate) fn split_variable_path(path: &str) -> Option<(&str, Option<&str>)> {
    let rest = path.strip_prefix("$$")?;
    Some(match rest.split_once('.') {
        Some((name, fields)) => (name, Some(fields)),
        None => (rest, None),
    })
}

/// Accesses a dotted path of fields on an expression.
pub(crate) fn access_path(input: &Expression, fields: &str) -> Expression {
    match input {
        Expression::FieldPath(p) => Expression::FieldPath(format!("{p}.{fields}")),
        Expression::Variable(v) => Expression::FieldPath(format!("$${}.{fields}", v.name)),
        _ => fields
            .split('.')
            .fold(input.clone(), |acc, field| Expression::get_field(acc, field)),
    }
}

struct SubstituteVariableVisitor<'a> {
    name: &'a str,
    replacement: &'a Expression,
}

impl<'a> Visitor for SubstituteVariableVisitor<'a> {
    fn visit_expression(&mut self, node: Expression) -> Expression {
        match node {
            Expression::Variable(v) if !v.is_current && v.name == self.name => {
                self.replacement.clone()
            }
            Expression::FieldPath(p) => match split_variable_path(&p) {
                Some((name, fields)) if name == self.name => match fields {
                    Some(fields) => access_path(self.replacement, fields),
                    None => self.replacement.clone(),
                },
                _ => Expression::FieldPath(p),
            },
            Expression::Map(m) if m.as_var == self.name => Expression::Map(Map {
                input: Box::new(self.visit_expression(*m.input)),
                ..m
            }),
            Expression::Filter(f) if f.as_var == self.name => {
                Expression::Filter(FilterExpression {
                    input: Box::new(self.visit_expression(*f.input)),
                    limit: f.limit.map(|l| Box::new(self.visit_expression(*l))),
                    ..f
                })
            }
            Expression::Pick(p) if p.as_var == self.name => Expression::Pick(Pick {
                source: Box::new(self.visit_expression(*p.source)),
                n: p.n.map(|n| Box::new(self.visit_expression(*n))),
                ..p
            }),
            Expression::Let(l) if l.vars.iter().any(|b| b.name == self.name) => {
                Expression::Let(Let {
                    vars: l
                        .vars
                        .into_iter()
                        .map(|b| VarBinding {
                            name: b.name,
                            value: self.visit_expression(b.value),
                        })
                        .collect(),
                    inside: l.inside,
                })
            }
            node => node.walk(self),
        }
    }
}

struct VariableUseVisitor<'a> {
    name: &'a str,
    uses: usize,
}

impl<'a> Visitor for VariableUseVisitor<'a> {
    fn visit_expression(&mut self, node: Expression) -> Expression {
        match &node {
            Expression::Variable(v) if !v.is_current && v.name == self.name => {
                self.uses += 1;
                node
            }
            Expression::FieldPath(p) => {
                if matches!(split_variable_path(p), Some((name, _)) if name == self.name) {
                    self.uses += 1;
                }
                node
            }
            Expression::Map(m) if m.as_var == self.name => {
                self.visit_expression((*m.input).clone());
                node
            }
            Expression::Filter(f) if f.as_var == self.name => {
                self.visit_expression((*f.input).clone());
                node
            }
            Expression::Pick(p) if p.as_var == self.name => {
                self.visit_expression((*p.source).clone());
                node
            }
            Expression::Let(l) if l.vars.iter().any(|b| b.name == self.name) => {
                for b in l.vars.iter() {
                    self.visit_expression(b.value.clone());
                }
                node
            }
            _ => node.walk(self),
        }
    }
}
