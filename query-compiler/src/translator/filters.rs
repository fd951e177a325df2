use crate::{
    expression::{Binary, BinaryOp, Call, Expr, Method, Unary, UnaryOp},
    serializer::Serializer,
    translator::{
        not_supported_because,
        utils::{escape_regex, join_path},
        QueryTranslator, Result, Symbol,
    },
};
use bson::Bson;
use itertools::Itertools;
use log::trace;
use pipeline_ast::{
    definitions::{
        ComparisonOperator, Expression, FieldFilter, Filter, FilterOperation, RegexOperation,
    },
    ELEMENT_SENTINEL,
};

impl<'a> QueryTranslator<'a> {
    /// Translates a predicate into a match-language filter, falling back to
    /// $expr for predicates that have no match-language form.
    pub(crate) fn translate_filter(&self, expr: &Expr) -> Result<Filter> {
        match expr {
            Expr::Binary(b) if b.op == BinaryOp::AndAlso => Ok(Filter::And(vec![
                self.translate_filter(&b.left)?,
                self.translate_filter(&b.right)?,
            ])),
            Expr::Binary(b) if b.op == BinaryOp::OrElse => Ok(Filter::Or(vec![
                self.translate_filter(&b.left)?,
                self.translate_filter(&b.right)?,
            ])),
            Expr::Binary(b) if comparison_operator(b.op).is_some() => {
                self.translate_comparison_filter(expr, b)
            }
            Expr::Unary(Unary {
                op: UnaryOp::Not,
                operand,
            }) => Ok(match self.translate_filter(operand)? {
                Filter::Field(f) => Filter::Field(FieldFilter {
                    path: f.path,
                    operation: FilterOperation::Not(Box::new(f.operation)),
                }),
                other => Filter::Nor(vec![other]),
            }),
            Expr::Constant(Bson::Boolean(true)) => Ok(Filter::MatchesEverything),
            Expr::Call(c) => match self.translate_method_filter(c)? {
                Some(filter) => Ok(filter),
                None => self.translate_expr_filter(expr),
            },
            _ => match self.resolve_field_path(expr) {
                Some((path, serializer)) if serializer.is_boolean() => {
                    Ok(Filter::compare(path, ComparisonOperator::Eq, true))
                }
                _ => self.translate_expr_filter(expr),
            },
        }
    }

    fn translate_expr_filter(&self, expr: &Expr) -> Result<Filter> {
        let translated = self.translate_expression(expr)?;
        Ok(Filter::Expr(translated.ast))
    }

    /// Resolves an expression to the match-language path of the field it
    /// reads, if it reads a field of the current document or of the element
    /// of an $elemMatch.
    pub(crate) fn resolve_field_path(&self, expr: &Expr) -> Option<(String, Serializer)> {
        let (path, serializer) = self.resolve_path(expr)?;
        if path.is_empty() {
            None
        } else {
            Some((path, serializer))
        }
    }

    fn resolve_path(&self, expr: &Expr) -> Option<(String, Serializer)> {
        match expr {
            Expr::Parameter(name) => {
                let symbol = self.lookup_symbol(name).ok()?;
                Some((symbol.filter_path.clone()?, symbol.serializer.clone()))
            }
            Expr::Member(m) => {
                let (prefix, serializer) = self.resolve_path(&m.target)?;
                match (&serializer, m.member.as_str()) {
                    (Serializer::Grouping(g), "Key") => {
                        Some((join_path(&prefix, "_id"), (*g.key).clone()))
                    }
                    _ => {
                        let member = serializer.member(&m.member)?;
                        Some((
                            join_path(&prefix, &member.element_name),
                            member.serializer.clone(),
                        ))
                    }
                }
            }
            Expr::Call(Call {
                method: Method::First,
                arguments,
            }) => match arguments.as_slice() {
                [source] => self.resolve_array_element_path(source, 0),
                _ => None,
            },
            Expr::Call(Call {
                method: Method::ElementAt,
                arguments,
            }) => match arguments.as_slice() {
                [source, Expr::Constant(index)] => {
                    self.resolve_array_element_path(source, constant_index(index)?)
                }
                _ => None,
            },
            Expr::Binary(Binary {
                op: BinaryOp::ArrayIndex,
                left,
                right,
            }) => match right.as_ref() {
                Expr::Constant(index) => self.resolve_array_element_path(left, constant_index(index)?),
                _ => None,
            },
            _ => None,
        }
    }

    /// Resolves the path of an array valued field. A grouping stands for its
    /// elements.
    fn resolve_array_path(&self, expr: &Expr) -> Option<(String, Serializer)> {
        let (path, serializer) = self.resolve_path(expr)?;
        match serializer {
            Serializer::Grouping(g) => Some((
                join_path(&path, pipeline_ast::ELEMENTS_FIELD),
                Serializer::Array(g.element),
            )),
            Serializer::Array(_) if !path.is_empty() => Some((path, serializer)),
            _ => None,
        }
    }

    fn resolve_array_element_path(&self, expr: &Expr, index: i64) -> Option<(String, Serializer)> {
        let (path, serializer) = self.resolve_array_path(expr)?;
        let item = serializer.item_serializer()?.clone();
        Some((join_path(&path, &index.to_string()), item))
    }

    fn translate_comparison_filter(&self, expr: &Expr, b: &Binary) -> Result<Filter> {
        let op = match comparison_operator(b.op) {
            Some(op) => op,
            None => return self.translate_expr_filter(expr),
        };
        if op == ComparisonOperator::Eq {
            if let Some(filter) = self.translate_size_filter(&b.left, &b.right) {
                return Ok(filter);
            }
        }
        let (field, value, op) = match (b.left.as_ref(), b.right.as_ref()) {
            (field, Expr::Constant(value)) => (field, value, op),
            (Expr::Constant(value), field) => (field, value, flip(op)),
            _ => return self.translate_expr_filter(expr),
        };
        match self.resolve_field_path(field) {
            Some((path, _)) => Ok(Filter::compare(path, op, value.clone())),
            None => self.translate_expr_filter(expr),
        }
    }

    /// `array.Length == n` and `array.Count() == n` become $size.
    fn translate_size_filter(&self, left: &Expr, right: &Expr) -> Option<Filter> {
        let n = match right {
            Expr::Constant(Bson::Int32(n)) => *n,
            _ => return None,
        };
        let array = match left {
            Expr::Member(m) if m.member == "Length" || m.member == "Count" => m.target.as_ref(),
            Expr::Call(Call {
                method: Method::Count,
                arguments,
            }) if arguments.len() == 1 => &arguments[0],
            _ => return None,
        };
        let (path, _) = self.resolve_array_path(array)?;
        Some(Filter::field(path, FilterOperation::Size(n)))
    }

    /// Translates the methods with a match-language form. Returns None for
    /// the others.
    fn translate_method_filter(&self, call: &Call) -> Result<Option<Filter>> {
        let filter = match (&call.method, call.arguments.as_slice()) {
            (Method::Contains, [Expr::Constant(Bson::Array(values)), value]) => self
                .resolve_field_path(value)
                .map(|(path, _)| Filter::field(path, FilterOperation::In(values.clone()))),
            (Method::Contains, [source, Expr::Constant(value)]) => {
                match self.resolve_field_path(source) {
                    Some((path, serializer)) if serializer.is_string() => match value {
                        Bson::String(s) => Some(regex_filter(path, escape_regex(s))),
                        _ => None,
                    },
                    Some((path, Serializer::Array(_))) => {
                        Some(Filter::compare(path, ComparisonOperator::Eq, value.clone()))
                    }
                    _ => None,
                }
            }
            (Method::StartsWith, [source, Expr::Constant(Bson::String(s))]) => self
                .resolve_string_path(source)
                .map(|path| regex_filter(path, format!("^{}", escape_regex(s)))),
            (Method::EndsWith, [source, Expr::Constant(Bson::String(s))]) => self
                .resolve_string_path(source)
                .map(|path| regex_filter(path, format!("{}$", escape_regex(s)))),
            (Method::IsMatch, [source, Expr::Constant(Bson::RegularExpression(r))]) => self
                .resolve_string_path(source)
                .map(|path| {
                    Filter::field(
                        path,
                        FilterOperation::Regex(RegexOperation {
                            pattern: r.pattern.clone(),
                            options: r.options.clone(),
                        }),
                    )
                }),
            (Method::Any, [source]) => self.resolve_array_path(source).map(|(path, _)| {
                Filter::And(vec![
                    Filter::compare(path.clone(), ComparisonOperator::Ne, Bson::Null),
                    Filter::field(
                        path,
                        FilterOperation::Not(Box::new(FilterOperation::Size(0))),
                    ),
                ])
            }),
            (Method::Any, [source, predicate]) => match self.resolve_array_path(source) {
                Some((path, serializer)) => self.translate_elem_match(path, &serializer, predicate)?,
                None => None,
            },
            _ => None,
        };
        Ok(filter)
    }

    fn resolve_string_path(&self, expr: &Expr) -> Option<String> {
        match self.resolve_field_path(expr) {
            Some((path, serializer)) if serializer.is_string() => Some(path),
            _ => None,
        }
    }

    /// Translates `array.Any(predicate)` to an $elemMatch. Returns None when
    /// the predicate has no $elemMatch form, and the caller falls back to
    /// $expr.
    fn translate_elem_match(
        &self,
        path: String,
        array_serializer: &Serializer,
        predicate: &Expr,
    ) -> Result<Option<Filter>> {
        let lambda = predicate.as_lambda(1).ok_or_else(|| {
            not_supported_because(predicate, "a single parameter lambda is required")
        })?;
        let item = array_serializer
            .item_serializer()
            .cloned()
            .ok_or_else(|| not_supported_because(predicate, "the value is not an array"))?;
        let name = lambda.parameters[0].clone();
        let translator = self.with_symbols(vec![Symbol {
            name: name.clone(),
            ast: Expression::var(name),
            serializer: item,
            filter_path: Some(ELEMENT_SENTINEL.to_string()),
        }]);
        let inner = translator.translate_filter(&lambda.body)?;
        if contains_expr(&inner)
            || !element_filters_are_renderable(&inner)
            || !element_operators_are_unique(&inner)
        {
            trace!("predicate {predicate} has no $elemMatch form");
            return Ok(None);
        }
        Ok(Some(Filter::field(
            path,
            FilterOperation::ElemMatch(Box::new(inner)),
        )))
    }
}

fn comparison_operator(op: BinaryOp) -> Option<ComparisonOperator> {
    Some(match op {
        BinaryOp::Equal => ComparisonOperator::Eq,
        BinaryOp::NotEqual => ComparisonOperator::Ne,
        BinaryOp::LessThan => ComparisonOperator::Lt,
        BinaryOp::LessThanOrEqual => ComparisonOperator::Lte,
        BinaryOp::GreaterThan => ComparisonOperator::Gt,
        BinaryOp::GreaterThanOrEqual => ComparisonOperator::Gte,
        _ => return None,
    })
}

/// The operator that compares the same operands the other way around.
fn flip(op: ComparisonOperator) -> ComparisonOperator {
    use ComparisonOperator::*;
    match op {
        Gt => Lt,
        Gte => Lte,
        Lt => Gt,
        Lte => Gte,
        op => op,
    }
}

fn constant_index(index: &Bson) -> Option<i64> {
    match index {
        Bson::Int32(i) if *i >= 0 => Some(i64::from(*i)),
        Bson::Int64(i) if *i >= 0 => Some(*i),
        _ => None,
    }
}

fn regex_filter(path: String, pattern: String) -> Filter {
    Filter::field(
        path,
        FilterOperation::Regex(RegexOperation {
            pattern,
            options: String::new(),
        }),
    )
}

fn contains_expr(filter: &Filter) -> bool {
    match filter {
        Filter::Expr(_) => true,
        Filter::And(fs) | Filter::Or(fs) | Filter::Nor(fs) => fs.iter().any(contains_expr),
        Filter::Field(_) | Filter::MatchesEverything => false,
    }
}

/// Whether a filter refers to the $elemMatch element itself.
fn mentions_element(filter: &Filter) -> bool {
    match filter {
        Filter::Field(f) => f.path == ELEMENT_SENTINEL,
        Filter::And(fs) | Filter::Or(fs) | Filter::Nor(fs) => fs.iter().any(mentions_element),
        Filter::Expr(_) | Filter::MatchesEverything => false,
    }
}

/// Filters on the element itself can only be written as a bare operator
/// document: one filter, or a conjunction of nothing but such filters. Under
/// $or and $nor, or next to filters on fields of the element, they would need
/// a field name.
fn element_filters_are_renderable(filter: &Filter) -> bool {
    match filter {
        Filter::Field(_) | Filter::Expr(_) | Filter::MatchesEverything => true,
        Filter::And(fs)
            if fs
                .iter()
                .all(|f| matches!(f, Filter::Field(f) if f.path == ELEMENT_SENTINEL)) =>
        {
            true
        }
        Filter::And(fs) | Filter::Or(fs) | Filter::Nor(fs) => !fs.iter().any(mentions_element),
    }
}

fn operator_key(op: &FilterOperation) -> &'static str {
    match op {
        FilterOperation::Comparison(c) => c.op.name(),
        FilterOperation::ImpliedEquality(_) => "$eq",
        FilterOperation::Regex(_) => "$regex",
        FilterOperation::ElemMatch(_) => "$elemMatch",
        FilterOperation::Not(_) => "$not",
        FilterOperation::Exists(_) => "$exists",
        FilterOperation::In(_) => "$in",
        FilterOperation::Nin(_) => "$nin",
        FilterOperation::Size(_) => "$size",
    }
}

/// Filters on the element itself are rendered as one operator document, so
/// each operator may appear at most once.
fn element_operators_are_unique(filter: &Filter) -> bool {
    match filter {
        Filter::And(fs) => fs
            .iter()
            .filter_map(|f| match f {
                Filter::Field(f) if f.path == ELEMENT_SENTINEL => Some(operator_key(&f.operation)),
                _ => None,
            })
            .all_unique(),
        _ => true,
    }
}
