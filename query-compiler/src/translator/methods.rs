use crate::{
    expression::{Call, Expr, Method, PickMethod},
    serializer::{ScalarType, Serializer},
    translator::{
        not_supported, not_supported_because,
        utils::{constant_string, escape_regex},
        QueryTranslator, Result, Symbol, TranslatedExpression,
    },
};
use bson::{Bson, Regex};
use pipeline_ast::definitions::{
    BinaryOperator, Expression, FilterExpression, NaryOperator, Pick, PickOperator,
    QuantileOperator, Slice, UnaryOperator,
};

impl<'a> QueryTranslator<'a> {
    /// Translates a method applied to an array or a string value.
    pub(crate) fn translate_method_call(
        &self,
        expr: &Expr,
        call: &Call,
    ) -> Result<TranslatedExpression> {
        use Method::*;
        let boolean = Serializer::Scalar(ScalarType::Boolean);
        match (&call.method, call.arguments.as_slice()) {
            (Count | LongCount, [source, rest @ ..]) if rest.len() <= 1 => {
                let source = self.translate_enumerable(source)?;
                let array = match rest {
                    [predicate] => self.translate_array_filter(source, predicate)?.ast,
                    _ => source.ast,
                };
                let serializer = if call.method == LongCount {
                    ScalarType::Int64
                } else {
                    ScalarType::Int32
                };
                Ok(TranslatedExpression {
                    ast: Expression::unary(UnaryOperator::Size, array),
                    serializer: Serializer::Scalar(serializer),
                })
            }
            (
                Sum | Min | Max | Average | StandardDeviationPopulation | StandardDeviationSample,
                [source, rest @ ..],
            ) if rest.len() <= 1 => {
                let op = match call.method {
                    Sum => UnaryOperator::Sum,
                    Min => UnaryOperator::Min,
                    Max => UnaryOperator::Max,
                    Average => UnaryOperator::Avg,
                    StandardDeviationPopulation => UnaryOperator::StdDevPop,
                    _ => UnaryOperator::StdDevSamp,
                };
                let source = self.translate_enumerable(source)?;
                let values = match rest {
                    [selector] => self.translate_array_map(source, selector)?,
                    _ => source,
                };
                let serializer = match op {
                    UnaryOperator::Avg | UnaryOperator::StdDevPop | UnaryOperator::StdDevSamp => {
                        Serializer::Scalar(ScalarType::Double)
                    }
                    _ => item_serializer(expr, &values.serializer)?,
                };
                Ok(TranslatedExpression {
                    ast: Expression::unary(op, values.ast),
                    serializer,
                })
            }
            (Median, [source, rest @ ..]) if rest.len() <= 1 => {
                let values = self.translate_numeric_values(source, rest.first())?;
                Ok(TranslatedExpression {
                    ast: Expression::quantile(QuantileOperator::Median, values.ast, None),
                    serializer: Serializer::Scalar(ScalarType::Double),
                })
            }
            (Percentile, [source, rest @ .., p]) if rest.len() <= 1 => {
                let values = self.translate_numeric_values(source, rest.first())?;
                let p = self.translate_expression(p)?;
                Ok(TranslatedExpression {
                    ast: Expression::quantile(QuantileOperator::Percentile, values.ast, Some(p.ast)),
                    serializer: Serializer::array_of(Serializer::Scalar(ScalarType::Double)),
                })
            }
            (First | Last, [source, rest @ ..]) if rest.len() <= 1 => {
                let op = if call.method == First {
                    UnaryOperator::First
                } else {
                    UnaryOperator::Last
                };
                let source = self.translate_enumerable(source)?;
                let array = match rest {
                    [predicate] => self.translate_array_filter(source, predicate)?,
                    _ => source,
                };
                Ok(TranslatedExpression {
                    serializer: item_serializer(expr, &array.serializer)?,
                    ast: Expression::unary(op, array.ast),
                })
            }
            (Any, [source]) => {
                let source = self.translate_enumerable(source)?;
                Ok(TranslatedExpression {
                    ast: Expression::binary(
                        BinaryOperator::Gt,
                        Expression::unary(UnaryOperator::Size, source.ast),
                        Expression::Constant(Bson::Int32(0)),
                    ),
                    serializer: boolean,
                })
            }
            (Any | All, [source, predicate]) => {
                let op = if call.method == Any {
                    UnaryOperator::AnyElementTrue
                } else {
                    UnaryOperator::AllElementsTrue
                };
                let source = self.translate_enumerable(source)?;
                let mapped = self.translate_array_map(source, predicate)?;
                Ok(TranslatedExpression {
                    ast: Expression::unary(op, mapped.ast),
                    serializer: boolean,
                })
            }
            (Contains, [source, value]) => {
                let target = self.translate_expression(source)?;
                let value = self.translate_expression(value)?;
                let ast = if target.serializer.is_string() {
                    Expression::binary(
                        BinaryOperator::Gte,
                        Expression::binary(BinaryOperator::IndexOfCP, target.ast, value.ast),
                        Expression::Constant(Bson::Int32(0)),
                    )
                } else {
                    let array = self.translate_enumerable(source)?;
                    Expression::binary(BinaryOperator::In, value.ast, array.ast)
                };
                Ok(TranslatedExpression {
                    ast,
                    serializer: boolean,
                })
            }
            (ElementAt, [source, index]) => {
                let source = self.translate_enumerable(source)?;
                let index = self.translate_expression(index)?;
                Ok(TranslatedExpression {
                    serializer: item_serializer(expr, &source.serializer)?,
                    ast: Expression::binary(BinaryOperator::ArrayElemAt, source.ast, index.ast),
                })
            }
            (Select, [source, selector]) => {
                let source = self.translate_enumerable(source)?;
                let mapped = self.translate_array_map(source, selector)?;
                Ok(mapped)
            }
            (Where, [source, predicate]) => {
                let source = self.translate_enumerable(source)?;
                self.translate_array_filter(source, predicate)
            }
            (Skip | Take, [source, n]) => {
                let source = self.translate_enumerable(source)?;
                let n = self.translate_expression(n)?;
                let slice = if call.method == Skip {
                    Slice {
                        array: Box::new(source.ast),
                        position: Some(Box::new(n.ast)),
                        n: Box::new(Expression::Constant(Bson::Int32(i32::MAX))),
                    }
                } else {
                    Slice {
                        array: Box::new(source.ast),
                        position: None,
                        n: Box::new(n.ast),
                    }
                };
                Ok(TranslatedExpression {
                    ast: Expression::Slice(slice),
                    serializer: source.serializer,
                })
            }
            (Pick(pick), [source, selector, rest @ ..]) if rest.len() <= 1 => {
                self.translate_pick(expr, pick, source, selector, rest.first())
            }
            (ToLower | ToUpper | Trim, [source]) => {
                let op = match call.method {
                    ToLower => UnaryOperator::ToLower,
                    ToUpper => UnaryOperator::ToUpper,
                    _ => UnaryOperator::Trim,
                };
                let source = self.translate_expression(source)?;
                Ok(TranslatedExpression {
                    ast: Expression::unary(op, source.ast),
                    serializer: Serializer::Scalar(ScalarType::String),
                })
            }
            (StartsWith, [source, prefix]) => {
                let source = self.translate_expression(source)?;
                let prefix = self.translate_expression(prefix)?;
                Ok(TranslatedExpression {
                    ast: Expression::binary(
                        BinaryOperator::Eq,
                        Expression::binary(BinaryOperator::IndexOfCP, source.ast, prefix.ast),
                        Expression::Constant(Bson::Int32(0)),
                    ),
                    serializer: boolean,
                })
            }
            (EndsWith, [source, suffix]) => {
                let source = self.translate_expression(source)?;
                let pattern = format!("{}$", escape_regex(constant_string(suffix)?));
                Ok(TranslatedExpression {
                    ast: Expression::binary(
                        BinaryOperator::RegexMatch,
                        source.ast,
                        Expression::Constant(Bson::RegularExpression(Regex {
                            pattern,
                            options: String::new(),
                        })),
                    ),
                    serializer: boolean,
                })
            }
            (Substring, [source, start, rest @ ..]) if rest.len() <= 1 => {
                let source = self.translate_expression(source)?;
                let start = self.translate_expression(start)?;
                let length = match rest {
                    [length] => self.translate_expression(length)?.ast,
                    _ => Expression::Constant(Bson::Int32(i32::MAX)),
                };
                Ok(TranslatedExpression {
                    ast: Expression::nary(NaryOperator::SubstrCP, vec![source.ast, start.ast, length]),
                    serializer: Serializer::Scalar(ScalarType::String),
                })
            }
            (IsMatch, [source, regex @ Expr::Constant(Bson::RegularExpression(_))]) => {
                let source = self.translate_expression(source)?;
                let regex = self.translate_expression(regex)?;
                Ok(TranslatedExpression {
                    ast: Expression::binary(BinaryOperator::RegexMatch, source.ast, regex.ast),
                    serializer: boolean,
                })
            }
            _ => Err(not_supported(expr)),
        }
    }

    /// Binds the single parameter of a lambda to the `$$name` variable of an
    /// array operator iterating over items of the given serializer.
    pub(crate) fn bind_lambda_to_item<'l>(
        &self,
        expr: &'l Expr,
        item: &Serializer,
    ) -> Result<(Self, String, &'l Expr)> {
        let lambda = expr
            .as_lambda(1)
            .ok_or_else(|| not_supported_because(expr, "a single parameter lambda is required"))?;
        let name = lambda.parameters[0].clone();
        let translator = self.with_symbols(vec![Symbol {
            name: name.clone(),
            ast: Expression::var(name.clone()),
            serializer: item.clone(),
            filter_path: None,
        }]);
        Ok((translator, name, lambda.body.as_ref()))
    }

    fn translate_array_map(
        &self,
        source: TranslatedExpression,
        selector: &Expr,
    ) -> Result<TranslatedExpression> {
        let item = item_serializer(selector, &source.serializer)?;
        let (translator, name, body) = self.bind_lambda_to_item(selector, &item)?;
        let body = translator.translate_expression(body)?;
        Ok(TranslatedExpression {
            ast: Expression::map(source.ast, name, body.ast),
            serializer: Serializer::array_of(body.serializer),
        })
    }

    /// The values a statistic is computed over: the source array, or the
    /// selector applied to each of its items.
    fn translate_numeric_values(
        &self,
        source: &Expr,
        selector: Option<&Expr>,
    ) -> Result<TranslatedExpression> {
        let source = self.translate_enumerable(source)?;
        match selector {
            Some(selector) => self.translate_array_map(source, selector),
            None => Ok(source),
        }
    }

    fn translate_array_filter(
        &self,
        source: TranslatedExpression,
        predicate: &Expr,
    ) -> Result<TranslatedExpression> {
        let item = item_serializer(predicate, &source.serializer)?;
        let (translator, name, body) = self.bind_lambda_to_item(predicate, &item)?;
        let cond = translator.translate_expression(body)?;
        Ok(TranslatedExpression {
            ast: Expression::Filter(FilterExpression {
                input: Box::new(source.ast),
                as_var: name,
                cond: Box::new(cond.ast),
                limit: None,
            }),
            serializer: source.serializer,
        })
    }

    fn translate_pick(
        &self,
        expr: &Expr,
        pick: &PickMethod,
        source: &Expr,
        selector: &Expr,
        n: Option<&Expr>,
    ) -> Result<TranslatedExpression> {
        let (op, sort_by) = match pick {
            PickMethod::Top(s) => (PickOperator::Top, Some(s.clone())),
            PickMethod::TopN(s) => (PickOperator::TopN, Some(s.clone())),
            PickMethod::Bottom(s) => (PickOperator::Bottom, Some(s.clone())),
            PickMethod::BottomN(s) => (PickOperator::BottomN, Some(s.clone())),
            PickMethod::FirstN => (PickOperator::FirstN, None),
            PickMethod::LastN => (PickOperator::LastN, None),
            PickMethod::MaxN => (PickOperator::MaxN, None),
            PickMethod::MinN => (PickOperator::MinN, None),
        };
        let takes_n = !matches!(op, PickOperator::Top | PickOperator::Bottom);
        if takes_n != n.is_some() {
            return Err(not_supported_because(
                expr,
                format!("{} has the wrong number of arguments", op.name()),
            ));
        }

        let source = self.translate_enumerable(source)?;
        let item = item_serializer(selector, &source.serializer)?;
        let (translator, as_var, body) = self.bind_lambda_to_item(selector, &item)?;
        let selected = translator.translate_expression(body)?;
        let n = n.map(|n| self.translate_expression(n)).transpose()?;
        let serializer = if takes_n {
            Serializer::array_of(selected.serializer)
        } else {
            selected.serializer
        };
        Ok(TranslatedExpression {
            ast: Expression::Pick(Pick {
                op,
                source: Box::new(source.ast),
                sort_by,
                as_var,
                selector: Box::new(selected.ast),
                n: n.map(|n| Box::new(n.ast)),
            }),
            serializer,
        })
    }
}

fn item_serializer(expr: &Expr, serializer: &Serializer) -> Result<Serializer> {
    serializer
        .item_serializer()
        .cloned()
        .ok_or_else(|| not_supported_because(expr, "the value is not an array"))
}
