use crate::{
    expression::{BinaryOp, Binary, Conditional, Expr, MemberAccess, NewObject, Unary, UnaryOp},
    serializer::{DocumentSerializer, MemberSerializer, ScalarType, Serializer, ANONYMOUS_TYPE_NAME},
    translator::{
        not_supported, not_supported_because, utils::validate_field_name, QueryTranslator, Result,
        TranslatedExpression,
    },
};
use bson::Bson;
use linked_hash_map::LinkedHashMap;
use pipeline_ast::{
    definitions::{BinaryOperator, Cond, Expression, NaryOperator, UnaryOperator},
    ELEMENTS_FIELD,
};

/// Variable bound by the $map that pushes a member access into an array
/// returned by $first or $last.
const ITEM_VAR: &str = "item";

impl<'a> QueryTranslator<'a> {
    pub(crate) fn translate_expression(&self, expr: &Expr) -> Result<TranslatedExpression> {
        match expr {
            Expr::Constant(c) => Ok(TranslatedExpression {
                ast: Expression::Constant(c.clone()),
                serializer: Serializer::for_value(c),
            }),
            Expr::Parameter(name) => {
                let symbol = self.lookup_symbol(name)?;
                Ok(TranslatedExpression {
                    ast: symbol.ast.clone(),
                    serializer: symbol.serializer.clone(),
                })
            }
            Expr::Member(m) => self.translate_member(expr, m),
            Expr::Binary(b) => self.translate_binary(expr, b),
            Expr::Unary(u) => self.translate_unary(expr, u),
            Expr::Conditional(c) => self.translate_conditional(c),
            Expr::New(n) => self.translate_new(n),
            Expr::NewArray(items) => {
                let items = items
                    .iter()
                    .map(|i| self.translate_expression(i))
                    .collect::<Result<Vec<_>>>()?;
                let item_serializer = items
                    .first()
                    .map(|i| i.serializer.clone())
                    .unwrap_or(Serializer::Scalar(ScalarType::Any));
                Ok(TranslatedExpression {
                    ast: Expression::ComputedArray(items.into_iter().map(|i| i.ast).collect()),
                    serializer: Serializer::array_of(item_serializer),
                })
            }
            Expr::Call(c) if !expr.is_query() => self.translate_method_call(expr, c),
            Expr::Call(_) => Err(not_supported_because(
                expr,
                "a query cannot be used as a value",
            )),
            Expr::Source(_) | Expr::Documents(_) | Expr::Lambda(_) => Err(not_supported(expr)),
        }
    }

    /// Translates an expression used as an array. A grouping stands for its
    /// elements.
    pub(crate) fn translate_enumerable(&self, expr: &Expr) -> Result<TranslatedExpression> {
        let translated = self.translate_expression(expr)?;
        match translated.serializer {
            Serializer::Grouping(g) => Ok(TranslatedExpression {
                ast: Expression::get_field(translated.ast, ELEMENTS_FIELD),
                serializer: Serializer::Array(g.element),
            }),
            Serializer::Array(_) => Ok(translated),
            Serializer::Nullable(inner) if matches!(*inner, Serializer::Array(_)) => {
                Ok(TranslatedExpression {
                    ast: translated.ast,
                    serializer: *inner,
                })
            }
            _ => Err(not_supported_because(expr, "the value is not an array")),
        }
    }

    fn translate_member(&self, expr: &Expr, m: &MemberAccess) -> Result<TranslatedExpression> {
        let target = self.translate_expression(&m.target)?;
        let member = m.member.as_str();
        let (ast, serializer) = match (&target.serializer, member) {
            (Serializer::Grouping(g), "Key") => (
                Expression::get_field(target.ast, "_id"),
                (*g.key).clone(),
            ),
            (Serializer::Grouping(_), "Count") => {
                let elements = self.translate_enumerable(&m.target)?;
                (
                    Expression::unary(UnaryOperator::Size, elements.ast),
                    Serializer::Scalar(ScalarType::Int32),
                )
            }
            (Serializer::Array(_), "Length" | "Count") => (
                Expression::unary(UnaryOperator::Size, target.ast),
                Serializer::Scalar(ScalarType::Int32),
            ),
            (Serializer::Scalar(ScalarType::String), "Length") => (
                Expression::unary(UnaryOperator::StrLenCP, target.ast),
                Serializer::Scalar(ScalarType::Int32),
            ),
            (Serializer::Nullable(_), "HasValue") => (
                Expression::binary(
                    BinaryOperator::Ne,
                    target.ast,
                    Expression::Constant(Bson::Null),
                ),
                Serializer::Scalar(ScalarType::Boolean),
            ),
            (Serializer::Nullable(inner), "Value") => (target.ast, (**inner).clone()),
            (Serializer::Scalar(ScalarType::DateTime), _) => {
                let op = match member {
                    "Year" => UnaryOperator::Year,
                    "Month" => UnaryOperator::Month,
                    "Day" => UnaryOperator::DayOfMonth,
                    "Hour" => UnaryOperator::Hour,
                    "Minute" => UnaryOperator::Minute,
                    "Second" => UnaryOperator::Second,
                    _ => return Err(not_supported(expr)),
                };
                (
                    Expression::unary(op, target.ast),
                    Serializer::Scalar(ScalarType::Int32),
                )
            }
            (serializer, _) => match serializer.member(member) {
                Some(MemberSerializer {
                    element_name,
                    serializer,
                    ..
                }) => (
                    member_access(target.ast, element_name),
                    serializer.clone(),
                ),
                None => {
                    return Err(not_supported_because(
                        expr,
                        format!("{member} is not a known member"),
                    ))
                }
            },
        };
        Ok(TranslatedExpression { ast, serializer })
    }

    fn translate_binary(&self, expr: &Expr, b: &Binary) -> Result<TranslatedExpression> {
        use BinaryOp::*;
        if b.op == ArrayIndex {
            let array = self.translate_enumerable(&b.left)?;
            let index = self.translate_expression(&b.right)?;
            let serializer = array
                .serializer
                .item_serializer()
                .cloned()
                .ok_or_else(|| not_supported(expr))?;
            return Ok(TranslatedExpression {
                ast: Expression::binary(BinaryOperator::ArrayElemAt, array.ast, index.ast),
                serializer,
            });
        }

        let left = self.translate_expression(&b.left)?;
        let right = self.translate_expression(&b.right)?;
        let boolean = Serializer::Scalar(ScalarType::Boolean);
        let (ast, serializer) = match b.op {
            Add if left.serializer.is_string() || right.serializer.is_string() => (
                Expression::nary(NaryOperator::Concat, vec![left.ast, right.ast]),
                Serializer::Scalar(ScalarType::String),
            ),
            Add => (
                Expression::nary(NaryOperator::Add, vec![left.ast, right.ast]),
                left.serializer,
            ),
            Multiply => (
                Expression::nary(NaryOperator::Multiply, vec![left.ast, right.ast]),
                left.serializer,
            ),
            Subtract => (
                Expression::binary(BinaryOperator::Subtract, left.ast, right.ast),
                left.serializer,
            ),
            Divide => (
                Expression::binary(BinaryOperator::Divide, left.ast, right.ast),
                left.serializer,
            ),
            Modulo => (
                Expression::binary(BinaryOperator::Mod, left.ast, right.ast),
                left.serializer,
            ),
            AndAlso => (
                Expression::nary(NaryOperator::And, vec![left.ast, right.ast]),
                boolean,
            ),
            OrElse => (
                Expression::nary(NaryOperator::Or, vec![left.ast, right.ast]),
                boolean,
            ),
            Coalesce => (
                Expression::binary(BinaryOperator::IfNull, left.ast, right.ast),
                right.serializer,
            ),
            Equal | NotEqual | LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => {
                let op = match b.op {
                    Equal => BinaryOperator::Eq,
                    NotEqual => BinaryOperator::Ne,
                    LessThan => BinaryOperator::Lt,
                    LessThanOrEqual => BinaryOperator::Lte,
                    GreaterThan => BinaryOperator::Gt,
                    _ => BinaryOperator::Gte,
                };
                (Expression::binary(op, left.ast, right.ast), boolean)
            }
            ArrayIndex => return Err(not_supported(expr)),
        };
        Ok(TranslatedExpression { ast, serializer })
    }

    fn translate_unary(&self, expr: &Expr, u: &Unary) -> Result<TranslatedExpression> {
        let operand = self.translate_expression(&u.operand)?;
        match u.op {
            UnaryOp::Not => Ok(TranslatedExpression {
                ast: Expression::unary(UnaryOperator::Not, operand.ast),
                serializer: Serializer::Scalar(ScalarType::Boolean),
            }),
            UnaryOp::Negate => Ok(TranslatedExpression {
                ast: Expression::nary(
                    NaryOperator::Multiply,
                    vec![Expression::Constant(Bson::Int32(-1)), operand.ast],
                ),
                serializer: operand.serializer,
            }),
            UnaryOp::Convert(target) if operand.serializer.scalar_type() == Some(target) => {
                Ok(operand)
            }
            UnaryOp::Convert(target) => {
                let op = match target {
                    ScalarType::Boolean => UnaryOperator::ToBool,
                    ScalarType::DateTime => UnaryOperator::ToDate,
                    ScalarType::Decimal128 => UnaryOperator::ToDecimal,
                    ScalarType::Double => UnaryOperator::ToDouble,
                    ScalarType::Int32 => UnaryOperator::ToInt,
                    ScalarType::Int64 => UnaryOperator::ToLong,
                    ScalarType::ObjectId => UnaryOperator::ToObjectId,
                    ScalarType::String => UnaryOperator::ToString,
                    ScalarType::Any | ScalarType::Null | ScalarType::RegularExpression => {
                        return Err(not_supported_because(
                            expr,
                            format!("there is no conversion to {target:?}"),
                        ))
                    }
                };
                Ok(TranslatedExpression {
                    ast: Expression::unary(op, operand.ast),
                    serializer: Serializer::Scalar(target),
                })
            }
        }
    }

    fn translate_conditional(&self, c: &Conditional) -> Result<TranslatedExpression> {
        let test = self.translate_expression(&c.test)?;
        let if_true = self.translate_expression(&c.if_true)?;
        let if_false = self.translate_expression(&c.if_false)?;
        Ok(TranslatedExpression {
            ast: Expression::Cond(Cond {
                condition: Box::new(test.ast),
                then_branch: Box::new(if_true.ast),
                else_branch: Box::new(if_false.ast),
            }),
            serializer: if_true.serializer,
        })
    }

    fn translate_new(&self, n: &NewObject) -> Result<TranslatedExpression> {
        let mut fields = LinkedHashMap::new();
        let mut members = Vec::with_capacity(n.members.len());
        for (name, value) in n.members.iter() {
            validate_field_name(name)?;
            let translated = self.translate_expression(value)?;
            fields.insert(name.clone(), translated.ast);
            members.push(MemberSerializer {
                member_name: name.clone(),
                element_name: name.clone(),
                serializer: translated.serializer,
            });
        }
        Ok(TranslatedExpression {
            ast: Expression::ComputedDocument(fields),
            serializer: Serializer::Document(DocumentSerializer {
                type_name: n
                    .type_name
                    .clone()
                    .unwrap_or_else(|| ANONYMOUS_TYPE_NAME.to_string()),
                members,
            }),
        })
    }
}

/// Accesses a field of a document valued expression. A field of the first
/// or last element of an array is taken from the array first, which keeps
/// the access inside a single array operator.
fn member_access(target: Expression, element_name: &str) -> Expression {
    match target {
        Expression::Unary(u) if matches!(u.op, UnaryOperator::First | UnaryOperator::Last) => {
            Expression::unary(
                u.op,
                Expression::map(
                    *u.arg,
                    ITEM_VAR,
                    Expression::get_field(Expression::var(ITEM_VAR), element_name),
                ),
            )
        }
        target => Expression::get_field(target, element_name),
    }
}
