use super::*;
use std::fmt;

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinaryOp::*;
        let op = match self {
            Add => "+",
            AndAlso => "&&",
            ArrayIndex => "[]",
            Coalesce => "??",
            Divide => "/",
            Equal => "==",
            GreaterThan => ">",
            GreaterThanOrEqual => ">=",
            LessThan => "<",
            LessThanOrEqual => "<=",
            Modulo => "%",
            Multiply => "*",
            NotEqual => "!=",
            OrElse => "||",
            Subtract => "-",
        };
        write!(f, "{op}")
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Source(s) => write!(f, "{}", s.collection),
            Expr::Documents(d) => write!(f, "Documents<{}>[{}]", d.document_type, d.documents.len()),
            Expr::Parameter(name) => write!(f, "{name}"),
            Expr::Constant(c) => write!(f, "{c}"),
            Expr::Member(m) => write!(f, "{}.{}", m.target, m.member),
            Expr::Binary(b) if b.op == BinaryOp::ArrayIndex => write!(f, "{}[{}]", b.left, b.right),
            Expr::Binary(b) => write!(f, "({} {} {})", b.left, b.op, b.right),
            Expr::Unary(u) => match u.op {
                UnaryOp::Not => write!(f, "!{}", u.operand),
                UnaryOp::Negate => write!(f, "-{}", u.operand),
                UnaryOp::Convert(t) => write!(f, "Convert({}, {:?})", u.operand, t),
            },
            Expr::Conditional(c) => write!(f, "({} ? {} : {})", c.test, c.if_true, c.if_false),
            Expr::New(n) => {
                write!(f, "new {}{{ ", n.type_name.as_deref().unwrap_or(""))?;
                for (i, (name, e)) in n.members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} = {e}")?;
                }
                write!(f, " }}")
            }
            Expr::NewArray(items) => {
                write!(f, "new[] {{ ")?;
                write_list(f, items)?;
                write!(f, " }}")
            }
            Expr::Lambda(l) => match l.parameters.as_slice() {
                [p] => write!(f, "{} => {}", p, l.body),
                ps => write!(f, "({}) => {}", ps.join(", "), l.body),
            },
            Expr::Call(c) => match c.arguments.split_first() {
                Some((source, rest)) => {
                    write!(f, "{}.{}(", source, c.method.name())?;
                    write_list(f, rest)?;
                    write!(f, ")")
                }
                None => write!(f, "{}()", c.method.name()),
            },
        }
    }
}
