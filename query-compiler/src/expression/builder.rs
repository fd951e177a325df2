//! Helpers for building query trees.
//!
//! ```ignore
//! source("people", "Person")
//!     .where_(lambda(&["p"], param("p").member("Age").greater_than(constant(21))))
//!     .select(lambda(&["p"], param("p").member("Name")))
//! ```

use super::*;

pub fn source(collection: &str, document_type: &str) -> Expr {
    Expr::Source(Source {
        collection: collection.to_string(),
        document_type: document_type.to_string(),
    })
}

pub fn documents(documents: Vec<Document>, document_type: &str) -> Expr {
    Expr::Documents(DocumentsSource {
        documents,
        document_type: document_type.to_string(),
    })
}

pub fn param(name: &str) -> Expr {
    Expr::Parameter(name.to_string())
}

pub fn constant(value: impl Into<Bson>) -> Expr {
    Expr::Constant(value.into())
}

pub fn lambda(parameters: &[&str], body: Expr) -> Expr {
    Expr::Lambda(Lambda {
        parameters: parameters.iter().map(|p| p.to_string()).collect(),
        body: Box::new(body),
    })
}

pub fn new_object(members: Vec<(&str, Expr)>) -> Expr {
    Expr::New(NewObject {
        type_name: None,
        members: members
            .into_iter()
            .map(|(name, e)| (name.to_string(), e))
            .collect(),
    })
}

pub fn new_typed_object(type_name: &str, members: Vec<(&str, Expr)>) -> Expr {
    match new_object(members) {
        Expr::New(n) => Expr::New(NewObject {
            type_name: Some(type_name.to_string()),
            ..n
        }),
        other => other,
    }
}

pub fn new_array(items: Vec<Expr>) -> Expr {
    Expr::NewArray(items)
}

pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Expr {
    Expr::Conditional(Conditional {
        test: Box::new(test),
        if_true: Box::new(if_true),
        if_false: Box::new(if_false),
    })
}

pub fn call(method: Method, arguments: Vec<Expr>) -> Expr {
    Expr::Call(Call { method, arguments })
}

impl Expr {
    pub fn member(self, member: &str) -> Expr {
        Expr::Member(MemberAccess {
            target: Box::new(self),
            member: member.to_string(),
        })
    }

    fn binary(self, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary(Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        })
    }

    pub fn equal(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Equal, right)
    }

    pub fn not_equal(self, right: Expr) -> Expr {
        self.binary(BinaryOp::NotEqual, right)
    }

    pub fn less_than(self, right: Expr) -> Expr {
        self.binary(BinaryOp::LessThan, right)
    }

    pub fn less_than_or_equal(self, right: Expr) -> Expr {
        self.binary(BinaryOp::LessThanOrEqual, right)
    }

    pub fn greater_than(self, right: Expr) -> Expr {
        self.binary(BinaryOp::GreaterThan, right)
    }

    pub fn greater_than_or_equal(self, right: Expr) -> Expr {
        self.binary(BinaryOp::GreaterThanOrEqual, right)
    }

    pub fn and_also(self, right: Expr) -> Expr {
        self.binary(BinaryOp::AndAlso, right)
    }

    pub fn or_else(self, right: Expr) -> Expr {
        self.binary(BinaryOp::OrElse, right)
    }

    pub fn plus(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Add, right)
    }

    pub fn minus(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Subtract, right)
    }

    pub fn times(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Multiply, right)
    }

    pub fn divided_by(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Divide, right)
    }

    pub fn modulo(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Modulo, right)
    }

    pub fn coalesce(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Coalesce, right)
    }

    pub fn index(self, right: Expr) -> Expr {
        self.binary(BinaryOp::ArrayIndex, right)
    }

    fn unary(self, op: UnaryOp) -> Expr {
        Expr::Unary(Unary {
            op,
            operand: Box::new(self),
        })
    }

    pub fn not(self) -> Expr {
        self.unary(UnaryOp::Not)
    }

    pub fn negate(self) -> Expr {
        self.unary(UnaryOp::Negate)
    }

    pub fn convert(self, target: ScalarType) -> Expr {
        self.unary(UnaryOp::Convert(target))
    }

    /// Applies a method with this expression as its source.
    pub fn call(self, method: Method, mut arguments: Vec<Expr>) -> Expr {
        arguments.insert(0, self);
        call(method, arguments)
    }

    pub fn where_(self, predicate: Expr) -> Expr {
        self.call(Method::Where, vec![predicate])
    }

    pub fn select(self, selector: Expr) -> Expr {
        self.call(Method::Select, vec![selector])
    }

    pub fn select_many(self, collection_selector: Expr) -> Expr {
        self.call(Method::SelectMany, vec![collection_selector])
    }

    pub fn group_by(self, key_selector: Expr) -> Expr {
        self.call(Method::GroupBy, vec![key_selector])
    }

    pub fn order_by(self, key_selector: Expr) -> Expr {
        self.call(Method::OrderBy, vec![key_selector])
    }

    pub fn order_by_descending(self, key_selector: Expr) -> Expr {
        self.call(Method::OrderByDescending, vec![key_selector])
    }

    pub fn then_by(self, key_selector: Expr) -> Expr {
        self.call(Method::ThenBy, vec![key_selector])
    }

    pub fn then_by_descending(self, key_selector: Expr) -> Expr {
        self.call(Method::ThenByDescending, vec![key_selector])
    }

    pub fn skip(self, n: Expr) -> Expr {
        self.call(Method::Skip, vec![n])
    }

    pub fn take(self, n: Expr) -> Expr {
        self.call(Method::Take, vec![n])
    }
}
