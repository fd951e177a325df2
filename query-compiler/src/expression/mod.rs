//! The front-end query tree: method-call chains over a collection, with
//! lambdas for selectors and predicates.

pub mod builder;
mod display;

use crate::serializer::ScalarType;
use bson::{Bson, Document};
use pipeline_ast::definitions::{DensifyRange, SortField};

#[derive(PartialEq, Debug, Clone)]
pub enum Expr {
    Source(Source),
    Documents(DocumentsSource),
    Parameter(String),
    Constant(Bson),
    Member(MemberAccess),
    Binary(Binary),
    Unary(Unary),
    Conditional(Conditional),
    New(NewObject),
    NewArray(Vec<Expr>),
    Lambda(Lambda),
    Call(Call),
}

/// Source is a collection whose documents are of the named type.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Source {
    pub collection: String,
    pub document_type: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct DocumentsSource {
    pub documents: Vec<Document>,
    pub document_type: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MemberAccess {
    pub target: Box<Expr>,
    pub member: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BinaryOp {
    Add,
    AndAlso,
    ArrayIndex,
    Coalesce,
    Divide,
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Modulo,
    Multiply,
    NotEqual,
    OrElse,
    Subtract,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Unary {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum UnaryOp {
    Not,
    Negate,
    Convert(ScalarType),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Conditional {
    pub test: Box<Expr>,
    pub if_true: Box<Expr>,
    pub if_false: Box<Expr>,
}

/// NewObject constructs a document. Without a type name the result is an
/// anonymous document.
#[derive(PartialEq, Debug, Clone)]
pub struct NewObject {
    pub type_name: Option<String>,
    pub members: Vec<(String, Expr)>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Lambda {
    pub parameters: Vec<String>,
    pub body: Box<Expr>,
}

/// Call applies a method to its arguments. The first argument is the
/// source the method is applied to.
#[derive(PartialEq, Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub arguments: Vec<Expr>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Method {
    // Pipeline operators. Select, Where, Skip and Take are also array
    // methods when their source is not a query.
    Where,
    Select,
    SelectMany,
    GroupBy,
    Join,
    GroupJoin,
    Lookup,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    Skip,
    Take,
    Sample,
    Distinct,
    Union,
    Concat,
    OfType(String),
    AppendStage(AppendStage),
    Densify(DensifyRange),
    Bucket(BucketOptions),
    BucketAuto(BucketAutoOptions),

    // Array methods
    Count,
    LongCount,
    Sum,
    Min,
    Max,
    Average,
    StandardDeviationPopulation,
    StandardDeviationSample,
    Median,
    Percentile,
    First,
    Last,
    Any,
    All,
    Contains,
    ElementAt,
    Pick(PickMethod),

    // String methods
    ToLower,
    ToUpper,
    Trim,
    StartsWith,
    EndsWith,
    Substring,
    IsMatch,
}

#[derive(PartialEq, Debug, Clone)]
pub struct AppendStage {
    pub stage: Document,
    pub output_type: Option<String>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct BucketOptions {
    pub boundaries: Vec<Bson>,
    pub default: Option<Bson>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct BucketAutoOptions {
    pub buckets: i32,
    pub granularity: Option<String>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum PickMethod {
    Top(Vec<SortField>),
    TopN(Vec<SortField>),
    Bottom(Vec<SortField>),
    BottomN(Vec<SortField>),
    FirstN,
    LastN,
    MaxN,
    MinN,
}

impl Method {
    /// Whether this method can head a pipeline operator.
    pub fn is_query_operator(&self) -> bool {
        use Method::*;
        matches!(
            self,
            Where
                | Select
                | SelectMany
                | GroupBy
                | Join
                | GroupJoin
                | Lookup
                | OrderBy
                | OrderByDescending
                | ThenBy
                | ThenByDescending
                | Skip
                | Take
                | Sample
                | Distinct
                | Union
                | Concat
                | OfType(_)
                | AppendStage(_)
                | Densify(_)
                | Bucket(_)
                | BucketAuto(_)
        )
    }

    pub fn name(&self) -> &'static str {
        use Method::*;
        match self {
            Where => "Where",
            Select => "Select",
            SelectMany => "SelectMany",
            GroupBy => "GroupBy",
            Join => "Join",
            GroupJoin => "GroupJoin",
            Lookup => "Lookup",
            OrderBy => "OrderBy",
            OrderByDescending => "OrderByDescending",
            ThenBy => "ThenBy",
            ThenByDescending => "ThenByDescending",
            Skip => "Skip",
            Take => "Take",
            Sample => "Sample",
            Distinct => "Distinct",
            Union => "Union",
            Concat => "Concat",
            OfType(_) => "OfType",
            AppendStage(_) => "AppendStage",
            Densify(_) => "Densify",
            Bucket(_) => "Bucket",
            BucketAuto(_) => "BucketAuto",
            Count => "Count",
            LongCount => "LongCount",
            Sum => "Sum",
            Min => "Min",
            Max => "Max",
            Average => "Average",
            StandardDeviationPopulation => "StandardDeviationPopulation",
            StandardDeviationSample => "StandardDeviationSample",
            Median => "Median",
            Percentile => "Percentile",
            First => "First",
            Last => "Last",
            Any => "Any",
            All => "All",
            Contains => "Contains",
            ElementAt => "ElementAt",
            Pick(p) => match p {
                PickMethod::Top(_) => "Top",
                PickMethod::TopN(_) => "TopN",
                PickMethod::Bottom(_) => "Bottom",
                PickMethod::BottomN(_) => "BottomN",
                PickMethod::FirstN => "FirstN",
                PickMethod::LastN => "LastN",
                PickMethod::MaxN => "MaxN",
                PickMethod::MinN => "MinN",
            },
            ToLower => "ToLower",
            ToUpper => "ToUpper",
            Trim => "Trim",
            StartsWith => "StartsWith",
            EndsWith => "EndsWith",
            Substring => "Substring",
            IsMatch => "IsMatch",
        }
    }
}

impl Expr {
    /// Whether this expression denotes a query, i.e. a chain of pipeline
    /// operators rooted at a collection or an inline documents source.
    pub fn is_query(&self) -> bool {
        match self {
            Expr::Source(_) | Expr::Documents(_) => true,
            Expr::Call(c) if c.method.is_query_operator() => {
                c.arguments.first().map(Expr::is_query).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Returns the collection at the root of a query.
    pub fn root_collection(&self) -> Option<&str> {
        match self {
            Expr::Source(s) => Some(s.collection.as_str()),
            Expr::Call(c) if c.method.is_query_operator() => {
                c.arguments.first().and_then(Expr::root_collection)
            }
            _ => None,
        }
    }

    /// Returns the lambda if this expression is one, with the given arity.
    pub fn as_lambda(&self, arity: usize) -> Option<&Lambda> {
        match self {
            Expr::Lambda(l) if l.parameters.len() == arity => Some(l),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Bson> {
        match self {
            Expr::Constant(c) => Some(c),
            _ => None,
        }
    }
}

impl Lambda {
    /// Whether the body is the lambda's own single parameter, as in `x => x`.
    pub fn is_identity(&self) -> bool {
        match (self.parameters.as_slice(), self.body.as_ref()) {
            ([p], Expr::Parameter(name)) => p == name,
            _ => false,
        }
    }
}
