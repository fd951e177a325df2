use bson::{Bson, Document};
use linked_hash_map::LinkedHashMap;

use crate::{ELEMENT_SENTINEL, ROOT_NAME};

// This module contains the aggregation pipeline syntax tree produced by the
// query compiler. Every node is immutable once built: passes consume a tree
// and return a new one, sharing nothing mutable with the input.

/// Stage represents a single aggregation pipeline stage.
#[derive(PartialEq, Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Project(Project),
    Group(Group),
    Sort(Vec<SortField>),
    Limit(i64),
    Skip(i64),
    Sample(i64),
    Lookup(Lookup),
    Unwind(Unwind),
    Bucket(Bucket),
    BucketAuto(BucketAuto),
    Densify(Densify),
    Documents(Vec<Bson>),
    ReplaceRoot(Expression),
    UnionWith(UnionWith),
    /// A stage supplied verbatim by the caller. It is rendered as is and
    /// never inspected by the optimizer.
    Universal(Document),
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Project {
    pub specifications: LinkedHashMap<String, ProjectItem>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ProjectItem {
    Exclusion,
    Inclusion,
    Assignment(Expression),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Group {
    pub id: Expression,
    pub fields: Vec<AccumulatorField>,
}

/// AccumulatorField is one output field of a grouping stage. The order of
/// the fields in a grouping stage is the order in which they were added.
#[derive(PartialEq, Debug, Clone)]
pub struct AccumulatorField {
    pub name: String,
    pub value: AccumulatorExpression,
}

#[derive(PartialEq, Debug, Clone)]
pub enum AccumulatorExpression {
    Unary(UnaryAccumulator),
    Pick(PickAccumulator),
    Quantile(Quantile),
}

#[derive(PartialEq, Debug, Clone)]
pub struct UnaryAccumulator {
    pub op: AccumulatorOperator,
    pub arg: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct PickAccumulator {
    pub op: PickOperator,
    pub sort_by: Option<Vec<SortField>>,
    pub selector: Box<Expression>,
    pub n: Option<Box<Expression>>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum AccumulatorOperator {
    AddToSet,
    Avg,
    First,
    Last,
    Max,
    MergeObjects,
    Min,
    Push,
    StdDevPop,
    StdDevSamp,
    Sum,
}

/// PickOperator covers the top-N/bottom-N family. The same operators exist
/// as array expressions and as accumulators.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum PickOperator {
    Bottom,
    BottomN,
    FirstN,
    LastN,
    MaxN,
    MinN,
    Top,
    TopN,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SortField {
    pub path: String,
    pub order: SortOrder,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Lookup covers the three shapes of $lookup: the local/foreign field form,
/// the correlated sub-pipeline form, and the concise form that has both.
#[derive(PartialEq, Debug, Clone)]
pub struct Lookup {
    pub from: Option<String>,
    pub local_field: Option<String>,
    pub foreign_field: Option<String>,
    pub let_vars: Vec<VarBinding>,
    pub pipeline: Option<Vec<Stage>>,
    pub as_field: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct VarBinding {
    pub name: String,
    pub value: Expression,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Unwind {
    pub path: String,
    pub include_array_index: Option<String>,
    pub preserve_null_and_empty_arrays: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Bucket {
    pub group_by: Expression,
    pub boundaries: Vec<Bson>,
    pub default: Option<Bson>,
    pub output: Vec<AccumulatorField>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct BucketAuto {
    pub group_by: Expression,
    pub buckets: i32,
    pub granularity: Option<String>,
    pub output: Vec<AccumulatorField>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Densify {
    pub field: String,
    pub partition_by_fields: Vec<String>,
    pub range: DensifyRange,
}

#[derive(PartialEq, Debug, Clone)]
pub struct DensifyRange {
    pub step: Bson,
    pub unit: Option<String>,
    pub bounds: DensifyBounds,
}

#[derive(PartialEq, Debug, Clone)]
pub enum DensifyBounds {
    Full,
    Partition,
    Range(Bson, Bson),
}

#[derive(PartialEq, Debug, Clone)]
pub struct UnionWith {
    pub collection: String,
    pub pipeline: Option<Vec<Stage>>,
}

/// Filter is a boolean predicate in match-language form.
#[derive(PartialEq, Debug, Clone)]
pub enum Filter {
    Field(FieldFilter),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Expr(Expression),
    /// The trivially true filter. Renders as `{}` and is removed by the
    /// simplifier when it is the whole of a $match.
    MatchesEverything,
}

/// FieldFilter applies an operation to a field path. Inside an $elemMatch
/// the path is ELEMENT_SENTINEL when the operation applies to the array
/// element itself.
#[derive(PartialEq, Debug, Clone)]
pub struct FieldFilter {
    pub path: String,
    pub operation: FilterOperation,
}

#[derive(PartialEq, Debug, Clone)]
pub enum FilterOperation {
    Comparison(Comparison),
    ImpliedEquality(Bson),
    Regex(RegexOperation),
    ElemMatch(Box<Filter>),
    Not(Box<FilterOperation>),
    Exists(bool),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Size(i32),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Comparison {
    pub op: ComparisonOperator,
    pub value: Bson,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ComparisonOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct RegexOperation {
    pub pattern: String,
    pub options: String,
}

/// Expression is an aggregation expression.
#[derive(PartialEq, Debug, Clone)]
pub enum Expression {
    Constant(Bson),
    /// A rendered path, including its `$` or `$$` prefix, e.g. `$a.b` or `$$this.b`.
    FieldPath(String),
    Variable(Variable),
    GetField(GetField),
    Unary(UnaryExpression),
    Binary(BinaryExpression),
    Nary(NaryExpression),
    Cond(Cond),
    Map(Map),
    Filter(FilterExpression),
    Let(Let),
    ComputedDocument(LinkedHashMap<String, Expression>),
    ComputedArray(Vec<Expression>),
    Slice(Slice),
    Pick(Pick),
    Quantile(Quantile),
}

/// Variable references `$$name`. `is_current` marks the variable that the
/// pipeline binds to the current document, so that field accesses on it can
/// be rendered as plain field paths.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub is_current: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GetField {
    pub input: Box<Expression>,
    pub field: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct UnaryExpression {
    pub op: UnaryOperator,
    pub arg: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct BinaryExpression {
    pub op: BinaryOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct NaryExpression {
    pub op: NaryOperator,
    pub args: Vec<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Cond {
    pub condition: Box<Expression>,
    pub then_branch: Box<Expression>,
    pub else_branch: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Map {
    pub input: Box<Expression>,
    pub as_var: String,
    pub inside: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FilterExpression {
    pub input: Box<Expression>,
    pub as_var: String,
    pub cond: Box<Expression>,
    pub limit: Option<Box<Expression>>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Let {
    pub vars: Vec<VarBinding>,
    pub inside: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Slice {
    pub array: Box<Expression>,
    pub position: Option<Box<Expression>>,
    pub n: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Pick {
    pub op: PickOperator,
    pub source: Box<Expression>,
    pub sort_by: Option<Vec<SortField>>,
    pub as_var: String,
    pub selector: Box<Expression>,
    pub n: Option<Box<Expression>>,
}

/// Quantile is `$median` or `$percentile` over an array, or over the group
/// members when used as an accumulator. Only percentiles carry `p`, the
/// list of requested probabilities.
#[derive(PartialEq, Debug, Clone)]
pub struct Quantile {
    pub op: QuantileOperator,
    pub input: Box<Expression>,
    pub p: Option<Box<Expression>>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum QuantileOperator {
    Median,
    Percentile,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum UnaryOperator {
    // Arithmetic operators
    Abs,
    Ceil,
    Exp,
    Floor,
    Sqrt,

    // Array operators
    AllElementsTrue,
    AnyElementTrue,
    ArrayToObject,
    First,
    IsArray,
    Last,
    ObjectToArray,
    ReverseArray,
    Size,

    // Array reductions, which double as accumulators
    Avg,
    Max,
    Min,
    StdDevPop,
    StdDevSamp,
    Sum,

    // Boolean operators
    Not,

    // String operators
    StrLenCP,
    ToLower,
    ToUpper,
    Trim,

    // Date operators
    DayOfMonth,
    Hour,
    Minute,
    Month,
    Second,
    Year,

    // Type operators
    ToBool,
    ToDate,
    ToDecimal,
    ToDouble,
    ToInt,
    ToLong,
    ToObjectId,
    ToString,
    Type,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BinaryOperator {
    ArrayElemAt,
    Cmp,
    Divide,
    Eq,
    Gt,
    Gte,
    IfNull,
    In,
    IndexOfCP,
    Lt,
    Lte,
    Mod,
    Ne,
    Pow,
    RegexMatch,
    Split,
    Subtract,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum NaryOperator {
    Add,
    And,
    Concat,
    ConcatArrays,
    Multiply,
    Or,
    SubstrCP,
}

impl UnaryOperator {
    /// Returns the accumulator with the same meaning as this array operator,
    /// if there is one.
    pub fn accumulator_operator(self) -> Option<AccumulatorOperator> {
        use UnaryOperator::*;
        Some(match self {
            Avg => AccumulatorOperator::Avg,
            First => AccumulatorOperator::First,
            Last => AccumulatorOperator::Last,
            Max => AccumulatorOperator::Max,
            Min => AccumulatorOperator::Min,
            StdDevPop => AccumulatorOperator::StdDevPop,
            StdDevSamp => AccumulatorOperator::StdDevSamp,
            Sum => AccumulatorOperator::Sum,
            _ => return None,
        })
    }

    /// Conversions that map null to null.
    pub fn is_null_preserving_conversion(self) -> bool {
        use UnaryOperator::*;
        matches!(
            self,
            ToBool | ToDate | ToDecimal | ToDouble | ToInt | ToLong | ToObjectId | ToString
        )
    }
}

impl BinaryOperator {
    pub fn comparison_inverse(self) -> Option<BinaryOperator> {
        match self {
            BinaryOperator::Eq => Some(BinaryOperator::Ne),
            BinaryOperator::Ne => Some(BinaryOperator::Eq),
            _ => None,
        }
    }
}

impl ComparisonOperator {
    pub fn negate(self) -> Option<ComparisonOperator> {
        match self {
            ComparisonOperator::Eq => Some(ComparisonOperator::Ne),
            ComparisonOperator::Ne => Some(ComparisonOperator::Eq),
            _ => None,
        }
    }
}

impl Expression {
    /// `$$ROOT`, bound to the current document.
    pub fn root() -> Expression {
        Expression::Variable(Variable {
            name: ROOT_NAME.to_string(),
            is_current: true,
        })
    }

    pub fn var(name: impl Into<String>) -> Expression {
        Expression::Variable(Variable {
            name: name.into(),
            is_current: false,
        })
    }

    pub fn constant(value: impl Into<Bson>) -> Expression {
        Expression::Constant(value.into())
    }

    pub fn get_field(input: Expression, field: impl Into<String>) -> Expression {
        Expression::GetField(GetField {
            input: Box::new(input),
            field: Box::new(Expression::Constant(Bson::String(field.into()))),
        })
    }

    pub fn unary(op: UnaryOperator, arg: Expression) -> Expression {
        Expression::Unary(UnaryExpression {
            op,
            arg: Box::new(arg),
        })
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
        Expression::Binary(BinaryExpression {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn nary(op: NaryOperator, args: Vec<Expression>) -> Expression {
        Expression::Nary(NaryExpression { op, args })
    }

    pub fn map(input: Expression, as_var: impl Into<String>, inside: Expression) -> Expression {
        Expression::Map(Map {
            input: Box::new(input),
            as_var: as_var.into(),
            inside: Box::new(inside),
        })
    }

    pub fn quantile(op: QuantileOperator, input: Expression, p: Option<Expression>) -> Expression {
        Expression::Quantile(Quantile {
            op,
            input: Box::new(input),
            p: p.map(Box::new),
        })
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Expression::Variable(v) if v.name == ROOT_NAME && v.is_current)
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self, Expression::Constant(Bson::Null))
    }

    /// Returns the field name if this is a $getField with a constant string
    /// field name.
    pub fn get_field_name(&self) -> Option<&str> {
        match self {
            Expression::GetField(GetField { field, .. }) => match field.as_ref() {
                Expression::Constant(Bson::String(s)) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Filter {
    pub fn field(path: impl Into<String>, operation: FilterOperation) -> Filter {
        Filter::Field(FieldFilter {
            path: path.into(),
            operation,
        })
    }

    pub fn compare(path: impl Into<String>, op: ComparisonOperator, value: impl Into<Bson>) -> Filter {
        Filter::field(
            path,
            FilterOperation::Comparison(Comparison {
                op,
                value: value.into(),
            }),
        )
    }

    /// A filter on the array element itself, for use inside $elemMatch.
    pub fn element(operation: FilterOperation) -> Filter {
        Filter::field(ELEMENT_SENTINEL, operation)
    }
}

impl AccumulatorExpression {
    pub fn unary(op: AccumulatorOperator, arg: Expression) -> AccumulatorExpression {
        AccumulatorExpression::Unary(UnaryAccumulator {
            op,
            arg: Box::new(arg),
        })
    }
}

impl SortField {
    pub fn ascending(path: impl Into<String>) -> SortField {
        SortField {
            path: path.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(path: impl Into<String>) -> SortField {
        SortField {
            path: path.into(),
            order: SortOrder::Descending,
        }
    }
}
