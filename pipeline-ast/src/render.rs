use crate::{definitions::*, ELEMENT_SENTINEL};
use bson::{bson, doc, Bson, Document};

/// Renders a list of stages into the documents sent to the server.
pub fn render_pipeline(stages: &[Stage]) -> Vec<Document> {
    stages.iter().map(Stage::render).collect()
}

fn render_int(n: i64) -> Bson {
    match i32::try_from(n) {
        Ok(i) => Bson::Int32(i),
        Err(_) => Bson::Int64(n),
    }
}

fn render_sort_fields(fields: &[SortField]) -> Document {
    fields
        .iter()
        .map(|f| {
            let direction = match f.order {
                SortOrder::Ascending => Bson::Int32(1),
                SortOrder::Descending => Bson::Int32(-1),
            };
            (f.path.clone(), direction)
        })
        .collect()
}

fn render_accumulator_fields(fields: &[AccumulatorField]) -> Document {
    fields
        .iter()
        .map(|f| (f.name.clone(), f.value.render()))
        .collect()
}

/// Whether a constant would be misread as a path, variable, or operator
/// if it were rendered without $literal.
fn needs_literal(value: &Bson) -> bool {
    match value {
        Bson::String(s) => s.starts_with('$'),
        Bson::Array(a) => a.iter().any(needs_literal),
        Bson::Document(d) => d
            .iter()
            .any(|(k, v)| k.starts_with('$') || needs_literal(v)),
        _ => false,
    }
}

impl Stage {
    pub fn render(&self) -> Document {
        match self {
            Stage::Match(f) => doc! {"$match": f.render()},
            Stage::Project(p) => doc! {"$project": p.render()},
            Stage::Group(g) => {
                let mut group_doc = doc! {"_id": g.id.render()};
                group_doc.extend(render_accumulator_fields(&g.fields));
                doc! {"$group": group_doc}
            }
            Stage::Sort(fields) => doc! {"$sort": render_sort_fields(fields)},
            Stage::Limit(n) => doc! {"$limit": render_int(*n)},
            Stage::Skip(n) => doc! {"$skip": render_int(*n)},
            Stage::Sample(n) => doc! {"$sample": {"size": render_int(*n)}},
            Stage::Lookup(l) => doc! {"$lookup": l.render()},
            Stage::Unwind(u) => {
                let path = format!("${}", u.path);
                if u.include_array_index.is_none() && !u.preserve_null_and_empty_arrays {
                    return doc! {"$unwind": path};
                }
                let mut unwind_doc = doc! {"path": path};
                if let Some(index) = &u.include_array_index {
                    unwind_doc.insert("includeArrayIndex", index.clone());
                }
                if u.preserve_null_and_empty_arrays {
                    unwind_doc.insert("preserveNullAndEmptyArrays", true);
                }
                doc! {"$unwind": unwind_doc}
            }
            Stage::Bucket(b) => {
                let mut bucket_doc = doc! {
                    "groupBy": b.group_by.render(),
                    "boundaries": b.boundaries.clone(),
                };
                if let Some(default) = &b.default {
                    bucket_doc.insert("default", default.clone());
                }
                if !b.output.is_empty() {
                    bucket_doc.insert("output", render_accumulator_fields(&b.output));
                }
                doc! {"$bucket": bucket_doc}
            }
            Stage::BucketAuto(b) => {
                let mut bucket_doc = doc! {
                    "groupBy": b.group_by.render(),
                    "buckets": b.buckets,
                };
                if let Some(granularity) = &b.granularity {
                    bucket_doc.insert("granularity", granularity.clone());
                }
                if !b.output.is_empty() {
                    bucket_doc.insert("output", render_accumulator_fields(&b.output));
                }
                doc! {"$bucketAuto": bucket_doc}
            }
            Stage::Densify(d) => {
                let mut densify_doc = doc! {"field": d.field.clone()};
                if !d.partition_by_fields.is_empty() {
                    densify_doc.insert("partitionByFields", d.partition_by_fields.clone());
                }
                let mut range_doc = doc! {"step": d.range.step.clone()};
                if let Some(unit) = &d.range.unit {
                    range_doc.insert("unit", unit.clone());
                }
                let bounds = match &d.range.bounds {
                    DensifyBounds::Full => bson!("full"),
                    DensifyBounds::Partition => bson!("partition"),
                    DensifyBounds::Range(lower, upper) => bson!([lower.clone(), upper.clone()]),
                };
                range_doc.insert("bounds", bounds);
                densify_doc.insert("range", range_doc);
                doc! {"$densify": densify_doc}
            }
            Stage::Documents(docs) => doc! {"$documents": docs.clone()},
            Stage::ReplaceRoot(e) => doc! {"$replaceRoot": {"newRoot": e.render()}},
            Stage::UnionWith(u) => match &u.pipeline {
                None => doc! {"$unionWith": u.collection.clone()},
                Some(pipeline) => doc! {"$unionWith": {
                    "coll": u.collection.clone(),
                    "pipeline": render_pipeline(pipeline),
                }},
            },
            Stage::Universal(d) => d.clone(),
        }
    }
}

impl Project {
    pub fn render(&self) -> Document {
        self.specifications
            .iter()
            .map(|(k, item)| {
                let value = match item {
                    ProjectItem::Exclusion => Bson::Int32(0),
                    ProjectItem::Inclusion => Bson::Int32(1),
                    // a bare constant in $project means inclusion or exclusion
                    ProjectItem::Assignment(Expression::Constant(c)) => {
                        bson!({"$literal": c.clone()})
                    }
                    ProjectItem::Assignment(e) => e.render(),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

impl Lookup {
    fn render(&self) -> Document {
        let mut lookup_doc = Document::new();
        if let Some(from) = &self.from {
            lookup_doc.insert("from", from.clone());
        }
        if let Some(local_field) = &self.local_field {
            lookup_doc.insert("localField", local_field.clone());
        }
        if let Some(foreign_field) = &self.foreign_field {
            lookup_doc.insert("foreignField", foreign_field.clone());
        }
        if !self.let_vars.is_empty() {
            lookup_doc.insert(
                "let",
                self.let_vars
                    .iter()
                    .map(|v| (v.name.clone(), v.value.render()))
                    .collect::<Document>(),
            );
        }
        if let Some(pipeline) = &self.pipeline {
            lookup_doc.insert("pipeline", render_pipeline(pipeline));
        }
        lookup_doc.insert("as", self.as_field.clone());
        lookup_doc
    }
}

impl Filter {
    pub fn render(&self) -> Document {
        match self {
            Filter::Field(f) => doc! {f.path.clone(): f.operation.render()},
            Filter::And(filters) => {
                let rendered: Vec<Document> = filters.iter().map(Filter::render).collect();
                match merge_conjunction(&rendered) {
                    Some(merged) => merged,
                    None => doc! {"$and": rendered},
                }
            }
            Filter::Or(filters) => {
                doc! {"$or": filters.iter().map(Filter::render).collect::<Vec<_>>()}
            }
            Filter::Nor(filters) => {
                doc! {"$nor": filters.iter().map(Filter::render).collect::<Vec<_>>()}
            }
            Filter::Expr(e) => doc! {"$expr": e.render()},
            Filter::MatchesEverything => Document::new(),
        }
    }

    /// Renders the body of an $elemMatch. Filters on the element itself are
    /// written as bare operator documents.
    fn render_elem_match_body(&self) -> Document {
        match self {
            Filter::Field(f) if f.path == ELEMENT_SENTINEL => f.operation.render_operator_document(),
            Filter::And(filters)
                if filters
                    .iter()
                    .all(|f| matches!(f, Filter::Field(f) if f.path == ELEMENT_SENTINEL)) =>
            {
                let mut body = Document::new();
                for f in filters {
                    body.extend(f.render_elem_match_body());
                }
                body
            }
            _ => self.render(),
        }
    }
}

/// Merges the documents of a conjunction into one when none of their keys
/// collide and none is an operator.
fn merge_conjunction(rendered: &[Document]) -> Option<Document> {
    let mut merged = Document::new();
    for d in rendered {
        for (k, v) in d {
            if k.starts_with('$') || merged.contains_key(k) {
                return None;
            }
            merged.insert(k.clone(), v.clone());
        }
    }
    Some(merged)
}

impl FilterOperation {
    pub fn render(&self) -> Bson {
        match self {
            FilterOperation::ImpliedEquality(v) => v.clone(),
            _ => Bson::Document(self.render_operator_document()),
        }
    }

    fn render_operator_document(&self) -> Document {
        match self {
            FilterOperation::Comparison(c) => doc! {c.op.name(): c.value.clone()},
            FilterOperation::ImpliedEquality(v @ Bson::RegularExpression(_)) => {
                doc! {"$regex": v.clone()}
            }
            FilterOperation::ImpliedEquality(v) => doc! {"$eq": v.clone()},
            FilterOperation::Regex(r) => {
                if r.options.is_empty() {
                    doc! {"$regex": r.pattern.clone()}
                } else {
                    doc! {"$regex": r.pattern.clone(), "$options": r.options.clone()}
                }
            }
            FilterOperation::ElemMatch(f) => doc! {"$elemMatch": f.render_elem_match_body()},
            FilterOperation::Not(op) => doc! {"$not": op.render()},
            FilterOperation::Exists(b) => doc! {"$exists": *b},
            FilterOperation::In(values) => doc! {"$in": values.clone()},
            FilterOperation::Nin(values) => doc! {"$nin": values.clone()},
            FilterOperation::Size(n) => doc! {"$size": *n},
        }
    }
}

impl ComparisonOperator {
    pub fn name(self) -> &'static str {
        use ComparisonOperator::*;
        match self {
            Eq => "$eq",
            Gt => "$gt",
            Gte => "$gte",
            Lt => "$lt",
            Lte => "$lte",
            Ne => "$ne",
        }
    }
}

impl UnaryOperator {
    pub fn name(self) -> &'static str {
        use UnaryOperator::*;
        match self {
            // Arithmetic operators
            Abs => "$abs",
            Ceil => "$ceil",
            Exp => "$exp",
            Floor => "$floor",
            Sqrt => "$sqrt",

            // Array operators
            AllElementsTrue => "$allElementsTrue",
            AnyElementTrue => "$anyElementTrue",
            ArrayToObject => "$arrayToObject",
            First => "$first",
            IsArray => "$isArray",
            Last => "$last",
            ObjectToArray => "$objectToArray",
            ReverseArray => "$reverseArray",
            Size => "$size",
            Avg => "$avg",
            Max => "$max",
            Min => "$min",
            StdDevPop => "$stdDevPop",
            StdDevSamp => "$stdDevSamp",
            Sum => "$sum",

            Not => "$not",

            // String operators
            StrLenCP => "$strLenCP",
            ToLower => "$toLower",
            ToUpper => "$toUpper",
            Trim => "$trim",

            // Date operators
            DayOfMonth => "$dayOfMonth",
            Hour => "$hour",
            Minute => "$minute",
            Month => "$month",
            Second => "$second",
            Year => "$year",

            // Type operators
            ToBool => "$toBool",
            ToDate => "$toDate",
            ToDecimal => "$toDecimal",
            ToDouble => "$toDouble",
            ToInt => "$toInt",
            ToLong => "$toLong",
            ToObjectId => "$toObjectId",
            ToString => "$toString",
            Type => "$type",
        }
    }
}

impl BinaryOperator {
    pub fn name(self) -> &'static str {
        use BinaryOperator::*;
        match self {
            ArrayElemAt => "$arrayElemAt",
            Cmp => "$cmp",
            Divide => "$divide",
            Eq => "$eq",
            Gt => "$gt",
            Gte => "$gte",
            IfNull => "$ifNull",
            In => "$in",
            IndexOfCP => "$indexOfCP",
            Lt => "$lt",
            Lte => "$lte",
            Mod => "$mod",
            Ne => "$ne",
            Pow => "$pow",
            RegexMatch => "$regexMatch",
            Split => "$split",
            Subtract => "$subtract",
        }
    }
}

impl NaryOperator {
    pub fn name(self) -> &'static str {
        use NaryOperator::*;
        match self {
            Add => "$add",
            And => "$and",
            Concat => "$concat",
            ConcatArrays => "$concatArrays",
            Multiply => "$multiply",
            Or => "$or",
            SubstrCP => "$substrCP",
        }
    }
}

impl AccumulatorOperator {
    pub fn name(self) -> &'static str {
        use AccumulatorOperator::*;
        match self {
            AddToSet => "$addToSet",
            Avg => "$avg",
            First => "$first",
            Last => "$last",
            Max => "$max",
            MergeObjects => "$mergeObjects",
            Min => "$min",
            Push => "$push",
            StdDevPop => "$stdDevPop",
            StdDevSamp => "$stdDevSamp",
            Sum => "$sum",
        }
    }
}

impl PickOperator {
    pub fn name(self) -> &'static str {
        use PickOperator::*;
        match self {
            Bottom => "$bottom",
            BottomN => "$bottomN",
            FirstN => "$firstN",
            LastN => "$lastN",
            MaxN => "$maxN",
            MinN => "$minN",
            Top => "$top",
            TopN => "$topN",
        }
    }

    /// The operators that order their input with a sortBy specification.
    pub fn is_sorted(self) -> bool {
        use PickOperator::*;
        matches!(self, Bottom | BottomN | Top | TopN)
    }
}

impl AccumulatorExpression {
    pub fn render(&self) -> Bson {
        match self {
            AccumulatorExpression::Unary(u) => bson!({u.op.name(): u.arg.render()}),
            AccumulatorExpression::Pick(p) => {
                let mut body = Document::new();
                if let Some(sort_by) = &p.sort_by {
                    body.insert("sortBy", render_sort_fields(sort_by));
                }
                let selector_key = if p.op.is_sorted() { "output" } else { "input" };
                body.insert(selector_key, p.selector.render());
                if let Some(n) = &p.n {
                    body.insert("n", n.render());
                }
                bson!({p.op.name(): body})
            }
            AccumulatorExpression::Quantile(q) => q.render(),
        }
    }
}

impl Expression {
    pub fn render(&self) -> Bson {
        match self {
            Expression::Constant(c) => {
                if needs_literal(c) {
                    bson!({"$literal": c.clone()})
                } else {
                    c.clone()
                }
            }
            Expression::FieldPath(p) => Bson::String(p.clone()),
            Expression::Variable(v) => Bson::String(format!("$${}", v.name)),
            Expression::GetField(g) => bson!({"$getField": {
                "field": g.field.render(),
                "input": g.input.render(),
            }}),
            Expression::Unary(u) => {
                let arg = u.arg.render();
                match u.op {
                    UnaryOperator::Trim => bson!({"$trim": {"input": arg}}),
                    // an array argument would be read as the argument list
                    _ if matches!(arg, Bson::Array(_)) => bson!({u.op.name(): [arg]}),
                    _ => bson!({u.op.name(): arg}),
                }
            }
            Expression::Binary(b) => match b.op {
                BinaryOperator::RegexMatch => bson!({"$regexMatch": {
                    "input": b.left.render(),
                    "regex": b.right.render(),
                }}),
                _ => bson!({b.op.name(): [b.left.render(), b.right.render()]}),
            },
            Expression::Nary(n) => bson!({
                n.op.name(): n.args.iter().map(Expression::render).collect::<Vec<_>>()
            }),
            Expression::Cond(c) => bson!({"$cond": {
                "if": c.condition.render(),
                "then": c.then_branch.render(),
                "else": c.else_branch.render(),
            }}),
            Expression::Map(m) => bson!({"$map": {
                "input": m.input.render(),
                "as": m.as_var.clone(),
                "in": m.inside.render(),
            }}),
            Expression::Filter(f) => {
                let mut body = doc! {
                    "input": f.input.render(),
                    "as": f.as_var.clone(),
                    "cond": f.cond.render(),
                };
                if let Some(limit) = &f.limit {
                    body.insert("limit", limit.render());
                }
                bson!({"$filter": body})
            }
            Expression::Let(l) => bson!({"$let": {
                "vars": l.vars
                    .iter()
                    .map(|v| (v.name.clone(), v.value.render()))
                    .collect::<Document>(),
                "in": l.inside.render(),
            }}),
            Expression::ComputedDocument(d) => Bson::Document(
                d.iter()
                    .map(|(k, e)| (k.clone(), e.render()))
                    .collect::<Document>(),
            ),
            Expression::ComputedArray(a) => {
                Bson::Array(a.iter().map(Expression::render).collect())
            }
            Expression::Slice(s) => match &s.position {
                None => bson!({"$slice": [s.array.render(), s.n.render()]}),
                Some(p) => bson!({"$slice": [s.array.render(), p.render(), s.n.render()]}),
            },
            Expression::Pick(p) => p.render(),
            Expression::Quantile(q) => q.render(),
        }
    }
}

impl QuantileOperator {
    pub fn name(self) -> &'static str {
        match self {
            QuantileOperator::Median => "$median",
            QuantileOperator::Percentile => "$percentile",
        }
    }
}

impl Quantile {
    /// The same form serves as expression and as accumulator. The server
    /// only implements the approximate method.
    fn render(&self) -> Bson {
        let mut body = doc! {"input": self.input.render()};
        if let Some(p) = &self.p {
            body.insert("p", p.render());
        }
        body.insert("method", "approximate");
        bson!({self.op.name(): body})
    }
}

impl Pick {
    /// Array picks are written in terms of the array operators available
    /// to expressions: the source is sorted with $sortArray when the operator
    /// is ordered, the selector is applied with $map, and the result is taken
    /// from the front or back of the mapped array.
    fn render(&self) -> Bson {
        let source = match (&self.sort_by, self.op.is_sorted()) {
            (Some(sort_by), true) => bson!({"$sortArray": {
                "input": self.source.render(),
                "sortBy": render_sort_fields(sort_by),
            }}),
            _ => self.source.render(),
        };
        let mapped = bson!({"$map": {
            "input": source,
            "as": self.as_var.clone(),
            "in": self.selector.render(),
        }});
        let n = self
            .n
            .as_ref()
            .map(|n| n.render())
            .unwrap_or(Bson::Int32(1));
        match self.op {
            PickOperator::Top => bson!({"$first": mapped}),
            PickOperator::Bottom => bson!({"$last": mapped}),
            PickOperator::TopN | PickOperator::FirstN => {
                bson!({"$firstN": {"input": mapped, "n": n}})
            }
            PickOperator::BottomN | PickOperator::LastN => {
                bson!({"$lastN": {"input": mapped, "n": n}})
            }
            PickOperator::MaxN | PickOperator::MinN => {
                bson!({self.op.name(): {"input": mapped, "n": n}})
            }
        }
    }
}
