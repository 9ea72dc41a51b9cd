//! Aggregation clause kinds and tree nodes

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::{Map, Value};

use crate::errors::{ClauseError, ClauseResult};
use crate::mappings::{FieldType, TypeRule, CONTAINERS, DATES, GEO, NOT_TERMS, NUMERIC, NUMERIC_OR_DATE, STRINGS};
use crate::nesting::{ScopeBoundary, ScopedNode};
use crate::tree::TreeNode;

/// Aggregation family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFamily {
    /// Produces buckets; `multiple` is false for single-bucket aggregations
    Bucket { multiple: bool },
    Metric,
    Pipeline,
}

/// How a bucket key translates back into a query condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRule {
    /// `term` on the aggregation field
    Term,
    /// One `term` per `terms` source
    MultiTerms,
    /// The aggregation body is the condition
    Filter,
    /// Named or anonymous filters, plus the other bucket
    Filters,
    /// Documents lacking the field
    Missing,
    /// `[key, key + interval)` range
    Histogram,
    /// Date math upper bound from the interval
    DateHistogram,
    /// Bucket `from`/`to` bounds
    Range,
    /// One condition per composite source
    Composite,
    /// `&`-joined filter names
    AdjacencyMatrix,
    /// Adds no condition (scope markers, samplers, join traversal)
    Transparent,
    /// Adds no condition and stops the ancestor walk
    Global,
    /// No filter can be derived
    Unsupported,
    /// Not a bucket aggregation
    NotApplicable,
}

/// Registered aggregation kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggKind {
    pub tag: &'static str,
    pub family: AggFamily,
    pub rule: TypeRule,
    /// Response attributes holding the aggregation value
    pub value_attrs: &'static [&'static str],
    pub filter: FilterRule,
}

impl AggKind {
    pub fn is_bucket(&self) -> bool {
        matches!(self.family, AggFamily::Bucket { .. })
    }

    pub fn is_multi_bucket(&self) -> bool {
        self.family == AggFamily::Bucket { multiple: true }
    }

    pub fn is_single_bucket(&self) -> bool {
        self.family == AggFamily::Bucket { multiple: false }
    }
}

/// Map from type tag to aggregation kind
#[derive(Debug, Default)]
pub struct AggRegistry {
    kinds: HashMap<&'static str, AggKind>,
}

static REGISTRY: OnceLock<AggRegistry> = OnceLock::new();

const DOC_COUNT: &[&str] = &["doc_count"];
const VALUE: &[&str] = &["value"];
const VALUES: &[&str] = &["values"];
const NONE: &[&str] = &[];
const STATS: &[&str] = &["count", "min", "max", "avg", "sum"];
const EXTENDED_STATS: &[&str] = &[
    "count",
    "min",
    "max",
    "avg",
    "sum",
    "sum_of_squares",
    "variance",
    "std_deviation",
    "std_deviation_bounds",
];

/// `nested` aggregation kind
pub static NESTED: AggKind = AggKind {
    tag: "nested",
    family: AggFamily::Bucket { multiple: false },
    rule: TypeRule::AllowOnly(&[FieldType::Nested]),
    value_attrs: DOC_COUNT,
    filter: FilterRule::Transparent,
};

/// `reverse_nested` aggregation kind
pub static REVERSE_NESTED: AggKind = AggKind {
    tag: "reverse_nested",
    family: AggFamily::Bucket { multiple: false },
    rule: TypeRule::AllowOnly(&[FieldType::Nested]),
    value_attrs: DOC_COUNT,
    filter: FilterRule::Transparent,
};

impl AggRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a kind, replacing any kind with the same tag
    pub fn register(&mut self, kind: AggKind) {
        self.kinds.insert(kind.tag, kind);
    }

    /// Looks up a kind by type tag
    pub fn get(&self, tag: &str) -> ClauseResult<&AggKind> {
        self.kinds
            .get(tag)
            .ok_or_else(|| ClauseError::UnknownClauseType(tag.to_string()))
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Registry holding every built-in aggregation kind, built on first use
    pub fn global() -> &'static AggRegistry {
        REGISTRY.get_or_init(|| {
            let mut registry = AggRegistry::new();
            register_builtin(&mut registry);
            registry
        })
    }
}

fn multi(tag: &'static str, rule: TypeRule, filter: FilterRule) -> AggKind {
    AggKind {
        tag,
        family: AggFamily::Bucket { multiple: true },
        rule,
        value_attrs: DOC_COUNT,
        filter,
    }
}

fn single(tag: &'static str, rule: TypeRule, filter: FilterRule) -> AggKind {
    AggKind {
        tag,
        family: AggFamily::Bucket { multiple: false },
        rule,
        value_attrs: DOC_COUNT,
        filter,
    }
}

fn metric(tag: &'static str, rule: TypeRule, value_attrs: &'static [&'static str]) -> AggKind {
    AggKind {
        tag,
        family: AggFamily::Metric,
        rule,
        value_attrs,
        filter: FilterRule::NotApplicable,
    }
}

fn pipeline(tag: &'static str, value_attrs: &'static [&'static str]) -> AggKind {
    AggKind {
        tag,
        family: AggFamily::Pipeline,
        rule: TypeRule::Any,
        value_attrs,
        filter: FilterRule::NotApplicable,
    }
}

/// Registers the built-in aggregation kinds
pub fn register_builtin(registry: &mut AggRegistry) {
    use FilterRule::*;
    let any = TypeRule::Any;

    // multi-bucket
    for tag in ["terms", "significant_terms", "rare_terms"] {
        registry.register(multi(tag, TypeRule::Deny(NOT_TERMS), Term));
    }
    registry.register(multi("multi_terms", any, MultiTerms));
    registry.register(multi("histogram", TypeRule::AllowOnly(NUMERIC), Histogram));
    registry.register(multi("date_histogram", TypeRule::AllowOnly(DATES), DateHistogram));
    registry.register(multi("range", TypeRule::AllowOnly(NUMERIC_OR_DATE), Range));
    registry.register(multi("date_range", TypeRule::AllowOnly(DATES), Range));
    registry.register(multi("ip_range", TypeRule::AllowOnly(&[FieldType::Ip]), Range));
    registry.register(multi("filters", any, Filters));
    registry.register(multi("composite", any, Composite));
    registry.register(multi("adjacency_matrix", any, AdjacencyMatrix));
    registry.register(multi("geohash_grid", TypeRule::AllowOnly(GEO), Unsupported));
    registry.register(multi("geotile_grid", TypeRule::AllowOnly(GEO), Unsupported));
    registry.register(multi("auto_date_histogram", TypeRule::AllowOnly(DATES), Unsupported));
    registry.register(multi(
        "variable_width_histogram",
        TypeRule::AllowOnly(NUMERIC),
        Unsupported,
    ));

    // single-bucket
    registry.register(single("filter", any, Filter));
    registry.register(single("missing", any, Missing));
    registry.register(NESTED.clone());
    registry.register(REVERSE_NESTED.clone());
    registry.register(single("global", any, Global));
    registry.register(single("sampler", any, Transparent));
    registry.register(single("diversified_sampler", any, Transparent));
    registry.register(single("children", any, Transparent));
    registry.register(single("parent", any, Transparent));

    // metrics
    let numeric = TypeRule::AllowOnly(NUMERIC_OR_DATE);
    for tag in ["avg", "sum", "min", "max", "median_absolute_deviation"] {
        registry.register(metric(tag, numeric, VALUE));
    }
    for tag in ["value_count", "cardinality"] {
        registry.register(metric(tag, TypeRule::Deny(CONTAINERS), VALUE));
    }
    for tag in ["weighted_avg", "scripted_metric", "rate"] {
        registry.register(metric(tag, any, VALUE));
    }
    registry.register(metric("stats", numeric, STATS));
    registry.register(metric("extended_stats", numeric, EXTENDED_STATS));
    registry.register(metric("percentiles", numeric, VALUES));
    registry.register(metric("percentile_ranks", numeric, VALUES));
    registry.register(metric("boxplot", numeric, &["min", "max", "q1", "q2", "q3"]));
    registry.register(metric("top_hits", any, &["hits"]));
    registry.register(metric("top_metrics", any, &["top"]));
    registry.register(metric("geo_bounds", TypeRule::AllowOnly(GEO), &["bounds"]));
    registry.register(metric("geo_centroid", TypeRule::AllowOnly(GEO), &["location"]));
    registry.register(metric(
        "string_stats",
        TypeRule::AllowOnly(STRINGS),
        &["count", "min_length", "max_length", "avg_length", "entropy"],
    ));

    // pipelines
    for tag in [
        "avg_bucket",
        "max_bucket",
        "min_bucket",
        "sum_bucket",
        "bucket_script",
        "cumulative_sum",
        "cumulative_cardinality",
        "derivative",
        "moving_fn",
        "serial_diff",
        "normalize",
    ] {
        registry.register(pipeline(tag, VALUE));
    }
    registry.register(pipeline("stats_bucket", STATS));
    registry.register(pipeline("extended_stats_bucket", EXTENDED_STATS));
    registry.register(pipeline("percentiles_bucket", VALUES));
    // these reshape their parent's buckets and return nothing of their own
    registry.register(pipeline("bucket_selector", NONE));
    registry.register(pipeline("bucket_sort", NONE));
}

/// Aggregation clause
#[derive(Debug, Clone, PartialEq)]
pub struct AggClause {
    pub kind: &'static AggKind,
    /// Everything under the type tag
    pub body: Map<String, Value>,
    pub meta: Option<Map<String, Value>>,
}

impl AggClause {
    pub fn new(kind: &'static AggKind, body: Map<String, Value>) -> ClauseResult<Self> {
        if kind.tag == "nested" && !matches!(body.get("path"), Some(Value::String(_))) {
            return Err(ClauseError::malformed("'nested' aggregation requires a string 'path'"));
        }
        Ok(Self {
            kind,
            body,
            meta: None,
        })
    }

    /// `nested` clause opening `path`
    pub fn nested(path: &str) -> Self {
        let mut body = Map::new();
        body.insert("path".into(), Value::String(path.to_string()));
        Self {
            kind: &NESTED,
            body,
            meta: None,
        }
    }

    /// `reverse_nested` clause leaving to `path`, or to the document root
    pub fn reverse_nested(path: Option<&str>) -> Self {
        let mut body = Map::new();
        if let Some(path) = path {
            body.insert("path".into(), Value::String(path.to_string()));
        }
        Self {
            kind: &REVERSE_NESTED,
            body,
            meta: None,
        }
    }

    /// Field the clause aggregates on; pipelines reference buckets instead
    pub fn field(&self) -> Option<&str> {
        if self.kind.family == AggFamily::Pipeline {
            return None;
        }
        self.body.get("field").and_then(Value::as_str)
    }

    /// Path attribute of `nested`/`reverse_nested`
    pub fn path(&self) -> Option<&str> {
        self.body.get("path").and_then(Value::as_str)
    }

    /// Declared `keyed` response shape
    ///
    /// An explicit `keyed` wins; named `filters` default to keyed.
    pub fn is_keyed(&self) -> bool {
        if let Some(keyed) = self.body.get("keyed").and_then(Value::as_bool) {
            return keyed;
        }
        match self.kind.filter {
            FilterRule::Filters => self
                .body
                .get("filters")
                .map(Value::is_object)
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Node of an aggregation tree
#[derive(Debug, Clone, PartialEq)]
pub enum AggNode {
    /// Request level; holds the top-level aggregations
    Root,
    Clause(AggClause),
}

impl AggNode {
    pub fn clause(&self) -> Option<&AggClause> {
        match self {
            AggNode::Clause(clause) => Some(clause),
            AggNode::Root => None,
        }
    }

    pub fn is_bucket(&self) -> bool {
        self.clause().map(|c| c.kind.is_bucket()).unwrap_or(false)
    }
}

impl TreeNode for AggNode {
    fn check_child(&self, child: &Self, _siblings: usize) -> ClauseResult<()> {
        match (self, child) {
            (_, AggNode::Root) => Err(ClauseError::InvalidParent {
                parent: self.label(),
                child: "aggregation root".to_string(),
            }),
            (AggNode::Root, _) => Ok(()),
            (AggNode::Clause(parent), _) if parent.kind.is_bucket() => Ok(()),
            (AggNode::Clause(parent), _) => Err(ClauseError::InvalidParent {
                parent: format!("non-bucket aggregation '{}'", parent.kind.tag),
                child: format!("'{}'", child.label()),
            }),
        }
    }

    fn label(&self) -> String {
        match self {
            AggNode::Root => "_".to_string(),
            AggNode::Clause(clause) => match (clause.field(), clause.path()) {
                (Some(field), _) => format!("{}, field={}", clause.kind.tag, field),
                (None, Some(path)) => format!("{}, path={}", clause.kind.tag, path),
                (None, None) => clause.kind.tag.to_string(),
            },
        }
    }
}

impl ScopedNode for AggNode {
    fn scope_boundary(&self) -> Option<ScopeBoundary> {
        let clause = self.clause()?;
        match clause.kind.tag {
            "nested" => clause.path().map(|p| ScopeBoundary::Enter(p.to_string())),
            "reverse_nested" => Some(ScopeBoundary::Exit(clause.path().map(str::to_string))),
            _ => None,
        }
    }
}
