//! Buckets and their extraction from raw aggregation responses

use serde_json::{Map, Value};

use crate::aggs::{AggClause, AggKind, FilterRule};
use crate::errors::{ClauseError, ClauseResult};
use crate::tree::TreeNode;

/// Default key of the `filters` other bucket
pub const OTHER_BUCKET_KEY: &str = "_other_";

/// One result partition, or the value of a metric below a bucket
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Name of the producing aggregation
    pub level: String,
    pub kind: &'static AggKind,
    /// `None` for single-bucket aggregations and metrics
    pub key: Option<Value>,
    /// Extracted value (`doc_count` for buckets)
    pub value: Value,
    /// Remaining scalar attributes (`key_as_string`, `from`, `to`, ...)
    pub attrs: Map<String, Value>,
}

impl Bucket {
    pub fn is_bucket(&self) -> bool {
        self.kind.is_bucket()
    }
}

/// Node of a response tree
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseNode {
    Root,
    Bucket(Bucket),
}

impl ResponseNode {
    pub fn bucket(&self) -> Option<&Bucket> {
        match self {
            ResponseNode::Bucket(bucket) => Some(bucket),
            ResponseNode::Root => None,
        }
    }
}

impl TreeNode for ResponseNode {
    fn check_child(&self, child: &Self, _siblings: usize) -> ClauseResult<()> {
        match (self, child) {
            (_, ResponseNode::Root) => Err(ClauseError::InvalidParent {
                parent: self.label(),
                child: "response root".to_string(),
            }),
            (ResponseNode::Bucket(parent), _) if !parent.is_bucket() => {
                Err(ClauseError::InvalidParent {
                    parent: format!("metric '{}'", parent.level),
                    child: child.label(),
                })
            }
            _ => Ok(()),
        }
    }

    fn label(&self) -> String {
        match self {
            ResponseNode::Root => "root".to_string(),
            ResponseNode::Bucket(bucket) => match &bucket.key {
                Some(key) => format!("{}={} [{}]", bucket.level, key, bucket.value),
                None => format!("{} [{}]", bucket.level, bucket.value),
            },
        }
    }
}

/// Extracts the value of an aggregation from its response object
///
/// One value attribute gives a scalar, several give an object of the present ones.
pub fn extract_value(kind: &AggKind, raw: &Value) -> Value {
    match kind.value_attrs {
        [] => Value::Null,
        [only] => raw.get(*only).cloned().unwrap_or(Value::Null),
        many => Value::Object(
            many.iter()
                .filter_map(|attr| raw.get(*attr).map(|v| (attr.to_string(), v.clone())))
                .collect(),
        ),
    }
}

/// Key of the other bucket when the `filters` declaration asks for one
pub fn other_bucket_key(clause: &AggClause) -> Option<String> {
    let explicit = clause.body.get("other_bucket_key").and_then(Value::as_str);
    let enabled = clause
        .body
        .get("other_bucket")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    match explicit {
        Some(key) => Some(key.to_string()),
        None if enabled => Some(OTHER_BUCKET_KEY.to_string()),
        None => None,
    }
}

/// Lists `(key, raw bucket)` pairs of a multi-bucket response
///
/// The response shape must match the declared `keyed` flag. Anonymous filters
/// are keyed by position, named ones by name; a keyed other bucket comes last.
pub fn extract_buckets<'a>(
    name: &str,
    clause: &AggClause,
    raw: &'a Value,
) -> ClauseResult<Vec<(Value, &'a Value)>> {
    let buckets = raw.get("buckets").ok_or_else(|| {
        ClauseError::malformed(format!("response of '{}' holds no 'buckets'", name))
    })?;
    let keyed = clause.is_keyed();
    match buckets {
        Value::Array(items) if !keyed => Ok(items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let key = match clause.kind.filter {
                    // named filters listed unkeyed carry their name
                    FilterRule::Filters => item.get("key").cloned().unwrap_or_else(|| Value::from(i)),
                    _ => item.get("key").cloned().unwrap_or(Value::Null),
                };
                (key, item)
            })
            .collect()),
        Value::Object(map) if keyed => {
            let other = match clause.kind.filter {
                FilterRule::Filters => other_bucket_key(clause),
                _ => None,
            };
            let (mut named, last): (Vec<_>, Vec<_>) = map
                .iter()
                .map(|(key, item)| (Value::String(key.clone()), item))
                .partition(|(key, _)| other.as_deref() != key.as_str());
            named.extend(last);
            Ok(named)
        }
        other => Err(ClauseError::malformed(format!(
            "'{}' is declared {}, response buckets are {}",
            name,
            if keyed { "keyed" } else { "not keyed" },
            if other.is_array() { "a list" } else { "not a list" }
        ))),
    }
}
