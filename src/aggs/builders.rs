//! Aggregation inputs and builder functions

use serde_json::{json, Map, Value};

use super::aggs::Aggs;
use super::clauses::AggNode;
use super::codec::parse_aggs;
use crate::errors::{ClauseError, ClauseResult};
use crate::tree::Tree;

/// Anything that can be inserted into an aggregation tree
#[derive(Debug, Clone)]
pub enum AggInput {
    /// `{"<name>": {"<type>": {...}}, ...}`
    Json(Value),
    /// Single clause given by parts
    Named {
        name: String,
        tag: String,
        body: Value,
    },
    /// Tree rooted at [`AggNode::Root`], typically taken from another request
    Tree(Tree<AggNode>),
}

impl AggInput {
    pub fn named(name: impl Into<String>, tag: impl Into<String>, body: Value) -> Self {
        AggInput::Named {
            name: name.into(),
            tag: tag.into(),
            body,
        }
    }

    /// Turns the input into a tree rooted at [`AggNode::Root`]
    pub fn normalize(self) -> ClauseResult<Tree<AggNode>> {
        match self {
            AggInput::Json(value) => parse_aggs(&value),
            AggInput::Named { name, tag, body } => parse_aggs(&agg(&name, &tag, body)),
            AggInput::Tree(tree) => {
                let request_level = match tree.root() {
                    None => true,
                    Some(root) => matches!(tree.get(root), Ok(AggNode::Root)),
                };
                if request_level {
                    Ok(tree)
                } else {
                    Err(ClauseError::malformed(
                        "aggregation tree input must be rooted at the request level",
                    ))
                }
            }
        }
    }
}

impl From<Value> for AggInput {
    fn from(value: Value) -> Self {
        AggInput::Json(value)
    }
}

impl From<Tree<AggNode>> for AggInput {
    fn from(tree: Tree<AggNode>) -> Self {
        AggInput::Tree(tree)
    }
}

impl From<&Aggs> for AggInput {
    fn from(aggs: &Aggs) -> Self {
        AggInput::Tree(aggs.tree().clone())
    }
}

/// `{"<name>": {"<tag>": body}}`
pub fn agg(name: &str, tag: &str, body: Value) -> Value {
    let mut typed = Map::new();
    typed.insert(tag.to_string(), body);
    let mut outer = Map::new();
    outer.insert(name.to_string(), Value::Object(typed));
    Value::Object(outer)
}

/// Adds sub-aggregations to a single named declaration
pub fn with_children(mut declaration: Value, children: Value) -> Value {
    if let Some(inner) = declaration
        .as_object_mut()
        .and_then(|outer| outer.values_mut().next())
        .and_then(Value::as_object_mut)
    {
        inner.insert("aggs".to_string(), children);
    }
    declaration
}

pub fn terms(name: &str, field: &str) -> Value {
    agg(name, "terms", json!({"field": field}))
}

pub fn histogram(name: &str, field: &str, interval: f64) -> Value {
    agg(name, "histogram", json!({"field": field, "interval": interval}))
}

pub fn date_histogram(name: &str, field: &str, calendar_interval: &str) -> Value {
    agg(
        name,
        "date_histogram",
        json!({"field": field, "calendar_interval": calendar_interval}),
    )
}

pub fn filter(name: &str, query: Value) -> Value {
    agg(name, "filter", query)
}

/// Single-value metric such as `avg`, `sum`, `cardinality`
pub fn metric(name: &str, tag: &str, field: &str) -> Value {
    agg(name, tag, json!({"field": field}))
}
