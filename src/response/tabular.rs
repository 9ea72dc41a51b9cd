//! Tabular view of a response
//!
//! One row per bucket of the grouping aggregation. The row index holds the
//! keys of the bucket and its bucket ancestors; the columns hold the
//! bucket's value and the values of the aggregations directly below it.

use serde::Serialize;
use serde_json::{Map, Value};

use super::bucket::ResponseNode;
use super::tree::ResponseTree;
use crate::aggs::{AggNode, Aggs};
use crate::config::TabularConfig;
use crate::errors::{ClauseError, ClauseResult};
use crate::nesting::ScopedNode;
use crate::tree::NodeId;

/// Tabular output options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularOptions {
    /// Grouping aggregation; defaults to the grouping pointer, then to the
    /// deepest aggregation of the non-branching bucket chain
    pub grouped_by: Option<String>,
    /// Keep single-bucket aggregations in the row index
    pub include_single_bucket: bool,
    /// Column holding the grouping bucket's own value
    pub value_column: String,
}

impl Default for TabularOptions {
    fn default() -> Self {
        Self::from(&TabularConfig::default())
    }
}

impl From<&TabularConfig> for TabularOptions {
    fn from(config: &TabularConfig) -> Self {
        Self {
            grouped_by: None,
            include_single_bucket: config.include_single_bucket,
            value_column: config.value_column.clone(),
        }
    }
}

impl TabularOptions {
    pub fn grouped_by(mut self, name: impl Into<String>) -> Self {
        self.grouped_by = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub index: Vec<Value>,
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tabular {
    pub index_names: Vec<String>,
    pub rows: Vec<Row>,
}

impl Tabular {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn is_scope_marker(aggs: &Aggs, id: NodeId) -> bool {
    aggs.tree()
        .get(id)
        .map(|node| node.scope_boundary().is_some())
        .unwrap_or(false)
}

/// Aggregations whose values become columns: direct children of the grouping
/// aggregation, looking through scope wrappers
fn column_aggs(aggs: &Aggs, grouping: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    for &child in aggs.tree().children(grouping) {
        if is_scope_marker(aggs, child) {
            out.extend(column_aggs(aggs, child));
        } else {
            out.push(child);
        }
    }
    out
}

/// Descendants of a response node produced by `level`, crossing scope wrappers
fn values_below(response: &ResponseTree, from: NodeId, level: &str, aggs: &Aggs) -> Vec<NodeId> {
    let tree = response.tree();
    let mut out = Vec::new();
    for &child in tree.children(from) {
        let Some(bucket) = tree.get(child).ok().and_then(ResponseNode::bucket) else {
            continue;
        };
        if bucket.level == level {
            out.push(child);
        } else if aggs
            .id_from_name(&bucket.level)
            .map(|id| is_scope_marker(aggs, id))
            .unwrap_or(false)
        {
            out.extend(values_below(response, child, level, aggs));
        }
    }
    out
}

fn grouping_agg(aggs: &Aggs, options: &TabularOptions) -> ClauseResult<NodeId> {
    let id = match &options.grouped_by {
        Some(name) => aggs.id_from_name(name)?,
        None => match aggs.grouping() {
            Some(pointer) => pointer,
            None => aggs
                .linear_chain_end()
                .ok_or_else(|| ClauseError::NodeNotFound("aggregation root".to_string()))?,
        },
    };
    match aggs.tree().get(id)? {
        AggNode::Root => Ok(id),
        AggNode::Clause(clause) if clause.kind.is_bucket() => Ok(id),
        AggNode::Clause(clause) => Err(ClauseError::InvalidParent {
            parent: format!("non-bucket aggregation '{}'", clause.kind.tag),
            child: "tabular rows".to_string(),
        }),
    }
}

/// Builds rows for the grouping aggregation
pub fn to_tabular(aggs: &Aggs, response: &ResponseTree, options: &TabularOptions) -> ClauseResult<Tabular> {
    let grouping = grouping_agg(aggs, options)?;
    let agg_tree = aggs.tree();

    let index_names: Vec<String> = agg_tree
        .ancestors(grouping, true)
        .into_iter()
        .rev()
        .filter_map(|id| match agg_tree.get(id) {
            Ok(AggNode::Clause(clause)) if clause.kind.is_multi_bucket() => Some(id),
            Ok(AggNode::Clause(clause))
                if clause.kind.is_single_bucket() && options.include_single_bucket =>
            {
                Some(id)
            }
            _ => None,
        })
        .filter_map(|id| agg_tree.key(id).map(str::to_string))
        .collect();

    let rows_at: Vec<NodeId> = match agg_tree.key(grouping) {
        Some(name) => response.buckets_at(name),
        None => vec![response.root()?],
    };
    let columns: Vec<(String, bool)> = column_aggs(aggs, grouping)
        .into_iter()
        .filter_map(|id| {
            let clause = agg_tree.get(id).ok()?.clause()?;
            Some((agg_tree.key(id)?.to_string(), clause.kind.is_multi_bucket()))
        })
        .collect();

    let tree = response.tree();
    let mut rows = Vec::with_capacity(rows_at.len());
    for bucket_id in rows_at {
        let index = tree
            .ancestors(bucket_id, true)
            .into_iter()
            .rev()
            .filter_map(|id| tree.get(id).ok().and_then(ResponseNode::bucket))
            .filter(|bucket| index_names.contains(&bucket.level))
            .map(|bucket| bucket.key.clone().unwrap_or(Value::Null))
            .collect();

        let mut values = Map::new();
        if let Some(bucket) = tree.get(bucket_id).ok().and_then(ResponseNode::bucket) {
            values.insert(options.value_column.clone(), bucket.value.clone());
        }
        for (name, multiple) in &columns {
            let found = values_below(response, bucket_id, name, aggs);
            let value = if *multiple {
                Value::Array(found.into_iter().map(|id| response.normalize(id)).collect())
            } else {
                found
                    .first()
                    .and_then(|&id| tree.get(id).ok().and_then(ResponseNode::bucket))
                    .map(|bucket| bucket.value.clone())
                    .unwrap_or(Value::Null)
            };
            values.insert(name.clone(), value);
        }
        rows.push(Row { index, values });
    }

    Ok(Tabular { index_names, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn aggs() -> Aggs {
        Aggs::new()
            .groupby(json!({"by_country": {"terms": {"field": "country"}}}), None)
            .unwrap()
            .groupby(json!({"by_city": {"terms": {"field": "city"}}}), None)
            .unwrap()
            .agg(json!({"avg_age": {"avg": {"field": "age"}}}), None)
            .unwrap()
    }

    fn raw() -> Value {
        json!({"by_country": {"buckets": [
            {"key": "FR", "doc_count": 5, "by_city": {"buckets": [
                {"key": "Paris", "doc_count": 3, "avg_age": {"value": 30.0}},
                {"key": "Lyon", "doc_count": 2, "avg_age": {"value": 40.0}}
            ]}},
            {"key": "IT", "doc_count": 1, "by_city": {"buckets": [
                {"key": "Rome", "doc_count": 1, "avg_age": {"value": 20.0}}
            ]}}
        ]}})
    }

    #[test]
    fn test_rows_at_grouping_pointer() {
        let aggs = aggs();
        let response = ResponseTree::parse(&aggs, &raw()).unwrap();
        let table = to_tabular(&aggs, &response, &TabularOptions::default()).unwrap();
        assert_eq!(table.index_names, vec!["by_country", "by_city"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[0].index, vec![json!("FR"), json!("Paris")]);
        assert_eq!(table.rows[0].values["doc_count"], json!(3));
        assert_eq!(table.rows[0].values["avg_age"], json!(30.0));
    }

    #[test]
    fn test_explicit_outer_grouping() {
        let aggs = aggs();
        let response = ResponseTree::parse(&aggs, &raw()).unwrap();
        let table = to_tabular(
            &aggs,
            &response,
            &TabularOptions::default().grouped_by("by_country"),
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.index_names, vec!["by_country"]);
        let cities = table.rows[0].values["by_city"].as_array().unwrap();
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[1]["key"], "Lyon");
    }

    #[test]
    fn test_custom_value_column() {
        let aggs = aggs();
        let response = ResponseTree::parse(&aggs, &raw()).unwrap();
        let options = TabularOptions {
            value_column: "count".to_string(),
            ..TabularOptions::default()
        };
        let table = to_tabular(&aggs, &response, &options).unwrap();
        assert_eq!(table.rows[2].values["count"], json!(1));
    }

    #[test]
    fn test_metric_grouping_rejected() {
        let aggs = aggs();
        let response = ResponseTree::parse(&aggs, &raw()).unwrap();
        let err = to_tabular(&aggs, &response, &TabularOptions::default().grouped_by("avg_age"))
            .unwrap_err();
        assert_eq!(err.code(), "STRUCTURAL_INVALID_PARENT");
    }
}
