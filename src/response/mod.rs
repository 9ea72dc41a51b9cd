//! Response denormalizer
//!
//! Parses a raw aggregation response against the aggregation tree that
//! produced it, then exposes it as a bucket tree, tabular rows, a normalized
//! tree and per-bucket filter queries.

mod bucket;
mod filter;
mod tabular;
mod tree;

pub use bucket::{extract_buckets, extract_value, other_bucket_key, Bucket, ResponseNode, OTHER_BUCKET_KEY};
pub use filter::bucket_filter;
pub use tabular::{to_tabular, Row, Tabular, TabularOptions};
pub use tree::ResponseTree;

use serde_json::Value;
use tracing::debug;

use crate::aggs::Aggs;
use crate::errors::ClauseResult;
use crate::query::Query;
use crate::tree::NodeId;

/// Aggregation response bound to its request
#[derive(Debug, Clone)]
pub struct AggResponse {
    aggs: Aggs,
    tree: ResponseTree,
    base_query: Option<Query>,
}

impl AggResponse {
    pub fn parse(aggs: &Aggs, raw: &Value) -> ClauseResult<Self> {
        let tree = ResponseTree::parse(aggs, raw)?;
        debug!(nodes = tree.tree().len(), "parsed aggregation response");
        Ok(Self {
            aggs: aggs.clone(),
            tree,
            base_query: None,
        })
    }

    /// Query the request was run with; bucket filters are AND-ed with it
    pub fn with_query(mut self, query: Query) -> Self {
        self.base_query = Some(query);
        self
    }

    pub fn aggs(&self) -> &Aggs {
        &self.aggs
    }

    pub fn tree(&self) -> &ResponseTree {
        &self.tree
    }

    pub fn bucket(&self, id: NodeId) -> ClauseResult<&Bucket> {
        self.tree.bucket(id)
    }

    pub fn buckets_at(&self, level: &str) -> Vec<NodeId> {
        self.tree.buckets_at(level)
    }

    pub fn find_bucket(&self, path: &[(&str, Value)]) -> Option<NodeId> {
        self.tree.find_bucket(path)
    }

    pub fn to_tabular(&self, options: &TabularOptions) -> ClauseResult<Tabular> {
        to_tabular(&self.aggs, &self.tree, options)
    }

    pub fn to_normalized(&self) -> Value {
        self.tree.to_normalized()
    }

    /// Query selecting the documents of a bucket, within the base query if any
    pub fn bucket_filter(&self, id: NodeId) -> ClauseResult<Query> {
        let selection = bucket_filter(&self.aggs, &self.tree, id)?;
        match &self.base_query {
            Some(base) if !base.is_empty() => base.filter(&selection),
            _ => Ok(selection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bucket_filter_within_base_query() {
        let aggs = Aggs::new()
            .groupby(json!({"by_type": {"terms": {"field": "classification_type"}}}), None)
            .unwrap();
        let raw = json!({"by_type": {"buckets": [{"key": "multilabel", "doc_count": 2}]}});
        let base = Query::new()
            .query(json!({"range": {"price": {"gte": 10}}}))
            .unwrap();
        let response = AggResponse::parse(&aggs, &raw).unwrap().with_query(base);
        let bucket = response.find_bucket(&[("by_type", json!("multilabel"))]).unwrap();
        assert_eq!(
            response.bucket_filter(bucket).unwrap().to_json(),
            Some(json!({"bool": {
                "must": [{"range": {"price": {"gte": 10}}}],
                "filter": [{"term": {"classification_type": "multilabel"}}]
            }}))
        );
    }
}
