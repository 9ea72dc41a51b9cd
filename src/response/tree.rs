//! Response tree: buckets mirroring the aggregation tree

use serde_json::{json, Map, Value};
use tracing::debug;

use super::bucket::{extract_buckets, extract_value, Bucket, ResponseNode};
use crate::aggs::{AggFamily, AggNode, Aggs};
use crate::errors::{ClauseError, ClauseResult};
use crate::tree::{NodeId, Tree};

/// Buckets parsed from one aggregation response
#[derive(Debug, Clone)]
pub struct ResponseTree {
    tree: Tree<ResponseNode>,
}

impl ResponseTree {
    /// Walks the aggregation tree and the raw response in lock-step
    ///
    /// Accepts the `aggregations` object or a whole search response holding one.
    pub fn parse(aggs: &Aggs, raw: &Value) -> ClauseResult<Self> {
        let raw = match raw.get("aggregations") {
            Some(inner) if aggs.id_from_name("aggregations").is_err() => inner,
            _ => raw,
        };
        if !raw.is_object() {
            return Err(ClauseError::malformed("aggregation response must be an object"));
        }
        let mut tree = Tree::with_root(ResponseNode::Root, None);
        if let Some(root) = tree.root() {
            parse_level(aggs, aggs.root()?, raw, &mut tree, root)?;
        }
        Ok(Self { tree })
    }

    pub fn tree(&self) -> &Tree<ResponseNode> {
        &self.tree
    }

    pub fn root(&self) -> ClauseResult<NodeId> {
        self.tree
            .root()
            .ok_or_else(|| ClauseError::NodeNotFound("response root".to_string()))
    }

    pub fn bucket(&self, id: NodeId) -> ClauseResult<&Bucket> {
        self.tree
            .get(id)?
            .bucket()
            .ok_or_else(|| ClauseError::NodeNotFound(id.to_string()))
    }

    /// Buckets produced by the named aggregation, in response order
    pub fn buckets_at(&self, level: &str) -> Vec<NodeId> {
        self.tree
            .root()
            .map(|root| self.tree.preorder(root))
            .unwrap_or_default()
            .into_iter()
            .filter(|&id| {
                self.tree
                    .get(id)
                    .ok()
                    .and_then(ResponseNode::bucket)
                    .map(|b| b.level == level)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Follows `(level, key)` steps from the root; unkeyed levels in between
    /// are crossed transparently
    pub fn find_bucket(&self, path: &[(&str, Value)]) -> Option<NodeId> {
        let mut current = self.tree.root()?;
        for (level, key) in path {
            current = self.descend(current, level, key)?;
        }
        Some(current)
    }

    fn descend(&self, from: NodeId, level: &str, key: &Value) -> Option<NodeId> {
        for &child in self.tree.children(from) {
            let bucket = self.tree.get(child).ok()?.bucket()?;
            if bucket.level == level && bucket.key.as_ref() == Some(key) {
                return Some(child);
            }
            if bucket.key.is_none() && bucket.is_bucket() {
                if let Some(found) = self.descend(child, level, key) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Every node as `{level, key, value, children}`
    pub fn to_normalized(&self) -> Value {
        match self.tree.root() {
            Some(root) => self.normalize(root),
            None => Value::Null,
        }
    }

    pub(crate) fn normalize(&self, id: NodeId) -> Value {
        let children: Vec<Value> = self
            .tree
            .children(id)
            .iter()
            .map(|&child| self.normalize(child))
            .collect();
        match self.tree.get(id).ok().and_then(ResponseNode::bucket) {
            Some(bucket) => {
                let mut out = Map::new();
                out.insert("level".into(), Value::String(bucket.level.clone()));
                out.insert("key".into(), bucket.key.clone().unwrap_or(Value::Null));
                out.insert("value".into(), bucket.value.clone());
                if let Some(key_as_string) = bucket.attrs.get("key_as_string") {
                    out.insert("key_as_string".into(), key_as_string.clone());
                }
                out.insert("children".into(), Value::Array(children));
                Value::Object(out)
            }
            None => json!({"level": "root", "key": null, "value": null, "children": children}),
        }
    }

    pub fn show(&self) -> String {
        self.tree.render()
    }
}

fn bucket_attrs(raw: &Value, skip: &[&str]) -> Map<String, Value> {
    raw.as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(k, v)| k.as_str() != "key" && !v.is_object() && !skip.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_level(
    aggs: &Aggs,
    agg_id: NodeId,
    raw: &Value,
    tree: &mut Tree<ResponseNode>,
    parent: NodeId,
) -> ClauseResult<()> {
    let agg_tree = aggs.tree();
    for &child in agg_tree.children(agg_id) {
        let Some(name) = agg_tree.key(child) else {
            continue;
        };
        let Some(AggNode::Clause(clause)) = agg_tree.get(child).ok() else {
            continue;
        };
        let Some(raw_child) = raw.get(name) else {
            debug!(aggregation = name, "aggregation missing from response");
            continue;
        };
        let kind = clause.kind;
        match kind.family {
            AggFamily::Bucket { multiple: true } => {
                let grandchildren: Vec<&str> = agg_tree
                    .children(child)
                    .iter()
                    .filter_map(|&c| agg_tree.key(c))
                    .collect();
                for (key, raw_bucket) in extract_buckets(name, clause, raw_child)? {
                    let bucket = Bucket {
                        level: name.to_string(),
                        kind,
                        key: Some(key),
                        value: extract_value(kind, raw_bucket),
                        attrs: bucket_attrs(raw_bucket, &grandchildren),
                    };
                    let id = tree.insert(ResponseNode::Bucket(bucket), parent, None)?;
                    parse_level(aggs, child, raw_bucket, tree, id)?;
                }
            }
            AggFamily::Bucket { multiple: false } => {
                let bucket = Bucket {
                    level: name.to_string(),
                    kind,
                    key: None,
                    value: extract_value(kind, raw_child),
                    attrs: Map::new(),
                };
                let id = tree.insert(ResponseNode::Bucket(bucket), parent, None)?;
                parse_level(aggs, child, raw_child, tree, id)?;
            }
            AggFamily::Metric | AggFamily::Pipeline => {
                if kind.value_attrs.is_empty() {
                    continue;
                }
                let bucket = Bucket {
                    level: name.to_string(),
                    kind,
                    key: None,
                    value: extract_value(kind, raw_child),
                    attrs: Map::new(),
                };
                tree.insert(ResponseNode::Bucket(bucket), parent, None)?;
            }
        }
    }
    Ok(())
}
