//! Aggregation JSON codec
//!
//! `{"<name>": {"<type>": {...}, "aggs": {...}, "meta": {...}}}`; the
//! `aggregations` spelling of `aggs` is accepted on input.

use serde_json::{Map, Value};

use super::clauses::{AggClause, AggNode, AggRegistry};
use crate::errors::{ClauseError, ClauseResult};
use crate::tree::{NodeId, Tree};

const CHILDREN_KEYS: [&str; 2] = ["aggs", "aggregations"];

/// Parses an aggregation declaration into a tree rooted at [`AggNode::Root`]
pub fn parse_aggs(value: &Value) -> ClauseResult<Tree<AggNode>> {
    let mut tree = Tree::with_root(AggNode::Root, None);
    if let Some(root) = tree.root() {
        parse_level(&mut tree, value, root)?;
    }
    Ok(tree)
}

fn parse_level(tree: &mut Tree<AggNode>, value: &Value, parent: NodeId) -> ClauseResult<()> {
    let level = value.as_object().ok_or_else(|| {
        ClauseError::malformed(format!("aggregations must be an object, got {}", value))
    })?;
    for (name, declaration) in level {
        if tree.find_by_key(name).is_some() {
            return Err(ClauseError::DuplicateName(name.clone()));
        }
        let (clause, children) = parse_clause(name, declaration)?;
        let id = tree.insert(AggNode::Clause(clause), parent, Some(name.clone()))?;
        if let Some(children) = children {
            parse_level(tree, children, id)?;
        }
    }
    Ok(())
}

/// Parses one named declaration, returning the clause and its raw children
pub fn parse_clause<'a>(name: &str, declaration: &'a Value) -> ClauseResult<(AggClause, Option<&'a Value>)> {
    let obj = declaration.as_object().ok_or_else(|| {
        ClauseError::malformed(format!("aggregation '{}' must be an object", name))
    })?;
    let mut typed = None;
    let mut children = None;
    let mut meta = None;
    for (key, inner) in obj {
        if CHILDREN_KEYS.contains(&key.as_str()) {
            if children.is_some() {
                return Err(ClauseError::malformed(format!(
                    "aggregation '{}' declares both 'aggs' and 'aggregations'",
                    name
                )));
            }
            children = Some(inner);
        } else if key == "meta" {
            meta = Some(inner.as_object().cloned().ok_or_else(|| {
                ClauseError::malformed(format!("meta of '{}' must be an object", name))
            })?);
        } else if typed.is_some() {
            return Err(ClauseError::malformed(format!(
                "aggregation '{}' must declare exactly one type",
                name
            )));
        } else {
            typed = Some((key, inner));
        }
    }
    let Some((tag, body)) = typed else {
        return Err(ClauseError::malformed(format!(
            "aggregation '{}' declares no type",
            name
        )));
    };
    let kind = AggRegistry::global().get(tag)?;
    let body = body.as_object().cloned().ok_or_else(|| {
        ClauseError::malformed(format!("body of '{}' aggregation '{}' must be an object", tag, name))
    })?;
    let mut clause = AggClause::new(kind, body)?;
    clause.meta = meta;
    Ok((clause, children))
}

/// Serializes the aggregations below `id` as a name → declaration map
pub fn children_to_json(tree: &Tree<AggNode>, id: NodeId) -> Map<String, Value> {
    tree.children(id)
        .iter()
        .filter_map(|&child| {
            let name = tree.key(child)?.to_string();
            Some((name, clause_to_json(tree, child)?))
        })
        .collect()
}

/// Serializes one clause with its sub-aggregations
pub fn clause_to_json(tree: &Tree<AggNode>, id: NodeId) -> Option<Value> {
    let clause = tree.get(id).ok()?.clause()?;
    let mut out = Map::new();
    out.insert(clause.kind.tag.to_string(), Value::Object(clause.body.clone()));
    let children = children_to_json(tree, id);
    if !children.is_empty() {
        out.insert("aggs".to_string(), Value::Object(children));
    }
    if let Some(meta) = &clause.meta {
        out.insert("meta".to_string(), Value::Object(meta.clone()));
    }
    Some(Value::Object(out))
}
