//! Query DSL JSON codec
//!
//! A clause is a single-key object `{"<type>": <body>}`. Compound bodies mix
//! attributes with parameters; a multiple parameter accepts one clause or an
//! array and always serializes as an array.

use serde_json::{Map, Value};

use super::clauses::{CompoundClause, LeafClause, ParameterSlot, QueryKind, QueryNode, QueryRegistry};
use crate::errors::{ClauseError, ClauseResult};
use crate::tree::{NodeId, Tree};

/// Parses a query DSL document into a tree
pub fn parse_query(value: &Value) -> ClauseResult<Tree<QueryNode>> {
    let mut tree = Tree::new();
    parse_into(&mut tree, value, None)?;
    Ok(tree)
}

fn single_entry(value: &Value) -> ClauseResult<(&String, &Map<String, Value>)> {
    let obj = value
        .as_object()
        .ok_or_else(|| ClauseError::malformed(format!("query clause must be an object, got {}", value)))?;
    let mut entries = obj.iter();
    match (entries.next(), entries.next()) {
        (Some((tag, Value::Object(body))), None) => Ok((tag, body)),
        (Some((tag, other)), None) => Err(ClauseError::malformed(format!(
            "body of '{}' must be an object, got {}",
            tag, other
        ))),
        _ => Err(ClauseError::malformed(format!(
            "query clause must hold exactly one type key, got {}",
            obj.len()
        ))),
    }
}

fn parse_into(tree: &mut Tree<QueryNode>, value: &Value, slot: Option<NodeId>) -> ClauseResult<NodeId> {
    let (tag, body) = single_entry(value)?;
    match QueryRegistry::global().get(tag)? {
        QueryKind::Leaf(kind) => {
            let node = QueryNode::Leaf(LeafClause::from_body(kind, body.clone())?);
            place(tree, node, slot)
        }
        QueryKind::Compound(kind) => {
            let mut attrs = Map::new();
            let mut params = Vec::new();
            for (key, inner) in body {
                match kind.param(key) {
                    Some(spec) => params.push((spec, inner)),
                    None => {
                        attrs.insert(key.clone(), inner.clone());
                    }
                }
            }
            let node = QueryNode::Compound(CompoundClause::new(kind, attrs)?);
            let id = place(tree, node, slot)?;
            for (spec, inner) in params {
                let slot_id = tree.insert(
                    QueryNode::Param(ParameterSlot::from(spec)),
                    id,
                    Some(spec.name.to_string()),
                )?;
                match inner {
                    Value::Array(items) if spec.multiple => {
                        for item in items {
                            parse_into(tree, item, Some(slot_id))?;
                        }
                    }
                    Value::Object(_) => {
                        parse_into(tree, inner, Some(slot_id))?;
                    }
                    other => {
                        return Err(ClauseError::malformed(format!(
                            "parameter '{}' of '{}' cannot hold {}",
                            spec.name, kind.tag, other
                        )))
                    }
                }
            }
            Ok(id)
        }
    }
}

fn place(tree: &mut Tree<QueryNode>, node: QueryNode, slot: Option<NodeId>) -> ClauseResult<NodeId> {
    let key = node.name().map(str::to_string);
    match slot {
        Some(slot) => tree.insert(node, slot, key),
        None => tree.insert_root(node, key),
    }
}

fn wrap(tag: &str, body: Map<String, Value>) -> Value {
    let mut outer = Map::new();
    outer.insert(tag.to_string(), Value::Object(body));
    Value::Object(outer)
}

/// Serializes the subtree below `id`
///
/// A parameter slot serializes as its clauses: an array for multiple slots.
pub fn clause_to_json(tree: &Tree<QueryNode>, id: NodeId) -> Option<Value> {
    match tree.get(id).ok()? {
        QueryNode::Leaf(leaf) => Some(wrap(leaf.kind.tag, leaf.body.clone())),
        QueryNode::Compound(compound) => {
            let mut body = compound.body.clone();
            for &param_id in tree.children(id) {
                if let Some(QueryNode::Param(slot)) = tree.get(param_id).ok() {
                    if let Some(value) = clause_to_json(tree, param_id) {
                        body.insert(slot.name.to_string(), value);
                    }
                }
            }
            Some(wrap(compound.kind.tag, body))
        }
        QueryNode::Param(slot) => {
            let mut items = tree
                .children(id)
                .iter()
                .filter_map(|&child| clause_to_json(tree, child));
            if slot.multiple {
                Some(Value::Array(items.collect()))
            } else {
                items.next()
            }
        }
    }
}
