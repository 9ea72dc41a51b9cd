//! Query clause engine
//!
//! A `Query` owns a tree of query clauses. Every insertion returns a new
//! `Query`; the receiver is never modified.
//!
//! # Insertion
//!
//! - no target: the clause goes to the top; an existing non-bool root is
//!   wrapped into a new `bool`'s `must` slot together with the new clause
//! - `at`: insert below a compound clause, in `parameter` or its default slot
//! - `on`: merge a compound clause into an existing compound of the same type
//!
//! Leaf clauses on fields are validated against the mappings and placed inside
//! the `nested` clauses their field requires.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use super::builders::QueryInput;
use super::clauses::{ParameterSlot, QueryNode};
use super::codec::clause_to_json;
use crate::config::BuilderConfig;
use crate::errors::{ClauseError, ClauseResult};
use crate::mappings::Mappings;
use crate::nesting::{current_scope, reconcile, ScopeBoundary, ScopeWrapper};
use crate::tree::{NodeId, Tree, TreeNode};

/// How an `on` insertion combines with the targeted compound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Append children to the targeted slots
    #[default]
    Add,
    /// Clear each slot named by the incoming clause before appending
    Replace,
    /// Drop every slot and attribute of the target first
    ReplaceAll,
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMode::Add => "add",
            MergeMode::Replace => "replace",
            MergeMode::ReplaceAll => "replace_all",
        }
    }
}

impl FromStr for MergeMode {
    type Err = ClauseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(MergeMode::Add),
            "replace" => Ok(MergeMode::Replace),
            "replace_all" => Ok(MergeMode::ReplaceAll),
            other => Err(ClauseError::UnsupportedMergeMode(other.to_string())),
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Node address: tree identifier or clause `_name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(NodeId),
    Name(String),
}

impl From<NodeId> for Target {
    fn from(id: NodeId) -> Self {
        Target::Id(id)
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Target::Name(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::Name(name)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => write!(f, "{}", id),
            Target::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Options of a single insertion
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    pub at: Option<Target>,
    pub on: Option<Target>,
    pub mode: Option<MergeMode>,
    pub parameter: Option<String>,
}

impl InsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert below the targeted compound
    pub fn at(target: impl Into<Target>) -> Self {
        Self {
            at: Some(target.into()),
            ..Self::default()
        }
    }

    /// Merge into the targeted compound
    pub fn on(target: impl Into<Target>) -> Self {
        Self {
            on: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn mode(mut self, mode: MergeMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }
}

/// Insertion point inside a query tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// Top of the tree
    Top,
    /// Parameter slot of a compound clause
    Slot {
        compound: NodeId,
        param: &'static str,
    },
}

/// Query clause tree bound to optional mappings
#[derive(Debug, Clone)]
pub struct Query {
    tree: Tree<QueryNode>,
    mappings: Option<Arc<Mappings>>,
    nested_autocorrect: bool,
    default_mode: MergeMode,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    /// Empty query without mappings
    pub fn new() -> Self {
        Self {
            tree: Tree::new(),
            mappings: None,
            nested_autocorrect: true,
            default_mode: MergeMode::Add,
        }
    }

    pub fn with_mappings(mut self, mappings: Arc<Mappings>) -> Self {
        self.mappings = Some(mappings);
        self
    }

    pub fn with_nested_autocorrect(mut self, enabled: bool) -> Self {
        self.nested_autocorrect = enabled;
        self
    }

    /// Applies autocorrection and default merge mode from configuration
    pub fn with_config(mut self, config: &BuilderConfig) -> Self {
        self.nested_autocorrect = config.nested_autocorrect;
        self.default_mode = config.default_merge_mode;
        self
    }

    /// Parses, validates and auto-corrects a query DSL document
    pub fn from_json(value: &Value, mappings: Option<Arc<Mappings>>) -> ClauseResult<Self> {
        let mut query = Query::new();
        query.mappings = mappings;
        query.insert(value.clone(), InsertOptions::default())
    }

    pub fn tree(&self) -> &Tree<QueryNode> {
        &self.tree
    }

    pub fn mappings(&self) -> Option<&Arc<Mappings>> {
        self.mappings.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Query DSL body, `None` for an empty query
    pub fn to_json(&self) -> Option<Value> {
        self.tree.root().and_then(|root| clause_to_json(&self.tree, root))
    }

    /// Text rendering of the clause tree
    pub fn show(&self) -> String {
        self.tree.render()
    }

    /// Resolves a target to a node; names address clauses, never slots
    pub fn find(&self, target: &Target) -> ClauseResult<NodeId> {
        match target {
            Target::Id(id) if self.tree.contains(*id) => Ok(*id),
            Target::Id(id) => Err(ClauseError::NodeNotFound(id.to_string())),
            Target::Name(name) => self
                .tree
                .root()
                .map(|root| self.tree.preorder(root))
                .unwrap_or_default()
                .into_iter()
                .find(|&id| {
                    self.tree.key(id) == Some(name.as_str())
                        && self.tree.get(id).map(|n| !n.is_param()).unwrap_or(false)
                })
                .ok_or_else(|| ClauseError::NodeNotFound(name.clone())),
        }
    }

    /// Nested scope in effect at the targeted node
    pub fn applied_nested_path_at(&self, target: impl Into<Target>) -> ClauseResult<Option<String>> {
        let id = self.find(&target.into())?;
        Ok(current_scope(&self.tree, Some(id)))
    }

    /// Inserts a clause, returning the resulting query
    pub fn insert(&self, input: impl Into<QueryInput>, options: InsertOptions) -> ClauseResult<Query> {
        let incoming = input.into().normalize()?;
        let mode = options.mode.unwrap_or(self.default_mode);
        let mut next = self.clone();
        match (&options.on, &options.at) {
            (Some(on), Some(at)) => {
                return Err(ClauseError::AmbiguousInsertion(format!(
                    "both 'on' ({}) and 'at' ({}) targets given",
                    on, at
                )))
            }
            (Some(on), None) => next.merge_on(on, &incoming, mode)?,
            (None, Some(at)) => {
                let pos = next.position_for(at, options.parameter.as_deref())?;
                next.insert_tree(pos, &incoming)?;
            }
            (None, None) => {
                let pos = match (options.parameter.as_deref(), next.tree.root()) {
                    (Some(param), Some(root)) => next.position_for(&Target::Id(root), Some(param))?,
                    _ => Position::Top,
                };
                next.insert_tree(pos, &incoming)?;
            }
        }
        Ok(next)
    }

    /// Inserts at the top of the tree
    pub fn query(&self, input: impl Into<QueryInput>) -> ClauseResult<Query> {
        self.insert(input, InsertOptions::default())
    }

    /// Inserts into the root boolean's `must` slot
    pub fn must(&self, input: impl Into<QueryInput>) -> ClauseResult<Query> {
        self.bool_param("must", input)
    }

    /// Inserts into the root boolean's `should` slot
    pub fn should(&self, input: impl Into<QueryInput>) -> ClauseResult<Query> {
        self.bool_param("should", input)
    }

    /// Inserts into the root boolean's `filter` slot
    pub fn filter(&self, input: impl Into<QueryInput>) -> ClauseResult<Query> {
        self.bool_param("filter", input)
    }

    /// Inserts into the root boolean's `must_not` slot
    pub fn must_not(&self, input: impl Into<QueryInput>) -> ClauseResult<Query> {
        self.bool_param("must_not", input)
    }

    fn bool_param(&self, param: &'static str, input: impl Into<QueryInput>) -> ClauseResult<Query> {
        let incoming = input.into().normalize()?;
        let mut next = self.clone();
        let root = next.ensure_bool_root()?;
        next.insert_tree(Position::Slot { compound: root, param }, &incoming)?;
        Ok(next)
    }

    fn ensure_bool_root(&mut self) -> ClauseResult<NodeId> {
        match self.tree.root() {
            None => self.tree.insert_root(QueryNode::bool_clause(), None),
            Some(root) if self.is_bool(root) => Ok(root),
            Some(root) => self.wrap_in_bool(root).map(|(bool_id, _)| bool_id),
        }
    }

    fn is_bool(&self, id: NodeId) -> bool {
        self.tree.get(id).map(QueryNode::is_bool).unwrap_or(false)
    }

    fn find_slot(&self, compound: NodeId, param: &str) -> Option<NodeId> {
        self.tree
            .find_child(compound, |node, _| matches!(node, QueryNode::Param(slot) if slot.name == param))
    }

    fn ensure_slot(&mut self, compound: NodeId, param: &str) -> ClauseResult<NodeId> {
        if let Some(slot) = self.find_slot(compound, param) {
            return Ok(slot);
        }
        let spec = match self.tree.get(compound)? {
            QueryNode::Compound(clause) => {
                clause
                    .kind
                    .param(param)
                    .ok_or_else(|| ClauseError::UnknownParameter {
                        clause: clause.kind.tag.to_string(),
                        param: param.to_string(),
                    })?
            }
            other => {
                return Err(ClauseError::InvalidParent {
                    parent: format!("'{}'", other.label()),
                    child: format!("parameter '{}'", param),
                })
            }
        };
        self.tree.insert(
            QueryNode::Param(ParameterSlot::from(spec)),
            compound,
            Some(spec.name.to_string()),
        )
    }

    /// Moves `occupant` into the `must` slot of a new bool placed where it was
    fn wrap_in_bool(&mut self, occupant: NodeId) -> ClauseResult<(NodeId, NodeId)> {
        let parent = self.tree.parent(occupant);
        self.tree.detach(occupant)?;
        let bool_id = match parent {
            Some(slot) => self.tree.insert(QueryNode::bool_clause(), slot, None)?,
            None => self.tree.insert_root(QueryNode::bool_clause(), None)?,
        };
        let must = self.ensure_slot(bool_id, "must")?;
        self.tree.attach(occupant, must)?;
        debug!(wrapped = %occupant, "wrapped clause into bool must");
        Ok((bool_id, must))
    }

    /// Redirects positions whose occupant is a bool to that bool's `must`
    fn effective(&self, pos: Position) -> ClauseResult<Position> {
        match pos {
            Position::Top => match self.tree.root() {
                Some(root) if self.is_bool(root) => Ok(Position::Slot {
                    compound: root,
                    param: "must",
                }),
                _ => Ok(Position::Top),
            },
            Position::Slot { compound, param } => {
                if let Some(slot) = self.find_slot(compound, param) {
                    if let QueryNode::Param(spec) = self.tree.get(slot)? {
                        if !spec.multiple {
                            if let Some(&occupant) = self.tree.children(slot).first() {
                                if self.is_bool(occupant) {
                                    return Ok(Position::Slot {
                                        compound: occupant,
                                        param: "must",
                                    });
                                }
                            }
                        }
                    }
                }
                Ok(Position::Slot { compound, param })
            }
        }
    }

    /// Clauses directly reachable from a position
    fn children_at(&self, pos: &Position) -> Vec<NodeId> {
        match self.effective(pos.clone()) {
            Ok(Position::Top) => self.tree.root().into_iter().collect(),
            Ok(Position::Slot { compound, param }) => self
                .find_slot(compound, param)
                .map(|slot| self.tree.children(slot).to_vec())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    fn place(&mut self, pos: Position, node: QueryNode, key: Option<String>) -> ClauseResult<NodeId> {
        trace!(clause = %node.label(), ?pos, "placing query clause");
        match self.effective(pos)? {
            Position::Top => match self.tree.root() {
                None => self.tree.insert_root(node, key),
                Some(root) => {
                    let (_, must) = self.wrap_in_bool(root)?;
                    self.tree.insert(node, must, key)
                }
            },
            Position::Slot { compound, param } => {
                let slot = self.ensure_slot(compound, param)?;
                let occupant = match self.tree.get(slot)? {
                    QueryNode::Param(spec) if !spec.multiple => {
                        self.tree.children(slot).first().copied()
                    }
                    _ => None,
                };
                match occupant {
                    None => self.tree.insert(node, slot, key),
                    Some(occupant) => {
                        let (_, must) = self.wrap_in_bool(occupant)?;
                        self.tree.insert(node, must, key)
                    }
                }
            }
        }
    }

    fn insert_tree(&mut self, pos: Position, src: &Tree<QueryNode>) -> ClauseResult<()> {
        if let Some(root) = src.root() {
            match src.get(root)? {
                // a bare slot contributes its clauses
                QueryNode::Param(_) => {
                    for &child in src.children(root) {
                        self.insert_clause(pos.clone(), src, child)?;
                    }
                }
                _ => {
                    self.insert_clause(pos, src, root)?;
                }
            }
        }
        Ok(())
    }

    fn insert_clause(&mut self, pos: Position, src: &Tree<QueryNode>, src_id: NodeId) -> ClauseResult<NodeId> {
        let node = src.get(src_id)?.clone();
        let key = src.key(src_id).map(str::to_string);

        let pos = match (node.field(), self.mappings.clone()) {
            (Some(field), Some(mappings)) => {
                if let QueryNode::Leaf(leaf) = &node {
                    mappings.check_field(leaf.kind.tag, leaf.kind.rule, field)?;
                }
                let autocorrect = self.nested_autocorrect;
                reconcile(self, pos, field, &mappings, autocorrect)?
            }
            _ => pos,
        };

        let id = self.place(pos, node, key)?;
        for &param_id in src.children(src_id) {
            let QueryNode::Param(slot) = src.get(param_id)? else {
                continue;
            };
            let param = slot.name;
            self.ensure_slot(id, param)?;
            for &child in src.children(param_id) {
                self.insert_clause(Position::Slot { compound: id, param }, src, child)?;
            }
        }
        Ok(id)
    }

    fn position_for(&self, at: &Target, parameter: Option<&str>) -> ClauseResult<Position> {
        let id = self.find(at)?;
        match self.tree.get(id)? {
            QueryNode::Leaf(_) => Err(ClauseError::InvalidParent {
                parent: format!("leaf clause '{}'", at),
                child: "a clause".to_string(),
            }),
            QueryNode::Compound(compound) => {
                let name = parameter.unwrap_or(compound.kind.default_param);
                let spec = compound
                    .kind
                    .param(name)
                    .ok_or_else(|| ClauseError::UnknownParameter {
                        clause: compound.kind.tag.to_string(),
                        param: name.to_string(),
                    })?;
                Ok(Position::Slot {
                    compound: id,
                    param: spec.name,
                })
            }
            QueryNode::Param(slot) => {
                if let Some(param) = parameter {
                    if param != slot.name {
                        return Err(ClauseError::ParameterUnderParameter(param.to_string()));
                    }
                }
                let compound = self
                    .tree
                    .parent(id)
                    .ok_or_else(|| ClauseError::NodeNotFound(at.to_string()))?;
                Ok(Position::Slot {
                    compound,
                    param: slot.name,
                })
            }
        }
    }

    fn merge_on(&mut self, on: &Target, incoming: &Tree<QueryNode>, mode: MergeMode) -> ClauseResult<()> {
        let target = self.find(on)?;
        let Some(src_root) = incoming.root() else {
            return Ok(());
        };
        let existing = self.tree.get(target)?;
        let incoming_node = incoming.get(src_root)?;
        let incoming_body = match (existing, incoming_node) {
            (QueryNode::Compound(current), QueryNode::Compound(new))
                if current.kind.tag == new.kind.tag =>
            {
                new.body.clone()
            }
            _ => {
                return Err(ClauseError::MergeMismatch {
                    existing: existing.tag().to_string(),
                    incoming: incoming_node.tag().to_string(),
                })
            }
        };

        if mode == MergeMode::ReplaceAll {
            for slot in self.tree.children(target).to_vec() {
                self.tree.remove(slot)?;
            }
        }
        if let QueryNode::Compound(current) = self.tree.get_mut(target)? {
            if mode == MergeMode::ReplaceAll {
                current.body = incoming_body;
            } else {
                current.body.extend(incoming_body);
            }
        }
        // the merged body decides the `_name` the target answers to
        let name = self.tree.get(target)?.name().map(str::to_string);
        self.tree.set_key(target, name)?;

        for &param_id in incoming.children(src_root) {
            let QueryNode::Param(slot) = incoming.get(param_id)? else {
                continue;
            };
            let param = slot.name;
            if mode == MergeMode::Replace {
                if let Some(existing_slot) = self.find_slot(target, param) {
                    for child in self.tree.children(existing_slot).to_vec() {
                        self.tree.remove(child)?;
                    }
                }
            }
            self.ensure_slot(target, param)?;
            for &child in incoming.children(param_id) {
                self.insert_clause(Position::Slot { compound: target, param }, incoming, child)?;
            }
        }
        debug!(target = %on, mode = mode.as_str(), "merged compound clause");
        Ok(())
    }
}

impl ScopeWrapper for Query {
    type Position = Position;

    fn scope_at(&self, pos: &Position) -> Option<String> {
        match pos {
            Position::Top => None,
            Position::Slot { compound, .. } => current_scope(&self.tree, Some(*compound)),
        }
    }

    fn find_wrapper(&self, pos: &Position, boundary: &ScopeBoundary) -> Option<Position> {
        let ScopeBoundary::Enter(path) = boundary else {
            return None;
        };
        self.children_at(pos)
            .into_iter()
            .find(|&id| self.tree.get(id).ok().and_then(QueryNode::nested_path) == Some(path.as_str()))
            .map(|id| Position::Slot {
                compound: id,
                param: "query",
            })
    }

    fn open_wrapper(&mut self, pos: &Position, boundary: &ScopeBoundary) -> ClauseResult<Option<Position>> {
        match boundary {
            ScopeBoundary::Enter(path) => {
                let id = self.place(pos.clone(), QueryNode::nested(path), None)?;
                Ok(Some(Position::Slot {
                    compound: id,
                    param: "query",
                }))
            }
            // no reverse-nested clause exists in the query DSL
            ScopeBoundary::Exit(_) => Ok(None),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.show())
    }
}
