//! Aggregation clause engine
//!
//! Bucket aggregations nest directly below each other. Two insertion modes:
//! - `groupby` (vertical): the new clause is inserted below the target and
//!   takes over the target's previous children; the grouping pointer moves to it
//! - `agg` (horizontal): clauses are added as siblings below the target
//!
//! Without an explicit target, insertions go below the grouping pointer, or
//! below the deepest bucket of a non-branching chain from the root.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use super::builders::AggInput;
use super::clauses::{AggClause, AggNode};
use super::codec::children_to_json;
use crate::config::BuilderConfig;
use crate::errors::{ClauseError, ClauseResult};
use crate::mappings::Mappings;
use crate::nesting::{current_scope, reconcile, ScopeBoundary, ScopeWrapper, ScopedNode};
use crate::tree::{NodeId, Tree};

/// Aggregation clause tree bound to optional mappings
#[derive(Debug, Clone)]
pub struct Aggs {
    tree: Tree<AggNode>,
    mappings: Option<Arc<Mappings>>,
    nested_autocorrect: bool,
    grouping: Option<NodeId>,
}

impl Default for Aggs {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggs {
    /// Empty aggregation request
    pub fn new() -> Self {
        Self {
            tree: Tree::with_root(AggNode::Root, None),
            mappings: None,
            nested_autocorrect: true,
            grouping: None,
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

    pub fn with_config(mut self, config: &BuilderConfig) -> Self {
        self.nested_autocorrect = config.nested_autocorrect;
        self
    }

    /// Parses, validates and auto-corrects an aggregation declaration
    pub fn from_json(value: &Value, mappings: Option<Arc<Mappings>>) -> ClauseResult<Self> {
        let mut aggs = Aggs::new();
        aggs.mappings = mappings;
        let src = AggInput::from(value.clone()).normalize()?;
        let root = aggs.root()?;
        aggs.insert_horizontal(root, &src)?;
        Ok(aggs)
    }

    pub fn tree(&self) -> &Tree<AggNode> {
        &self.tree
    }

    pub fn mappings(&self) -> Option<&Arc<Mappings>> {
        self.mappings.as_ref()
    }

    /// Request-level node
    pub fn root(&self) -> ClauseResult<NodeId> {
        self.tree
            .root()
            .ok_or_else(|| ClauseError::NodeNotFound("aggregation root".to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.tree
            .root()
            .map(|root| self.tree.children(root).is_empty())
            .unwrap_or(true)
    }

    /// Grouping pointer, if set
    pub fn grouping(&self) -> Option<NodeId> {
        self.grouping
    }

    /// Name of the clause under the grouping pointer
    pub fn grouping_name(&self) -> Option<&str> {
        self.grouping.and_then(|id| self.tree.key(id))
    }

    /// Aggregation declaration, `{}` when empty
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.tree
                .root()
                .map(|root| children_to_json(&self.tree, root))
                .unwrap_or_default(),
        )
    }

    pub fn show(&self) -> String {
        self.tree.render()
    }

    /// Node id of the named aggregation
    pub fn id_from_name(&self, name: &str) -> ClauseResult<NodeId> {
        self.tree
            .find_by_key(name)
            .ok_or_else(|| ClauseError::NodeNotFound(name.to_string()))
    }

    /// Clause of the named aggregation
    pub fn clause(&self, name: &str) -> ClauseResult<&AggClause> {
        let id = self.id_from_name(name)?;
        self.tree
            .get(id)?
            .clause()
            .ok_or_else(|| ClauseError::NodeNotFound(name.to_string()))
    }

    /// Nested scope in effect at the named aggregation
    pub fn applied_nested_path_at(&self, name: &str) -> ClauseResult<Option<String>> {
        let id = self.id_from_name(name)?;
        Ok(current_scope(&self.tree, Some(id)))
    }

    fn bucket_children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .children(id)
            .iter()
            .copied()
            .filter(|&c| self.tree.get(c).map(AggNode::is_bucket).unwrap_or(false))
            .collect()
    }

    /// Deepest bucket clause reachable from the root through a chain of
    /// single bucket children
    ///
    /// Fails when the chain branches into several bucket clauses.
    pub fn deepest_linear_bucket(&self) -> ClauseResult<NodeId> {
        let mut current = self.root()?;
        loop {
            let buckets = self.bucket_children(current);
            match buckets.as_slice() {
                [] => return Ok(current),
                [only] => current = *only,
                _ => {
                    let at = self.tree.key(current).unwrap_or("root");
                    return Err(ClauseError::AmbiguousInsertion(format!(
                        "'{}' has {} bucket aggregations below it, name an explicit target",
                        at,
                        buckets.len()
                    )));
                }
            }
        }
    }

    /// Like [`Aggs::deepest_linear_bucket`], stopping before the first branch
    pub(crate) fn linear_chain_end(&self) -> Option<NodeId> {
        let mut current = self.tree.root()?;
        loop {
            match self.bucket_children(current).as_slice() {
                [only] => current = *only,
                _ => return Some(current),
            }
        }
    }

    fn resolve_target(&self, at: Option<&str>) -> ClauseResult<NodeId> {
        match (at, self.grouping) {
            (Some(name), _) => self.id_from_name(name),
            (None, Some(pointer)) => Ok(pointer),
            (None, None) => self.deepest_linear_bucket(),
        }
    }

    fn ensure_bucket(&self, id: NodeId) -> ClauseResult<()> {
        match self.tree.get(id)? {
            AggNode::Root => Ok(()),
            AggNode::Clause(clause) if clause.kind.is_bucket() => Ok(()),
            AggNode::Clause(clause) => Err(ClauseError::InvalidParent {
                parent: format!("non-bucket aggregation '{}'", clause.kind.tag),
                child: "further aggregations".to_string(),
            }),
        }
    }

    /// Moves the grouping pointer to a bucket aggregation
    pub fn grouped_by(&self, name: &str) -> ClauseResult<Aggs> {
        let id = self.id_from_name(name)?;
        self.ensure_bucket(id)?;
        let mut next = self.clone();
        next.grouping = Some(id);
        debug!(grouping = name, "moved grouping pointer");
        Ok(next)
    }

    /// Inserts bucket aggregations vertically below `at` (or the grouping
    /// pointer); several top-level clauses in the input are chained
    pub fn groupby(&self, input: impl Into<AggInput>, at: Option<&str>) -> ClauseResult<Aggs> {
        let src = input.into().normalize()?;
        let mut next = self.clone();
        let mut parent = next.resolve_target(at)?;
        let Some(src_root) = src.root() else {
            return Ok(next);
        };
        for &src_id in src.children(src_root) {
            if !src.get(src_id)?.is_bucket() {
                return Err(ClauseError::InvalidParent {
                    parent: "grouping level".to_string(),
                    child: format!("non-bucket aggregation '{}'", src.key(src_id).unwrap_or("?")),
                });
            }
            parent = next.insert_vertical(parent, &src, src_id)?;
        }
        next.grouping = Some(parent);
        debug!(grouping = next.grouping_name().unwrap_or("root"), "moved grouping pointer");
        Ok(next)
    }

    /// Inserts aggregations as siblings below `at` (or the grouping pointer);
    /// the pointer does not move
    pub fn agg(&self, input: impl Into<AggInput>, at: Option<&str>) -> ClauseResult<Aggs> {
        let src = input.into().normalize()?;
        let mut next = self.clone();
        let parent = next.resolve_target(at)?;
        next.insert_horizontal(parent, &src)?;
        Ok(next)
    }

    /// Alias of [`Aggs::agg`] for several siblings at once
    pub fn aggs(&self, input: impl Into<AggInput>, at: Option<&str>) -> ClauseResult<Aggs> {
        self.agg(input, at)
    }

    fn insert_horizontal(&mut self, parent: NodeId, src: &Tree<AggNode>) -> ClauseResult<()> {
        self.ensure_bucket(parent)?;
        if let Some(src_root) = src.root() {
            for &src_id in src.children(src_root) {
                self.insert_subtree(parent, src, src_id)?;
            }
        }
        Ok(())
    }

    fn insert_vertical(&mut self, parent: NodeId, src: &Tree<AggNode>, src_id: NodeId) -> ClauseResult<NodeId> {
        self.ensure_bucket(parent)?;
        let existing: Vec<NodeId> = self.tree.descendants(parent);
        let inserted = self.insert_subtree(parent, src, src_id)?;

        // nodes between `parent` and the inserted clause (wrappers, new or reused)
        let path: Vec<NodeId> = self
            .tree
            .ancestors(inserted, false)
            .into_iter()
            .take_while(|&id| id != parent)
            .chain(std::iter::once(parent))
            .collect();
        for &holder in &path {
            let moved: Vec<NodeId> = self
                .tree
                .children(holder)
                .iter()
                .copied()
                .filter(|c| existing.contains(c) && !path.contains(c) && *c != inserted)
                .collect();
            for child in moved {
                self.relocate(child, inserted)?;
            }
        }
        Ok(inserted)
    }

    /// Moves `id` below `target`, re-reconciling its scope
    fn relocate(&mut self, id: NodeId, target: NodeId) -> ClauseResult<()> {
        let node = self.tree.get(id)?.clone();
        if let Some(ScopeBoundary::Enter(path)) = node.scope_boundary() {
            if current_scope(&self.tree, Some(target)).as_deref() == Some(path.as_str()) {
                // target already sits in that scope: the wrapper dissolves
                for child in self.tree.children(id).to_vec() {
                    self.relocate(child, target)?;
                }
                self.tree.remove(id)?;
                return Ok(());
            }
        }
        let destination = match (node.clause().and_then(AggClause::field), self.mappings.clone()) {
            (Some(field), Some(mappings)) => {
                let autocorrect = self.nested_autocorrect;
                reconcile(self, target, field, &mappings, autocorrect)?
            }
            _ => target,
        };
        self.tree.move_node(id, destination)
    }

    fn insert_subtree(&mut self, parent: NodeId, src: &Tree<AggNode>, src_id: NodeId) -> ClauseResult<NodeId> {
        let node = src.get(src_id)?.clone();
        let name = src
            .key(src_id)
            .ok_or_else(|| ClauseError::malformed("aggregation clause without a name"))?
            .to_string();
        if self.tree.find_by_key(&name).is_some() {
            return Err(ClauseError::DuplicateName(name));
        }
        let AggNode::Clause(clause) = &node else {
            return Err(ClauseError::InvalidParent {
                parent: name,
                child: "aggregation root".to_string(),
            });
        };

        let mut parent = parent;
        if let Some(mappings) = self.mappings.clone() {
            if let Some(ScopeBoundary::Enter(path) | ScopeBoundary::Exit(Some(path))) =
                node.scope_boundary()
            {
                if !mappings.is_nested(&path) {
                    return Err(ClauseError::InvalidFieldType {
                        clause: clause.kind.tag.to_string(),
                        field: path.clone(),
                        field_type: mappings.type_of(&path)?.to_string(),
                    });
                }
            }
            if let Some(field) = clause.field() {
                mappings.check_field(clause.kind.tag, clause.kind.rule, field)?;
                let autocorrect = self.nested_autocorrect;
                parent = reconcile(self, parent, field, &mappings, autocorrect)?;
            }
        }

        trace!(aggregation = %name, kind = clause.kind.tag, %parent, "placing aggregation clause");
        let id = self.tree.insert(node, parent, Some(name))?;
        for &child in src.children(src_id) {
            self.insert_subtree(id, src, child)?;
        }
        Ok(id)
    }

    fn wrapper_name(&self, tag: &str, parent: NodeId) -> String {
        let base = format!("{}_below_{}", tag, self.tree.key(parent).unwrap_or("root"));
        if self.tree.find_by_key(&base).is_none() {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", base, n);
            if self.tree.find_by_key(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }
}

impl ScopeWrapper for Aggs {
    type Position = NodeId;

    fn scope_at(&self, pos: &NodeId) -> Option<String> {
        current_scope(&self.tree, Some(*pos))
    }

    fn find_wrapper(&self, pos: &NodeId, boundary: &ScopeBoundary) -> Option<NodeId> {
        self.tree.find_child(*pos, |node, _| node.scope_boundary().as_ref() == Some(boundary))
    }

    fn open_wrapper(&mut self, pos: &NodeId, boundary: &ScopeBoundary) -> ClauseResult<Option<NodeId>> {
        let clause = match boundary {
            ScopeBoundary::Enter(path) => AggClause::nested(path),
            ScopeBoundary::Exit(to) => AggClause::reverse_nested(to.as_deref()),
        };
        let name = self.wrapper_name(clause.kind.tag, *pos);
        debug!(wrapper = %name, "inserting scope wrapper aggregation");
        self.tree
            .insert(AggNode::Clause(clause), *pos, Some(name))
            .map(Some)
    }
}

impl fmt::Display for Aggs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.show())
    }
}
