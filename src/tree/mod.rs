//! Clause tree subsystem
//!
//! A keyed, ordered tree stored in an arena. Query, aggregation, mapping and
//! response trees are all `Tree<N>` with a different node type.
//!
//! # Ownership
//!
//! - A tree exclusively owns its nodes; node ids are stable for the life of the tree
//! - `Clone` is a full structural copy: no node state is shared between trees
//! - Removed nodes leave a hole, ids are never reused

mod render;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ClauseError, ClauseResult};

/// Stable identifier of a node inside one tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the arena index
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Behaviour every node type stored in a [`Tree`] provides
pub trait TreeNode: Clone + fmt::Debug {
    /// Validates placing `child` below `self` when `siblings` children are already attached.
    fn check_child(&self, child: &Self, siblings: usize) -> ClauseResult<()>;

    /// One-line description used when rendering the tree
    fn label(&self) -> String;
}

#[derive(Debug, Clone)]
struct Entry<N> {
    node: N,
    key: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed ordered tree
#[derive(Debug, Clone)]
pub struct Tree<N> {
    entries: Vec<Option<Entry<N>>>,
    root: Option<NodeId>,
}

impl<N> Default for Tree<N> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            root: None,
        }
    }
}

impl<N: TreeNode> Tree<N> {
    /// Creates an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree holding a single root node
    pub fn with_root(node: N, key: Option<String>) -> Self {
        let mut tree = Self::default();
        let root = tree.alloc(node, key, None);
        tree.root = Some(root);
        tree
    }

    /// Returns true if the tree has no root
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of nodes reachable from the root
    pub fn len(&self) -> usize {
        self.root.map_or(0, |root| self.preorder(root).len())
    }

    /// Root node id
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Returns true if the id addresses a live node
    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.entries.get(id.0), Some(Some(_)))
    }

    fn entry(&self, id: NodeId) -> ClauseResult<&Entry<N>> {
        self.entries
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| ClauseError::NodeNotFound(id.to_string()))
    }

    fn entry_mut(&mut self, id: NodeId) -> ClauseResult<&mut Entry<N>> {
        self.entries
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| ClauseError::NodeNotFound(id.to_string()))
    }

    /// Node payload
    pub fn get(&self, id: NodeId) -> ClauseResult<&N> {
        self.entry(id).map(|e| &e.node)
    }

    /// Mutable node payload
    pub fn get_mut(&mut self, id: NodeId) -> ClauseResult<&mut N> {
        self.entry_mut(id).map(|e| &mut e.node)
    }

    /// Key under which the node is addressed
    pub fn key(&self, id: NodeId) -> Option<&str> {
        self.entry(id).ok().and_then(|e| e.key.as_deref())
    }

    /// Re-addresses a node under a new key
    pub fn set_key(&mut self, id: NodeId, key: Option<String>) -> ClauseResult<()> {
        self.entry_mut(id)?.key = key;
        Ok(())
    }

    /// Parent id, `None` for the root or a detached node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id).ok().and_then(|e| e.parent)
    }

    /// Ordered children ids
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.entry(id).map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    fn alloc(&mut self, node: N, key: Option<String>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.entries.len());
        self.entries.push(Some(Entry {
            node,
            key,
            parent,
            children: Vec::new(),
        }));
        id
    }

    /// Inserts the root node of an empty tree
    pub fn insert_root(&mut self, node: N, key: Option<String>) -> ClauseResult<NodeId> {
        if self.root.is_some() {
            return Err(ClauseError::RootOccupied);
        }
        let id = self.alloc(node, key, None);
        self.root = Some(id);
        Ok(id)
    }

    /// Inserts `node` as last child of `parent`
    pub fn insert(&mut self, node: N, parent: NodeId, key: Option<String>) -> ClauseResult<NodeId> {
        let parent_entry = self.entry(parent)?;
        parent_entry
            .node
            .check_child(&node, parent_entry.children.len())?;
        let id = self.alloc(node, key, Some(parent));
        self.entry_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Ancestors ordered from the node up to the root
    pub fn ancestors(&self, id: NodeId, include_self: bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        if include_self && self.contains(id) {
            out.push(id);
        }
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// Pre-order traversal starting at (and including) `id`
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            for child in self.children(current).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Descendants of `id` in pre-order, excluding `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.preorder(id).into_iter().skip(1).collect()
    }

    /// Depth of the node, the root being at depth 0
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id, false).len()
    }

    /// Nodes without children
    pub fn leaves(&self) -> Vec<NodeId> {
        self.root
            .map(|root| {
                self.preorder(root)
                    .into_iter()
                    .filter(|id| self.children(*id).is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First child of `parent` matching the predicate
    pub fn find_child<F>(&self, parent: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&N, Option<&str>) -> bool,
    {
        self.children(parent).iter().copied().find(|id| {
            self.entry(*id)
                .map(|e| predicate(&e.node, e.key.as_deref()))
                .unwrap_or(false)
        })
    }

    /// First node in pre-order whose key equals `key`
    pub fn find_by_key(&self, key: &str) -> Option<NodeId> {
        let root = self.root?;
        self.preorder(root)
            .into_iter()
            .find(|id| self.key(*id) == Some(key))
    }

    /// Copies the node and its descendants into a new tree
    pub fn subtree(&self, id: NodeId) -> ClauseResult<Tree<N>> {
        let mut out = Tree::new();
        let entry = self.entry(id)?;
        let root = out.alloc(entry.node.clone(), entry.key.clone(), None);
        out.root = Some(root);
        self.copy_children(id, &mut out, root)?;
        Ok(out)
    }

    fn copy_children(&self, from: NodeId, out: &mut Tree<N>, to: NodeId) -> ClauseResult<()> {
        for child in self.children(from) {
            let entry = self.entry(*child)?;
            let copied = out.alloc(entry.node.clone(), entry.key.clone(), Some(to));
            out.entry_mut(to)?.children.push(copied);
            self.copy_children(*child, out, copied)?;
        }
        Ok(())
    }

    /// Copies `other` below `parent`, or as root of an empty tree when `parent` is `None`.
    ///
    /// Every copied node goes through `check_child`. Returns the id of the copied root.
    pub fn graft(&mut self, other: &Tree<N>, parent: Option<NodeId>) -> ClauseResult<Option<NodeId>> {
        let Some(other_root) = other.root() else {
            return Ok(None);
        };
        let entry = other.entry(other_root)?;
        let copied = match parent {
            Some(parent) => self.insert(entry.node.clone(), parent, entry.key.clone())?,
            None => self.insert_root(entry.node.clone(), entry.key.clone())?,
        };
        self.graft_children(other, other_root, copied)?;
        Ok(Some(copied))
    }

    fn graft_children(&mut self, other: &Tree<N>, from: NodeId, to: NodeId) -> ClauseResult<()> {
        for child in other.children(from) {
            let entry = other.entry(*child)?;
            let copied = self.insert(entry.node.clone(), to, entry.key.clone())?;
            self.graft_children(other, *child, copied)?;
        }
        Ok(())
    }

    /// Detaches the node from its parent; the subtree stays in the arena until reattached
    pub fn detach(&mut self, id: NodeId) -> ClauseResult<()> {
        let parent = self.entry(id)?.parent;
        match parent {
            Some(parent) => {
                self.entry_mut(parent)?.children.retain(|c| *c != id);
                self.entry_mut(id)?.parent = None;
            }
            None if self.root == Some(id) => self.root = None,
            None => {}
        }
        Ok(())
    }

    /// Attaches a detached node as last child of `parent`
    pub fn attach(&mut self, id: NodeId, parent: NodeId) -> ClauseResult<()> {
        if self.entry(id)?.parent.is_some() || self.root == Some(id) {
            return Err(ClauseError::InvalidParent {
                parent: parent.to_string(),
                child: format!("attached node {}", id),
            });
        }
        if self.ancestors(parent, true).contains(&id) {
            return Err(ClauseError::InvalidParent {
                parent: parent.to_string(),
                child: format!("its own ancestor {}", id),
            });
        }
        let parent_entry = self.entry(parent)?;
        parent_entry
            .node
            .check_child(&self.entry(id)?.node, parent_entry.children.len())?;
        self.entry_mut(parent)?.children.push(id);
        self.entry_mut(id)?.parent = Some(parent);
        Ok(())
    }

    /// Moves a node, with its subtree, to the end of `new_parent`'s children
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId) -> ClauseResult<()> {
        if self.ancestors(new_parent, true).contains(&id) {
            return Err(ClauseError::InvalidParent {
                parent: new_parent.to_string(),
                child: format!("its own ancestor {}", id),
            });
        }
        let previous = self.parent(id);
        let was_root = self.root == Some(id);
        self.detach(id)?;
        if let Err(err) = self.attach(id, new_parent) {
            // restore the previous position before reporting
            if let Some(previous) = previous {
                self.entry_mut(previous)?.children.push(id);
                self.entry_mut(id)?.parent = Some(previous);
            } else if was_root {
                self.root = Some(id);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Removes the node and its descendants, returning them as a new tree
    pub fn remove(&mut self, id: NodeId) -> ClauseResult<Tree<N>> {
        let removed = self.subtree(id)?;
        self.detach(id)?;
        for dropped in self.preorder(id) {
            self.entries[dropped.0] = None;
        }
        Ok(removed)
    }

    /// Replaces the payload of a node, returning the previous payload
    pub fn replace(&mut self, id: NodeId, node: N) -> ClauseResult<N> {
        Ok(std::mem::replace(&mut self.entry_mut(id)?.node, node))
    }

    /// Text rendering of the whole tree
    pub fn render(&self) -> String {
        render::render(self)
    }
}
