//! Nested-scope reconciliation
//!
//! Each tree position has a current scope (the nearest scope boundary among its
//! ancestors) and each field reference a required scope (its deepest enclosing
//! nested field). `reconcile` computes the wrappers needed to go from one to
//! the other and inserts them through a [`ScopeWrapper`] adapter, reusing
//! existing wrappers before creating new ones.

use tracing::debug;

use crate::errors::{ClauseError, ClauseResult};
use crate::mappings::Mappings;
use crate::tree::{NodeId, Tree, TreeNode};

/// Scope boundary carried by a clause node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeBoundary {
    /// Enters the nested scope at this path
    Enter(String),
    /// Leaves nested scopes, up to the given path or the document root
    Exit(Option<String>),
}

/// Node types that may act as scope boundaries
pub trait ScopedNode {
    fn scope_boundary(&self) -> Option<ScopeBoundary>;
}

/// Nested scope in effect at `at`, `None` meaning the document root
pub fn current_scope<N: TreeNode + ScopedNode>(tree: &Tree<N>, at: Option<NodeId>) -> Option<String> {
    let at = at?;
    for id in tree.ancestors(at, true) {
        match tree.get(id).ok().and_then(ScopedNode::scope_boundary) {
            Some(ScopeBoundary::Enter(path)) => return Some(path),
            Some(ScopeBoundary::Exit(target)) => return target,
            None => {}
        }
    }
    None
}

/// Wrappers needed to move from the current scope to a required scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopePlan {
    /// Scopes already match
    Direct,
    /// Open the listed scopes, shallowest first
    Enter(Vec<String>),
    /// Exit to `to`, then open `then_enter`, shallowest first
    Exit {
        to: Option<String>,
        then_enter: Vec<String>,
    },
}

impl ScopePlan {
    /// Boundaries to cross, in insertion order
    pub fn steps(&self) -> Vec<ScopeBoundary> {
        match self {
            ScopePlan::Direct => Vec::new(),
            ScopePlan::Enter(scopes) => scopes.iter().cloned().map(ScopeBoundary::Enter).collect(),
            ScopePlan::Exit { to, then_enter } => std::iter::once(ScopeBoundary::Exit(to.clone()))
                .chain(then_enter.iter().cloned().map(ScopeBoundary::Enter))
                .collect(),
        }
    }
}

fn is_within(scope: &str, outer: &str) -> bool {
    scope.len() > outer.len() && scope.starts_with(outer) && scope[outer.len()..].starts_with('.')
}

/// Plans the crossing from `current` to `required` (deepest first)
pub fn plan(current: Option<&str>, required: &[String]) -> ScopePlan {
    let target = required.first().map(String::as_str);
    if current == target {
        return ScopePlan::Direct;
    }
    let Some(current) = current else {
        return ScopePlan::Enter(required.iter().rev().cloned().collect());
    };
    if let Some(pos) = required.iter().position(|scope| scope == current) {
        // current scope encloses the field: open the deeper ones
        return ScopePlan::Enter(required[..pos].iter().rev().cloned().collect());
    }
    match required.iter().position(|scope| is_within(current, scope)) {
        Some(common) => ScopePlan::Exit {
            to: Some(required[common].clone()),
            then_enter: required[..common].iter().rev().cloned().collect(),
        },
        None => ScopePlan::Exit {
            to: None,
            then_enter: required.iter().rev().cloned().collect(),
        },
    }
}

/// Engine-specific wrapper handling used by [`reconcile`]
pub trait ScopeWrapper {
    /// Insertion position understood by the engine
    type Position: Clone + std::fmt::Debug;

    /// Current scope at a position
    fn scope_at(&self, pos: &Self::Position) -> Option<String>;

    /// Existing wrapper for `boundary` directly below `pos`, as the position inside it
    fn find_wrapper(&self, pos: &Self::Position, boundary: &ScopeBoundary) -> Option<Self::Position>;

    /// Synthesizes a wrapper below `pos`; `Ok(None)` if the engine cannot express it
    fn open_wrapper(
        &mut self,
        pos: &Self::Position,
        boundary: &ScopeBoundary,
    ) -> ClauseResult<Option<Self::Position>>;
}

/// Returns the position where a clause on `field` must be inserted, creating
/// wrappers below `pos` as needed.
///
/// Idempotent: wrappers already present are reused, so re-running the same
/// insertion against a corrected tree adds no wrapper.
pub fn reconcile<W: ScopeWrapper>(
    wrapper: &mut W,
    pos: W::Position,
    field: &str,
    mappings: &Mappings,
    autocorrect: bool,
) -> ClauseResult<W::Position> {
    let required = mappings.nested_scopes_for(field)?;
    let current = wrapper.scope_at(&pos);
    let scope_plan = plan(current.as_deref(), &required);
    if scope_plan == ScopePlan::Direct {
        return Ok(pos);
    }

    let nesting_error = || ClauseError::InvalidNesting {
        field: field.to_string(),
        current: current.clone(),
        required: required.first().cloned(),
    };
    if !autocorrect {
        return Err(nesting_error());
    }

    let mut pos = pos;
    for boundary in scope_plan.steps() {
        pos = match wrapper.find_wrapper(&pos, &boundary) {
            Some(inner) => {
                debug!(field, ?boundary, "reusing scope wrapper");
                inner
            }
            None => {
                debug!(field, ?boundary, "synthesizing scope wrapper");
                wrapper.open_wrapper(&pos, &boundary)?.ok_or_else(nesting_error)?
            }
        };
    }
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plan_direct() {
        assert_eq!(plan(None, &[]), ScopePlan::Direct);
        assert_eq!(plan(Some("a"), &scopes(&["a"])), ScopePlan::Direct);
    }

    #[test]
    fn test_plan_enter_from_root() {
        assert_eq!(
            plan(None, &scopes(&["a.b", "a"])),
            ScopePlan::Enter(scopes(&["a", "a.b"]))
        );
    }

    #[test]
    fn test_plan_enter_from_enclosing_scope() {
        assert_eq!(
            plan(Some("a"), &scopes(&["a.b", "a"])),
            ScopePlan::Enter(scopes(&["a.b"]))
        );
    }

    #[test]
    fn test_plan_exit_to_root() {
        assert_eq!(
            plan(Some("a"), &[]),
            ScopePlan::Exit {
                to: None,
                then_enter: vec![]
            }
        );
    }

    #[test]
    fn test_plan_exit_to_enclosing_scope() {
        assert_eq!(
            plan(Some("a.b"), &scopes(&["a"])),
            ScopePlan::Exit {
                to: Some("a".into()),
                then_enter: vec![]
            }
        );
    }

    #[test]
    fn test_plan_sibling_scope() {
        let p = plan(Some("a.b"), &scopes(&["a.c", "a"]));
        assert_eq!(
            p,
            ScopePlan::Exit {
                to: Some("a".into()),
                then_enter: scopes(&["a.c"])
            }
        );
        assert_eq!(
            p.steps(),
            vec![
                ScopeBoundary::Exit(Some("a".into())),
                ScopeBoundary::Enter("a.c".into())
            ]
        );
    }

    #[test]
    fn test_plan_unrelated_scope() {
        assert_eq!(
            plan(Some("x"), &scopes(&["a"])),
            ScopePlan::Exit {
                to: None,
                then_enter: scopes(&["a"])
            }
        );
    }

    #[test]
    fn test_prefix_is_not_enclosing() {
        // "ab" is not within "a"
        assert_eq!(
            plan(Some("ab"), &scopes(&["a"])),
            ScopePlan::Exit {
                to: None,
                then_enter: scopes(&["a"])
            }
        );
    }
}
