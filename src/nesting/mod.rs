//! Nested-scope resolver
//!
//! Reconciles where a field-referencing clause is anchored (the nested scopes
//! of its field) with where it is inserted (the scope at the insertion point).
//! The same algorithm serves query and aggregation trees; only the concrete
//! wrapper clauses differ.

mod resolver;

pub use resolver::{
    current_scope, plan, reconcile, ScopeBoundary, ScopePlan, ScopeWrapper, ScopedNode,
};
