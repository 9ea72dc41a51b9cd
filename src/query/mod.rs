//! Query clause engine
//!
//! Builds, validates and auto-corrects search query clause trees:
//! - leaf clauses target a single field (or none)
//! - compound clauses hold children in named parameter slots
//! - `nested` clauses are synthesized where a field's scope requires them

pub mod builders;
mod clauses;
mod codec;
#[allow(clippy::module_inception)]
mod query;

pub use builders::QueryInput;
pub use clauses::{
    register_builtin, CompoundClause, CompoundKind, LeafClause, LeafKind, LeafShape, ParamSpec,
    ParameterSlot, QueryKind, QueryNode, QueryRegistry,
};
pub use codec::{clause_to_json, parse_query};
pub use query::{InsertOptions, MergeMode, Position, Query, Target};
