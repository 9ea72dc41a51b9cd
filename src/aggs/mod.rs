//! Aggregation clause engine
//!
//! Bucket, metric and pipeline aggregations in direct parent-child nesting,
//! with a grouping pointer marking the current insertion level.
//! `nested`/`reverse_nested` wrappers are synthesized where field scopes
//! require them.

#[allow(clippy::module_inception)]
mod aggs;
pub mod builders;
mod clauses;
mod codec;

pub use aggs::Aggs;
pub use builders::AggInput;
pub use clauses::{
    register_builtin, AggClause, AggFamily, AggKind, AggNode, AggRegistry, FilterRule,
};
pub use codec::{children_to_json, clause_to_json, parse_aggs, parse_clause};
