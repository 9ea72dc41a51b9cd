//! clausetree - builder, validator and denormalizer for search-engine clause trees
//!
//! Query and aggregation trees are composed against a field mapping, placed
//! under the `nested` scopes their fields require, serialized to the engine's
//! JSON, and aggregation responses are parsed back into rows, normalized trees
//! and per-bucket filter queries.

pub mod aggs;
pub mod cli;
pub mod config;
pub mod errors;
pub mod mappings;
pub mod nesting;
pub mod query;
pub mod response;
pub mod tree;

pub use aggs::{AggInput, Aggs};
pub use config::{BuilderConfig, TabularConfig};
pub use errors::{ClauseError, ClauseResult, ErrorCategory};
pub use mappings::{FieldType, Mappings};
pub use query::{InsertOptions, MergeMode, Query, QueryInput, Target};
pub use response::{AggResponse, ResponseTree, Tabular, TabularOptions};
pub use tree::{NodeId, Tree, TreeNode};
