//! Field schema index
//!
//! Parses a nested field-mapping declaration into a queryable index:
//! field path → type, subfield presence, and the nested scopes enclosing the path.
//!
//! # Scope rules
//!
//! - `nested` fields open a new nested scope boundary
//! - `object` fields are transparent to scope
//! - subfields (`fields`) share the scope of the field declaring them

mod index;
mod loader;
mod rules;
mod types;

pub use index::{MappingNode, Mappings};
pub use rules::{
    is_valid_on, TypeRule, CONTAINERS, DATES, GEO, NOT_TERMS, NUMERIC, NUMERIC_OR_DATE, STRINGS,
};
pub use types::{Field, FieldType, Subfield};
