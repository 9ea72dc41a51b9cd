//! Field type definitions
//!
//! Leaf types are scalar/geo/range types. Two container types exist:
//! - object: transparent to nested scope
//! - nested: opens a new nested scope boundary

use std::fmt;

use serde_json::{Map, Value};

use crate::errors::{ClauseError, ClauseResult};

/// Field types supported in mapping declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldType {
    Text,
    Keyword,
    ConstantKeyword,
    Wildcard,
    SearchAsYouType,
    Long,
    Integer,
    Short,
    Byte,
    Double,
    Float,
    HalfFloat,
    ScaledFloat,
    UnsignedLong,
    Date,
    DateNanos,
    Boolean,
    Binary,
    Ip,
    GeoPoint,
    GeoShape,
    Completion,
    TokenCount,
    Flattened,
    Percolator,
    Join,
    Alias,
    IntegerRange,
    FloatRange,
    LongRange,
    DoubleRange,
    DateRange,
    IpRange,
    DenseVector,
    RankFeature,
    RankFeatures,
    Object,
    Nested,
}

const ALL_TYPES: &[FieldType] = &[
    FieldType::Text,
    FieldType::Keyword,
    FieldType::ConstantKeyword,
    FieldType::Wildcard,
    FieldType::SearchAsYouType,
    FieldType::Long,
    FieldType::Integer,
    FieldType::Short,
    FieldType::Byte,
    FieldType::Double,
    FieldType::Float,
    FieldType::HalfFloat,
    FieldType::ScaledFloat,
    FieldType::UnsignedLong,
    FieldType::Date,
    FieldType::DateNanos,
    FieldType::Boolean,
    FieldType::Binary,
    FieldType::Ip,
    FieldType::GeoPoint,
    FieldType::GeoShape,
    FieldType::Completion,
    FieldType::TokenCount,
    FieldType::Flattened,
    FieldType::Percolator,
    FieldType::Join,
    FieldType::Alias,
    FieldType::IntegerRange,
    FieldType::FloatRange,
    FieldType::LongRange,
    FieldType::DoubleRange,
    FieldType::DateRange,
    FieldType::IpRange,
    FieldType::DenseVector,
    FieldType::RankFeature,
    FieldType::RankFeatures,
    FieldType::Object,
    FieldType::Nested,
];

impl FieldType {
    /// Returns the type name as written in mapping declarations
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::ConstantKeyword => "constant_keyword",
            FieldType::Wildcard => "wildcard",
            FieldType::SearchAsYouType => "search_as_you_type",
            FieldType::Long => "long",
            FieldType::Integer => "integer",
            FieldType::Short => "short",
            FieldType::Byte => "byte",
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::HalfFloat => "half_float",
            FieldType::ScaledFloat => "scaled_float",
            FieldType::UnsignedLong => "unsigned_long",
            FieldType::Date => "date",
            FieldType::DateNanos => "date_nanos",
            FieldType::Boolean => "boolean",
            FieldType::Binary => "binary",
            FieldType::Ip => "ip",
            FieldType::GeoPoint => "geo_point",
            FieldType::GeoShape => "geo_shape",
            FieldType::Completion => "completion",
            FieldType::TokenCount => "token_count",
            FieldType::Flattened => "flattened",
            FieldType::Percolator => "percolator",
            FieldType::Join => "join",
            FieldType::Alias => "alias",
            FieldType::IntegerRange => "integer_range",
            FieldType::FloatRange => "float_range",
            FieldType::LongRange => "long_range",
            FieldType::DoubleRange => "double_range",
            FieldType::DateRange => "date_range",
            FieldType::IpRange => "ip_range",
            FieldType::DenseVector => "dense_vector",
            FieldType::RankFeature => "rank_feature",
            FieldType::RankFeatures => "rank_features",
            FieldType::Object => "object",
            FieldType::Nested => "nested",
        }
    }

    /// Parses a declared type name
    pub fn parse(name: &str) -> ClauseResult<Self> {
        ALL_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| ClauseError::UnknownFieldType(name.to_string()))
    }

    /// Object and nested fields hold sub-properties
    pub fn is_container(&self) -> bool {
        matches!(self, FieldType::Object | FieldType::Nested)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A declared field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Name relative to the parent container
    pub name: String,
    /// Dot-joined path from the document root
    pub path: String,
    /// Declared type
    pub field_type: FieldType,
    /// Alternate analyses declared under `fields`, by subfield name
    pub subfields: Vec<Subfield>,
    /// Remaining declaration attributes (analyzer, format, dynamic, ...)
    pub params: Map<String, Value>,
}

/// Multi-field declared under a field's `fields`
#[derive(Debug, Clone, PartialEq)]
pub struct Subfield {
    pub name: String,
    pub field_type: FieldType,
    pub params: Map<String, Value>,
}

impl Field {
    /// Looks up a subfield by name
    pub fn subfield(&self, name: &str) -> Option<&Subfield> {
        self.subfields.iter().find(|s| s.name == name)
    }

    /// Returns true if the field opens a nested scope
    pub fn is_nested(&self) -> bool {
        self.field_type == FieldType::Nested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_round_trip() {
        for t in ALL_TYPES {
            assert_eq!(FieldType::parse(t.as_str()).unwrap(), *t);
        }
    }

    #[test]
    fn test_unknown_type() {
        let err = FieldType::parse("string").unwrap_err();
        assert_eq!(err, ClauseError::UnknownFieldType("string".into()));
    }

    #[test]
    fn test_containers() {
        assert!(FieldType::Nested.is_container());
        assert!(FieldType::Object.is_container());
        assert!(!FieldType::Keyword.is_container());
    }
}
