//! Per-clause field type rules
//!
//! Each registered clause type carries a `TypeRule` deciding which declared
//! field types it may target.

use super::types::FieldType;

pub const NUMERIC: &[FieldType] = &[
    FieldType::Long,
    FieldType::Integer,
    FieldType::Short,
    FieldType::Byte,
    FieldType::Double,
    FieldType::Float,
    FieldType::HalfFloat,
    FieldType::ScaledFloat,
    FieldType::UnsignedLong,
];

pub const NUMERIC_OR_DATE: &[FieldType] = &[
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
];

pub const DATES: &[FieldType] = &[FieldType::Date, FieldType::DateNanos];

pub const GEO: &[FieldType] = &[FieldType::GeoPoint, FieldType::GeoShape];

pub const STRINGS: &[FieldType] = &[
    FieldType::Text,
    FieldType::Keyword,
    FieldType::ConstantKeyword,
    FieldType::Wildcard,
    FieldType::SearchAsYouType,
];

pub const CONTAINERS: &[FieldType] = &[FieldType::Object, FieldType::Nested];

/// Terms-like aggregations cannot run on analyzed text or containers
pub const NOT_TERMS: &[FieldType] = &[
    FieldType::Text,
    FieldType::Object,
    FieldType::Nested,
    FieldType::Binary,
    FieldType::GeoShape,
];

/// Allowed/denied field types for a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRule {
    /// Any declared type
    Any,
    /// Only the listed types
    AllowOnly(&'static [FieldType]),
    /// Every type except the listed ones
    Deny(&'static [FieldType]),
}

impl TypeRule {
    /// Returns true if the rule accepts the field type
    pub fn accepts(&self, field_type: FieldType) -> bool {
        match self {
            TypeRule::Any => true,
            TypeRule::AllowOnly(allowed) => allowed.contains(&field_type),
            TypeRule::Deny(denied) => !denied.contains(&field_type),
        }
    }
}

/// Returns true if a clause with this rule may target a field of this type
pub fn is_valid_on(rule: TypeRule, field_type: FieldType) -> bool {
    rule.accepts(field_type)
}
