//! Error taxonomy shared by the clause tree engines
//!
//! Categories:
//! - SCHEMA: field absent from the mappings, or clause not applicable on its type
//! - STRUCTURAL: invalid tree placement or addressing
//! - NESTING: nested scope mismatch that may not be corrected
//! - MERGE: incompatible compound merge
//! - DESERIALIZATION: malformed clause, mapping or response JSON
//! - CONFIG: invalid builder configuration
//!
//! All errors are raised synchronously and abort the builder call before any
//! tree is returned, so the tree the call was made on stays valid.

use std::fmt;

use thiserror::Error;

/// High-level error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Schema,
    Structural,
    Nesting,
    Merge,
    Deserialization,
    Config,
}

impl ErrorCategory {
    /// Returns the category name used as error code prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Schema => "SCHEMA",
            ErrorCategory::Structural => "STRUCTURAL",
            ErrorCategory::Nesting => "NESTING",
            ErrorCategory::Merge => "MERGE",
            ErrorCategory::Deserialization => "DESERIALIZATION",
            ErrorCategory::Config => "CONFIG",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised while building, merging, validating or decoding clause trees
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClauseError {
    // ==================
    // Schema
    // ==================
    /// Field path is absent from the mappings (direct and subfield forms)
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// Clause type is not permitted on the field's declared type
    #[error("Clause '{clause}' is not applicable on field '{field}' of type '{field_type}'")]
    InvalidFieldType {
        clause: String,
        field: String,
        field_type: String,
    },

    // ==================
    // Structural
    // ==================
    /// Addressed node does not exist
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    /// Parent does not accept this kind of child
    #[error("Cannot insert {child} below {parent}")]
    InvalidParent { parent: String, child: String },

    /// Parameter slot placed below another parameter slot
    #[error("Parameter '{0}' cannot be placed under another parameter")]
    ParameterUnderParameter(String),

    /// Parameter key not allowed for the compound type
    #[error("Unknown parameter '{param}' for '{clause}' clause")]
    UnknownParameter { clause: String, param: String },

    /// Single-valued parameter slot already holds a clause
    #[error("Parameter '{0}' accepts a single clause and is already occupied")]
    SlotOccupied(String),

    /// Aggregation name used twice in the same tree
    #[error("Aggregation name '{0}' is already used")]
    DuplicateName(String),

    /// Insertion target cannot be derived without an explicit target
    #[error("Ambiguous insertion: {0}")]
    AmbiguousInsertion(String),

    /// Tree already has a root node
    #[error("Tree already has a root")]
    RootOccupied,

    /// Bucket key cannot be translated into a filter for this aggregation type
    #[error("Cannot derive a filter from '{agg}' buckets of type '{kind}'")]
    UnsupportedBucketFilter { agg: String, kind: String },

    // ==================
    // Nesting
    // ==================
    /// Field scope differs from the scope at the insertion point
    #[error("Field '{field}' requires nested scope {required:?}, insertion point is in scope {current:?}")]
    InvalidNesting {
        field: String,
        current: Option<String>,
        required: Option<String>,
    },

    // ==================
    // Merge
    // ==================
    /// Compound clauses of different kinds
    #[error("Cannot merge '{incoming}' clause onto '{existing}' clause")]
    MergeMismatch { existing: String, incoming: String },

    /// Merge mode is not one of add, replace, replace_all
    #[error("Unsupported merge mode '{0}'")]
    UnsupportedMergeMode(String),

    // ==================
    // Deserialization
    // ==================
    /// Malformed JSON input (wrong key cardinality, wrong value type, ...)
    #[error("Malformed input: {0}")]
    Malformed(String),

    /// Clause type tag is not registered
    #[error("Unknown clause type '{0}'")]
    UnknownClauseType(String),

    /// Mapping type is not supported
    #[error("Unknown field type '{0}'")]
    UnknownFieldType(String),

    // ==================
    // Config
    // ==================
    /// Configuration file could not be read or is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClauseError {
    /// Returns the category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClauseError::UnknownField(_) | ClauseError::InvalidFieldType { .. } => {
                ErrorCategory::Schema
            }
            ClauseError::NodeNotFound(_)
            | ClauseError::InvalidParent { .. }
            | ClauseError::ParameterUnderParameter(_)
            | ClauseError::UnknownParameter { .. }
            | ClauseError::SlotOccupied(_)
            | ClauseError::DuplicateName(_)
            | ClauseError::AmbiguousInsertion(_)
            | ClauseError::RootOccupied
            | ClauseError::UnsupportedBucketFilter { .. } => ErrorCategory::Structural,
            ClauseError::InvalidNesting { .. } => ErrorCategory::Nesting,
            ClauseError::MergeMismatch { .. } | ClauseError::UnsupportedMergeMode(_) => {
                ErrorCategory::Merge
            }
            ClauseError::Malformed(_)
            | ClauseError::UnknownClauseType(_)
            | ClauseError::UnknownFieldType(_) => ErrorCategory::Deserialization,
            ClauseError::InvalidConfig(_) => ErrorCategory::Config,
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ClauseError::UnknownField(_) => "SCHEMA_UNKNOWN_FIELD",
            ClauseError::InvalidFieldType { .. } => "SCHEMA_INVALID_FIELD_TYPE",
            ClauseError::NodeNotFound(_) => "STRUCTURAL_NODE_NOT_FOUND",
            ClauseError::InvalidParent { .. } => "STRUCTURAL_INVALID_PARENT",
            ClauseError::ParameterUnderParameter(_) => "STRUCTURAL_PARAMETER_UNDER_PARAMETER",
            ClauseError::UnknownParameter { .. } => "STRUCTURAL_UNKNOWN_PARAMETER",
            ClauseError::SlotOccupied(_) => "STRUCTURAL_SLOT_OCCUPIED",
            ClauseError::DuplicateName(_) => "STRUCTURAL_DUPLICATE_NAME",
            ClauseError::AmbiguousInsertion(_) => "STRUCTURAL_AMBIGUOUS_INSERTION",
            ClauseError::RootOccupied => "STRUCTURAL_ROOT_OCCUPIED",
            ClauseError::UnsupportedBucketFilter { .. } => "STRUCTURAL_UNSUPPORTED_BUCKET_FILTER",
            ClauseError::InvalidNesting { .. } => "NESTING_INVALID_SCOPE",
            ClauseError::MergeMismatch { .. } => "MERGE_KIND_MISMATCH",
            ClauseError::UnsupportedMergeMode(_) => "MERGE_UNSUPPORTED_MODE",
            ClauseError::Malformed(_) => "DESERIALIZATION_MALFORMED",
            ClauseError::UnknownClauseType(_) => "DESERIALIZATION_UNKNOWN_CLAUSE_TYPE",
            ClauseError::UnknownFieldType(_) => "DESERIALIZATION_UNKNOWN_FIELD_TYPE",
            ClauseError::InvalidConfig(_) => "CONFIG_INVALID",
        }
    }

    /// Shorthand for a malformed-input error
    pub fn malformed(reason: impl Into<String>) -> Self {
        ClauseError::Malformed(reason.into())
    }
}

/// Result type for clause tree operations
pub type ClauseResult<T> = Result<T, ClauseError>;
