//! Builder configuration
//!
//! Loaded from a JSON file. Every field is optional:
//!
//! ```json
//! {
//!   "nested_autocorrect": true,
//!   "default_merge_mode": "add",
//!   "tabular": {"include_single_bucket": false, "value_column": "doc_count"},
//!   "mappings_path": "./mappings.json"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ClauseError, ClauseResult};
use crate::mappings::Mappings;
use crate::query::MergeMode;

/// Options for tabular response output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularConfig {
    /// Keep single-bucket aggregations as index columns
    #[serde(default)]
    pub include_single_bucket: bool,

    /// Column holding each row's bucket value
    #[serde(default = "default_value_column")]
    pub value_column: String,
}

fn default_value_column() -> String {
    "doc_count".to_string()
}

fn default_nested_autocorrect() -> bool {
    true
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            include_single_bucket: false,
            value_column: default_value_column(),
        }
    }
}

/// Builder configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Synthesize nested/reverse_nested wrappers instead of failing
    #[serde(default = "default_nested_autocorrect")]
    pub nested_autocorrect: bool,

    /// Merge mode used when an insertion does not name one
    #[serde(default)]
    pub default_merge_mode: MergeMode,

    #[serde(default)]
    pub tabular: TabularConfig,

    /// Mapping declaration to load
    #[serde(default)]
    pub mappings_path: Option<PathBuf>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            nested_autocorrect: default_nested_autocorrect(),
            default_merge_mode: MergeMode::default(),
            tabular: TabularConfig::default(),
            mappings_path: None,
        }
    }
}

impl BuilderConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> ClauseResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ClauseError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json_str(&content)?;
        debug!(path = %path.display(), "loaded builder configuration");
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_json_str(content: &str) -> ClauseResult<Self> {
        let config: BuilderConfig = serde_json::from_str(content)
            .map_err(|e| ClauseError::InvalidConfig(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ClauseResult<()> {
        if self.tabular.value_column.trim().is_empty() {
            return Err(ClauseError::InvalidConfig(
                "tabular.value_column must not be empty".to_string(),
            ));
        }
        if let Some(path) = &self.mappings_path {
            if path.as_os_str().is_empty() {
                return Err(ClauseError::InvalidConfig(
                    "mappings_path must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Loads the configured mapping declaration, if any
    pub fn load_mappings(&self) -> ClauseResult<Option<Mappings>> {
        self.mappings_path
            .as_deref()
            .map(Mappings::from_file)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = BuilderConfig::from_json_str("{}").unwrap();
        assert!(config.nested_autocorrect);
        assert_eq!(config.default_merge_mode, MergeMode::Add);
        assert_eq!(config.tabular.value_column, "doc_count");
        assert!(!config.tabular.include_single_bucket);
        assert_eq!(config, BuilderConfig::default());
    }

    #[test]
    fn test_merge_mode_names() {
        let config =
            BuilderConfig::from_json_str(r#"{"default_merge_mode": "replace_all"}"#).unwrap();
        assert_eq!(config.default_merge_mode, MergeMode::ReplaceAll);

        let err = BuilderConfig::from_json_str(r#"{"default_merge_mode": "upsert"}"#).unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    #[test]
    fn test_empty_value_column_rejected() {
        let err =
            BuilderConfig::from_json_str(r#"{"tabular": {"value_column": ""}}"#).unwrap_err();
        assert!(matches!(err, ClauseError::InvalidConfig(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"nested_autocorrect": false}}"#).unwrap();
        let config = BuilderConfig::load(file.path()).unwrap();
        assert!(!config.nested_autocorrect);
        assert!(config.load_mappings().unwrap().is_none());
    }

    #[test]
    fn test_missing_file() {
        let err = BuilderConfig::load(Path::new("/nonexistent/clausetree.json")).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Config);
    }
}
