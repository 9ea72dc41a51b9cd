//! Loading mapping declarations from disk
//!
//! The file holds the declaration exactly as returned by the engine's
//! get-mapping endpoint, or the bare `{"properties": ...}` body.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::index::Mappings;
use crate::errors::{ClauseError, ClauseResult};

impl Mappings {
    /// Reads and parses a mapping declaration file
    pub fn from_file(path: &Path) -> ClauseResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ClauseError::malformed(format!(
                "failed to read mappings file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            ClauseError::malformed(format!(
                "invalid JSON in mappings file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mappings = Mappings::from_json(&value)?;
        debug!(path = %path.display(), fields = mappings.paths().count(), "loaded mappings");
        Ok(mappings)
    }
}
