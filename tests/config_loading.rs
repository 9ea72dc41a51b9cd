//! Configuration Loading Tests
//!
//! Builder configuration files:
//! - every field is optional
//! - invalid values are rejected with a CONFIG error
//! - the configured mapping file is loaded on request
//! - engines pick up autocorrection and merge defaults

use std::io::Write;

use clausetree::query::{InsertOptions, MergeMode};
use clausetree::response::{AggResponse, TabularOptions};
use clausetree::{Aggs, BuilderConfig, ErrorCategory, Query};
use serde_json::json;
use tempfile::{NamedTempFile, TempDir};

// =============================================================================
// Helper Functions
// =============================================================================

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

// =============================================================================
// Parsing
// =============================================================================

#[test]
fn test_full_config() {
    let file = write_config(
        r#"{
            "nested_autocorrect": false,
            "default_merge_mode": "replace",
            "tabular": {"include_single_bucket": true, "value_column": "count"}
        }"#,
    );
    let config = BuilderConfig::load(file.path()).unwrap();
    assert!(!config.nested_autocorrect);
    assert_eq!(config.default_merge_mode, MergeMode::Replace);
    assert!(config.tabular.include_single_bucket);
    assert_eq!(config.tabular.value_column, "count");
    assert_eq!(config.mappings_path, None);
}

#[test]
fn test_empty_config_uses_defaults() {
    let file = write_config("{}");
    assert_eq!(BuilderConfig::load(file.path()).unwrap(), BuilderConfig::default());
}

#[test]
fn test_invalid_configs() {
    for content in [
        "not json",
        r#"{"default_merge_mode": "upsert"}"#,
        r#"{"tabular": {"value_column": " "}}"#,
        r#"{"mappings_path": ""}"#,
    ] {
        let file = write_config(content);
        let err = BuilderConfig::load(file.path()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Config, "accepted {}", content);
        assert_eq!(err.code(), "CONFIG_INVALID");
    }
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let err = BuilderConfig::load(&dir.path().join("absent.json")).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Config);
}

// =============================================================================
// Mappings
// =============================================================================

#[test]
fn test_configured_mappings_loaded() {
    let dir = TempDir::new().unwrap();
    let mappings_path = dir.path().join("mappings.json");
    std::fs::write(
        &mappings_path,
        json!({"movies": {"mappings": {"properties": {"year": {"type": "integer"}}}}}).to_string(),
    )
    .unwrap();
    let config = BuilderConfig::from_json_str(
        &json!({"mappings_path": mappings_path}).to_string(),
    )
    .unwrap();
    let mappings = config.load_mappings().unwrap().unwrap();
    assert!(mappings.contains("year"));
}

#[test]
fn test_no_mappings_configured() {
    assert!(BuilderConfig::default().load_mappings().unwrap().is_none());
}

#[test]
fn test_configured_mappings_file_missing() {
    let config = BuilderConfig::from_json_str(r#"{"mappings_path": "/nonexistent/mappings.json"}"#).unwrap();
    assert_eq!(
        config.load_mappings().unwrap_err().code(),
        "DESERIALIZATION_MALFORMED"
    );
}

// =============================================================================
// Applying Configuration
// =============================================================================

#[test]
fn test_merge_default_applied() {
    let config = BuilderConfig::from_json_str(r#"{"default_merge_mode": "replace"}"#).unwrap();
    let q = Query::new()
        .with_config(&config)
        .query(json!({"bool": {"_name": "b", "must": [{"term": {"a": 1}}]}}))
        .unwrap()
        .insert(json!({"bool": {"must": [{"term": {"b": 2}}]}}), InsertOptions::on("b"))
        .unwrap();
    assert_eq!(
        q.to_json().unwrap(),
        json!({"bool": {"_name": "b", "must": [{"term": {"b": 2}}]}})
    );
}

#[test]
fn test_tabular_options_from_config() {
    let config = BuilderConfig::from_json_str(r#"{"tabular": {"value_column": "hits"}}"#).unwrap();
    let aggs = Aggs::new()
        .with_config(&config)
        .groupby(json!({"by_tag": {"terms": {"field": "tag"}}}), None)
        .unwrap();
    let response = AggResponse::parse(
        &aggs,
        &json!({"by_tag": {"buckets": [{"key": "x", "doc_count": 7}]}}),
    )
    .unwrap();
    let table = response
        .to_tabular(&TabularOptions::from(&config.tabular))
        .unwrap();
    assert_eq!(table.rows[0].values["hits"], json!(7));
    assert!(table.rows[0].values.get("doc_count").is_none());
}
