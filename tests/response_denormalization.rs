//! Response Denormalization Tests
//!
//! Raw aggregation responses turned back into:
//! - tabular rows indexed by bucket keys
//! - a normalized tree
//! - per-bucket filter queries respecting nested scopes

use std::sync::Arc;

use clausetree::response::{AggResponse, TabularOptions};
use clausetree::{Aggs, Mappings, Query};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn mappings() -> Arc<Mappings> {
    Arc::new(
        Mappings::from_json(&json!({
            "properties": {
                "classification_type": {"type": "keyword"},
                "global_metrics": {"properties": {
                    "field": {"properties": {"name": {"type": "keyword"}}},
                    "score": {"type": "float"}
                }},
                "created": {"type": "date"},
                "roles": {
                    "type": "nested",
                    "properties": {
                        "gender": {"type": "keyword"},
                        "role": {"type": "keyword"}
                    }
                }
            }
        }))
        .unwrap(),
    )
}

fn type_and_field_aggs() -> Aggs {
    Aggs::new()
        .with_mappings(mappings())
        .groupby(json!({"by_type": {"terms": {"field": "classification_type"}}}), None)
        .unwrap()
        .groupby(json!({"by_field": {"terms": {"field": "global_metrics.field.name"}}}), None)
        .unwrap()
        .agg(json!({"avg_score": {"avg": {"field": "global_metrics.score"}}}), None)
        .unwrap()
}

fn type_and_field_response() -> Value {
    json!({"took": 4, "aggregations": {"by_type": {"buckets": [
        {"key": "multilabel", "doc_count": 4, "by_field": {"buckets": [
            {"key": "flavors", "doc_count": 3, "avg_score": {"value": 0.5}},
            {"key": "colors", "doc_count": 1, "avg_score": {"value": 0.25}}
        ]}},
        {"key": "binary", "doc_count": 2, "by_field": {"buckets": [
            {"key": "flavors", "doc_count": 2, "avg_score": {"value": 0.75}}
        ]}}
    ]}}})
}

// =============================================================================
// Tabular View
// =============================================================================

/// terms under terms gives one row per leaf bucket.
#[test]
fn test_terms_terms_rows() {
    let aggs = type_and_field_aggs();
    let response = AggResponse::parse(&aggs, &type_and_field_response()).unwrap();
    let table = response.to_tabular(&TabularOptions::default()).unwrap();

    assert_eq!(table.index_names, vec!["by_type", "by_field"]);
    assert_eq!(table.len(), 3);
    let keys: Vec<Vec<Value>> = table.rows.iter().map(|row| row.index.clone()).collect();
    assert_eq!(
        keys,
        vec![
            vec![json!("multilabel"), json!("flavors")],
            vec![json!("multilabel"), json!("colors")],
            vec![json!("binary"), json!("flavors")],
        ]
    );
    assert_eq!(table.rows[2].values["doc_count"], json!(2));
    assert_eq!(table.rows[2].values["avg_score"], json!(0.75));
}

/// Single-bucket levels join the index only when asked to.
#[test]
fn test_single_bucket_index_levels() {
    let aggs = Aggs::new()
        .groupby(json!({"recent": {"filter": {"range": {"created": {"gte": "now-1d"}}}}}), None)
        .unwrap()
        .groupby(json!({"by_type": {"terms": {"field": "classification_type"}}}), None)
        .unwrap();
    let raw = json!({"recent": {"doc_count": 3, "by_type": {"buckets": [
        {"key": "binary", "doc_count": 3}
    ]}}});
    let response = AggResponse::parse(&aggs, &raw).unwrap();

    let table = response.to_tabular(&TabularOptions::default()).unwrap();
    assert_eq!(table.index_names, vec!["by_type"]);
    assert_eq!(table.rows[0].index, vec![json!("binary")]);

    let options = TabularOptions {
        include_single_bucket: true,
        ..TabularOptions::default()
    };
    let table = response.to_tabular(&options).unwrap();
    assert_eq!(table.index_names, vec!["recent", "by_type"]);
    assert_eq!(table.rows[0].index, vec![Value::Null, json!("binary")]);
}

/// Grouping at the request level gives a single row of top-level values.
#[test]
fn test_metrics_only_single_row() {
    let aggs = Aggs::new()
        .agg(json!({"avg_score": {"avg": {"field": "global_metrics.score"}}}), None)
        .unwrap();
    let response = AggResponse::parse(&aggs, &json!({"avg_score": {"value": 0.5}})).unwrap();
    let table = response.to_tabular(&TabularOptions::default()).unwrap();
    assert!(table.index_names.is_empty());
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows[0].values["avg_score"], json!(0.5));
}

// =============================================================================
// Normalized View
// =============================================================================

/// Every bucket becomes a `{level, key, value, children}` node.
#[test]
fn test_normalized_tree() {
    let aggs = type_and_field_aggs();
    let response = AggResponse::parse(&aggs, &type_and_field_response()).unwrap();
    let normalized = response.to_normalized();

    assert_eq!(normalized["level"], "root");
    let types = normalized["children"].as_array().unwrap();
    assert_eq!(types.len(), 2);
    assert_eq!(types[0]["level"], "by_type");
    assert_eq!(types[0]["key"], "multilabel");
    assert_eq!(types[0]["value"], 4);
    let flavors = &types[0]["children"][0];
    assert_eq!(flavors["key"], "flavors");
    assert_eq!(flavors["children"][0], json!({
        "level": "avg_score", "key": null, "value": 0.5, "children": []
    }));
}

/// A response shaped differently from the declaration is rejected.
#[test]
fn test_keyed_mismatch_rejected() {
    let aggs = Aggs::new()
        .groupby(json!({"by_type": {"terms": {"field": "classification_type"}}}), None)
        .unwrap();
    let err = AggResponse::parse(&aggs, &json!({"by_type": {"buckets": {"a": {"doc_count": 1}}}}))
        .unwrap_err();
    assert_eq!(err.code(), "DESERIALIZATION_MALFORMED");
}

/// Named filters declared `keyed: false` answer with a list of named buckets.
#[test]
fn test_unkeyed_named_filters() {
    let aggs = Aggs::new()
        .groupby(
            json!({"kinds": {"filters": {
                "keyed": false,
                "filters": {"binary": {"term": {"classification_type": "binary"}}}
            }}}),
            None,
        )
        .unwrap();
    let raw = json!({"kinds": {"buckets": [{"key": "binary", "doc_count": 2}]}});
    let response = AggResponse::parse(&aggs, &raw).unwrap();
    let bucket = response.find_bucket(&[("kinds", json!("binary"))]).unwrap();
    assert_eq!(
        response.bucket_filter(bucket).unwrap().to_json().unwrap(),
        json!({"term": {"classification_type": "binary"}})
    );
}

// =============================================================================
// Bucket Filters
// =============================================================================

/// Root-level fields give a plain conjunction, with no nested wrapper.
#[test]
fn test_bucket_filter_root_fields() {
    let aggs = type_and_field_aggs();
    let response = AggResponse::parse(&aggs, &type_and_field_response()).unwrap();
    let bucket = response
        .find_bucket(&[("by_type", json!("multilabel")), ("by_field", json!("flavors"))])
        .unwrap();
    let filter = response.bucket_filter(bucket).unwrap().to_json().unwrap();
    assert_eq!(
        filter,
        json!({"bool": {"filter": [
            {"term": {"classification_type": "multilabel"}},
            {"term": {"global_metrics.field.name": "flavors"}}
        ]}})
    );
    assert!(!filter.to_string().contains("nested"));
}

/// Conditions on nested fields stay grouped under their scope.
#[test]
fn test_bucket_filter_nested_scope() {
    let aggs = Aggs::new()
        .with_mappings(mappings())
        .groupby(json!({"by_gender": {"terms": {"field": "roles.gender"}}}), None)
        .unwrap()
        .groupby(json!({"by_type": {"terms": {"field": "classification_type"}}}), None)
        .unwrap();
    let raw = json!({"nested_below_root": {"doc_count": 10, "by_gender": {"buckets": [
        {"key": "F", "doc_count": 6, "reverse_nested_below_by_gender": {"doc_count": 4, "by_type": {"buckets": [
            {"key": "binary", "doc_count": 4}
        ]}}}
    ]}}});
    let response = AggResponse::parse(&aggs, &raw).unwrap();
    let bucket = response
        .find_bucket(&[("by_gender", json!("F")), ("by_type", json!("binary"))])
        .unwrap();
    assert_eq!(
        response.bucket_filter(bucket).unwrap().to_json().unwrap(),
        json!({"bool": {"filter": [
            {"term": {"classification_type": "binary"}},
            {"nested": {"path": "roles", "query": {"term": {"roles.gender": "F"}}}}
        ]}})
    );
}

/// With a base query the bucket filter lands in its `filter` slot.
#[test]
fn test_bucket_filter_within_base_query() {
    let aggs = type_and_field_aggs();
    let base = Query::new()
        .with_mappings(mappings())
        .filter(json!({"range": {"created": {"gte": "2024-01-01"}}}))
        .unwrap();
    let response = AggResponse::parse(&aggs, &type_and_field_response())
        .unwrap()
        .with_query(base);
    let bucket = response.find_bucket(&[("by_type", json!("binary"))]).unwrap();
    assert_eq!(
        response.bucket_filter(bucket).unwrap().to_json().unwrap(),
        json!({"bool": {"filter": [
            {"range": {"created": {"gte": "2024-01-01"}}},
            {"term": {"classification_type": "binary"}}
        ]}})
    );
}

/// Metrics have no own condition: their filter is the enclosing bucket's.
#[test]
fn test_bucket_filter_of_metric_node() {
    let aggs = type_and_field_aggs();
    let response = AggResponse::parse(&aggs, &type_and_field_response()).unwrap();
    let metric = response.buckets_at("avg_score")[2];
    assert_eq!(response.bucket(metric).unwrap().value, json!(0.75));
    assert_eq!(
        response.bucket_filter(metric).unwrap().to_json().unwrap(),
        json!({"bool": {"filter": [
            {"term": {"classification_type": "binary"}},
            {"term": {"global_metrics.field.name": "flavors"}}
        ]}})
    );
}
