//! JSON Round-Trip Tests
//!
//! Documents that need no correction come back unchanged:
//! - query DSL bodies
//! - aggregation declarations
//! - mapping declarations

use clausetree::aggs::parse_aggs;
use clausetree::query::parse_query;
use clausetree::{Aggs, Mappings, Query};
use serde_json::json;

// =============================================================================
// Queries
// =============================================================================

/// Compound queries with attributes, named clauses and every slot kind.
#[test]
fn test_query_round_trip() {
    let body = json!({"bool": {
        "minimum_should_match": 1,
        "boost": 1.5,
        "must": [{"match": {"title": {"query": "rust", "operator": "and"}}}],
        "should": [
            {"term": {"status": {"value": "published", "_name": "published"}}},
            {"terms": {"tags": ["a", "b"], "boost": 2}}
        ],
        "filter": [
            {"range": {"year": {"gte": 2000, "lt": 2010}}},
            {"constant_score": {"filter": {"exists": {"field": "cover"}}, "boost": 1.2}}
        ],
        "must_not": [{"dis_max": {"queries": [{"match_all": {}}, {"ids": {"values": ["1"]}}]}}]
    }});
    let q = Query::from_json(&body, None).unwrap();
    assert_eq!(q.to_json().unwrap(), body);
    assert!(q.find(&"published".into()).is_ok());
}

/// A slot given a single object is written back as a list.
#[test]
fn test_single_object_slot_becomes_list() {
    let q = Query::from_json(&json!({"bool": {"must": {"term": {"a": 1}}}}), None).unwrap();
    assert_eq!(q.to_json().unwrap(), json!({"bool": {"must": [{"term": {"a": 1}}]}}));
}

/// Parsing fails on unknown clause types and malformed leaves.
#[test]
fn test_query_parse_errors() {
    assert_eq!(
        parse_query(&json!({"termz": {"a": 1}})).unwrap_err().code(),
        "DESERIALIZATION_UNKNOWN_CLAUSE_TYPE"
    );
    assert_eq!(
        parse_query(&json!({"term": {"a": 1, "b": 2}})).unwrap_err().code(),
        "DESERIALIZATION_MALFORMED"
    );
    assert_eq!(
        parse_query(&json!({"bool": {"must": 3}})).unwrap_err().code(),
        "DESERIALIZATION_MALFORMED"
    );
    assert_eq!(
        parse_query(&json!({"nested": {"query": {"match_all": {}}}})).unwrap_err().code(),
        "DESERIALIZATION_MALFORMED"
    );
}

// =============================================================================
// Aggregations
// =============================================================================

/// Nested declarations, metadata and pipelines survive a round trip.
#[test]
fn test_aggs_round_trip() {
    let body = json!({
        "per_month": {
            "date_histogram": {"field": "created", "calendar_interval": "month"},
            "meta": {"label": "monthly"},
            "aggs": {
                "revenue": {"sum": {"field": "price"}},
                "cumulative": {"cumulative_sum": {"buckets_path": "revenue"}}
            }
        },
        "kinds": {
            "filters": {"filters": {"cheap": {"range": {"price": {"lt": 10}}}}},
            "aggs": {"top": {"top_hits": {"size": 1}}}
        }
    });
    let aggs = Aggs::from_json(&body, None).unwrap();
    assert_eq!(aggs.to_json(), body);
}

/// `aggregations` is read and written back as `aggs`.
#[test]
fn test_aggregations_spelling() {
    let tree = parse_aggs(&json!({"t": {
        "terms": {"field": "tag"},
        "aggregations": {"m": {"max": {"field": "price"}}}
    }}))
    .unwrap();
    let aggs = Aggs::new().aggs(tree, None).unwrap();
    assert_eq!(
        aggs.to_json(),
        json!({"t": {"terms": {"field": "tag"}, "aggs": {"m": {"max": {"field": "price"}}}}})
    );
}

/// Declarations with an unknown type are rejected.
#[test]
fn test_unknown_aggregation_type() {
    let err = Aggs::from_json(&json!({"x": {"termz": {"field": "a"}}}), None).unwrap_err();
    assert_eq!(err.code(), "DESERIALIZATION_UNKNOWN_CLAUSE_TYPE");
}

// =============================================================================
// Mappings
// =============================================================================

/// Field parameters and subfields are preserved.
#[test]
fn test_mappings_round_trip() {
    let declaration = json!({
        "dynamic": "strict",
        "properties": {
            "title": {"type": "text", "analyzer": "english", "fields": {"raw": {"type": "keyword"}}},
            "created": {"type": "date", "format": "yyyy-MM-dd"},
            "roles": {"type": "nested", "properties": {
                "gender": {"type": "keyword"},
                "skills": {"type": "nested", "properties": {"label": {"type": "keyword"}}}
            }}
        }
    });
    let mappings = Mappings::from_json(&declaration).unwrap();
    assert_eq!(mappings.to_json(), declaration);
    assert!(mappings.contains("title.raw"));
    assert_eq!(
        mappings.nested_at("roles.skills.label").unwrap(),
        Some("roles.skills".to_string())
    );
}
