//! Nested Scope Invariant Tests
//!
//! A field-bearing clause always ends up under the nested scope its field
//! requires:
//! - missing `nested` / `reverse_nested` wrappers are synthesized
//! - existing wrappers are reused, so re-inserting adds nothing
//! - without autocorrection a scope mismatch is an error
//! - the query DSL cannot leave a nested scope

use std::sync::Arc;

use clausetree::query::InsertOptions;
use clausetree::{Aggs, ErrorCategory, Mappings, Query};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn mappings() -> Arc<Mappings> {
    Arc::new(
        Mappings::from_json(&json!({
            "properties": {
                "name": {"type": "keyword"},
                "price": {"type": "float"},
                "roles": {
                    "type": "nested",
                    "properties": {
                        "gender": {"type": "keyword"},
                        "role": {"type": "keyword"},
                        "skills": {
                            "type": "nested",
                            "properties": {"label": {"type": "keyword"}}
                        }
                    }
                }
            }
        }))
        .unwrap(),
    )
}

fn query() -> Query {
    Query::new().with_mappings(mappings())
}

fn aggs() -> Aggs {
    Aggs::new().with_mappings(mappings())
}

// =============================================================================
// Query Side
// =============================================================================

/// Two top-level inserts on the same nested scope share one wrapper.
#[test]
fn test_roles_clauses_share_nested_wrapper() {
    let q = query()
        .query(json!({"term": {"roles.gender": "F"}}))
        .unwrap()
        .query(json!({"term": {"roles.role": "admin"}}))
        .unwrap();
    assert_eq!(
        q.to_json().unwrap(),
        json!({"nested": {"path": "roles", "query": {"bool": {"must": [
            {"term": {"roles.gender": "F"}},
            {"term": {"roles.role": "admin"}}
        ]}}}})
    );
}

/// An already wrapped clause is not wrapped again.
#[test]
fn test_wrapping_is_idempotent() {
    let wrapped = json!({"nested": {"path": "roles", "query": {"term": {"roles.gender": "F"}}}});
    let q = query().query(wrapped.clone()).unwrap();
    assert_eq!(q.to_json().unwrap(), wrapped);

    let again = Query::from_json(&q.to_json().unwrap(), Some(mappings())).unwrap();
    assert_eq!(again.to_json(), q.to_json());
}

/// Fields of a deeper nested scope open every scope on the way.
#[test]
fn test_multi_level_scopes_opened_shallowest_first() {
    let q = query()
        .query(json!({"term": {"roles.skills.label": "rust"}}))
        .unwrap();
    assert_eq!(
        q.to_json().unwrap(),
        json!({"nested": {"path": "roles", "query": {
            "nested": {"path": "roles.skills", "query": {"term": {"roles.skills.label": "rust"}}}
        }}})
    );
    assert_eq!(
        q.applied_nested_path_at(q.tree().leaves()[0]).unwrap(),
        Some("roles.skills".to_string())
    );
}

/// Root-level fields stay outside any wrapper.
#[test]
fn test_root_field_not_wrapped() {
    let q = query().query(json!({"term": {"name": "x"}})).unwrap();
    assert_eq!(q.to_json().unwrap(), json!({"term": {"name": "x"}}));
}

/// Without autocorrection the mismatch is reported.
#[test]
fn test_autocorrect_disabled() {
    let err = query()
        .with_nested_autocorrect(false)
        .query(json!({"term": {"roles.gender": "F"}}))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Nesting);
    assert_eq!(err.code(), "NESTING_INVALID_SCOPE");
}

/// Explicitly written wrappers pass without autocorrection.
#[test]
fn test_explicit_wrapper_accepted_without_autocorrect() {
    let q = query()
        .with_nested_autocorrect(false)
        .query(json!({"nested": {"path": "roles", "query": {"term": {"roles.role": "admin"}}}}))
        .unwrap();
    assert_eq!(q.applied_nested_path_at(q.tree().leaves()[0]).unwrap(), Some("roles".into()));
}

/// A root field cannot be placed inside a nested query.
#[test]
fn test_query_cannot_leave_nested_scope() {
    let q = query()
        .query(json!({"nested": {"_name": "in_roles", "path": "roles", "query": {"term": {"roles.role": "admin"}}}}))
        .unwrap();
    let err = q
        .insert(json!({"term": {"name": "x"}}), InsertOptions::at("in_roles"))
        .unwrap_err();
    assert_eq!(err.code(), "NESTING_INVALID_SCOPE");
}

// =============================================================================
// Aggregation Side
// =============================================================================

/// Grouping on a nested field inserts a `nested` aggregation above it.
#[test]
fn test_agg_nested_wrapper() {
    let a = aggs()
        .groupby(json!({"by_gender": {"terms": {"field": "roles.gender"}}}), None)
        .unwrap();
    assert_eq!(a.applied_nested_path_at("by_gender").unwrap(), Some("roles".into()));
    assert_eq!(a.clause("nested_below_root").unwrap().path(), Some("roles"));
}

/// Root fields below a nested bucket go through `reverse_nested`.
#[test]
fn test_agg_reverse_nested_wrapper() {
    let a = aggs()
        .groupby(json!({"by_gender": {"terms": {"field": "roles.gender"}}}), None)
        .unwrap()
        .agg(json!({"avg_price": {"avg": {"field": "price"}}}), None)
        .unwrap();
    assert_eq!(a.applied_nested_path_at("avg_price").unwrap(), None);

    let body: Value = a.to_json();
    let reverse = &body["nested_below_root"]["aggs"]["by_gender"]["aggs"]["reverse_nested_below_by_gender"];
    assert!(reverse.get("reverse_nested").is_some());
    assert_eq!(reverse["aggs"]["avg_price"], json!({"avg": {"field": "price"}}));
}

/// Sibling fields of the same scope reuse the wrapper.
#[test]
fn test_agg_wrapper_reused() {
    let a = aggs()
        .agg(json!({"by_gender": {"terms": {"field": "roles.gender"}}}), None)
        .unwrap()
        .agg(json!({"by_role": {"terms": {"field": "roles.role"}}}), Some("nested_below_root"))
        .unwrap();
    let wrapper = a.id_from_name("nested_below_root").unwrap();
    assert_eq!(a.tree().children(wrapper).len(), 2);
    assert!(a.id_from_name("nested_below_root_2").is_err());
}

/// Re-parsing an auto-corrected declaration adds no wrapper.
#[test]
fn test_agg_wrapping_is_idempotent() {
    let a = aggs()
        .groupby(json!({"by_gender": {"terms": {"field": "roles.gender"}}}), None)
        .unwrap()
        .agg(json!({"avg_price": {"avg": {"field": "price"}}}), None)
        .unwrap();
    let again = Aggs::from_json(&a.to_json(), Some(mappings())).unwrap();
    assert_eq!(again.to_json(), a.to_json());
    assert_eq!(again.tree().len(), a.tree().len());
}

/// Without autocorrection aggregations fail like queries do.
#[test]
fn test_agg_autocorrect_disabled() {
    let err = aggs()
        .with_nested_autocorrect(false)
        .groupby(json!({"by_gender": {"terms": {"field": "roles.gender"}}}), None)
        .unwrap_err();
    assert_eq!(err.code(), "NESTING_INVALID_SCOPE");
}
