//! Bucket filter reconstruction
//!
//! Translates the keys along a bucket's ancestor chain back into query
//! conditions, grouped under the nested scope each originating aggregation
//! runs in. Conditions of a scope are AND-ed and wrapped in a `nested` query
//! before joining the enclosing scope.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::bucket::{other_bucket_key, Bucket};
use super::tree::ResponseTree;
use crate::aggs::{AggClause, Aggs, FilterRule};
use crate::errors::{ClauseError, ClauseResult};
use crate::mappings::Mappings;
use crate::nesting::current_scope;
use crate::query::Query;
use crate::tree::NodeId;

/// Condition contributed by one ancestor bucket
#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    scope: Option<String>,
    condition: Value,
}

/// Builds the query selecting the documents of one bucket
pub fn bucket_filter(aggs: &Aggs, response: &ResponseTree, bucket_id: NodeId) -> ClauseResult<Query> {
    let fragments = collect_fragments(aggs, response, bucket_id)?;
    let value = assemble(&fragments, aggs.mappings().map(|m| m.as_ref()))
        .unwrap_or_else(|| json!({"match_all": {}}));
    Query::from_json(&value, aggs.mappings().cloned())
}

fn collect_fragments(aggs: &Aggs, response: &ResponseTree, bucket_id: NodeId) -> ClauseResult<Vec<Fragment>> {
    let tree = response.tree();
    let mut per_level = Vec::new();
    for id in tree.ancestors(bucket_id, true) {
        let Some(bucket) = tree.get(id)?.bucket() else {
            continue;
        };
        let agg_id = aggs.id_from_name(&bucket.level)?;
        let clause = aggs.clause(&bucket.level)?;
        match clause.kind.filter {
            FilterRule::Global => break,
            FilterRule::Transparent | FilterRule::NotApplicable => continue,
            _ => {}
        }
        let scope = current_scope(aggs.tree(), Some(agg_id));
        let level: Vec<Fragment> = conditions(clause, bucket)?
            .into_iter()
            .map(|condition| Fragment {
                scope: scope.clone(),
                condition,
            })
            .collect();
        per_level.push(level);
    }
    // ancestors come deepest first; conditions within a level keep their order
    per_level.reverse();
    Ok(per_level.into_iter().flatten().collect())
}

fn unsupported(clause: &AggClause, level: &str) -> ClauseError {
    ClauseError::UnsupportedBucketFilter {
        agg: level.to_string(),
        kind: clause.kind.tag.to_string(),
    }
}

fn required_field<'a>(clause: &'a AggClause, level: &str) -> ClauseResult<&'a str> {
    clause.field().ok_or_else(|| unsupported(clause, level))
}

fn term(field: &str, value: &Value) -> Value {
    let mut inner = Map::new();
    inner.insert(field.to_string(), value.clone());
    json!({"term": inner})
}

fn missing(field: &str) -> Value {
    json!({"bool": {"must_not": [{"exists": {"field": field}}]}})
}

fn range(field: &str, bounds: Map<String, Value>) -> Value {
    let mut inner = Map::new();
    inner.insert(field.to_string(), Value::Object(bounds));
    json!({"range": inner})
}

fn conjunction(mut conditions: Vec<Value>) -> Option<Value> {
    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(json!({"bool": {"filter": conditions}})),
    }
}

/// Adds two JSON numbers, staying integral when both are
fn add_numbers(a: &Value, b: &Value) -> Option<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.checked_add(y).map(Value::from);
    }
    Some(json!(a.as_f64()? + b.as_f64()?))
}

fn histogram_range(field: &str, key: &Value, interval: &Value) -> Option<Value> {
    let upper = add_numbers(key, interval)?;
    let mut bounds = Map::new();
    bounds.insert("gte".into(), key.clone());
    bounds.insert("lt".into(), upper);
    Some(range(field, bounds))
}

fn interval_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d+)?([a-zA-Z]+)$").ok())
        .as_ref()
}

/// Date math step for a date histogram interval (`1d`, `month`, `2w`, ...)
fn date_math_step(interval: &str) -> Option<String> {
    let named = match interval {
        "minute" => Some("1m"),
        "hour" => Some("1h"),
        "day" => Some("1d"),
        "week" => Some("1w"),
        "month" => Some("1M"),
        "quarter" => Some("3M"),
        "year" => Some("1y"),
        _ => None,
    };
    if let Some(step) = named {
        return Some(step.to_string());
    }
    let caps = interval_pattern()?.captures(interval)?;
    let count: u64 = match caps.get(1) {
        Some(m) => m.as_str().parse().ok()?,
        None => 1,
    };
    match caps.get(2)?.as_str() {
        "q" => Some(format!("{}M", count.checked_mul(3)?)),
        unit @ ("s" | "m" | "h" | "d" | "w" | "M" | "y") => Some(format!("{}{}", count, unit)),
        _ => None,
    }
}

fn date_interval(body: &Map<String, Value>) -> Option<&str> {
    ["calendar_interval", "fixed_interval", "interval"]
        .iter()
        .find_map(|attr| body.get(*attr).and_then(Value::as_str))
}

fn epoch_millis(key: &Value) -> Option<String> {
    key.as_i64()
        .or_else(|| key.as_f64().map(|f| f as i64))
        .map(|millis| millis.to_string())
}

fn date_histogram_range(field: &str, key: &Value, interval: &str) -> Option<Value> {
    let step = date_math_step(interval)?;
    let start = epoch_millis(key)?;
    let mut bounds = Map::new();
    bounds.insert("gte".into(), Value::String(start.clone()));
    bounds.insert("lt".into(), Value::String(format!("{}||+{}", start, step)));
    bounds.insert("format".into(), Value::String("epoch_millis".into()));
    Some(range(field, bounds))
}

fn named_filters(clause: &AggClause) -> Option<&Map<String, Value>> {
    clause.body.get("filters").and_then(Value::as_object)
}

/// Conditions selecting the documents of `bucket` within `clause`
fn conditions(clause: &AggClause, bucket: &Bucket) -> ClauseResult<Vec<Value>> {
    let level = bucket.level.as_str();
    let key = bucket.key.as_ref().unwrap_or(&Value::Null);
    let fail = || unsupported(clause, level);

    let condition = match clause.kind.filter {
        FilterRule::Term => term(required_field(clause, level)?, key),
        FilterRule::MultiTerms => {
            let sources = clause
                .body
                .get("terms")
                .and_then(Value::as_array)
                .ok_or_else(fail)?;
            let keys = key.as_array().ok_or_else(fail)?;
            if sources.len() != keys.len() {
                return Err(fail());
            }
            return sources
                .iter()
                .zip(keys)
                .map(|(source, value)| {
                    let field = source.get("field").and_then(Value::as_str).ok_or_else(fail)?;
                    Ok(term(field, value))
                })
                .collect();
        }
        FilterRule::Filter => Value::Object(clause.body.clone()),
        FilterRule::Filters => filters_condition(clause, key).ok_or_else(fail)?,
        FilterRule::Missing => missing(required_field(clause, level)?),
        FilterRule::Histogram => {
            let interval = clause.body.get("interval").ok_or_else(fail)?;
            histogram_range(required_field(clause, level)?, key, interval).ok_or_else(fail)?
        }
        FilterRule::DateHistogram => {
            let interval = date_interval(&clause.body).ok_or_else(fail)?;
            date_histogram_range(required_field(clause, level)?, key, interval).ok_or_else(fail)?
        }
        FilterRule::Range => {
            let mut bounds = Map::new();
            if let Some(from) = bucket.attrs.get("from").filter(|v| !v.is_null()) {
                bounds.insert("gte".into(), from.clone());
            }
            if let Some(to) = bucket.attrs.get("to").filter(|v| !v.is_null()) {
                bounds.insert("lt".into(), to.clone());
            }
            if clause.kind.tag == "date_range" {
                bounds.insert("format".into(), Value::String("epoch_millis".into()));
            }
            range(required_field(clause, level)?, bounds)
        }
        FilterRule::Composite => return composite_conditions(clause, key).ok_or_else(fail),
        FilterRule::AdjacencyMatrix => {
            let filters = named_filters(clause).ok_or_else(fail)?;
            let separator = clause
                .body
                .get("separator")
                .and_then(Value::as_str)
                .unwrap_or("&");
            return key
                .as_str()
                .ok_or_else(fail)?
                .split(separator)
                .map(|name| filters.get(name).cloned().ok_or_else(fail))
                .collect();
        }
        FilterRule::Unsupported => return Err(fail()),
        FilterRule::Transparent | FilterRule::Global | FilterRule::NotApplicable => {
            return Ok(Vec::new())
        }
    };
    Ok(vec![condition])
}

fn filters_condition(clause: &AggClause, key: &Value) -> Option<Value> {
    match clause.body.get("filters")? {
        Value::Object(named) => {
            let name = key.as_str()?;
            match named.get(name) {
                Some(filter) => Some(filter.clone()),
                None if other_bucket_key(clause).as_deref() == Some(name) => {
                    let all: Vec<Value> = named.values().cloned().collect();
                    Some(json!({"bool": {"must_not": all}}))
                }
                None => None,
            }
        }
        Value::Array(anonymous) => {
            let index = usize::try_from(key.as_u64()?).ok()?;
            match anonymous.get(index) {
                Some(filter) => Some(filter.clone()),
                // anonymous other bucket follows the declared filters
                None if index == anonymous.len() && other_bucket_key(clause).is_some() => {
                    Some(json!({"bool": {"must_not": anonymous}}))
                }
                None => None,
            }
        }
        _ => None,
    }
}

fn composite_conditions(clause: &AggClause, key: &Value) -> Option<Vec<Value>> {
    let sources = clause.body.get("sources")?.as_array()?;
    let keys = key.as_object()?;
    let mut out = Vec::with_capacity(sources.len());
    for source in sources {
        let (name, typed) = source.as_object()?.iter().next()?;
        let (tag, body) = typed.as_object()?.iter().next()?;
        let body = body.as_object()?;
        let field = body.get("field")?.as_str()?;
        let value = keys.get(name)?;
        let condition = match (tag.as_str(), value) {
            ("terms", Value::Null) => missing(field),
            ("terms", value) => term(field, value),
            ("histogram", value) => histogram_range(field, value, body.get("interval")?)?,
            ("date_histogram", value) => date_histogram_range(field, value, date_interval(body)?)?,
            _ => return None,
        };
        out.push(condition);
    }
    Some(out)
}

fn is_within(scope: &str, outer: &str) -> bool {
    scope.len() > outer.len() && scope.starts_with(outer) && scope[outer.len()..].starts_with('.')
}

/// Enclosing scope of `scope`; the mappings know it, otherwise the longest
/// dotted prefix among the scopes in play
fn parent_scope(scope: &str, known: &[String], mappings: Option<&Mappings>) -> Option<String> {
    if let Some(mappings) = mappings {
        if let Ok(scopes) = mappings.nested_scopes_for(scope) {
            return scopes.get(1).cloned();
        }
    }
    known
        .iter()
        .filter(|outer| is_within(scope, outer))
        .max_by_key(|outer| outer.len())
        .cloned()
}

/// Every scope holding a fragment, plus the scopes enclosing them, in order
/// of first appearance
fn scopes_in_play(fragments: &[Fragment], mappings: Option<&Mappings>) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for fragment in fragments {
        if let Some(scope) = &fragment.scope {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }
    }
    if let Some(mappings) = mappings {
        let mut i = 0;
        while i < scopes.len() {
            if let Some(parent) = parent_scope(&scopes[i], &scopes, Some(mappings)) {
                if !scopes.contains(&parent) {
                    scopes.push(parent);
                }
            }
            i += 1;
        }
    }
    scopes
}

fn assemble_scope(
    scope: Option<&str>,
    fragments: &[Fragment],
    scopes: &[String],
    mappings: Option<&Mappings>,
) -> Option<Value> {
    let mut conditions: Vec<Value> = fragments
        .iter()
        .filter(|fragment| fragment.scope.as_deref() == scope)
        .map(|fragment| fragment.condition.clone())
        .collect();
    for child in scopes
        .iter()
        .filter(|candidate| parent_scope(candidate, scopes, mappings).as_deref() == scope)
    {
        if let Some(inner) = assemble_scope(Some(child), fragments, scopes, mappings) {
            debug!(path = %child, "wrapping bucket conditions in nested query");
            conditions.push(json!({"nested": {"path": child, "query": inner}}));
        }
    }
    conjunction(conditions)
}

fn assemble(fragments: &[Fragment], mappings: Option<&Mappings>) -> Option<Value> {
    let scopes = scopes_in_play(fragments, mappings);
    assemble_scope(None, fragments, &scopes, mappings)
}
