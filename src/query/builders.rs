//! Query inputs and builder functions
//!
//! Every insertion accepts a [`QueryInput`]: a DSL document, a type tag with
//! its body, or an already built clause tree. The builder functions return DSL
//! documents so they compose freely:
//!
//! ```
//! use clausetree::query::builders::{nested, term};
//! let q = nested("roles", term("roles.gender", "F"));
//! assert_eq!(q["nested"]["path"], "roles");
//! ```

use serde_json::{json, Map, Value};

use super::clauses::QueryNode;
use super::codec::parse_query;
use super::query::Query;
use crate::errors::ClauseResult;
use crate::tree::Tree;

/// Anything that can be inserted into a query
#[derive(Debug, Clone)]
pub enum QueryInput {
    /// `{"<type>": <body>}`
    Json(Value),
    /// Type tag and body given separately
    Typed { tag: String, body: Value },
    /// Clause tree, typically taken from another query
    Tree(Tree<QueryNode>),
}

impl QueryInput {
    pub fn typed(tag: impl Into<String>, body: Value) -> Self {
        QueryInput::Typed {
            tag: tag.into(),
            body,
        }
    }

    /// Turns the input into a clause tree
    pub fn normalize(self) -> ClauseResult<Tree<QueryNode>> {
        match self {
            QueryInput::Json(value) => parse_query(&value),
            QueryInput::Typed { tag, body } => {
                let mut outer = Map::new();
                outer.insert(tag, body);
                parse_query(&Value::Object(outer))
            }
            QueryInput::Tree(tree) => Ok(tree),
        }
    }
}

impl From<Value> for QueryInput {
    fn from(value: Value) -> Self {
        QueryInput::Json(value)
    }
}

impl From<Tree<QueryNode>> for QueryInput {
    fn from(tree: Tree<QueryNode>) -> Self {
        QueryInput::Tree(tree)
    }
}

impl From<&Query> for QueryInput {
    fn from(query: &Query) -> Self {
        QueryInput::Tree(query.tree().clone())
    }
}

impl From<Query> for QueryInput {
    fn from(query: Query) -> Self {
        QueryInput::Tree(query.tree().clone())
    }
}

fn keyed(tag: &str, field: &str, value: Value) -> Value {
    let mut inner = Map::new();
    inner.insert(field.to_string(), value);
    let mut outer = Map::new();
    outer.insert(tag.to_string(), Value::Object(inner));
    Value::Object(outer)
}

pub fn term(field: &str, value: impl Into<Value>) -> Value {
    keyed("term", field, value.into())
}

pub fn terms<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Value {
    keyed(
        "terms",
        field,
        Value::Array(values.into_iter().map(Into::into).collect()),
    )
}

pub fn match_query(field: &str, value: impl Into<Value>) -> Value {
    keyed("match", field, value.into())
}

/// `range` clause; `bounds` holds `gte`, `lt`, `format`, ...
pub fn range(field: &str, bounds: Value) -> Value {
    keyed("range", field, bounds)
}

pub fn exists(field: &str) -> Value {
    json!({"exists": {"field": field}})
}

pub fn match_all() -> Value {
    json!({"match_all": {}})
}

pub fn nested(path: &str, query: Value) -> Value {
    json!({"nested": {"path": path, "query": query}})
}

/// `bool` clause from `(parameter, clauses)` pairs
pub fn bool_query<'a>(params: impl IntoIterator<Item = (&'a str, Vec<Value>)>) -> Value {
    let body: Map<String, Value> = params
        .into_iter()
        .map(|(name, clauses)| (name.to_string(), Value::Array(clauses)))
        .collect();
    json!({"bool": body})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_produce_parsable_clauses() {
        let doc = bool_query([
            ("must", vec![term("a", 1), match_query("b", "x")]),
            ("filter", vec![range("c", json!({"gte": 3})), exists("d")]),
            ("should", vec![terms("e", ["x", "y"]), nested("p", match_all())]),
        ]);
        let tree = QueryInput::from(doc).normalize().unwrap();
        assert_eq!(tree.len(), 1 + 3 + 6 + 2);
    }

    #[test]
    fn test_typed_input() {
        let tree = QueryInput::typed("term", json!({"a": 1})).normalize().unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_query_as_input() {
        let inner = Query::new().query(term("a", 1)).unwrap();
        let outer = Query::new().filter(&inner).unwrap();
        assert_eq!(
            outer.to_json().unwrap(),
            json!({"bool": {"filter": [{"term": {"a": 1}}]}})
        );
    }
}
