//! Query clause kinds and tree nodes
//!
//! Clause kinds are declared once in a static registry keyed by type tag.
//! Every "construct from type string" goes through `QueryRegistry::global()`.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::{Map, Value};

use crate::errors::{ClauseError, ClauseResult};
use crate::mappings::{FieldType, TypeRule, CONTAINERS, GEO, STRINGS};
use crate::nesting::{ScopeBoundary, ScopedNode};
use crate::tree::TreeNode;

/// Where a leaf clause keeps its field reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafShape {
    /// `{"term": {"<field>": ...}}`
    KeyedField,
    /// `{"exists": {"field": "<field>"}}`
    FieldParam,
    /// `{"terms": {"<field>": [...], "boost": 1.0}}`: the single key not listed is the field
    KeyedFieldWithParams(&'static [&'static str]),
    /// No single field (`match_all`, `ids`, `query_string`, ...)
    Fieldless,
}

/// Registered leaf clause kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafKind {
    pub tag: &'static str,
    pub shape: LeafShape,
    pub rule: TypeRule,
}

/// Parameter slot declared by a compound kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub multiple: bool,
}

/// Registered compound clause kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundKind {
    pub tag: &'static str,
    pub params: &'static [ParamSpec],
    pub default_param: &'static str,
    /// Whether the clause opens the nested scope named by its `path`
    pub opens_scope: bool,
}

impl CompoundKind {
    /// Looks up an allowed parameter
    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Registered query clause kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    Leaf(LeafKind),
    Compound(CompoundKind),
}

impl QueryKind {
    pub fn tag(&self) -> &'static str {
        match self {
            QueryKind::Leaf(kind) => kind.tag,
            QueryKind::Compound(kind) => kind.tag,
        }
    }
}

/// Map from type tag to clause kind
#[derive(Debug, Default)]
pub struct QueryRegistry {
    kinds: HashMap<&'static str, QueryKind>,
}

static REGISTRY: OnceLock<QueryRegistry> = OnceLock::new();

const BOOL_PARAMS: &[ParamSpec] = &[
    ParamSpec { name: "must", multiple: true },
    ParamSpec { name: "should", multiple: true },
    ParamSpec { name: "must_not", multiple: true },
    ParamSpec { name: "filter", multiple: true },
];
const BOOSTING_PARAMS: &[ParamSpec] = &[
    ParamSpec { name: "positive", multiple: false },
    ParamSpec { name: "negative", multiple: false },
];
const FILTER_PARAM: &[ParamSpec] = &[ParamSpec { name: "filter", multiple: false }];
const QUERIES_PARAM: &[ParamSpec] = &[ParamSpec { name: "queries", multiple: true }];
const QUERY_PARAM: &[ParamSpec] = &[ParamSpec { name: "query", multiple: false }];

/// `bool` compound kind
pub static BOOL: CompoundKind = CompoundKind {
    tag: "bool",
    params: BOOL_PARAMS,
    default_param: "must",
    opens_scope: false,
};

/// `nested` compound kind
pub static NESTED: CompoundKind = CompoundKind {
    tag: "nested",
    params: QUERY_PARAM,
    default_param: "query",
    opens_scope: true,
};

const TERMS_PARAMS: &[&str] = &["boost", "_name"];
const GEO_DISTANCE_PARAMS: &[&str] = &[
    "distance",
    "distance_type",
    "validation_method",
    "ignore_unmapped",
    "boost",
    "_name",
];
const GEO_PARAMS: &[&str] = &["validation_method", "type", "ignore_unmapped", "boost", "_name"];

impl QueryRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a kind, replacing any kind with the same tag
    pub fn register(&mut self, kind: QueryKind) {
        self.kinds.insert(kind.tag(), kind);
    }

    /// Looks up a kind by type tag
    pub fn get(&self, tag: &str) -> ClauseResult<&QueryKind> {
        self.kinds
            .get(tag)
            .ok_or_else(|| ClauseError::UnknownClauseType(tag.to_string()))
    }

    /// Leaf kind by tag
    pub fn leaf(&self, tag: &str) -> ClauseResult<&LeafKind> {
        match self.get(tag)? {
            QueryKind::Leaf(kind) => Ok(kind),
            QueryKind::Compound(_) => Err(ClauseError::UnknownClauseType(tag.to_string())),
        }
    }

    /// Compound kind by tag
    pub fn compound(&self, tag: &str) -> ClauseResult<&CompoundKind> {
        match self.get(tag)? {
            QueryKind::Compound(kind) => Ok(kind),
            QueryKind::Leaf(_) => Err(ClauseError::UnknownClauseType(tag.to_string())),
        }
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Registry holding every built-in clause kind, built on first use
    pub fn global() -> &'static QueryRegistry {
        REGISTRY.get_or_init(|| {
            let mut registry = QueryRegistry::new();
            register_builtin(&mut registry);
            registry
        })
    }
}

fn leaf(tag: &'static str, shape: LeafShape, rule: TypeRule) -> QueryKind {
    QueryKind::Leaf(LeafKind { tag, shape, rule })
}

fn compound(
    tag: &'static str,
    params: &'static [ParamSpec],
    default_param: &'static str,
) -> QueryKind {
    QueryKind::Compound(CompoundKind {
        tag,
        params,
        default_param,
        opens_scope: false,
    })
}

/// Registers the built-in query clause kinds
pub fn register_builtin(registry: &mut QueryRegistry) {
    use LeafShape::*;

    let scalar = TypeRule::Deny(CONTAINERS);
    let strings = TypeRule::AllowOnly(STRINGS);

    // full text and term level, keyed by field
    for tag in ["term", "match", "fuzzy", "terms_set"] {
        registry.register(leaf(tag, KeyedField, scalar));
    }
    registry.register(leaf("range", KeyedField, scalar));
    for tag in [
        "match_phrase",
        "match_phrase_prefix",
        "match_bool_prefix",
        "prefix",
        "wildcard",
        "regexp",
        "intervals",
        "span_term",
    ] {
        registry.register(leaf(tag, KeyedField, strings));
    }

    // field given as parameter
    registry.register(leaf("exists", FieldParam, TypeRule::Any));
    registry.register(leaf(
        "distance_feature",
        FieldParam,
        TypeRule::AllowOnly(&[FieldType::Date, FieldType::DateNanos, FieldType::GeoPoint]),
    ));
    registry.register(leaf(
        "rank_feature",
        FieldParam,
        TypeRule::AllowOnly(&[FieldType::RankFeature, FieldType::RankFeatures]),
    ));

    // field keyed among parameters
    registry.register(leaf("terms", KeyedFieldWithParams(TERMS_PARAMS), scalar));
    registry.register(leaf(
        "geo_distance",
        KeyedFieldWithParams(GEO_DISTANCE_PARAMS),
        TypeRule::AllowOnly(GEO),
    ));
    for tag in ["geo_bounding_box", "geo_polygon", "geo_shape"] {
        registry.register(leaf(
            tag,
            KeyedFieldWithParams(GEO_PARAMS),
            TypeRule::AllowOnly(GEO),
        ));
    }

    for tag in [
        "match_all",
        "match_none",
        "ids",
        "query_string",
        "simple_query_string",
        "multi_match",
        "combined_fields",
        "more_like_this",
        "script",
        "wrapper",
        "percolate",
        "parent_id",
    ] {
        registry.register(leaf(tag, Fieldless, TypeRule::Any));
    }

    registry.register(QueryKind::Compound(BOOL.clone()));
    registry.register(compound("boosting", BOOSTING_PARAMS, "positive"));
    registry.register(compound("constant_score", FILTER_PARAM, "filter"));
    registry.register(compound("dis_max", QUERIES_PARAM, "queries"));
    registry.register(compound("function_score", QUERY_PARAM, "query"));
    registry.register(compound("has_child", QUERY_PARAM, "query"));
    registry.register(compound("has_parent", QUERY_PARAM, "query"));
    registry.register(compound("script_score", QUERY_PARAM, "query"));
    registry.register(QueryKind::Compound(NESTED.clone()));
}

/// Leaf query clause
#[derive(Debug, Clone, PartialEq)]
pub struct LeafClause {
    pub kind: &'static LeafKind,
    /// Field reference extracted from the body according to the kind's shape
    pub field: Option<String>,
    /// Everything under the type tag, as written
    pub body: Map<String, Value>,
}

impl LeafClause {
    /// Builds a leaf from the object under its type tag
    pub fn from_body(kind: &'static LeafKind, body: Map<String, Value>) -> ClauseResult<Self> {
        let field = match kind.shape {
            LeafShape::KeyedField => {
                if body.len() != 1 {
                    return Err(ClauseError::malformed(format!(
                        "'{}' clause must hold exactly one field key, got {}",
                        kind.tag,
                        body.len()
                    )));
                }
                body.keys().next().cloned()
            }
            LeafShape::FieldParam => match body.get("field") {
                Some(Value::String(field)) => Some(field.clone()),
                _ => {
                    return Err(ClauseError::malformed(format!(
                        "'{}' clause requires a string 'field' parameter",
                        kind.tag
                    )))
                }
            },
            LeafShape::KeyedFieldWithParams(params) => {
                let mut fields = body.keys().filter(|k| !params.contains(&k.as_str()));
                match (fields.next(), fields.next()) {
                    (Some(field), None) => Some(field.clone()),
                    _ => {
                        return Err(ClauseError::malformed(format!(
                            "'{}' clause must hold exactly one field key",
                            kind.tag
                        )))
                    }
                }
            }
            LeafShape::Fieldless => None,
        };
        Ok(Self { kind, field, body })
    }
}

/// Compound query clause; children hang below its parameter slots
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundClause {
    pub kind: &'static CompoundKind,
    /// Attributes other than parameters (`boost`, `path`, `minimum_should_match`, ...)
    pub body: Map<String, Value>,
}

impl CompoundClause {
    pub fn new(kind: &'static CompoundKind, body: Map<String, Value>) -> ClauseResult<Self> {
        if kind.opens_scope && !matches!(body.get("path"), Some(Value::String(_))) {
            return Err(ClauseError::malformed(format!(
                "'{}' clause requires a string 'path'",
                kind.tag
            )));
        }
        Ok(Self { kind, body })
    }

    /// Nested path when the clause opens a scope
    pub fn path(&self) -> Option<&str> {
        if self.kind.opens_scope {
            self.body.get("path").and_then(Value::as_str)
        } else {
            None
        }
    }
}

/// Named attachment point below a compound clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSlot {
    pub name: &'static str,
    pub multiple: bool,
}

impl From<&'static ParamSpec> for ParameterSlot {
    fn from(spec: &'static ParamSpec) -> Self {
        Self {
            name: spec.name,
            multiple: spec.multiple,
        }
    }
}

/// Node of a query tree
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    Leaf(LeafClause),
    Compound(CompoundClause),
    Param(ParameterSlot),
}

impl QueryNode {
    /// Empty `bool` compound
    pub fn bool_clause() -> Self {
        QueryNode::Compound(CompoundClause {
            kind: &BOOL,
            body: Map::new(),
        })
    }

    /// `nested` compound opening `path`
    pub fn nested(path: &str) -> Self {
        let mut body = Map::new();
        body.insert("path".into(), Value::String(path.to_string()));
        QueryNode::Compound(CompoundClause {
            kind: &NESTED,
            body,
        })
    }

    /// Type tag, or the parameter name for slots
    pub fn tag(&self) -> &'static str {
        match self {
            QueryNode::Leaf(leaf) => leaf.kind.tag,
            QueryNode::Compound(compound) => compound.kind.tag,
            QueryNode::Param(slot) => slot.name,
        }
    }

    /// Field reference of a leaf clause
    pub fn field(&self) -> Option<&str> {
        match self {
            QueryNode::Leaf(leaf) => leaf.field.as_deref(),
            _ => None,
        }
    }

    /// `_name` of a named clause
    pub fn name(&self) -> Option<&str> {
        let body = match self {
            QueryNode::Leaf(leaf) => &leaf.body,
            QueryNode::Compound(compound) => &compound.body,
            QueryNode::Param(_) => return None,
        };
        body.get("_name").and_then(Value::as_str).or_else(|| {
            // keyed-field leaves carry `_name` inside the field body
            match self {
                QueryNode::Leaf(leaf) => leaf
                    .field
                    .as_ref()
                    .and_then(|f| body.get(f))
                    .and_then(|inner| inner.get("_name"))
                    .and_then(Value::as_str),
                _ => None,
            }
        })
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, QueryNode::Compound(c) if c.kind.tag == "bool")
    }

    pub fn is_param(&self) -> bool {
        matches!(self, QueryNode::Param(_))
    }

    /// Path of a `nested` clause
    pub fn nested_path(&self) -> Option<&str> {
        match self {
            QueryNode::Compound(compound) => compound.path(),
            _ => None,
        }
    }
}

impl TreeNode for QueryNode {
    fn check_child(&self, child: &Self, siblings: usize) -> ClauseResult<()> {
        match (self, child) {
            (QueryNode::Leaf(_), _) => Err(ClauseError::InvalidParent {
                parent: format!("leaf clause '{}'", self.label()),
                child: format!("'{}'", child.label()),
            }),
            (QueryNode::Param(_), QueryNode::Param(inner)) => {
                Err(ClauseError::ParameterUnderParameter(inner.name.to_string()))
            }
            (QueryNode::Param(slot), _) => {
                if !slot.multiple && siblings > 0 {
                    Err(ClauseError::SlotOccupied(slot.name.to_string()))
                } else {
                    Ok(())
                }
            }
            (QueryNode::Compound(compound), QueryNode::Param(slot)) => {
                if compound.kind.param(slot.name).is_some() {
                    Ok(())
                } else {
                    Err(ClauseError::UnknownParameter {
                        clause: compound.kind.tag.to_string(),
                        param: slot.name.to_string(),
                    })
                }
            }
            (QueryNode::Compound(compound), _) => Err(ClauseError::InvalidParent {
                parent: format!("compound clause '{}'", compound.kind.tag),
                child: format!("'{}' without a parameter slot", child.label()),
            }),
        }
    }

    fn label(&self) -> String {
        match self {
            QueryNode::Leaf(leaf) => match &leaf.field {
                Some(field) => format!("{}, field={}", leaf.kind.tag, field),
                None => leaf.kind.tag.to_string(),
            },
            QueryNode::Compound(compound) => match compound.path() {
                Some(path) => format!("{}, path={}", compound.kind.tag, path),
                None => compound.kind.tag.to_string(),
            },
            QueryNode::Param(slot) => slot.name.to_string(),
        }
    }
}

impl ScopedNode for QueryNode {
    fn scope_boundary(&self) -> Option<ScopeBoundary> {
        self.nested_path()
            .map(|path| ScopeBoundary::Enter(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_registry_lookup() {
        let registry = QueryRegistry::global();
        assert!(matches!(registry.get("term"), Ok(QueryKind::Leaf(_))));
        assert!(matches!(registry.get("bool"), Ok(QueryKind::Compound(_))));
        assert_eq!(
            registry.get("terminator").unwrap_err(),
            ClauseError::UnknownClauseType("terminator".into())
        );
    }

    #[test]
    fn test_explicit_registration() {
        let mut registry = QueryRegistry::new();
        assert!(registry.is_empty());
        registry.register(leaf("term", LeafShape::KeyedField, TypeRule::Any));
        assert_eq!(registry.len(), 1);
        assert!(registry.leaf("term").is_ok());
        assert!(registry.compound("term").is_err());
    }

    #[test]
    fn test_leaf_field_extraction() {
        let registry = QueryRegistry::global();
        let term = LeafClause::from_body(registry.leaf("term").unwrap(), body(json!({"user": "kimchy"})))
            .unwrap();
        assert_eq!(term.field.as_deref(), Some("user"));

        let exists =
            LeafClause::from_body(registry.leaf("exists").unwrap(), body(json!({"field": "user"})))
                .unwrap();
        assert_eq!(exists.field.as_deref(), Some("user"));

        let terms = LeafClause::from_body(
            registry.leaf("terms").unwrap(),
            body(json!({"user": ["a", "b"], "boost": 2.0})),
        )
        .unwrap();
        assert_eq!(terms.field.as_deref(), Some("user"));

        let all = LeafClause::from_body(registry.leaf("match_all").unwrap(), Map::new()).unwrap();
        assert_eq!(all.field, None);
    }

    #[test]
    fn test_keyed_field_cardinality() {
        let registry = QueryRegistry::global();
        let err = LeafClause::from_body(
            registry.leaf("term").unwrap(),
            body(json!({"a": 1, "b": 2})),
        )
        .unwrap_err();
        assert!(matches!(err, ClauseError::Malformed(_)));
    }

    #[test]
    fn test_nested_requires_path() {
        let kind = QueryRegistry::global().compound("nested").unwrap();
        assert!(CompoundClause::new(kind, Map::new()).is_err());
        let clause = CompoundClause::new(kind, body(json!({"path": "roles"}))).unwrap();
        assert_eq!(clause.path(), Some("roles"));
    }

    #[test]
    fn test_structural_rules() {
        let bool_node = QueryNode::bool_clause();
        let must = QueryNode::Param(ParameterSlot { name: "must", multiple: true });
        let query = QueryNode::Param(ParameterSlot { name: "query", multiple: false });
        let term = QueryNode::Leaf(
            LeafClause::from_body(
                QueryRegistry::global().leaf("term").unwrap(),
                body(json!({"a": 1})),
            )
            .unwrap(),
        );

        assert!(bool_node.check_child(&must, 0).is_ok());
        assert_eq!(
            bool_node.check_child(&query, 0).unwrap_err().code(),
            "STRUCTURAL_UNKNOWN_PARAMETER"
        );
        assert_eq!(
            must.check_child(&query, 0).unwrap_err(),
            ClauseError::ParameterUnderParameter("query".into())
        );
        assert_eq!(
            term.check_child(&must, 0).unwrap_err().code(),
            "STRUCTURAL_INVALID_PARENT"
        );
        assert!(query.check_child(&term, 0).is_ok());
        assert_eq!(
            query.check_child(&term, 1).unwrap_err(),
            ClauseError::SlotOccupied("query".into())
        );
    }

    #[test]
    fn test_named_clause() {
        let kind = QueryRegistry::global().leaf("match").unwrap();
        let leaf = LeafClause::from_body(kind, body(json!({"title": {"query": "x", "_name": "t"}})))
            .unwrap();
        assert_eq!(QueryNode::Leaf(leaf).name(), Some("t"));
    }
}
