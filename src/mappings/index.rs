//! Field schema index built from a mapping declaration
//!
//! The declaration is stored as a `Tree<MappingNode>`; a path index maps every
//! dot-joined field path to its node so lookups never walk the tree.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use super::rules::TypeRule;
use super::types::{Field, FieldType, Subfield};
use crate::errors::{ClauseError, ClauseResult};
use crate::tree::{NodeId, Tree, TreeNode};

/// Node of a mapping tree
#[derive(Debug, Clone, PartialEq)]
pub enum MappingNode {
    /// Document root, holding root-level attributes such as `dynamic`
    Root(Map<String, Value>),
    /// Declared field
    Field(Field),
}

impl TreeNode for MappingNode {
    fn check_child(&self, child: &Self, _siblings: usize) -> ClauseResult<()> {
        let accepts = match (self, child) {
            (_, MappingNode::Root(_)) => false,
            (MappingNode::Root(_), MappingNode::Field(_)) => true,
            (MappingNode::Field(parent), MappingNode::Field(_)) => parent.field_type.is_container(),
        };
        if accepts {
            Ok(())
        } else {
            Err(ClauseError::InvalidParent {
                parent: self.label(),
                child: child.label(),
            })
        }
    }

    fn label(&self) -> String {
        match self {
            MappingNode::Root(_) => "_root".to_string(),
            MappingNode::Field(field) => {
                let mut label = format!("{}  {}", field.name, field.field_type);
                for sub in &field.subfields {
                    label.push_str(&format!("  +{}", sub.name));
                }
                label
            }
        }
    }
}

/// Queryable index over a mapping declaration
///
/// Immutable once built; share it between trees behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Mappings {
    tree: Tree<MappingNode>,
    paths: BTreeMap<String, NodeId>,
}

impl Mappings {
    /// Parses a mapping declaration.
    ///
    /// Accepts `{"properties": ...}`, `{"mappings": {...}}` and index metadata
    /// shaped `{"<index>": {"mappings": {...}}}`.
    pub fn from_json(value: &Value) -> ClauseResult<Self> {
        let declaration = unwrap_declaration(value)?;
        let mut params = declaration
            .as_object()
            .cloned()
            .ok_or_else(|| ClauseError::malformed("mapping declaration must be an object"))?;
        let properties = params.remove("properties");

        let mut mappings = Mappings {
            tree: Tree::new(),
            paths: BTreeMap::new(),
        };
        let root = mappings.tree.insert_root(MappingNode::Root(params), None)?;
        if let Some(properties) = properties {
            mappings.parse_properties(root, None, &properties)?;
        }
        Ok(mappings)
    }

    fn parse_properties(
        &mut self,
        parent: NodeId,
        parent_path: Option<&str>,
        properties: &Value,
    ) -> ClauseResult<()> {
        let properties = properties
            .as_object()
            .ok_or_else(|| ClauseError::malformed("'properties' must be an object"))?;

        for (name, declaration) in properties {
            let path = match parent_path {
                Some(parent_path) => format!("{}.{}", parent_path, name),
                None => name.clone(),
            };
            let mut params = declaration.as_object().cloned().ok_or_else(|| {
                ClauseError::malformed(format!("declaration of field '{}' must be an object", path))
            })?;
            let children = params.remove("properties");
            let field_type = match params.remove("type") {
                Some(Value::String(name)) => FieldType::parse(&name)?,
                Some(other) => {
                    return Err(ClauseError::malformed(format!(
                        "type of field '{}' must be a string, got {}",
                        path, other
                    )))
                }
                None if children.is_some() => FieldType::Object,
                None => {
                    return Err(ClauseError::malformed(format!(
                        "field '{}' declares neither a type nor properties",
                        path
                    )))
                }
            };
            if children.is_some() && !field_type.is_container() {
                return Err(ClauseError::malformed(format!(
                    "field '{}' of type '{}' cannot declare properties",
                    path, field_type
                )));
            }
            let subfields = match params.remove("fields") {
                Some(fields) => parse_subfields(&path, &fields)?,
                None => Vec::new(),
            };

            let field = Field {
                name: name.clone(),
                path: path.clone(),
                field_type,
                subfields,
                params,
            };
            let id = self
                .tree
                .insert(MappingNode::Field(field), parent, Some(name.clone()))?;
            self.paths.insert(path.clone(), id);

            if let Some(children) = children {
                self.parse_properties(id, Some(&path), &children)?;
            }
        }
        Ok(())
    }

    /// Serializes back to a mapping declaration
    pub fn to_json(&self) -> Value {
        let Some(root) = self.tree.root() else {
            return Value::Object(Map::new());
        };
        let mut out = match self.tree.get(root) {
            Ok(MappingNode::Root(params)) => params.clone(),
            _ => Map::new(),
        };
        let properties = self.properties_json(root);
        if !properties.is_empty() {
            out.insert("properties".into(), Value::Object(properties));
        }
        Value::Object(out)
    }

    fn properties_json(&self, parent: NodeId) -> Map<String, Value> {
        let mut properties = Map::new();
        for child in self.tree.children(parent) {
            let Ok(MappingNode::Field(field)) = self.tree.get(*child) else {
                continue;
            };
            let mut declaration = field.params.clone();
            // object is the implicit container type
            if field.field_type != FieldType::Object {
                declaration.insert("type".into(), Value::String(field.field_type.to_string()));
            }
            if !field.subfields.is_empty() {
                let mut fields = Map::new();
                for sub in &field.subfields {
                    let mut sub_declaration = sub.params.clone();
                    sub_declaration.insert("type".into(), Value::String(sub.field_type.to_string()));
                    fields.insert(sub.name.clone(), Value::Object(sub_declaration));
                }
                declaration.insert("fields".into(), Value::Object(fields));
            }
            let nested_properties = self.properties_json(*child);
            if !nested_properties.is_empty() {
                declaration.insert("properties".into(), Value::Object(nested_properties));
            }
            properties.insert(field.name.clone(), Value::Object(declaration));
        }
        properties
    }

    /// Underlying mapping tree
    pub fn tree(&self) -> &Tree<MappingNode> {
        &self.tree
    }

    /// All declared field paths, sorted
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    /// Declared field at `path` (subfields are not fields of their own)
    pub fn field(&self, path: &str) -> ClauseResult<&Field> {
        let id = self
            .paths
            .get(path)
            .ok_or_else(|| ClauseError::UnknownField(path.to_string()))?;
        match self.tree.get(*id)? {
            MappingNode::Field(field) => Ok(field),
            MappingNode::Root(_) => Err(ClauseError::UnknownField(path.to_string())),
        }
    }

    /// Resolves `path` directly, or as `<field>.<subfield>`.
    ///
    /// Returns the node owning the path and the resolved type.
    fn resolve(&self, path: &str) -> ClauseResult<(NodeId, FieldType)> {
        if let Some(id) = self.paths.get(path) {
            if let MappingNode::Field(field) = self.tree.get(*id)? {
                return Ok((*id, field.field_type));
            }
        }
        if let Some((parent, sub)) = path.rsplit_once('.') {
            if let Some(id) = self.paths.get(parent) {
                if let MappingNode::Field(field) = self.tree.get(*id)? {
                    if let Some(subfield) = field.subfield(sub) {
                        return Ok((*id, subfield.field_type));
                    }
                }
            }
        }
        Err(ClauseError::UnknownField(path.to_string()))
    }

    /// Returns true if the path resolves to a field or subfield
    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    /// Declared type of a field or subfield
    pub fn type_of(&self, path: &str) -> ClauseResult<FieldType> {
        self.resolve(path).map(|(_, field_type)| field_type)
    }

    /// Nested scopes enclosing the path, deepest first.
    ///
    /// A nested field's own path is part of its scopes.
    pub fn nested_scopes_for(&self, path: &str) -> ClauseResult<Vec<String>> {
        let (id, _) = self.resolve(path)?;
        let scopes = self
            .tree
            .ancestors(id, true)
            .into_iter()
            .filter_map(|ancestor| match self.tree.get(ancestor) {
                Ok(MappingNode::Field(field)) if field.is_nested() => Some(field.path.clone()),
                _ => None,
            })
            .collect();
        Ok(scopes)
    }

    /// Deepest nested scope enclosing the path
    pub fn nested_at(&self, path: &str) -> ClauseResult<Option<String>> {
        Ok(self.nested_scopes_for(path)?.into_iter().next())
    }

    /// Returns true if the field itself is declared `nested`
    pub fn is_nested(&self, path: &str) -> bool {
        self.field(path).map(Field::is_nested).unwrap_or(false)
    }

    /// Validates that a clause with `rule` may target `path`
    pub fn check_field(&self, clause: &str, rule: TypeRule, path: &str) -> ClauseResult<FieldType> {
        let field_type = self.type_of(path)?;
        if !rule.accepts(field_type) {
            return Err(ClauseError::InvalidFieldType {
                clause: clause.to_string(),
                field: path.to_string(),
                field_type: field_type.to_string(),
            });
        }
        Ok(field_type)
    }

    /// Text rendering of the mapping tree
    pub fn show(&self) -> String {
        self.tree.render()
    }
}

impl fmt::Display for Mappings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.show())
    }
}

fn unwrap_declaration(value: &Value) -> ClauseResult<&Value> {
    let obj = value
        .as_object()
        .ok_or_else(|| ClauseError::malformed("mapping declaration must be an object"))?;
    if obj.contains_key("properties") {
        return Ok(value);
    }
    if let Some(inner) = obj.get("mappings") {
        return Ok(inner);
    }
    if obj.len() == 1 {
        if let Some(inner) = obj.values().next().and_then(|index| index.get("mappings")) {
            return Ok(inner);
        }
    }
    Ok(value)
}

fn parse_subfields(path: &str, fields: &Value) -> ClauseResult<Vec<Subfield>> {
    let fields = fields.as_object().ok_or_else(|| {
        ClauseError::malformed(format!("'fields' of field '{}' must be an object", path))
    })?;
    fields
        .iter()
        .map(|(name, declaration)| {
            let mut params = declaration.as_object().cloned().ok_or_else(|| {
                ClauseError::malformed(format!("subfield '{}.{}' must be an object", path, name))
            })?;
            let field_type = match params.remove("type") {
                Some(Value::String(type_name)) => FieldType::parse(&type_name)?,
                _ => {
                    return Err(ClauseError::malformed(format!(
                        "subfield '{}.{}' declares no type",
                        path, name
                    )))
                }
            };
            Ok(Subfield {
                name: name.clone(),
                field_type,
                params,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::rules::NUMERIC;
    use serde_json::json;

    fn sample() -> Mappings {
        Mappings::from_json(&json!({
            "dynamic": false,
            "properties": {
                "title": {"type": "text", "fields": {"raw": {"type": "keyword"}}},
                "year": {"type": "integer"},
                "meta": {"properties": {"source": {"type": "keyword"}}},
                "roles": {
                    "type": "nested",
                    "properties": {
                        "gender": {"type": "keyword"},
                        "awards": {
                            "type": "nested",
                            "properties": {"name": {"type": "keyword"}}
                        }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_type_lookup() {
        let m = sample();
        assert_eq!(m.type_of("title").unwrap(), FieldType::Text);
        assert_eq!(m.type_of("title.raw").unwrap(), FieldType::Keyword);
        assert_eq!(m.type_of("meta").unwrap(), FieldType::Object);
        assert_eq!(m.type_of("meta.source").unwrap(), FieldType::Keyword);
        assert_eq!(
            m.type_of("title.missing"),
            Err(ClauseError::UnknownField("title.missing".into()))
        );
    }

    #[test]
    fn test_nested_scopes_deepest_first() {
        let m = sample();
        assert!(m.nested_scopes_for("title").unwrap().is_empty());
        assert!(m.nested_scopes_for("meta.source").unwrap().is_empty());
        assert_eq!(m.nested_scopes_for("roles.gender").unwrap(), vec!["roles"]);
        assert_eq!(
            m.nested_scopes_for("roles.awards.name").unwrap(),
            vec!["roles.awards", "roles"]
        );
        assert_eq!(m.nested_at("roles.awards").unwrap(), Some("roles.awards".into()));
    }

    #[test]
    fn test_round_trip() {
        let declaration = json!({
            "dynamic": false,
            "properties": {
                "title": {"type": "text", "analyzer": "english", "fields": {"raw": {"type": "keyword"}}},
                "roles": {"type": "nested", "properties": {"gender": {"type": "keyword"}}}
            }
        });
        let m = Mappings::from_json(&declaration).unwrap();
        assert_eq!(m.to_json(), declaration);
    }

    #[test]
    fn test_wrapped_declarations() {
        let inner = json!({"properties": {"a": {"type": "keyword"}}});
        let wrapped = Mappings::from_json(&json!({"mappings": inner.clone()})).unwrap();
        let index = Mappings::from_json(&json!({"movies": {"mappings": inner}})).unwrap();
        assert!(wrapped.contains("a"));
        assert!(index.contains("a"));
    }

    #[test]
    fn test_malformed_declarations() {
        let untyped = Mappings::from_json(&json!({"properties": {"a": {}}}));
        assert!(matches!(untyped, Err(ClauseError::Malformed(_))));

        let unknown = Mappings::from_json(&json!({"properties": {"a": {"type": "strng"}}}));
        assert_eq!(unknown.unwrap_err(), ClauseError::UnknownFieldType("strng".into()));

        let leaf_with_props = Mappings::from_json(&json!({
            "properties": {"a": {"type": "keyword", "properties": {}}}
        }));
        assert!(leaf_with_props.is_err());
    }

    #[test]
    fn test_check_field() {
        let m = sample();
        assert!(m.check_field("avg", TypeRule::AllowOnly(NUMERIC), "year").is_ok());
        let err = m
            .check_field("avg", TypeRule::AllowOnly(NUMERIC), "title")
            .unwrap_err();
        assert_eq!(err.code(), "SCHEMA_INVALID_FIELD_TYPE");
    }

    #[test]
    fn test_show_lists_fields() {
        let rendered = sample().show();
        assert!(rendered.contains("roles  nested"));
        assert!(rendered.contains("title  text  +raw"));
    }
}
