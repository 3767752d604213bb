//! Static per-entity schema declarations.
//!
//! A descriptor is pure data: it names the node label and variable, the
//! declared properties, the relationships to other labels (with their edge
//! properties), and the constraints and indexes the database should carry.
//! Every compiler and assembly call is driven by one of these.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GraphError, Result};
use crate::query::ast::{Clause, Var};

/// Label and variable used for the primary node in compiled statements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeModel {
    /// Variable bound to the entity node (`article`).
    pub node_variable: String,
    /// Node label (`Article`).
    pub label: String,
}

/// Declared property kinds. Only the temporal kinds alter the emitted Cypher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// UTF-8 string.
    #[default]
    String,
    /// Integer or float.
    Number,
    /// Boolean flag.
    Boolean,
    /// Timestamp cast with `datetime(..)`.
    Datetime,
    /// Calendar date cast with `date(left(.., 10))`.
    Date,
    /// List of timestamps cast element-wise.
    #[serde(rename = "datetime[]")]
    DatetimeList,
    /// List of dates cast element-wise.
    #[serde(rename = "date[]")]
    DateList,
    /// List of strings.
    #[serde(rename = "string[]")]
    StringList,
    /// List of numbers.
    #[serde(rename = "number[]")]
    NumberList,
    /// Opaque JSON value stored as-is.
    Json,
}

impl FieldType {
    /// True for the single and list temporal kinds.
    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            FieldType::Datetime | FieldType::Date | FieldType::DatetimeList | FieldType::DateList
        )
    }
}

/// A declared node property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct FieldDef {
    /// Property kind.
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Value used on create when the caller omits the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDef {
    /// Field of the given kind without a default.
    pub fn of(field_type: FieldType) -> Self {
        Self {
            field_type,
            default: None,
        }
    }

    /// Attaches a create-time default.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Direction of a relationship as seen from the entity node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// `(entity)-[:REL]->(target)`
    #[default]
    Out,
    /// `(entity)<-[:REL]-(target)`
    In,
}

/// How many related nodes a relationship may connect to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// At most one related node.
    #[default]
    One,
    /// Any number of related nodes.
    Many,
}

/// A property stored on the edge itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeFieldDef {
    /// Property name on the relationship.
    pub name: String,
    /// Value applied when the caller does not supply one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A declared relationship from the entity to another label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    /// Relationship type in the graph (`WRITTEN_BY`).
    pub relationship_label: String,
    /// Arrow direction relative to the entity node.
    #[serde(default)]
    pub direction: Direction,
    /// One or many related nodes.
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Whether every entity must have this relationship.
    #[serde(default)]
    pub required: bool,
    /// Label of the related node.
    pub target_label: String,
    /// Edge properties.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EdgeFieldDef>,
    /// Request-context key whose value stands in for a missing input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_key: Option<String>,
    /// Input parameter carrying the related ids (defaults to the relationship name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dto_key: Option<String>,
}

impl RelationshipDef {
    /// Relationship with the given type and target label, `out`/`one`/optional.
    pub fn new(relationship_label: impl Into<String>, target_label: impl Into<String>) -> Self {
        Self {
            relationship_label: relationship_label.into(),
            direction: Direction::Out,
            cardinality: Cardinality::One,
            required: false,
            target_label: target_label.into(),
            fields: Vec::new(),
            context_key: None,
            dto_key: None,
        }
    }

    /// Sets the arrow direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Marks the relationship as many-valued.
    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    /// Marks the relationship as mandatory.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Declares an edge property.
    pub fn edge_field(mut self, name: impl Into<String>, default: Option<Value>) -> Self {
        self.fields.push(EdgeFieldDef {
            name: name.into(),
            default,
        });
        self
    }

    /// Falls back to a request-context value when the input omits the key.
    pub fn context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = Some(key.into());
        self
    }

    /// Reads related ids from a differently named input key.
    pub fn dto_key(mut self, key: impl Into<String>) -> Self {
        self.dto_key = Some(key.into());
        self
    }

    /// Input key carrying the related ids for relationship `name`.
    pub fn input_key<'a>(&'a self, name: &'a str) -> &'a str {
        self.dto_key.as_deref().unwrap_or(name)
    }

    /// Whether reads must use an optional traversal.
    pub fn is_optional(&self) -> bool {
        self.cardinality == Cardinality::Many || !self.required
    }
}

/// Uniqueness constraint on a property.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDef {
    /// Property that must be unique per label.
    pub property: String,
}

/// Kinds of index the schema can request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Plain range index.
    #[default]
    Range,
    /// Lucene-backed full-text index.
    Fulltext,
    /// Approximate nearest neighbour vector index.
    Vector,
}

/// Index declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, used verbatim in DDL and procedure calls.
    pub name: String,
    /// Index kind.
    #[serde(rename = "type", default)]
    pub kind: IndexKind,
    /// Indexed properties.
    pub properties: Vec<String>,
    /// Vector dimensions, required for vector indexes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    /// Vector similarity function (`cosine` when omitted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<String>,
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    #[default]
    Desc,
}

/// Ordering on a node property.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Property to order by.
    pub field: String,
    /// Sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Inputs handed to a custom return clause.
pub struct ReturnScope<'a> {
    /// Entity node variable.
    pub node: &'a Var,
    /// Every variable bound when the final projection runs, in binding order.
    pub bound: &'a [Var],
}

/// Descriptor-level replacement for the generic final projection.
#[derive(Clone)]
pub struct ReturnClauseFn(pub Arc<dyn Fn(&ReturnScope<'_>) -> Clause + Send + Sync>);

impl fmt::Debug for ReturnClauseFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReturnClauseFn(..)")
    }
}

/// Property names every entity carries regardless of its declared fields.
pub const SYSTEM_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// Schema for one entity type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Primary node label and variable.
    pub model: NodeModel,
    /// Whether the entity hangs off a tenant node.
    #[serde(default)]
    pub is_company_scoped: bool,
    /// Declared properties (excluding `id`, `createdAt`, `updatedAt`).
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
    /// Declared relationships by name.
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDef>,
    /// Uniqueness constraints.
    #[serde(default)]
    pub constraints: Vec<ConstraintDef>,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    /// Full-text index used for term searches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulltext_index_name: Option<String>,
    /// Ordering used when the caller does not pass one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_order_by: Option<OrderBy>,
    /// Overrides the generic final projection.
    #[serde(skip)]
    pub return_clause: Option<ReturnClauseFn>,
}

impl EntityDescriptor {
    /// Creates an unscoped descriptor with no fields or relationships.
    pub fn new(label: impl Into<String>, node_variable: impl Into<String>) -> Self {
        Self {
            model: NodeModel {
                node_variable: node_variable.into(),
                label: label.into(),
            },
            is_company_scoped: false,
            fields: BTreeMap::new(),
            relationships: BTreeMap::new(),
            constraints: vec![ConstraintDef {
                property: "id".into(),
            }],
            indexes: Vec::new(),
            fulltext_index_name: None,
            default_order_by: None,
            return_clause: None,
        }
    }

    /// Marks the entity as reachable only through its tenant.
    pub fn company_scoped(mut self) -> Self {
        self.is_company_scoped = true;
        self
    }

    /// Declares a property.
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Declares a relationship.
    pub fn relationship(mut self, name: impl Into<String>, def: RelationshipDef) -> Self {
        self.relationships.insert(name.into(), def);
        self
    }

    /// Declares a uniqueness constraint.
    pub fn constraint(mut self, property: impl Into<String>) -> Self {
        let property = property.into();
        if !self.constraints.iter().any(|c| c.property == property) {
            self.constraints.push(ConstraintDef { property });
        }
        self
    }

    /// Declares an index.
    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Declares the full-text index used for term searches.
    pub fn fulltext(mut self, index_name: impl Into<String>, properties: &[&str]) -> Self {
        let name = index_name.into();
        self.indexes.push(IndexDef {
            name: name.clone(),
            kind: IndexKind::Fulltext,
            properties: properties.iter().map(|p| (*p).to_owned()).collect(),
            dimensions: None,
            similarity: None,
        });
        self.fulltext_index_name = Some(name);
        self
    }

    /// Sets the fallback ordering.
    pub fn default_order(mut self, order: OrderBy) -> Self {
        self.default_order_by = Some(order);
        self
    }

    /// Installs a custom final projection.
    pub fn with_return_clause<F>(mut self, build: F) -> Self
    where
        F: Fn(&ReturnScope<'_>) -> Clause + Send + Sync + 'static,
    {
        self.return_clause = Some(ReturnClauseFn(Arc::new(build)));
        self
    }

    /// Node label.
    pub fn label(&self) -> &str {
        &self.model.label
    }

    /// Entity node variable.
    pub fn node_var(&self) -> Var {
        Var(self.model.node_variable.clone())
    }

    /// Looks up a relationship, failing with `UnknownRelationship`.
    pub fn relationship_def(&self, name: &str) -> Result<&RelationshipDef> {
        self.relationships
            .get(name)
            .ok_or_else(|| GraphError::UnknownRelationship {
                entity: self.model.label.clone(),
                relationship: name.to_owned(),
            })
    }

    /// Whether `name` is a declared field or a system field.
    pub fn knows_property(&self, name: &str) -> bool {
        self.fields.contains_key(name) || SYSTEM_FIELDS.contains(&name)
    }

    /// Vector index used by similarity searches, if declared.
    pub fn vector_index(&self) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.kind == IndexKind::Vector)
    }

    /// Checks that every interpolated token is a safe identifier and that
    /// cross references inside the descriptor resolve.
    pub fn validate(&self) -> Result<()> {
        let label = &self.model.label;
        ensure_identifier("label", label)?;
        ensure_identifier("node variable", &self.model.node_variable)?;
        for name in self.fields.keys() {
            ensure_identifier("field", name)?;
            if SYSTEM_FIELDS.contains(&name.as_str()) {
                return Err(GraphError::invalid(format!(
                    "{label}: '{name}' is managed by the engine and cannot be declared"
                )));
            }
        }
        for (name, rel) in &self.relationships {
            ensure_identifier("relationship", name)?;
            ensure_identifier("relationship label", &rel.relationship_label)?;
            ensure_identifier("target label", &rel.target_label)?;
            if let Some(key) = &rel.dto_key {
                ensure_identifier("dto key", key)?;
            }
            for edge in &rel.fields {
                ensure_identifier("edge field", &edge.name)?;
            }
        }
        for constraint in &self.constraints {
            if !self.knows_property(&constraint.property) {
                return Err(GraphError::invalid(format!(
                    "{label}: constraint on undeclared property '{}'",
                    constraint.property
                )));
            }
        }
        for index in &self.indexes {
            ensure_identifier("index", &index.name)?;
            if index.properties.is_empty() {
                return Err(GraphError::invalid(format!(
                    "{label}: index '{}' lists no properties",
                    index.name
                )));
            }
            if let Some(prop) = index.properties.iter().find(|p| !self.knows_property(p)) {
                return Err(GraphError::invalid(format!(
                    "{label}: index '{}' covers undeclared property '{prop}'",
                    index.name
                )));
            }
            if index.kind == IndexKind::Vector && index.dimensions.is_none() {
                return Err(GraphError::invalid(format!(
                    "{label}: vector index '{}' needs dimensions",
                    index.name
                )));
            }
        }
        if let Some(name) = &self.fulltext_index_name {
            ensure_identifier("fulltext index", name)?;
            let declared = self
                .indexes
                .iter()
                .any(|i| i.kind == IndexKind::Fulltext && &i.name == name);
            if !self.indexes.is_empty() && !declared {
                return Err(GraphError::invalid(format!(
                    "{label}: fulltext index '{name}' is not among the declared indexes"
                )));
            }
        }
        if let Some(order) = &self.default_order_by {
            if !self.knows_property(&order.field) {
                return Err(GraphError::invalid(format!(
                    "{label}: default order on undeclared property '{}'",
                    order.field
                )));
            }
        }
        Ok(())
    }
}

/// Accepts ASCII identifiers usable unquoted in Cypher.
pub fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn ensure_identifier(what: &str, token: &str) -> Result<()> {
    if is_identifier(token) {
        Ok(())
    } else {
        Err(GraphError::invalid(format!(
            "{what} '{token}' is not a valid identifier"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> EntityDescriptor {
        EntityDescriptor::new("Article", "article")
            .company_scoped()
            .field("title", FieldDef::of(FieldType::String))
            .field("publishedAt", FieldDef::of(FieldType::Datetime))
            .relationship(
                "author",
                RelationshipDef::new("WRITTEN_BY", "User").required(),
            )
            .fulltext("article_search", &["title"])
            .default_order(OrderBy::desc("publishedAt"))
    }

    #[test]
    fn valid_descriptor_passes() {
        article().validate().expect("descriptor should validate");
    }

    #[test]
    fn rejects_injected_labels() {
        let bad = EntityDescriptor::new("Article) DETACH DELETE (x", "article");
        assert!(matches!(
            bad.validate(),
            Err(GraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_redeclared_system_fields() {
        let bad = article().field("createdAt", FieldDef::of(FieldType::Datetime));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn unknown_relationship_is_reported_by_name() {
        let err = article().relationship_def("editor").unwrap_err();
        match err {
            GraphError::UnknownRelationship {
                entity,
                relationship,
            } => {
                assert_eq!(entity, "Article");
                assert_eq!(relationship, "editor");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn many_or_optional_relationships_traverse_optionally() {
        let required_one = RelationshipDef::new("WRITTEN_BY", "User").required();
        let optional_one = RelationshipDef::new("EDITED_BY", "User");
        let required_many = RelationshipDef::new("TAGGED", "Tag").many().required();
        assert!(!required_one.is_optional());
        assert!(optional_one.is_optional());
        assert!(required_many.is_optional());
    }

    #[test]
    fn descriptor_parses_from_toml() {
        let text = r#"
            is_company_scoped = true
            fulltext_index_name = "article_search"

            [model]
            node_variable = "article"
            label = "Article"

            [fields.title]
            type = "string"

            [fields.dates]
            type = "date[]"

            [relationships.tags]
            relationship_label = "TAGGED"
            target_label = "Tag"
            cardinality = "many"
            fields = [{ name = "weight", default = 1 }]

            [[indexes]]
            name = "article_search"
            type = "fulltext"
            properties = ["title"]
        "#;
        let descriptor: EntityDescriptor = toml::from_str(text).expect("parse descriptor");
        assert_eq!(descriptor.fields["dates"].field_type, FieldType::DateList);
        assert_eq!(
            descriptor.relationships["tags"].cardinality,
            Cardinality::Many
        );
        assert!(descriptor.return_clause.is_none());
        descriptor.validate().expect("parsed descriptor validates");
    }
}
