//! Serializer descriptors: how an entity becomes a resource.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::query::RequestContext;

/// Computes a value from the entity and the request.
pub type ComputeFn = Arc<dyn Fn(&Value, &RequestContext) -> Value + Send + Sync>;

/// Picks a serializer for one related item; `None` falls back to the
/// relationship's default.
pub type SerializerResolver = Arc<dyn Fn(&Value) -> Option<Arc<SerializerDescriptor>> + Send + Sync>;

/// Where a value comes from.
#[derive(Clone)]
pub enum FieldSource {
    /// A top-level field of the entity.
    Field(String),
    /// A function of the entity.
    Computed(ComputeFn),
}

impl FieldSource {
    /// Field source.
    pub fn field(name: impl Into<String>) -> Self {
        FieldSource::Field(name.into())
    }

    /// Computed source.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Value, &RequestContext) -> Value + Send + Sync + 'static,
    {
        FieldSource::Computed(Arc::new(f))
    }

    /// Resolves against `entity`; absent fields yield `Value::Null`.
    pub fn resolve(&self, entity: &Value, ctx: &RequestContext) -> Value {
        match self {
            FieldSource::Field(name) => entity.get(name).cloned().unwrap_or(Value::Null),
            FieldSource::Computed(f) => f(entity, ctx),
        }
    }
}

impl fmt::Debug for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSource::Field(name) => f.debug_tuple("Field").field(name).finish(),
            FieldSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// One declared relationship.
#[derive(Clone)]
pub enum RelationshipSpec {
    /// Linkage computed from the source entity; nothing is included.
    Identifier {
        /// Type of the linked resource.
        resource_type: String,
        /// Id (or list of ids) of the linked resource.
        id: FieldSource,
    },
    /// Related entity or list found under the relationship key, serialized
    /// recursively and included.
    ///
    /// A key of the form `join__target` reads the `join` array and
    /// serializes each element's `target` object.
    Nested {
        /// Serializer used when `resolver` returns nothing.
        serializer: Arc<SerializerDescriptor>,
        /// Per-item serializer choice.
        resolver: Option<SerializerResolver>,
    },
}

impl fmt::Debug for RelationshipSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipSpec::Identifier { resource_type, id } => f
                .debug_struct("Identifier")
                .field("resource_type", resource_type)
                .field("id", id)
                .finish(),
            RelationshipSpec::Nested {
                serializer,
                resolver,
            } => f
                .debug_struct("Nested")
                .field("serializer", &serializer.resource_type)
                .field("resolver", &resolver.is_some())
                .finish(),
        }
    }
}

/// Separator marking a many-to-many relationship read through a join list.
pub const JOIN_SEPARATOR: &str = "__";

/// Declares how entities of one kind serialize.
#[derive(Clone, Debug)]
pub struct SerializerDescriptor {
    /// JSON:API `type`.
    pub resource_type: String,
    /// Source of the resource id.
    pub id: FieldSource,
    /// Attribute name and source, in declaration order.
    pub attributes: Vec<(String, FieldSource)>,
    /// Resource meta, in declaration order.
    pub meta: Vec<(String, FieldSource)>,
    /// Relationships, in declaration order.
    pub relationships: Vec<(String, RelationshipSpec)>,
    /// Emit `links.self` as `<base_url>/<type>/<id>`.
    pub self_link: bool,
}

impl SerializerDescriptor {
    /// Descriptor for `resource_type` with `id` as the id field.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: FieldSource::field("id"),
            attributes: Vec::new(),
            meta: Vec::new(),
            relationships: Vec::new(),
            self_link: false,
        }
    }

    /// Reads the id from another field.
    pub fn id_field(mut self, name: impl Into<String>) -> Self {
        self.id = FieldSource::field(name);
        self
    }

    /// Computes the id.
    pub fn id_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &RequestContext) -> Value + Send + Sync + 'static,
    {
        self.id = FieldSource::computed(f);
        self
    }

    /// Copies the entity field of the same name.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.attributes.push((name.clone(), FieldSource::Field(name)));
        self
    }

    /// Copies several fields.
    pub fn attributes(self, names: &[&str]) -> Self {
        names.iter().fold(self, |acc, name| acc.attribute(*name))
    }

    /// Attribute with an explicit source.
    pub fn attribute_from(mut self, name: impl Into<String>, source: FieldSource) -> Self {
        self.attributes.push((name.into(), source));
        self
    }

    /// Resource meta entry.
    pub fn meta(mut self, name: impl Into<String>, source: FieldSource) -> Self {
        self.meta.push((name.into(), source));
        self
    }

    /// Identifier-only relationship.
    pub fn identifier(
        mut self,
        name: impl Into<String>,
        resource_type: impl Into<String>,
        id: FieldSource,
    ) -> Self {
        self.relationships.push((
            name.into(),
            RelationshipSpec::Identifier {
                resource_type: resource_type.into(),
                id,
            },
        ));
        self
    }

    /// Nested relationship serialized with `serializer`.
    pub fn nested(mut self, name: impl Into<String>, serializer: Arc<SerializerDescriptor>) -> Self {
        self.relationships.push((
            name.into(),
            RelationshipSpec::Nested {
                serializer,
                resolver: None,
            },
        ));
        self
    }

    /// Nested relationship whose serializer is chosen per item.
    pub fn nested_with<F>(
        mut self,
        name: impl Into<String>,
        fallback: Arc<SerializerDescriptor>,
        resolver: F,
    ) -> Self
    where
        F: Fn(&Value) -> Option<Arc<SerializerDescriptor>> + Send + Sync + 'static,
    {
        self.relationships.push((
            name.into(),
            RelationshipSpec::Nested {
                serializer: fallback,
                resolver: Some(Arc::new(resolver)),
            },
        ));
        self
    }

    /// Turns on `links.self`.
    pub fn with_self_link(mut self) -> Self {
        self.self_link = true;
        self
    }

    /// Freezes the descriptor for sharing.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sources_read_fields_or_compute() {
        let entity = json!({"first": "Ada", "last": "Lovelace"});
        let ctx = RequestContext::system();
        assert_eq!(FieldSource::field("first").resolve(&entity, &ctx), "Ada");
        assert!(FieldSource::field("missing").resolve(&entity, &ctx).is_null());
        let full = FieldSource::computed(|e, _| {
            json!(format!(
                "{} {}",
                e["first"].as_str().unwrap_or_default(),
                e["last"].as_str().unwrap_or_default()
            ))
        });
        assert_eq!(full.resolve(&entity, &ctx), "Ada Lovelace");
    }

    #[test]
    fn builder_keeps_declaration_order() {
        let users = SerializerDescriptor::new("users").attribute("name").shared();
        let articles = SerializerDescriptor::new("articles")
            .attributes(&["title", "body"])
            .nested("author", users)
            .identifier("company", "companies", FieldSource::field("companyId"));
        let names: Vec<&str> = articles.attributes.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["title", "body"]);
        assert_eq!(articles.relationships[0].0, "author");
        assert!(format!("{:?}", articles.relationships[1].1).contains("companies"));
    }
}
