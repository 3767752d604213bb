use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::config::ConfigError;
use crate::error::{GraphError, Result};
use crate::schema::ddl;
use crate::schema::descriptor::EntityDescriptor;

/// Read-only lookup of descriptors by label, built once at startup.
#[derive(Clone, Debug, Default)]
pub struct DescriptorRegistry {
    entries: BTreeMap<String, Arc<EntityDescriptor>>,
}

impl DescriptorRegistry {
    /// Starts collecting descriptors.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Returns the descriptor for `label`.
    ///
    /// # Panics
    ///
    /// Panics when `label` was never registered. Asking for an unknown entity
    /// type is a wiring bug and must not degrade into an empty query.
    pub fn get(&self, label: &str) -> &Arc<EntityDescriptor> {
        match self.entries.get(label) {
            Some(descriptor) => descriptor,
            None => panic!("no entity descriptor registered for '{label}'"),
        }
    }

    /// Returns the descriptor for `label`, if registered.
    pub fn try_get(&self, label: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entries.get(label)
    }

    /// Registered labels in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Registered descriptors in label order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityDescriptor>> {
        self.entries.values()
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Constraint and index DDL for every registered descriptor.
    pub fn ddl(&self) -> Vec<String> {
        self.entries
            .values()
            .flat_map(|descriptor| ddl::statements(descriptor))
            .collect()
    }
}

/// Collects descriptors and validates them before freezing the registry.
#[derive(Default)]
pub struct RegistryBuilder {
    pending: Vec<EntityDescriptor>,
}

impl RegistryBuilder {
    /// Queues a descriptor for registration.
    pub fn register(mut self, descriptor: EntityDescriptor) -> Self {
        self.pending.push(descriptor);
        self
    }

    /// Queues several descriptors.
    pub fn register_all<I>(mut self, descriptors: I) -> Self
    where
        I: IntoIterator<Item = EntityDescriptor>,
    {
        self.pending.extend(descriptors);
        self
    }

    /// Validates every descriptor and rejects duplicate labels.
    pub fn build(self) -> Result<DescriptorRegistry> {
        let mut entries = BTreeMap::new();
        for descriptor in self.pending {
            descriptor.validate()?;
            let label = descriptor.model.label.clone();
            if entries.contains_key(&label) {
                return Err(GraphError::invalid(format!(
                    "entity '{label}' registered twice"
                )));
            }
            debug!(
                entity = %label,
                fields = descriptor.fields.len(),
                relationships = descriptor.relationships.len(),
                "schema.registry.register"
            );
            entries.insert(label, Arc::new(descriptor));
        }
        Ok(DescriptorRegistry { entries })
    }
}

/// A set of descriptors stored in a TOML file.
///
/// ```toml
/// [[entities]]
/// is_company_scoped = true
/// [entities.model]
/// label = "Article"
/// node_variable = "article"
/// ```
#[derive(Debug, Deserialize)]
pub struct SchemaFile {
    /// Declared entities.
    #[serde(default)]
    pub entities: Vec<EntityDescriptor>,
}

impl SchemaFile {
    /// Parses a schema document.
    pub fn parse(text: &str, origin: &Path) -> std::result::Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Reads and parses a schema file.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Builds a registry from the file's entities.
    pub fn into_registry(self) -> Result<DescriptorRegistry> {
        DescriptorRegistry::builder()
            .register_all(self.entities)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::{FieldDef, FieldType};

    fn registry() -> DescriptorRegistry {
        DescriptorRegistry::builder()
            .register(
                EntityDescriptor::new("Article", "article")
                    .field("title", FieldDef::of(FieldType::String)),
            )
            .register(EntityDescriptor::new("User", "user"))
            .build()
            .expect("registry builds")
    }

    #[test]
    fn lookups_return_registered_descriptors() {
        let registry = registry();
        assert_eq!(registry.get("Article").model.node_variable, "article");
        assert!(registry.try_get("Invoice").is_none());
        assert_eq!(registry.labels().collect::<Vec<_>>(), ["Article", "User"]);
    }

    #[test]
    #[should_panic(expected = "no entity descriptor registered for 'Invoice'")]
    fn unknown_entity_fails_fast() {
        registry().get("Invoice");
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let result = DescriptorRegistry::builder()
            .register(EntityDescriptor::new("User", "user"))
            .register(EntityDescriptor::new("User", "person"))
            .build();
        assert!(matches!(result, Err(GraphError::InvalidArgument(_))));
    }

    #[test]
    fn schema_file_builds_registry() {
        let text = r#"
            [[entities]]
            [entities.model]
            label = "Tag"
            node_variable = "tag"
            [entities.fields.name]
            type = "string"

            [[entities]]
            is_company_scoped = true
            [entities.model]
            label = "Article"
            node_variable = "article"
        "#;
        let registry = SchemaFile::parse(text, Path::new("inline.toml"))
            .expect("schema parses")
            .into_registry()
            .expect("registry builds");
        assert_eq!(registry.len(), 2);
        assert!(registry.get("Article").is_company_scoped);
    }
}
