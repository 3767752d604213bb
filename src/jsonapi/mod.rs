#![forbid(unsafe_code)]

//! JSON:API document assembly.
//!
//! Entities (plain `serde_json::Value` objects) are turned into resources by
//! [`SerializerDescriptor`]s. Nested relationships are serialized recursively
//! and collected into one deduplicated `included` list per document.

/// Recursive assembler.
pub mod assembler;

/// Document types.
pub mod document;

/// Included-resource deduplication.
pub mod included;

/// Serializer descriptors.
pub mod serializer;

pub use assembler::{AssemblyContext, DocumentAssembler};
pub use document::{
    Document, ErrorObject, Links, PrimaryData, Relationship, RelationshipData, Resource,
    ResourceIdentifier,
};
pub use included::IncludedSet;
pub use serializer::{
    FieldSource, RelationshipSpec, SerializerDescriptor, SerializerResolver, JOIN_SEPARATOR,
};
