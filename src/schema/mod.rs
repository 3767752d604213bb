#![forbid(unsafe_code)]

//! Entity descriptors and the startup registry.
//!
//! Descriptors are declared once (in code or in a TOML schema file), validated
//! and frozen into a [`DescriptorRegistry`]. The registry is shared read-only
//! by every compiler and assembly call for the life of the process.

/// Constraint and index DDL rendering.
pub mod ddl;

/// Descriptor types.
pub mod descriptor;

/// Registry and schema files.
pub mod registry;

pub use descriptor::{
    is_identifier, Cardinality, ConstraintDef, Direction, EdgeFieldDef, EntityDescriptor,
    FieldDef, FieldType, IndexDef, IndexKind, NodeModel, OrderBy, RelationshipDef,
    ReturnClauseFn, ReturnScope, SortDirection, SYSTEM_FIELDS,
};
pub use registry::{DescriptorRegistry, RegistryBuilder, SchemaFile};
