//! Penumbra compiles declarative entity descriptors into parameterized
//! Cypher, runs it through a pooled execution client with write retries and
//! cursor pagination, and assembles the results into JSON:API documents.

#![warn(missing_docs)]

/// Execution client and driver seam.
pub mod client;
/// Engine configuration.
pub mod config;
/// Crate-wide error type.
pub mod error;
/// JSON:API document assembly.
pub mod jsonapi;
/// Tracing subscriber setup.
pub mod logging;
/// Cursor pagination and count derivation.
pub mod pagination;
/// Statement AST and compilers.
pub mod query;
/// Compile, execute and map in one call.
pub mod repository;
/// Entity descriptors and registry.
pub mod schema;

pub use error::{GraphError, MissingRelated, Result};
