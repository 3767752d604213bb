#![forbid(unsafe_code)]

//! Descriptor-driven Cypher compilation.
//!
//! Compilers build a clause AST with [`StatementBuilder`]; text is produced
//! only when a [`Statement`] is rendered against a pagination window.

/// Clause-level abstract syntax tree.
pub mod ast;

/// Imperative statement builder.
pub mod builder;

/// Compiler settings and shared scoping helpers.
pub mod compiler;

/// Request-scoped caller identity.
pub mod context;

/// Referential-integrity pre-check.
pub mod integrity;

/// Read statements.
pub mod read;

/// AST to Cypher text.
pub mod render;

/// Full-text term handling.
pub mod search;

/// Compiled statements and their rendered form.
pub mod statement;

/// Write statements.
pub mod write;

pub use builder::StatementBuilder;
pub use compiler::{CompilerSettings, QueryCompiler};
pub use context::RequestContext;
pub use integrity::{missing_from_rows, related_ids, RelatedRef};
pub use read::FindParams;
pub use statement::{CompiledQuery, Params, Statement};
pub use write::{WriteInput, WriteMode, WriteStatements};
