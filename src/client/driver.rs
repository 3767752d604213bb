//! Seam between the execution client and the database.

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::query::CompiledQuery;

/// One result row, keyed by column alias.
pub type Row = Map<String, Value>;

/// Session access mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Read-only session.
    Read,
    /// Session that may write.
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
        })
    }
}

/// Failure classes the driver reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Deadlocks, leader switches and similar; safe to retry.
    Transient,
    /// The connection dropped or could not be established; safe to retry.
    Connection,
    /// Syntax, constraint or type errors; retrying cannot help.
    Query,
}

/// Error reported across the driver seam.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct DriverError {
    /// Failure class.
    pub kind: DriverErrorKind,
    /// Driver-provided detail.
    pub message: String,
}

impl DriverError {
    /// Creates an error of the given kind.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Transient, message)
    }

    /// Connection failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connection, message)
    }

    /// Non-retryable statement failure.
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Query, message)
    }

    /// Whether the driver considers another attempt worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DriverErrorKind::Transient | DriverErrorKind::Connection
        )
    }
}

/// Opens transactions against the database.
#[async_trait]
pub trait GraphDriver: Send + Sync + 'static {
    /// Begins a transaction in a fresh session of the given mode.
    async fn begin(&self, mode: AccessMode) -> Result<Box<dyn GraphTransaction>, DriverError>;
}

/// An open transaction. Dropping it without commit or rollback leaves the
/// outcome to the driver; the client always finishes explicitly.
#[async_trait]
pub trait GraphTransaction: Send {
    /// Runs one statement and collects its rows.
    async fn run(&mut self, query: &CompiledQuery) -> Result<Vec<Row>, DriverError>;

    /// Commits and closes the session.
    async fn commit(self: Box<Self>) -> Result<(), DriverError>;

    /// Rolls back and closes the session.
    async fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}
