use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::client::DriverError;
use crate::config::ConfigError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

/// A related node referenced by a write that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRelated {
    /// Relationship name on the entity being written.
    pub relationship: String,
    /// Label the referenced node was expected to carry.
    pub label: String,
    /// Identifier that could not be resolved.
    pub id: String,
}

impl fmt::Display for MissingRelated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.label, self.id, self.relationship)
    }
}

fn join_missing(missing: &[MissingRelated]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every failure class the compiler, execution client, repository and
/// document assembler can produce.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A read transaction failed. Reads are never retried.
    #[error("read failed for {entity}: {source}")]
    ReadExecution {
        /// Entity label of the failing statement, or `-` for ad-hoc queries.
        entity: String,
        /// Statement text that failed.
        query: String,
        /// Driver failure.
        source: DriverError,
    },
    /// A write kept failing after the retry budget was spent.
    #[error("write failed for {entity} after {attempts} attempt(s): {source}")]
    WriteExecution {
        /// Entity label of the failing statement, or `-` for ad-hoc queries.
        entity: String,
        /// Statement text that failed.
        query: String,
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Last driver failure.
        source: DriverError,
    },
    /// One or more related nodes referenced by a write do not exist.
    #[error("referenced node(s) not found: {}", join_missing(.missing))]
    ReferentialIntegrity {
        /// Each unresolved reference.
        missing: Vec<MissingRelated>,
    },
    /// The record exists but the caller's tenant scope does not reach it.
    #[error("access to {entity} '{id}' denied")]
    AccessDenied {
        /// Entity label.
        entity: String,
        /// Identifier that was requested.
        id: String,
    },
    /// The record does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Entity label.
        entity: String,
        /// Identifier that was requested.
        id: String,
    },
    /// The caller referenced a relationship the descriptor does not declare.
    #[error("{entity} has no relationship named '{relationship}'")]
    UnknownRelationship {
        /// Entity label.
        entity: String,
        /// Relationship name that was requested.
        relationship: String,
    },
    /// A statement inside an atomic batch failed; the batch was rolled back.
    #[error("transaction rolled back at statement {index}: {source}")]
    TransactionRollback {
        /// Zero-based position of the failing statement in the batch.
        index: usize,
        /// Driver failure.
        source: DriverError,
    },
    /// No session became available before the acquisition timeout elapsed.
    #[error("no database session available after {waited:?}")]
    PoolTimeout {
        /// Time spent waiting.
        waited: Duration,
    },
    /// A company-scoped query was compiled for a caller without a tenant.
    #[error("{entity} is company scoped but the request carries no company")]
    MissingTenant {
        /// Entity label.
        entity: String,
    },
    /// Input rejected before any statement was issued.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A database row could not be turned into an entity or resource.
    #[error("mapping error: {0}")]
    Mapping(String),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GraphError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        GraphError::InvalidArgument(message.into())
    }

    pub(crate) fn mapping(message: impl Into<String>) -> Self {
        GraphError::Mapping(message.into())
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::ReadExecution { .. } => "ReadExecutionError",
            GraphError::WriteExecution { .. } => "WriteExecutionError",
            GraphError::ReferentialIntegrity { .. } => "ReferentialIntegrityError",
            GraphError::AccessDenied { .. } => "AccessDeniedError",
            GraphError::NotFound { .. } => "NotFoundError",
            GraphError::UnknownRelationship { .. } => "UnknownRelationshipError",
            GraphError::TransactionRollback { .. } => "TransactionRollbackError",
            GraphError::PoolTimeout { .. } => "PoolTimeoutError",
            GraphError::MissingTenant { .. } => "MissingTenantError",
            GraphError::InvalidArgument(_) => "InvalidArgument",
            GraphError::Mapping(_) => "MappingError",
            GraphError::Config(_) => "ConfigError",
        }
    }

    /// HTTP status the outer layer reports for this failure.
    pub fn status(&self) -> u16 {
        match self {
            GraphError::AccessDenied { .. } => 403,
            GraphError::NotFound { .. } => 404,
            GraphError::UnknownRelationship { .. }
            | GraphError::ReferentialIntegrity { .. }
            | GraphError::InvalidArgument(_) => 400,
            GraphError::MissingTenant { .. } => 403,
            _ => 500,
        }
    }

    /// Whether the failure came from the driver rather than from validation.
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            GraphError::ReadExecution { .. }
                | GraphError::WriteExecution { .. }
                | GraphError::TransactionRollback { .. }
                | GraphError::PoolTimeout { .. }
        )
    }
}

/// Convenience wrapper that formats errors with their codes.
pub struct GraphErrorWithCode<'a>(pub &'a GraphError);

impl fmt::Display for GraphErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
