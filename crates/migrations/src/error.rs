//! Error types for the migration system
//!
//! `MigrationError` is what registry queries return and what a failed
//! [`RunOutcome`](crate::RunOutcome) carries. `LedgerError` is raised by
//! ledger backends and wrapped by the registry and executor.

use thiserror::Error;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Result type alias for ledger backends
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type returned by migration behaviors
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Invalid version identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("Migration not found: {0}")]
    MigrationNotFound(String),

    #[error("Migration {0} is already applied")]
    AlreadyApplied(String),

    #[error("Migration {0} is already rolled back")]
    AlreadyRolledBack(String),

    #[error("Migration {version} failed: {message}")]
    Execution { version: String, message: String },

    #[error("Migration {version} ran but the ledger could not be updated: {message}")]
    LedgerWrite { version: String, message: String },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Migration {version} requested a restart {attempts} times without completing")]
    RestartLimitExceeded { version: String, attempts: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MigrationError {
    /// Create an execution error for a version
    pub fn execution(version: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            version: version.into(),
            message: message.into(),
        }
    }

    /// Create a ledger write error for a version
    pub fn ledger_write(version: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LedgerWrite {
            version: version.into(),
            message: message.into(),
        }
    }

    /// Whether `force` would have bypassed this error
    pub fn is_status_conflict(&self) -> bool {
        matches!(self, Self::AlreadyApplied(_) | Self::AlreadyRolledBack(_))
    }
}

/// Error types for execution ledger backends
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}
