//! Execution Ledger - the persisted set of applied versions
//!
//! The ledger stores identifiers as plain strings: it may hold names that
//! are no longer valid versions, and the registry discards those when
//! listing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;

pub mod file;
pub mod memory;
pub mod postgres;

pub use file::FileLedger;
pub use memory::MemoryLedger;
pub use postgres::{is_valid_table_name, PostgresLedger};

/// One execution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub version: String,
    pub applied_at: DateTime<Utc>,
}

impl LedgerRecord {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            applied_at: Utc::now(),
        }
    }
}

/// Storage backend for execution records
///
/// `add` and `remove` report whether they changed anything: `add` returns
/// `false` when the record already existed and `remove` returns `false` when
/// there was nothing to remove. Backend faults are errors.
#[async_trait]
pub trait ExecutionLedger: Send + Sync {
    /// All records in creation order
    async fn records(&self) -> LedgerResult<Vec<LedgerRecord>>;

    /// Record a version as applied
    async fn add(&self, version: &str) -> LedgerResult<bool>;

    /// Remove a version's record
    async fn remove(&self, version: &str) -> LedgerResult<bool>;

    /// Recorded identifiers in creation order
    async fn list(&self) -> LedgerResult<Vec<String>> {
        Ok(self
            .records()
            .await?
            .into_iter()
            .map(|record| record.version)
            .collect())
    }

    /// Whether a version is recorded
    async fn exists(&self, version: &str) -> LedgerResult<bool> {
        Ok(self
            .records()
            .await?
            .iter()
            .any(|record| record.version == version))
    }
}
