//! In-memory ledger for development and testing

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ExecutionLedger, LedgerRecord};
use crate::error::LedgerResult;

/// In-memory ledger backend
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RwLock<Vec<LedgerRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger that already holds the given versions, in order
    pub fn with_versions<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            records: RwLock::new(versions.into_iter().map(LedgerRecord::new).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ExecutionLedger for MemoryLedger {
    async fn records(&self) -> LedgerResult<Vec<LedgerRecord>> {
        Ok(self.records.read().clone())
    }

    async fn add(&self, version: &str) -> LedgerResult<bool> {
        let mut records = self.records.write();
        if records.iter().any(|r| r.version == version) {
            return Ok(false);
        }
        records.push(LedgerRecord::new(version));
        Ok(true)
    }

    async fn remove(&self, version: &str) -> LedgerResult<bool> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.version != version);
        Ok(records.len() != before)
    }

    async fn exists(&self, version: &str) -> LedgerResult<bool> {
        Ok(self.records.read().iter().any(|r| r.version == version))
    }
}
