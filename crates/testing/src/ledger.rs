//! Ledger with injectable faults

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use versium_migrations::{ExecutionLedger, LedgerError, LedgerRecord, LedgerResult, MemoryLedger};

/// In-memory ledger whose reads or writes can be switched to fail
#[derive(Debug, Default)]
pub struct FailingLedger {
    inner: MemoryLedger,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FailingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_versions<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: MemoryLedger::with_versions(versions),
            ..Self::default()
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryLedger {
        &self.inner
    }

    fn check(&self, flag: &AtomicBool, operation: &str) -> LedgerResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend(format!("injected {} failure", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionLedger for FailingLedger {
    async fn records(&self) -> LedgerResult<Vec<LedgerRecord>> {
        self.check(&self.fail_reads, "read")?;
        self.inner.records().await
    }

    async fn add(&self, version: &str) -> LedgerResult<bool> {
        self.check(&self.fail_writes, "write")?;
        self.inner.add(version).await
    }

    async fn remove(&self, version: &str) -> LedgerResult<bool> {
        self.check(&self.fail_writes, "write")?;
        self.inner.remove(version).await
    }

    async fn exists(&self, version: &str) -> LedgerResult<bool> {
        self.check(&self.fail_reads, "read")?;
        self.inner.exists(version).await
    }
}
