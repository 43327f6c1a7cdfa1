//! JSON file ledger
//!
//! The whole ledger is one JSON document. Every mutation rewrites it through
//! a temporary file in the same directory followed by a rename, so a failed
//! write leaves the previous document intact.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{ExecutionLedger, LedgerRecord};
use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    records: Vec<LedgerRecord>,
}

/// Ledger persisted as a JSON document on disk
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLedger {
    /// Open a ledger at `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> LedgerResult<LedgerDocument> {
        if !self.path.exists() {
            return Ok(LedgerDocument::default());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(LedgerDocument::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_document(&self, document: &LedgerDocument) -> LedgerResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut temp, document)?;
        temp.write_all(b"\n")?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|e| LedgerError::Io(e.error))?;
        Ok(())
    }

    /// Read, change and rewrite the document under the write lock
    ///
    /// `change` returns whether it modified the document; unchanged
    /// documents are not rewritten.
    fn update<F>(&self, change: F) -> LedgerResult<bool>
    where
        F: FnOnce(&mut LedgerDocument) -> bool,
    {
        let _guard = self.write_lock.lock();
        let mut document = self.read_document()?;
        if !change(&mut document) {
            return Ok(false);
        }
        self.write_document(&document)?;
        Ok(true)
    }
}

#[async_trait]
impl ExecutionLedger for FileLedger {
    async fn records(&self) -> LedgerResult<Vec<LedgerRecord>> {
        Ok(self.read_document()?.records)
    }

    async fn add(&self, version: &str) -> LedgerResult<bool> {
        let changed = self.update(|document| {
            if document.records.iter().any(|r| r.version == version) {
                return false;
            }
            document.records.push(LedgerRecord::new(version));
            true
        })?;
        if changed {
            tracing::debug!("Recorded migration {} in {}", version, self.path.display());
        }
        Ok(changed)
    }

    async fn remove(&self, version: &str) -> LedgerResult<bool> {
        let changed = self.update(|document| {
            let before = document.records.len();
            document.records.retain(|r| r.version != version);
            document.records.len() != before
        })?;
        if changed {
            tracing::debug!("Removed migration {} from {}", version, self.path.display());
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_ledger_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("ledger.json");

        let ledger = FileLedger::new(&path);
        assert!(ledger.list().await.unwrap().is_empty());
        assert!(ledger.add("Version20230101000000").await.unwrap());
        assert!(ledger.add("Version20230102000000").await.unwrap());
        assert!(!ledger.add("Version20230101000000").await.unwrap());
        assert!(path.exists());

        let reopened = FileLedger::new(&path);
        assert_eq!(
            reopened.list().await.unwrap(),
            vec!["Version20230101000000", "Version20230102000000"]
        );

        assert!(reopened.remove("Version20230101000000").await.unwrap());
        assert!(!ledger.exists("Version20230101000000").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_ledger_treats_empty_file_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.json");
        fs::write(&path, "").unwrap();

        let ledger = FileLedger::new(&path);
        assert!(ledger.records().await.unwrap().is_empty());
        assert!(!ledger.remove("Version20230101000000").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_ledger_reports_corrupt_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.json");
        fs::write(&path, "{ not json").unwrap();

        let ledger = FileLedger::new(&path);
        assert!(matches!(
            ledger.list().await,
            Err(LedgerError::Serialization(_))
        ));
        assert!(ledger.add("Version20230101000000").await.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }
}
