//! Temporary migration workspaces

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use versium_migrations::config::build_config;
use versium_migrations::{LedgerBackend, MigrationConfig, MigrationConfigBuilder};

use crate::{TestError, TestResult};

/// Write `<dir>/<version>.sql` with the usual section markers
pub fn write_sql_definition(
    dir: &Path,
    version: &str,
    description: Option<&str>,
    up_sql: &str,
    down_sql: &str,
) -> TestResult<PathBuf> {
    let mut content = String::new();
    if let Some(description) = description {
        content.push_str(&format!("-- Description: {}\n", description));
    }
    content.push_str(&format!("-- Up\n{}\n\n-- Down\n{}\n", up_sql, down_sql));

    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.sql", version));
    fs::write(&path, content)?;
    Ok(path)
}

/// Temporary directory holding a migrations folder and a ledger file
///
/// Everything is removed when the workspace is dropped.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> TestResult<Self> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("migrations"))?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.dir.path().join("migrations")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("ledger.json")
    }

    /// Configuration using this workspace's directory and ledger file
    pub fn config(&self) -> TestResult<MigrationConfig> {
        let builder = MigrationConfigBuilder::new()
            .migrations_dir(self.migrations_dir())
            .ledger(LedgerBackend::File {
                path: self.ledger_path(),
            });
        Ok(build_config(builder)?)
    }

    pub fn add_sql(
        &self,
        version: &str,
        description: Option<&str>,
        up_sql: &str,
        down_sql: &str,
    ) -> TestResult<PathBuf> {
        write_sql_definition(&self.migrations_dir(), version, description, up_sql, down_sql)
    }

    /// Delete a definition file, leaving any ledger record behind
    pub fn remove_definition(&self, version: &str) -> TestResult<()> {
        let path = self.migrations_dir().join(format!("{}.sql", version));
        if !path.exists() {
            return Err(TestError::Fixture {
                message: format!("no definition file for {}", version),
            });
        }
        fs::remove_file(path)?;
        Ok(())
    }
}
