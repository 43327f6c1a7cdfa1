//! # versium-migrations
//!
//! Versioned migration orchestration.
//!
//! ## Features
//!
//! - **Status registry**: merges a definition catalog with an execution ledger
//!   into `new` / `installed` / `unknown` statuses
//! - **Single-version executor**: apply or roll back one version, with a
//!   `force` override and panic capture
//! - **Restartable migrations**: a migration can suspend itself and be resumed
//!   with the parameters it saved
//! - **Manual marking**: flip versions between `new` and `installed` without
//!   running them
//! - **Pluggable storage**: file and in-memory catalogs; memory, JSON file and
//!   PostgreSQL ledgers
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use versium_migrations::{
//!     MemoryCatalog, MemoryLedger, Migration, MigrationDirection, MigrationManager,
//!     MigrationParams, StepOutcome, StepResult, VersionName, VersionStatus,
//! };
//!
//! #[derive(Default)]
//! struct AddIndex {
//!     params: MigrationParams,
//! }
//!
//! #[async_trait]
//! impl Migration for AddIndex {
//!     fn set_params(&mut self, params: MigrationParams) {
//!         self.params = params;
//!     }
//!
//!     fn params(&self) -> MigrationParams {
//!         self.params.clone()
//!     }
//!
//!     async fn up(&mut self) -> StepResult {
//!         Ok(StepOutcome::Done)
//!     }
//!
//!     async fn down(&mut self) -> StepResult {
//!         Ok(StepOutcome::Done)
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let catalog = Arc::new(MemoryCatalog::new());
//! catalog.register(VersionName::parse("Version20230101000000").unwrap(), || {
//!     Box::new(AddIndex::default())
//! });
//!
//! let manager = MigrationManager::new(catalog, Arc::new(MemoryLedger::new()));
//! let outcome = manager
//!     .start_migration("Version20230101000000", MigrationDirection::Up, MigrationParams::new(), false)
//!     .await;
//! assert!(outcome.is_success());
//!
//! let meta = manager.lookup("Version20230101000000").await.unwrap().unwrap();
//! assert_eq!(meta.status, VersionStatus::Installed);
//! # });
//! ```

pub mod catalog;
pub mod config;
pub mod definitions;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod manager;
pub mod migration;
pub mod notifier;
pub mod registry;
pub mod restart;
pub mod sql;
pub mod version;

pub use catalog::{clean_description, CatalogEntry, DefinitionCatalog, FileCatalog, LoadedDefinition, MemoryCatalog};
pub use config::{ConfigError, ConfigSource, LedgerBackend, MigrationConfig, MigrationConfigBuilder};
pub use definitions::{
    MarkResult, MigrationDirection, RunOutcome, StatusSummary, VersionFilter, VersionMetadata,
    VersionStatus,
};
pub use error::{BoxError, LedgerError, LedgerResult, MigrationError, MigrationResult};
pub use executor::MigrationExecutor;
pub use ledger::{ExecutionLedger, FileLedger, LedgerRecord, MemoryLedger, PostgresLedger};
pub use manager::MigrationManager;
pub use migration::{merge_params, Migration, MigrationFactory, MigrationHandle, MigrationParams, StepOutcome, StepResult};
pub use notifier::{MigrationNotifier, TracingNotifier};
pub use registry::VersionRegistry;
pub use restart::RestartTracker;
pub use sql::{split_sql_statements, SqlDefinition, SqlMigration, StatementRunner};
pub use version::{timestamp_token, VersionName};
