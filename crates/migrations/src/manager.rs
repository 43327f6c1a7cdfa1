//! Migration Manager - entry point tying the registry, executor and restart
//! tracker together

use std::sync::Arc;

use crate::catalog::{DefinitionCatalog, FileCatalog};
use crate::config::{LedgerBackend, MigrationConfig};
use crate::definitions::{
    MarkResult, MigrationDirection, RunOutcome, StatusSummary, VersionFilter, VersionMetadata,
    VersionStatus,
};
use crate::error::{MigrationError, MigrationResult};
use crate::executor::MigrationExecutor;
use crate::ledger::{ExecutionLedger, FileLedger, MemoryLedger, PostgresLedger};
use crate::migration::{merge_params, MigrationParams};
use crate::notifier::MigrationNotifier;
use crate::registry::VersionRegistry;
use crate::restart::RestartTracker;
use crate::sql::StatementRunner;
use crate::version::VersionName;

/// Migration manager for querying, applying and rolling back versions
pub struct MigrationManager {
    registry: Arc<VersionRegistry>,
    restarts: Arc<RestartTracker>,
    executor: MigrationExecutor,
}

impl MigrationManager {
    /// Create a manager over a catalog and a ledger
    pub fn new(catalog: Arc<dyn DefinitionCatalog>, ledger: Arc<dyn ExecutionLedger>) -> Self {
        let registry = Arc::new(VersionRegistry::new(catalog, ledger));
        let restarts = Arc::new(RestartTracker::new());
        let executor = MigrationExecutor::new(registry.clone(), restarts.clone());
        Self {
            registry,
            restarts,
            executor,
        }
    }

    /// Build the catalog and ledger described by `config`
    ///
    /// SQL definitions run through `runner`. With a PostgreSQL ledger and no
    /// runner, they run through the ledger's pool. Any other ledger needs a
    /// runner, otherwise `Configuration` is returned: SQL files could be
    /// listed but never loaded.
    pub async fn from_config(
        config: &MigrationConfig,
        runner: Option<Arc<dyn StatementRunner>>,
    ) -> MigrationResult<Self> {
        config.validate()?;

        let (ledger, runner): (Arc<dyn ExecutionLedger>, Option<Arc<dyn StatementRunner>>) =
            match config.get_ledger() {
                LedgerBackend::Memory => {
                    (Arc::new(MemoryLedger::new()) as Arc<dyn ExecutionLedger>, runner)
                }
                LedgerBackend::File { path } => {
                    (Arc::new(FileLedger::new(path.clone())) as Arc<dyn ExecutionLedger>, runner)
                }
                LedgerBackend::Postgres { url } => {
                    let ledger =
                        PostgresLedger::connect(url, config.get_migrations_table().clone()).await?;
                    let runner = runner.or_else(|| {
                        Some(Arc::new(ledger.pool().clone()) as Arc<dyn StatementRunner>)
                    });
                    (Arc::new(ledger) as Arc<dyn ExecutionLedger>, runner)
                }
            };

        let runner = runner.ok_or_else(|| {
            MigrationError::Configuration(format!(
                "a statement runner is required to run SQL definitions with the {:?} ledger",
                config.get_ledger()
            ))
        })?;
        let catalog = FileCatalog::new(config.get_migrations_dir().clone())
            .with_extension(config.get_file_extension().clone())
            .with_runner(runner);

        tracing::debug!(
            migrations_dir = %config.get_migrations_dir().display(),
            ledger = ?config.get_ledger(),
            "Migration manager configured"
        );

        Ok(Self::new(Arc::new(catalog), ledger))
    }

    /// Replace the notifier used for run outcomes
    pub fn with_notifier(mut self, notifier: Arc<dyn MigrationNotifier>) -> Self {
        self.executor = self.executor.with_notifier(notifier);
        self
    }

    pub fn registry(&self) -> &Arc<VersionRegistry> {
        &self.registry
    }

    pub fn restarts(&self) -> &Arc<RestartTracker> {
        &self.restarts
    }

    /// Apply or roll back one version; see [`MigrationExecutor::run`]
    pub async fn start_migration(
        &self,
        name: &str,
        direction: MigrationDirection,
        params: MigrationParams,
        force: bool,
    ) -> RunOutcome {
        self.executor.run(name, direction, params, force).await
    }

    /// Whether the last attempt for `name` ended in a restart request
    ///
    /// Malformed names never need a restart.
    pub fn needs_restart(&self, name: &str) -> bool {
        VersionName::parse(name)
            .map(|version| self.restarts.needs_restart(&version))
            .unwrap_or(false)
    }

    /// Parameters saved by the last restart request for `name`
    pub fn restart_params(&self, name: &str) -> Option<MigrationParams> {
        let version = VersionName::parse(name).ok()?;
        self.restarts.restart_params(&version)
    }

    /// Versions whose last attempt asked for a restart, in version order
    pub fn pending_restarts(&self) -> Vec<VersionName> {
        self.restarts.pending()
    }

    /// Run a version until it completes, resuming after each restart request
    ///
    /// Saved parameters are merged over the previous ones before each new
    /// attempt. Fails with `RestartLimitExceeded` once `max_attempts`
    /// attempts have all asked for a restart.
    pub async fn run_to_completion(
        &self,
        name: &str,
        direction: MigrationDirection,
        params: MigrationParams,
        force: bool,
        max_attempts: usize,
    ) -> MigrationResult<()> {
        if max_attempts == 0 {
            return Err(MigrationError::InvalidArgument(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let mut params = params;
        for attempt in 1..=max_attempts {
            match self.start_migration(name, direction, params.clone(), force).await {
                RunOutcome::Success => return Ok(()),
                RunOutcome::Failed(err) => return Err(err),
                RunOutcome::RestartRequested(saved) => {
                    tracing::debug!(version = name, attempt, "Resuming migration");
                    params = merge_params(params, saved);
                }
            }
        }

        Err(MigrationError::RestartLimitExceeded {
            version: name.to_string(),
            attempts: max_attempts,
        })
    }

    pub async fn lookup(&self, name: &str) -> MigrationResult<Option<VersionMetadata>> {
        self.registry.lookup(name).await
    }

    pub async fn list(&self, filter: &VersionFilter) -> MigrationResult<Vec<VersionMetadata>> {
        self.registry.list(filter).await
    }

    pub async fn mark(&self, search: &str, target: VersionStatus) -> Vec<MarkResult> {
        self.registry.mark(search, target).await
    }

    pub async fn status_summary(&self) -> MigrationResult<StatusSummary> {
        self.registry.status_summary().await
    }
}
