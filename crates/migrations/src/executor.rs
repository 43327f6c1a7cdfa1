//! Migration Executor - runs one version's apply or rollback
//!
//! Every failure is caught here and folded into [`RunOutcome::Failed`]: a
//! run never returns an error and never unwinds into the caller. A panic in
//! a migration counts as an execution failure.

use futures::FutureExt;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::definitions::{MigrationDirection, RunOutcome, VersionStatus};
use crate::error::{MigrationError, MigrationResult};
use crate::migration::{MigrationParams, StepOutcome};
use crate::notifier::{MigrationNotifier, TracingNotifier};
use crate::registry::VersionRegistry;
use crate::restart::RestartTracker;
use crate::version::VersionName;

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "migration panicked".to_string()
    }
}

/// Executes single migrations and reconciles the result into the ledger
pub struct MigrationExecutor {
    registry: Arc<VersionRegistry>,
    restarts: Arc<RestartTracker>,
    notifier: Arc<dyn MigrationNotifier>,
}

impl MigrationExecutor {
    pub fn new(registry: Arc<VersionRegistry>, restarts: Arc<RestartTracker>) -> Self {
        Self {
            registry,
            restarts,
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn MigrationNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn registry(&self) -> &Arc<VersionRegistry> {
        &self.registry
    }

    pub fn restarts(&self) -> &Arc<RestartTracker> {
        &self.restarts
    }

    /// Apply or roll back one version
    ///
    /// Any restart state saved for the version is discarded first. Unless
    /// `force` is set, `Up` requires status `new` and `Down` requires
    /// status `installed`.
    pub async fn run(
        &self,
        name: &str,
        direction: MigrationDirection,
        params: MigrationParams,
        force: bool,
    ) -> RunOutcome {
        let version = match VersionName::parse(name) {
            Ok(version) => version,
            Err(err) => {
                self.notifier.error(name, direction, &err.to_string());
                return RunOutcome::Failed(err);
            }
        };

        self.restarts.clear(&version);

        match self.attempt(&version, direction, params, force).await {
            Ok(None) => {
                self.notifier.success(version.as_str(), direction);
                RunOutcome::Success
            }
            Ok(Some(saved)) => {
                tracing::debug!(version = %version, direction = %direction, "Migration requested a restart");
                self.restarts.record(&version, saved.clone());
                RunOutcome::RestartRequested(saved)
            }
            Err(err) => {
                self.notifier.error(version.as_str(), direction, &err.to_string());
                RunOutcome::Failed(err)
            }
        }
    }

    /// Run the behavior; `Ok(Some(params))` is a restart request
    async fn attempt(
        &self,
        version: &VersionName,
        direction: MigrationDirection,
        params: MigrationParams,
        force: bool,
    ) -> MigrationResult<Option<MigrationParams>> {
        let meta = self
            .registry
            .lookup_version(version)
            .await?
            .ok_or_else(|| MigrationError::MigrationNotFound(version.to_string()))?;

        // The definition is gone, so a forced rollback can only drop the record.
        if force && direction == MigrationDirection::Down && meta.status == VersionStatus::Unknown {
            tracing::warn!(version = %version, "Forced rollback without a definition, removing the record only");
            self.write_ledger(version, direction).await?;
            return Ok(None);
        }

        let handle = meta
            .handle
            .ok_or_else(|| MigrationError::MigrationNotFound(version.to_string()))?;

        if !force && meta.status != direction.required_status() {
            return Err(match direction {
                MigrationDirection::Up => MigrationError::AlreadyApplied(version.to_string()),
                MigrationDirection::Down => MigrationError::AlreadyRolledBack(version.to_string()),
            });
        }

        let mut migration = catch_unwind(AssertUnwindSafe(|| handle.instantiate_with(params)))
            .map_err(|payload| MigrationError::execution(version.as_str(), panic_message(payload)))?;

        tracing::debug!(version = %version, direction = %direction, force, "Running migration");

        let step = AssertUnwindSafe(async {
            match direction {
                MigrationDirection::Up => migration.up().await,
                MigrationDirection::Down => migration.down().await,
            }
        })
        .catch_unwind()
        .await;

        match step {
            Err(payload) => {
                return Err(MigrationError::execution(version.as_str(), panic_message(payload)))
            }
            Ok(Err(e)) => return Err(MigrationError::execution(version.as_str(), e.to_string())),
            Ok(Ok(StepOutcome::Rejected)) => {
                return Err(MigrationError::execution(version.as_str(), "migration returns false"))
            }
            Ok(Ok(StepOutcome::Restart)) => {
                let saved = catch_unwind(AssertUnwindSafe(|| migration.params())).map_err(
                    |payload| MigrationError::execution(version.as_str(), panic_message(payload)),
                )?;
                return Ok(Some(saved));
            }
            Ok(Ok(StepOutcome::Done)) => {}
        }

        self.write_ledger(version, direction).await?;
        Ok(None)
    }

    async fn write_ledger(
        &self,
        version: &VersionName,
        direction: MigrationDirection,
    ) -> MigrationResult<()> {
        let ledger = self.registry.ledger();
        let written = match direction {
            MigrationDirection::Up => ledger.add(version.as_str()).await,
            MigrationDirection::Down => ledger.remove(version.as_str()).await,
        };

        match written {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::debug!(version = %version, direction = %direction, "Ledger already up to date");
                Ok(())
            }
            Err(e) => {
                tracing::error!(version = %version, "Migration ran but the ledger write failed: {}", e);
                Err(MigrationError::ledger_write(version.as_str(), e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::error::{BoxError, LedgerError, LedgerResult};
    use crate::ledger::{ExecutionLedger, LedgerRecord, MemoryLedger};
    use crate::migration::{Migration, StepResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Clone, Copy)]
    enum Script {
        Done,
        Rejected,
        Fail,
        Panic,
        /// Restart until `offset` reaches the given value
        RestartUntil(i64),
        /// Ask for a restart, then panic when params are read back
        RestartThenPanic,
    }

    struct Scripted {
        script: Script,
        params: MigrationParams,
    }

    impl Scripted {
        fn step(&mut self) -> StepResult {
            match self.script {
                Script::Done => Ok(StepOutcome::Done),
                Script::Rejected => Ok(false.into()),
                Script::Fail => Err(BoxError::from("table already exists")),
                Script::Panic => panic!("boom"),
                Script::RestartUntil(limit) => {
                    let offset = self.params.get("offset").and_then(|v| v.as_i64()).unwrap_or(0);
                    if offset >= limit {
                        return Ok(StepOutcome::Done);
                    }
                    self.params.insert("offset".to_string(), json!(offset + 1));
                    Ok(StepOutcome::Restart)
                }
                Script::RestartThenPanic => Ok(StepOutcome::Restart),
            }
        }
    }

    #[async_trait]
    impl Migration for Scripted {
        fn set_params(&mut self, params: MigrationParams) {
            self.params = params;
        }

        fn params(&self) -> MigrationParams {
            if let Script::RestartThenPanic = self.script {
                panic!("params unavailable");
            }
            self.params.clone()
        }

        async fn up(&mut self) -> StepResult {
            self.step()
        }

        async fn down(&mut self) -> StepResult {
            self.step()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<String>>,
    }

    impl MigrationNotifier for RecordingNotifier {
        fn success(&self, version: &str, direction: MigrationDirection) {
            self.events.lock().push(format!("{} ({}) success", version, direction));
        }

        fn error(&self, version: &str, direction: MigrationDirection, message: &str) {
            self.events.lock().push(format!("{} ({}) error: {}", version, direction, message));
        }
    }

    struct ReadOnlyLedger(MemoryLedger);

    #[async_trait]
    impl ExecutionLedger for ReadOnlyLedger {
        async fn records(&self) -> LedgerResult<Vec<LedgerRecord>> {
            self.0.records().await
        }

        async fn add(&self, _version: &str) -> LedgerResult<bool> {
            Err(LedgerError::Backend("ledger is read-only".to_string()))
        }

        async fn remove(&self, _version: &str) -> LedgerResult<bool> {
            Err(LedgerError::Backend("ledger is read-only".to_string()))
        }
    }

    const V1: &str = "Version20230101000000";

    fn version(name: &str) -> VersionName {
        VersionName::parse(name).unwrap()
    }

    struct Fixture {
        executor: MigrationExecutor,
        catalog: Arc<MemoryCatalog>,
        ledger: Arc<dyn ExecutionLedger>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture_with_ledger(ledger: Arc<dyn ExecutionLedger>) -> Fixture {
        let catalog = Arc::new(MemoryCatalog::new());
        let registry = Arc::new(VersionRegistry::new(catalog.clone(), ledger.clone()));
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = MigrationExecutor::new(registry, Arc::new(RestartTracker::new()))
            .with_notifier(notifier.clone());
        Fixture {
            executor,
            catalog,
            ledger,
            notifier,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_ledger(Arc::new(MemoryLedger::new()))
    }

    impl Fixture {
        fn define(&self, name: &str, script: Script) {
            self.catalog.register(version(name), move || {
                Box::new(Scripted {
                    script,
                    params: MigrationParams::new(),
                })
            });
        }

        async fn status(&self, name: &str) -> Option<VersionStatus> {
            self.executor
                .registry()
                .lookup(name)
                .await
                .unwrap()
                .map(|m| m.status)
        }
    }

    #[tokio::test]
    async fn test_up_then_down_round_trip() {
        let fx = fixture();
        fx.define(V1, Script::Done);
        assert_eq!(fx.status(V1).await, Some(VersionStatus::New));

        let outcome = fx.executor.run(V1, MigrationDirection::Up, MigrationParams::new(), false).await;
        assert!(outcome.is_success());
        assert_eq!(fx.status(V1).await, Some(VersionStatus::Installed));

        let outcome = fx.executor.run(V1, MigrationDirection::Down, MigrationParams::new(), false).await;
        assert!(outcome.is_success());
        assert_eq!(fx.status(V1).await, Some(VersionStatus::New));

        assert_eq!(
            *fx.notifier.events.lock(),
            vec![
                format!("{} (up) success", V1),
                format!("{} (down) success", V1),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_up_fails_without_force() {
        let fx = fixture();
        fx.define(V1, Script::Done);

        assert!(fx.executor.run(V1, MigrationDirection::Up, MigrationParams::new(), false).await.is_success());
        let outcome = fx.executor.run(V1, MigrationDirection::Up, MigrationParams::new(), false).await;
        assert!(matches!(outcome.error(), Some(MigrationError::AlreadyApplied(_))));
        assert_eq!(fx.ledger.list().await.unwrap(), vec![V1]);

        let outcome = fx.executor.run(V1, MigrationDirection::Up, MigrationParams::new(), true).await;
        assert!(outcome.is_success());
        assert_eq!(fx.ledger.list().await.unwrap(), vec![V1]);
    }

    #[tokio::test]
    async fn test_down_on_new_fails_without_force() {
        let fx = fixture();
        fx.define(V1, Script::Done);

        let outcome = fx.executor.run(V1, MigrationDirection::Down, MigrationParams::new(), false).await;
        assert!(matches!(outcome.error(), Some(MigrationError::AlreadyRolledBack(_))));

        let outcome = fx.executor.run(V1, MigrationDirection::Down, MigrationParams::new(), true).await;
        assert!(outcome.is_success());
        assert_eq!(fx.status(V1).await, Some(VersionStatus::New));
    }

    #[tokio::test]
    async fn test_invalid_and_missing_versions() {
        let fx = fixture();

        let outcome = fx.executor.run("create_users", MigrationDirection::Up, MigrationParams::new(), true).await;
        assert!(matches!(outcome.error(), Some(MigrationError::InvalidIdentifier(_))));

        let outcome = fx.executor.run(V1, MigrationDirection::Up, MigrationParams::new(), true).await;
        assert!(matches!(outcome.error(), Some(MigrationError::MigrationNotFound(_))));
        assert_eq!(fx.notifier.events.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_forced_down_recovers_unknown_version() {
        let fx = fixture();
        fx.ledger.add(V1).await.unwrap();
        assert_eq!(fx.status(V1).await, Some(VersionStatus::Unknown));

        let outcome = fx.executor.run(V1, MigrationDirection::Down, MigrationParams::new(), false).await;
        assert!(matches!(outcome.error(), Some(MigrationError::MigrationNotFound(_))));

        let outcome = fx.executor.run(V1, MigrationDirection::Up, MigrationParams::new(), true).await;
        assert!(matches!(outcome.error(), Some(MigrationError::MigrationNotFound(_))));

        let outcome = fx.executor.run(V1, MigrationDirection::Down, MigrationParams::new(), true).await;
        assert!(outcome.is_success());
        assert!(fx.ledger.list().await.unwrap().is_empty());
        assert_eq!(fx.status(V1).await, None);
    }

    #[tokio::test]
    async fn test_failures_leave_ledger_unchanged() {
        for (name, script, expected) in [
            ("Version20230101000000", Script::Fail, "table already exists"),
            ("Version20230102000000", Script::Rejected, "migration returns false"),
            ("Version20230103000000", Script::Panic, "boom"),
        ] {
            let fx = fixture();
            fx.define(name, script);

            let outcome = fx.executor.run(name, MigrationDirection::Up, MigrationParams::new(), false).await;
            match outcome.error() {
                Some(MigrationError::Execution { version, message }) => {
                    assert_eq!(version, name);
                    assert!(message.contains(expected), "{} vs {}", message, expected);
                }
                other => panic!("expected execution error, got {:?}", other),
            }
            assert!(fx.ledger.list().await.unwrap().is_empty());
            assert!(fx.notifier.events.lock()[0].contains("(up) error"));
        }
    }

    #[tokio::test]
    async fn test_ledger_write_failure_is_reported_distinctly() {
        let fx = fixture_with_ledger(Arc::new(ReadOnlyLedger(MemoryLedger::new())));
        fx.define(V1, Script::Done);

        let outcome = fx.executor.run(V1, MigrationDirection::Up, MigrationParams::new(), false).await;
        assert!(matches!(outcome.error(), Some(MigrationError::LedgerWrite { .. })));
        assert_eq!(fx.status(V1).await, Some(VersionStatus::New));
    }

    #[tokio::test]
    async fn test_restart_saves_params_and_clears_on_next_attempt() {
        let fx = fixture();
        fx.define(V1, Script::RestartUntil(2));
        let v1 = version(V1);

        let outcome = fx.executor.run(V1, MigrationDirection::Up, MigrationParams::new(), false).await;
        let saved = match outcome {
            RunOutcome::RestartRequested(saved) => saved,
            other => panic!("expected restart, got {:?}", other),
        };
        assert_eq!(saved.get("offset"), Some(&json!(1)));
        assert!(fx.executor.restarts().needs_restart(&v1));
        assert_eq!(fx.executor.restarts().restart_params(&v1), Some(saved.clone()));
        assert_eq!(fx.status(V1).await, Some(VersionStatus::New));
        assert!(fx.notifier.events.lock().is_empty());

        // A fresh attempt with empty params restarts again from scratch.
        let outcome = fx.executor.run(V1, MigrationDirection::Up, MigrationParams::new(), false).await;
        assert!(outcome.is_restart());

        let outcome = fx.executor.run(V1, MigrationDirection::Up, saved, false).await;
        assert!(outcome.is_restart());
        let saved = fx.executor.restarts().restart_params(&v1).unwrap();
        assert_eq!(saved.get("offset"), Some(&json!(2)));

        let outcome = fx.executor.run(V1, MigrationDirection::Up, saved, false).await;
        assert!(outcome.is_success());
        assert!(!fx.executor.restarts().needs_restart(&v1));
        assert_eq!(fx.status(V1).await, Some(VersionStatus::Installed));
    }

    #[tokio::test]
    async fn test_failed_attempt_still_clears_restart_state() {
        let fx = fixture();
        fx.define(V1, Script::RestartUntil(5));
        let v1 = version(V1);

        assert!(fx.executor.run(V1, MigrationDirection::Up, MigrationParams::new(), false).await.is_restart());
        assert!(fx.executor.restarts().needs_restart(&v1));

        let outcome = fx.executor.run(V1, MigrationDirection::Down, MigrationParams::new(), false).await;
        assert!(matches!(outcome.error(), Some(MigrationError::AlreadyRolledBack(_))));
        assert!(!fx.executor.restarts().needs_restart(&v1));
    }

    #[tokio::test]
    async fn test_panic_while_saving_restart_params_fails_the_run() {
        let fx = fixture();
        fx.define(V1, Script::RestartThenPanic);

        let outcome = fx.executor.run(V1, MigrationDirection::Up, MigrationParams::new(), false).await;
        match outcome.error() {
            Some(MigrationError::Execution { message, .. }) => {
                assert!(message.contains("params unavailable"))
            }
            other => panic!("expected execution error, got {:?}", other),
        }
        assert!(!fx.executor.restarts().needs_restart(&version(V1)));
        assert_eq!(fx.status(V1).await, Some(VersionStatus::New));
        assert!(fx.notifier.events.lock()[0].contains("(up) error: "));
    }
}
