//! Behavior contract for migration definitions
//!
//! Every definition, whether it is parsed from a SQL file or written in Rust,
//! is driven through the [`Migration`] trait. Definitions are instantiated
//! per run from a [`MigrationHandle`], which wraps a factory.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;
use crate::version::VersionName;

/// Resumption parameters a migration is instantiated with
pub type MigrationParams = serde_json::Map<String, Value>;

/// What a single `up()` / `down()` invocation reports back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step finished
    Done,
    /// The step declined to finish; treated as a failure
    Rejected,
    /// The step suspended itself and wants to be invoked again with its
    /// current parameters
    Restart,
}

impl From<bool> for StepOutcome {
    fn from(ok: bool) -> Self {
        if ok {
            StepOutcome::Done
        } else {
            StepOutcome::Rejected
        }
    }
}

/// Result of a single migration step
pub type StepResult = Result<StepOutcome, BoxError>;

/// Core trait that every migration definition implements
#[async_trait]
pub trait Migration: Send {
    /// Human description shown in listings
    fn description(&self) -> String {
        String::new()
    }

    /// Bind the resumption parameters for this run
    fn set_params(&mut self, params: MigrationParams);

    /// Current parameters, captured when the step requests a restart
    fn params(&self) -> MigrationParams;

    /// Apply the migration
    async fn up(&mut self) -> StepResult;

    /// Roll the migration back
    async fn down(&mut self) -> StepResult;
}

/// Factory producing fresh migration instances
pub type MigrationFactory = dyn Fn() -> Box<dyn Migration> + Send + Sync;

/// Constructible handle for one version's behavior
#[derive(Clone)]
pub struct MigrationHandle {
    version: VersionName,
    factory: Arc<MigrationFactory>,
}

impl MigrationHandle {
    /// Wrap a factory for the given version
    pub fn new<F>(version: VersionName, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Migration> + Send + Sync + 'static,
    {
        Self {
            version,
            factory: Arc::new(factory),
        }
    }

    /// Build a handle from an existing shared factory
    pub fn from_factory(version: VersionName, factory: Arc<MigrationFactory>) -> Self {
        Self { version, factory }
    }

    /// The version this handle builds
    pub fn version(&self) -> &VersionName {
        &self.version
    }

    /// Create a new instance with empty parameters
    pub fn instantiate(&self) -> Box<dyn Migration> {
        (self.factory)()
    }

    /// Create a new instance bound to `params`
    pub fn instantiate_with(&self, params: MigrationParams) -> Box<dyn Migration> {
        let mut migration = self.instantiate();
        migration.set_params(params);
        migration
    }
}

impl fmt::Debug for MigrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationHandle")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Overlay `overlay` onto `base`, keys in `overlay` winning
pub fn merge_params(mut base: MigrationParams, overlay: MigrationParams) -> MigrationParams {
    for (key, value) in overlay {
        base.insert(key, value);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Counter {
        params: MigrationParams,
    }

    #[async_trait]
    impl Migration for Counter {
        fn description(&self) -> String {
            "counts".to_string()
        }

        fn set_params(&mut self, params: MigrationParams) {
            self.params = params;
        }

        fn params(&self) -> MigrationParams {
            self.params.clone()
        }

        async fn up(&mut self) -> StepResult {
            Ok(StepOutcome::Done)
        }

        async fn down(&mut self) -> StepResult {
            Ok(false.into())
        }
    }

    fn params(value: serde_json::Value) -> MigrationParams {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_step_outcome_from_bool() {
        assert_eq!(StepOutcome::from(true), StepOutcome::Done);
        assert_eq!(StepOutcome::from(false), StepOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_handle_instantiates_with_params() {
        let version = VersionName::parse("Version20230101000000").unwrap();
        let handle = MigrationHandle::new(version.clone(), || {
            Box::new(Counter {
                params: MigrationParams::new(),
            })
        });

        let mut migration = handle.instantiate_with(params(json!({"offset": 10})));
        assert_eq!(migration.params().get("offset"), Some(&json!(10)));
        assert_eq!(migration.description(), "counts");
        assert_eq!(migration.up().await.unwrap(), StepOutcome::Done);
        assert_eq!(migration.down().await.unwrap(), StepOutcome::Rejected);

        assert!(handle.instantiate().params().is_empty());
        assert_eq!(handle.version(), &version);
        assert!(format!("{:?}", handle).contains("Version20230101000000"));
    }

    #[test]
    fn test_merge_params_overlay_wins() {
        let merged = merge_params(
            params(json!({"offset": 0, "batch": 100})),
            params(json!({"offset": 300})),
        );
        assert_eq!(merged.get("offset"), Some(&json!(300)));
        assert_eq!(merged.get("batch"), Some(&json!(100)));
    }
}
