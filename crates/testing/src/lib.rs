//! # versium-testing
//!
//! Test utilities for `versium-migrations`.
//!
//! ## Features
//!
//! - **Scripted migrations**: queue the outcome of each `up`/`down` call and
//!   inspect what the executor passed in
//! - **Recording collaborators**: notifier and statement runner that keep
//!   everything they see
//! - **Fault injection**: a ledger whose reads or writes can be made to fail
//! - **Workspaces**: temporary migration directories with SQL fixtures
//!
//! ## Quick Start
//!
//! ```rust
//! use versium_testing::prelude::*;
//!
//! let script = MigrationScript::new().then_up(Step::restart([("offset", json!(10))]));
//! let mut migration = script.build();
//! migration.set_params(MigrationParams::new());
//! assert_eq!(script.calls().len(), 0);
//! ```

pub mod fixtures;
pub mod ledger;
pub mod notifier;
pub mod runner;
pub mod script;

pub use fixtures::{write_sql_definition, TestWorkspace};
pub use ledger::FailingLedger;
pub use notifier::{Notification, RecordingNotifier};
pub use runner::RecordingRunner;
pub use script::{MigrationScript, RecordedCall, ScriptedMigration, Step};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        fixtures::{write_sql_definition, TestWorkspace},
        init_tracing,
        ledger::FailingLedger,
        notifier::{Notification, RecordingNotifier},
        runner::RecordingRunner,
        script::{MigrationScript, RecordedCall, ScriptedMigration, Step},
        TestError, TestResult,
    };

    pub use serde_json::{json, Value as JsonValue};
    pub use versium_migrations::{
        ExecutionLedger, Migration, MigrationDirection, MigrationError, MigrationManager,
        MigrationParams, RunOutcome, VersionFilter, VersionName, VersionStatus,
    };
}

#[derive(thiserror::Error, Debug)]
pub enum TestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] versium_migrations::ConfigError),

    #[error("Fixture error: {message}")]
    Fixture { message: String },
}

pub type TestResult<T> = Result<T, TestError>;

/// Install a `tracing` subscriber for tests, honouring `RUST_LOG`
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
