//! Notifications emitted after each apply/rollback attempt
//!
//! The version is passed as text because malformed identifiers are reported
//! too.

use crate::definitions::MigrationDirection;

/// Receives the outcome of each attempt; return values are not consumed
pub trait MigrationNotifier: Send + Sync {
    fn success(&self, version: &str, direction: MigrationDirection);

    fn error(&self, version: &str, direction: MigrationDirection, message: &str);
}

/// Notifier that writes to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl MigrationNotifier for TracingNotifier {
    fn success(&self, version: &str, direction: MigrationDirection) {
        tracing::info!(version = %version, direction = %direction, "{} ({}) success", version, direction);
    }

    fn error(&self, version: &str, direction: MigrationDirection, message: &str) {
        tracing::error!(
            version = %version,
            direction = %direction,
            "{} ({}) error: {}",
            version,
            direction,
            message
        );
    }
}
