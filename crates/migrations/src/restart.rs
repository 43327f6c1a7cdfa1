//! Restart Tracker - per-version restart state
//!
//! An entry exists for a version only between an attempt that requested a
//! restart and the start of the next attempt for that version. Nothing here
//! is persisted.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::migration::MigrationParams;
use crate::version::VersionName;

/// Restart state shared by the executor and its callers
#[derive(Debug, Default)]
pub struct RestartTracker {
    restarts: RwLock<HashMap<VersionName, MigrationParams>>,
}

impl RestartTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the last attempt for `version` ended in a restart request
    pub fn needs_restart(&self, version: &VersionName) -> bool {
        self.restarts.read().contains_key(version)
    }

    /// Parameters saved by the last restart request for `version`
    pub fn restart_params(&self, version: &VersionName) -> Option<MigrationParams> {
        self.restarts.read().get(version).cloned()
    }

    /// Versions currently waiting to be restarted
    pub fn pending(&self) -> Vec<VersionName> {
        let mut pending: Vec<VersionName> = self.restarts.read().keys().cloned().collect();
        pending.sort();
        pending
    }

    pub(crate) fn record(&self, version: &VersionName, params: MigrationParams) {
        self.restarts.write().insert(version.clone(), params);
    }

    pub(crate) fn clear(&self, version: &VersionName) -> Option<MigrationParams> {
        self.restarts.write().remove(version)
    }
}
