//! Migration Definitions - Core types shared across the migration system
//!
//! Status derivation lives here and nowhere else: [`VersionStatus::derive`]
//! is the only function that turns catalog and ledger presence into a status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MigrationError;
use crate::migration::{MigrationHandle, MigrationParams};
use crate::version::VersionName;

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Apply the migration
    Up,
    /// Roll the migration back
    Down,
}

impl MigrationDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationDirection::Up => "up",
            MigrationDirection::Down => "down",
        }
    }

    /// Status a version must be in before running in this direction
    pub fn required_status(&self) -> VersionStatus {
        match self {
            MigrationDirection::Up => VersionStatus::New,
            MigrationDirection::Down => VersionStatus::Installed,
        }
    }
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationDirection {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(MigrationDirection::Up),
            "down" => Ok(MigrationDirection::Down),
            other => Err(MigrationError::InvalidArgument(format!(
                "unknown direction '{}', expected up or down",
                other
            ))),
        }
    }
}

/// Derived status of a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    /// Definition exists, not applied
    New,
    /// Applied and the definition still exists
    Installed,
    /// Applied but the definition is gone
    Unknown,
}

impl VersionStatus {
    /// Derive the status from catalog and ledger presence
    ///
    /// Returns `None` when the version is in neither store.
    pub fn derive(is_file: bool, is_record: bool) -> Option<Self> {
        match (is_record, is_file) {
            (true, true) => Some(VersionStatus::Installed),
            (false, true) => Some(VersionStatus::New),
            (true, false) => Some(VersionStatus::Unknown),
            (false, false) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::New => "new",
            VersionStatus::Installed => "installed",
            VersionStatus::Unknown => "unknown",
        }
    }

    /// Listings filtered by this status are shown most recent first
    pub fn lists_descending(&self) -> bool {
        matches!(self, VersionStatus::Installed | VersionStatus::Unknown)
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionStatus {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "new" => Ok(VersionStatus::New),
            "installed" => Ok(VersionStatus::Installed),
            "unknown" => Ok(VersionStatus::Unknown),
            other => Err(MigrationError::InvalidArgument(format!(
                "unknown status '{}', expected new, installed or unknown",
                other
            ))),
        }
    }
}

/// Merged view of one version across catalog and ledger
///
/// Never cached: every registry query builds fresh metadata.
#[derive(Debug, Clone)]
pub struct VersionMetadata {
    pub version: VersionName,
    pub is_file: bool,
    pub is_record: bool,
    pub status: VersionStatus,
    /// Present only when the definition loaded
    pub description: Option<String>,
    /// Present only when `is_file`
    pub location: Option<String>,
    /// Present only when `is_file` and the definition loaded
    pub handle: Option<MigrationHandle>,
}

impl VersionMetadata {
    /// Text the search filter runs over
    pub fn search_text(&self) -> String {
        format!(
            "{}{}",
            self.version,
            self.description.as_deref().unwrap_or_default()
        )
    }

    /// Whether a behavior can be instantiated for this version
    pub fn is_loadable(&self) -> bool {
        self.handle.is_some()
    }
}

/// Filter for registry listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFilter {
    /// Only versions in this status; `None` lists everything
    #[serde(default)]
    pub status: Option<VersionStatus>,
    /// Case-insensitive substring over identifier and description
    #[serde(default)]
    pub search: String,
}

impl VersionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: VersionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    /// Whether listings under this filter are ordered most recent first
    pub fn is_descending(&self) -> bool {
        self.status.map_or(false, |s| s.lists_descending())
    }
}

/// Result of marking one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkResult {
    /// The affected version, absent when nothing matched
    pub version: Option<String>,
    pub message: String,
    pub success: bool,
}

impl MarkResult {
    pub(crate) fn success(version: &VersionName, message: impl Into<String>) -> Self {
        Self {
            version: Some(version.to_string()),
            message: message.into(),
            success: true,
        }
    }

    pub(crate) fn failure(version: Option<&VersionName>, message: impl Into<String>) -> Self {
        Self {
            version: version.map(|v| v.to_string()),
            message: message.into(),
            success: false,
        }
    }
}

/// Count of versions per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub new: usize,
    pub installed: usize,
    pub unknown: usize,
}

impl StatusSummary {
    pub(crate) fn record(&mut self, status: VersionStatus) {
        match status {
            VersionStatus::New => self.new += 1,
            VersionStatus::Installed => self.installed += 1,
            VersionStatus::Unknown => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.new + self.installed + self.unknown
    }
}

/// Outcome of one apply/rollback attempt
#[derive(Debug)]
pub enum RunOutcome {
    /// The behavior ran and the ledger was updated
    Success,
    /// The attempt failed; the ledger is unchanged unless the error is
    /// [`MigrationError::LedgerWrite`]
    Failed(MigrationError),
    /// The behavior suspended itself; call again with these parameters
    RestartRequested(MigrationParams),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }

    pub fn is_restart(&self) -> bool {
        matches!(self, RunOutcome::RestartRequested(_))
    }

    pub fn error(&self) -> Option<&MigrationError> {
        match self {
            RunOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Convert into a `Result`, treating a restart request as success
    /// carrying the saved parameters
    pub fn into_result(self) -> Result<Option<MigrationParams>, MigrationError> {
        match self {
            RunOutcome::Success => Ok(None),
            RunOutcome::RestartRequested(params) => Ok(Some(params)),
            RunOutcome::Failed(err) => Err(err),
        }
    }
}
