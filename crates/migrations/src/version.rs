//! Version identifiers
//!
//! A version is named by any string that ends in a 14-digit `YYYYMMDDHHMMSS`
//! token, e.g. `Version20230101120000` or `AddUsersTable20230101120000`. The
//! trailing token is the canonical sort key.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{MigrationError, MigrationResult};

/// Length of the trailing timestamp token
pub const TIMESTAMP_LEN: usize = 14;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

static TIMESTAMP_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{14}$").expect("timestamp suffix pattern is valid"));

/// Extract the trailing timestamp token of a candidate version name
pub fn timestamp_token(name: &str) -> Option<&str> {
    TIMESTAMP_SUFFIX.find(name).map(|m| m.as_str())
}

/// A validated migration version identifier
///
/// Equality is plain string equality. Ordering is by timestamp token first
/// and by the full name second, so two versions sharing a timestamp still
/// sort deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionName {
    name: String,
}

impl VersionName {
    /// Parse a version name, rejecting names without a trailing timestamp
    pub fn parse(name: impl Into<String>) -> MigrationResult<Self> {
        let name = name.into();
        if timestamp_token(&name).is_none() {
            return Err(MigrationError::InvalidIdentifier(name));
        }
        Ok(Self { name })
    }

    /// Check whether a string is a valid version name
    pub fn is_valid(name: &str) -> bool {
        timestamp_token(name).is_some()
    }

    /// The full version name
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The trailing 14-digit timestamp token
    pub fn timestamp(&self) -> &str {
        &self.name[self.name.len() - TIMESTAMP_LEN..]
    }

    /// Everything before the timestamp token (often `Version`)
    pub fn prefix(&self) -> &str {
        &self.name[..self.name.len() - TIMESTAMP_LEN]
    }

    /// The timestamp token as a date, if it names a real calendar instant
    ///
    /// Validity of a version does not depend on this: `Version99999999999999`
    /// is accepted and simply has no creation date.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.timestamp(), TIMESTAMP_FORMAT).ok()
    }
}

impl Ord for VersionName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp()
            .cmp(other.timestamp())
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for VersionName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for VersionName {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionName {
    type Error = MigrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<VersionName> for String {
    fn from(version: VersionName) -> Self {
        version.name
    }
}

impl AsRef<str> for VersionName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_names() {
        let version = VersionName::parse("Version20230101120000").unwrap();
        assert_eq!(version.as_str(), "Version20230101120000");
        assert_eq!(version.timestamp(), "20230101120000");
        assert_eq!(version.prefix(), "Version");

        let bare = VersionName::parse("20230101120000").unwrap();
        assert_eq!(bare.prefix(), "");
    }

    #[test]
    fn test_reject_names_without_trailing_timestamp() {
        for name in [
            "",
            "Version",
            "Version2023010112000",
            "Version20230101120000.sql",
            "20230101120000Version",
            "Version20230101120000 ",
        ] {
            let err = VersionName::parse(name).unwrap_err();
            assert!(
                matches!(err, MigrationError::InvalidIdentifier(ref n) if n == name),
                "expected {:?} to be rejected",
                name
            );
            assert!(!VersionName::is_valid(name));
        }
    }

    #[test]
    fn test_longer_digit_runs_use_last_fourteen() {
        let version = VersionName::parse("Version120230101120000").unwrap();
        assert_eq!(version.timestamp(), "20230101120000");
        assert_eq!(version.prefix(), "Version1");
    }

    #[test]
    fn test_ordering_by_timestamp_then_name() {
        let mut versions: Vec<VersionName> = [
            "Zeta20230102000000",
            "Alpha20230103000000",
            "Beta20230102000000",
            "Version20230101000000",
        ]
        .iter()
        .map(|n| VersionName::parse(*n).unwrap())
        .collect();
        versions.sort();

        let names: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Version20230101000000",
                "Beta20230102000000",
                "Zeta20230102000000",
                "Alpha20230103000000",
            ]
        );
    }

    #[test]
    fn test_created_at() {
        let version = VersionName::parse("Version20230215093000").unwrap();
        let created = version.created_at().unwrap();
        assert_eq!(created.format("%Y-%m-%d %H:%M:%S").to_string(), "2023-02-15 09:30:00");

        let odd = VersionName::parse("Version99999999999999").unwrap();
        assert!(odd.created_at().is_none());
    }

    #[test]
    fn test_serde_round_trip_rejects_invalid() {
        let version: VersionName = serde_json::from_str("\"Version20230101000000\"").unwrap();
        assert_eq!(serde_json::to_string(&version).unwrap(), "\"Version20230101000000\"");
        assert!(serde_json::from_str::<VersionName>("\"nope\"").is_err());
    }
}
