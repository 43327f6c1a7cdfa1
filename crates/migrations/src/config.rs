//! Orchestrator configuration types and builders

use serde::{Deserialize, Serialize};
use service_builder::builder;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::error::MigrationError;
use crate::ledger::is_valid_table_name;

pub const ENV_MIGRATIONS_DIR: &str = "VERSIUM_MIGRATIONS_DIR";
pub const ENV_MIGRATIONS_EXT: &str = "VERSIUM_MIGRATIONS_EXT";
pub const ENV_LEDGER: &str = "VERSIUM_LEDGER";
pub const ENV_MIGRATIONS_TABLE: &str = "VERSIUM_MIGRATIONS_TABLE";

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration build failed: {message}")]
    Build { message: String },
}

impl From<ConfigError> for MigrationError {
    fn from(err: ConfigError) -> Self {
        MigrationError::Configuration(err.to_string())
    }
}

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    EnvVar(String),
    Default(String),
}

impl ConfigSource {
    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::EnvVar(var) => write!(f, "Environment variable: {}", var),
            ConfigSource::Default(value) => write!(f, "Default value: {}", value),
        }
    }
}

/// Storage used for the execution ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LedgerBackend {
    /// Process-local, lost on exit
    Memory,
    /// JSON document on disk
    File { path: PathBuf },
    /// Table in a PostgreSQL database
    Postgres { url: String },
}

impl Default for LedgerBackend {
    fn default() -> Self {
        LedgerBackend::File {
            path: PathBuf::from("migrations/.ledger.json"),
        }
    }
}

impl LedgerBackend {
    /// Parse `memory`, `file:<path>` or a `postgres://` URL
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("memory") {
            return Ok(LedgerBackend::Memory);
        }
        if let Some(path) = value.strip_prefix("file:") {
            if !path.is_empty() {
                return Ok(LedgerBackend::File {
                    path: PathBuf::from(path),
                });
            }
        }
        if value.starts_with("postgres://") || value.starts_with("postgresql://") {
            return Ok(LedgerBackend::Postgres {
                url: value.to_string(),
            });
        }
        Err(ConfigError::InvalidValue {
            field: "ledger".to_string(),
            value: value.to_string(),
            expected: "'memory', 'file:<path>' or a postgres:// URL".to_string(),
        })
    }
}

/// Configuration for a migration manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct MigrationConfig {
    /// Directory holding migration definition files
    #[builder(default = "PathBuf::from(\"migrations\")", getter)]
    pub migrations_dir: PathBuf,

    /// Extension of definition files, without the dot
    #[builder(default = "\"sql\".to_string()", getter)]
    pub file_extension: String,

    /// Ledger storage
    #[builder(default = "LedgerBackend::default()", getter)]
    pub ledger: LedgerBackend,

    /// Table name for the PostgreSQL ledger
    #[builder(default = "\"versium_migrations\".to_string()", getter)]
    pub migrations_table: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            file_extension: "sql".to_string(),
            ledger: LedgerBackend::default(),
            migrations_table: "versium_migrations".to_string(),
        }
    }
}

impl MigrationConfig {
    /// Load configuration from `VERSIUM_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = env::var(ENV_MIGRATIONS_DIR) {
            config.migrations_dir = PathBuf::from(dir);
        }

        if let Ok(ext) = env::var(ENV_MIGRATIONS_EXT) {
            config.file_extension = ext.trim().trim_start_matches('.').to_string();
        }

        if let Ok(ledger) = env::var(ENV_LEDGER) {
            config.ledger = LedgerBackend::parse(&ledger)?;
        }

        if let Ok(table) = env::var(ENV_MIGRATIONS_TABLE) {
            config.migrations_table = table;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_extension.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "file_extension".to_string(),
                value: String::new(),
                expected: "a non-empty file extension".to_string(),
            });
        }

        if !is_valid_table_name(&self.migrations_table) {
            return Err(ConfigError::InvalidValue {
                field: "migrations_table".to_string(),
                value: self.migrations_table.clone(),
                expected: "a plain SQL identifier".to_string(),
            });
        }

        Ok(())
    }

    /// Which source each field was read from by [`from_env`](Self::from_env)
    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let fields = [
            ("migrations_dir", ENV_MIGRATIONS_DIR, "migrations"),
            ("file_extension", ENV_MIGRATIONS_EXT, "sql"),
            ("ledger", ENV_LEDGER, "file:migrations/.ledger.json"),
            ("migrations_table", ENV_MIGRATIONS_TABLE, "versium_migrations"),
        ];

        fields
            .into_iter()
            .map(|(field, var, default)| {
                let source = if env::var(var).is_ok() {
                    ConfigSource::EnvVar(var.to_string())
                } else {
                    ConfigSource::Default(default.to_string())
                };
                (field.to_string(), source)
            })
            .collect()
    }
}

impl MigrationConfigBuilder {
    /// Create a development configuration backed by a ledger file
    pub fn development() -> Self {
        MigrationConfigBuilder::new()
            .migrations_dir(PathBuf::from("migrations"))
            .ledger(LedgerBackend::File {
                path: PathBuf::from("migrations/.ledger.json"),
            })
    }

    /// Create a testing configuration with an in-memory ledger
    pub fn testing() -> Self {
        MigrationConfigBuilder::new().ledger(LedgerBackend::Memory)
    }
}

/// Build and validate a configuration
pub fn build_config(builder: MigrationConfigBuilder) -> Result<MigrationConfig, ConfigError> {
    let config = builder.build().map_err(|e| ConfigError::Build {
        message: format!("{:?}", e),
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            ENV_MIGRATIONS_DIR,
            ENV_MIGRATIONS_EXT,
            ENV_LEDGER,
            ENV_MIGRATIONS_TABLE,
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_ledger_backend_parse() {
        assert_eq!(LedgerBackend::parse("memory").unwrap(), LedgerBackend::Memory);
        assert_eq!(LedgerBackend::parse(" MEMORY ").unwrap(), LedgerBackend::Memory);
        assert_eq!(
            LedgerBackend::parse("file:/tmp/ledger.json").unwrap(),
            LedgerBackend::File {
                path: PathBuf::from("/tmp/ledger.json")
            }
        );
        assert!(matches!(
            LedgerBackend::parse("postgres://localhost/app").unwrap(),
            LedgerBackend::Postgres { .. }
        ));
        assert!(LedgerBackend::parse("file:").is_err());
        assert!(LedgerBackend::parse("redis://localhost").is_err());
    }

    #[test]
    fn test_builder_defaults_and_presets() {
        let config = MigrationConfigBuilder::new().build().expect("Failed to build config");
        assert_eq!(config.get_migrations_dir(), &PathBuf::from("migrations"));
        assert_eq!(config.get_file_extension(), "sql");
        assert_eq!(config.get_ledger(), &LedgerBackend::default());
        assert_eq!(config.get_migrations_table(), "versium_migrations");

        let config = build_config(MigrationConfigBuilder::testing()).unwrap();
        assert_eq!(config.ledger, LedgerBackend::Memory);

        let config = build_config(MigrationConfigBuilder::development()).unwrap();
        assert!(matches!(config.ledger, LedgerBackend::File { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = MigrationConfig {
            file_extension: String::new(),
            ..MigrationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "file_extension"
        ));

        let result = build_config(
            MigrationConfigBuilder::testing().migrations_table("bad table".to_string()),
        );
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = MigrationConfig::from_env().unwrap();
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert_eq!(config.file_extension, "sql");

        let sources = config.config_sources();
        assert!(sources["migrations_dir"].is_default());
        assert!(sources["ledger"].is_default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var(ENV_MIGRATIONS_DIR, "db/versions");
        env::set_var(ENV_MIGRATIONS_EXT, ".pgsql");
        env::set_var(ENV_LEDGER, "memory");
        env::set_var(ENV_MIGRATIONS_TABLE, "schema_versions");

        let config = MigrationConfig::from_env().unwrap();
        assert_eq!(config.migrations_dir, PathBuf::from("db/versions"));
        assert_eq!(config.file_extension, "pgsql");
        assert_eq!(config.ledger, LedgerBackend::Memory);
        assert_eq!(config.migrations_table, "schema_versions");
        assert_eq!(
            config.config_sources()["ledger"],
            ConfigSource::EnvVar(ENV_LEDGER.to_string())
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_ledger() {
        clear_env();
        env::set_var(ENV_LEDGER, "sqlite://nope");
        assert!(MigrationConfig::from_env().is_err());

        env::set_var(ENV_LEDGER, "memory");
        env::set_var(ENV_MIGRATIONS_TABLE, "1table");
        assert!(MigrationConfig::from_env().is_err());

        clear_env();
    }
}
