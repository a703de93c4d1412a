//! Typed configuration values.

use std::path::PathBuf;
use std::time::Duration;

use phc_fields::Identifier;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_DATABASE_PATH: &str = "phc.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_ACTOR: &str = "web";
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Where the ERP database lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// How long a writer waits on a locked database
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Complete configuration of the engine and its command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhcConfig {
    pub database: DatabaseConfig,
    /// Initials written to the audit columns
    pub actor: String,
    /// Host tables external fields may write to; empty allows any
    pub external_tables: Vec<String>,
    pub log: LogConfig,
}

impl Default for PhcConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            actor: DEFAULT_ACTOR.to_string(),
            external_tables: Vec::new(),
            log: LogConfig::default(),
        }
    }
}

impl PhcConfig {
    /// Check values that deserialized fine but cannot be used.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.actor.trim().is_empty() {
            return Err(ConfigError::invalid_value("actor", "must not be empty"));
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid_value(
                "database.path",
                "must not be empty",
            ));
        }
        for table in &self.external_tables {
            Identifier::parse(table).map_err(|e| {
                ConfigError::invalid_value("external_tables", e.to_string())
            })?;
        }
        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::invalid_value("log.filter", "must not be empty"));
        }
        Ok(())
    }
}
