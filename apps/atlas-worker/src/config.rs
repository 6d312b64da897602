//! # Worker Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ATLAS_DB_PATH=/var/lib/atlas/atlas.db                              │
//! │     ATLAS_LOG=info,atlas_db=debug                                      │
//! │     ATLAS_MAX_CONNECTIONS=4                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, or                                                │
//! │     ~/.config/atlas-erp/atlas.toml (Linux)                             │
//! │     ~/Library/Application Support/com.atlas.erp/atlas.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/atlas/atlas.db"
//! max_connections = 5
//! busy_timeout_secs = 10
//!
//! [accounts]
//! inventory = "1300"
//! accounts_receivable = "1200"
//! revenue = "4000"
//! tax_payable = "2310"
//!
//! [logging]
//! filter = "info,atlas_db=debug,sqlx=warn"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use atlas_core::journal::AccountMap;
use atlas_db::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Created on first use.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the write lock before failing.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "atlas", "erp")
        .map(|dirs| dirs.data_dir().join("atlas.db"))
        .unwrap_or_else(|| PathBuf::from("./atlas.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Logging Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive. `RUST_LOG` wins over this when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info,atlas_db=info,sqlx=warn".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: default_log_filter(),
        }
    }
}

// =============================================================================
// Worker Configuration
// =============================================================================

/// Complete worker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Ledger accounts the services post to.
    #[serde(default)]
    pub accounts: AccountMap,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl WorkerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (atlas.toml)
    /// 3. Environment variables
    ///
    /// An explicit `config_path` that does not exist is an error; a missing
    /// default file is not.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let explicit = config_path.is_some();
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading worker config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else if explicit {
                return Err(ConfigError::LoadFailed(format!(
                    "config file not found: {}",
                    path.display()
                )));
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document. Missing sections and fields take defaults.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.filter must not be empty".into()));
        }

        self.accounts
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("accounts: {e}")))?;

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("ATLAS_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(filter) = std::env::var("ATLAS_LOG") {
            self.logging.filter = filter;
        }

        if let Ok(max) = std::env::var("ATLAS_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring non-numeric ATLAS_MAX_CONNECTIONS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "atlas", "erp")
            .map(|dirs| dirs.config_dir().join("atlas.toml"))
    }

    /// Database settings in the form the pool takes.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .accounts(self.accounts.clone())
    }
}
