//! # Worker Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Worker Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Invocation   │  │       Engine            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  LoadFailed     │  │  Usage          │  │  Db (atlas-db)          │ │
//! │  │  Invalid        │  │  UnknownSku     │  │  Output (serde_json)    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Problems with the configuration file or environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Bad command line.
    #[error("{0}")]
    Usage(String),

    #[error("No item with SKU {0}")]
    UnknownSku(String),

    #[error(transparent)]
    Db(#[from] atlas_db::DbError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}
