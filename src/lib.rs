//! Procure-Sync: a cache-first mirror of a procurement reporting site
//!
//! This crate ingests the three-level drill-down published by the paddy
//! procurement portal (centre list → date-wise summary → farmer detail),
//! keeps a local SQLite copy, and decides per request whether the copy is
//! fresh enough to serve or a polite resync must run first.

pub mod config;
pub mod fetcher;
pub mod logging;
pub mod normalize;
pub mod output;
pub mod parser;
pub mod router;
pub mod shutdown;
pub mod state;
pub mod storage;
pub mod sync;

use thiserror::Error;

/// Main error type for sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Returns true if this error came from talking to the source site
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Status { .. } | Self::Reqwest(_)
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use logging::{LogLevel, LogSink, TracingSink};
pub use router::{RequestContext, RequestRouter, RouteResponse, RouteStatus};
pub use state::{DataState, FreshnessManager};
pub use sync::{FullSyncOrchestrator, SyncEngine, SyncWatchdog};
