//! Configuration module for Procure-Sync
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use procure_sync::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("procure.toml")).unwrap();
//! println!("Request delay: {}ms", config.fetcher.request_delay_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, FetcherConfig, FreshnessConfig, OutputConfig, SourceConfig, SyncConfig,
    WatchdogConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
