use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Procure-Sync
///
/// Parsed once at startup and passed by value (or behind an `Arc`) into every
/// component constructor. Nothing reads settings from global state.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub freshness: FreshnessConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    pub output: OutputConfig,
}

/// The reporting site entry point
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// The centre list URL, used verbatim. Its query token is opaque.
    #[serde(rename = "entry-url")]
    pub entry_url: String,

    /// Issue a session-establishing request when a fetcher is created
    #[serde(default = "default_true")]
    pub bootstrap: bool,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Politeness settings for outgoing requests
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Minimum time between two requests to the same host (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay")]
    pub request_delay_ms: u64,
}

/// Maximum tolerated age of a summary's last sync, per data state (hours)
#[derive(Debug, Clone, Deserialize)]
pub struct FreshnessConfig {
    #[serde(rename = "open-hours", default = "default_open_hours")]
    pub open_hours: u64,

    #[serde(rename = "closing-hours", default = "default_closing_hours")]
    pub closing_hours: u64,

    #[serde(rename = "closed-hours", default = "default_closed_hours")]
    pub closed_hours: u64,

    /// Offset of the site's calendar from UTC (minutes), used to decide
    /// which day "today" is
    #[serde(rename = "utc-offset-minutes", default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

/// Full-sync behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Worker pool width for the parallel phases
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Skip re-parsing a summary page whose content hash is unchanged
    #[serde(rename = "skip-unchanged", default)]
    pub skip_unchanged: bool,
}

/// Liveness monitoring for long-running jobs
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    /// A job with no check-in for this long is flagged (seconds)
    #[serde(rename = "timeout-secs", default = "default_watchdog_timeout")]
    pub timeout_secs: u64,

    /// How often the monitor scans registered jobs (seconds)
    #[serde(rename = "poll-interval-secs", default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Config {
    /// Builds a configuration with every optional section at its default
    pub fn new(entry_url: impl Into<String>, database_path: impl Into<String>) -> Self {
        Self {
            source: SourceConfig {
                entry_url: entry_url.into(),
                bootstrap: default_true(),
                request_timeout_secs: default_request_timeout(),
            },
            fetcher: FetcherConfig::default(),
            freshness: FreshnessConfig::default(),
            sync: SyncConfig::default(),
            watchdog: WatchdogConfig::default(),
            output: OutputConfig {
                database_path: database_path.into(),
            },
        }
    }
}

impl FetcherConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl WatchdogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay(),
        }
    }
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            open_hours: default_open_hours(),
            closing_hours: default_closing_hours(),
            closed_hours: default_closed_hours(),
            utc_offset_minutes: default_utc_offset(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            skip_unchanged: false,
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_watchdog_timeout(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_request_delay() -> u64 {
    1000
}

fn default_open_hours() -> u64 {
    1
}

fn default_closing_hours() -> u64 {
    24
}

fn default_closed_hours() -> u64 {
    168
}

// India Standard Time
fn default_utc_offset() -> i32 {
    330
}

fn default_workers() -> u32 {
    8
}

fn default_watchdog_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    10
}
