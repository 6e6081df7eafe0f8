//! Log sink for sync lifecycle events
//!
//! Components report sync start/end/failure, data-state changes, and job
//! timeouts through a [`LogSink`] rather than writing to stdout. The default
//! sink forwards everything to `tracing`; the SQLite sink in
//! [`crate::storage`] additionally keeps an activity log table.

use std::fmt;
use std::sync::Mutex;

/// Severity attached to a sink record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Destination for component log records
///
/// Implementations must be cheap to call from any worker; they are shared as
/// `Arc<dyn LogSink>`.
pub trait LogSink: Send + Sync {
    fn log(&self, component: &str, level: LogLevel, message: &str, details: Option<&str>);

    fn info(&self, component: &str, message: &str) {
        self.log(component, LogLevel::Info, message, None);
    }

    fn warn(&self, component: &str, message: &str) {
        self.log(component, LogLevel::Warning, message, None);
    }

    fn error(&self, component: &str, message: &str, details: Option<&str>) {
        self.log(component, LogLevel::Error, message, details);
    }
}

/// Forwards records to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, component: &str, level: LogLevel, message: &str, details: Option<&str>) {
        forward_to_tracing(component, level, message, details);
    }
}

/// Emits one record as a `tracing` event
pub(crate) fn forward_to_tracing(
    component: &str,
    level: LogLevel,
    message: &str,
    details: Option<&str>,
) {
    let details = details.unwrap_or("");
    match level {
        LogLevel::Debug => tracing::debug!(component, details, "{}", message),
        LogLevel::Info => tracing::info!(component, details, "{}", message),
        LogLevel::Warning => tracing::warn!(component, details, "{}", message),
        LogLevel::Error => tracing::error!(component, details, "{}", message),
    }
}

/// A captured sink record
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub component: String,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<String>,
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything logged so far
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Returns true if any record from `component` contains `needle`
    pub fn contains(&self, component: &str, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.component == component && r.message.contains(needle))
    }

    pub fn count_at(&self, level: LogLevel) -> usize {
        self.records().iter().filter(|r| r.level == level).count()
    }
}

impl LogSink for MemorySink {
    fn log(&self, component: &str, level: LogLevel, message: &str, details: Option<&str>) {
        if let Ok(mut records) = self.records.lock() {
            records.push(LogRecord {
                component: component.to_string(),
                level,
                message: message.to_string(),
                details: details.map(str::to_string),
            });
        }
    }
}
