//! Data age and freshness
//!
//! # Components
//!
//! - `DataState`: OPEN / CLOSING / CLOSED bucket derived from a date's age
//! - `FreshnessManager`: per-state staleness thresholds and verdicts

mod data_state;
mod freshness;

pub use data_state::DataState;
pub use freshness::{FreshnessManager, FreshnessVerdict};
