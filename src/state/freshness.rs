//! Staleness policy
//!
//! A summary is fresh while the time since its last successful sync is
//! below the threshold for its current [`DataState`]. Both the state and the
//! verdict are pure functions of the supplied clock, so nothing here needs
//! to be refreshed in the background.
//!
//! Ages are counted in the site's calendar (`utc-offset-minutes`), not UTC:
//! the site publishes dates on Indian time.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};

use super::DataState;
use crate::config::FreshnessConfig;

/// Result of checking one summary against the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessVerdict {
    /// State derived from the date right now
    pub state: DataState,

    /// Whether the cached copy is recent enough for `state`
    pub fresh: bool,

    /// The stored state differs from `state`
    pub state_changed: bool,
}

/// Computes data states and staleness verdicts
#[derive(Debug, Clone)]
pub struct FreshnessManager {
    open: Duration,
    closing: Duration,
    closed: Duration,
    calendar: FixedOffset,
}

impl FreshnessManager {
    pub fn new(config: &FreshnessConfig) -> Self {
        Self {
            open: hours(config.open_hours),
            closing: hours(config.closing_hours),
            closed: hours(config.closed_hours),
            calendar: FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60))
                .unwrap_or_else(|| Utc.fix()),
        }
    }

    /// Maximum tolerated time since last sync for `state`
    pub fn threshold(&self, state: DataState) -> Duration {
        match state {
            DataState::Open => self.open,
            DataState::Closing => self.closing,
            DataState::Closed => self.closed,
        }
    }

    /// The site's calendar day at `now`
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.calendar).date_naive()
    }

    /// State of `date` as of `now`, counted in the site's calendar
    pub fn data_state(&self, date: NaiveDate, now: DateTime<Utc>) -> DataState {
        DataState::for_date(date, self.today(now))
    }

    /// State of `date` as of the current time
    pub fn current_state(&self, date: NaiveDate) -> DataState {
        self.data_state(date, Utc::now())
    }

    pub fn is_fresh(&self, last_synced: DateTime<Utc>, state: DataState, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_synced) < self.threshold(state)
    }

    /// Checks a cached summary's date and sync time against the policy
    pub fn evaluate(
        &self,
        date: NaiveDate,
        last_synced: DateTime<Utc>,
        stored_state: Option<DataState>,
        now: DateTime<Utc>,
    ) -> FreshnessVerdict {
        let state = self.data_state(date, now);
        FreshnessVerdict {
            state,
            fresh: self.is_fresh(last_synced, state, now),
            state_changed: stored_state.is_some_and(|stored| stored != state),
        }
    }
}

impl Default for FreshnessManager {
    fn default() -> Self {
        Self::new(&FreshnessConfig::default())
    }
}

// Capped at a century so oversized config values can't overflow
fn hours(h: u64) -> Duration {
    Duration::hours(h.min(876_000) as i64)
}
