//! Statistics over the local mirror
//!
//! Counts and totals are read straight from storage; nothing here touches
//! the network. Data states are derived from each date's age when the
//! statistics are loaded, never taken from the stored column.

use chrono::{DateTime, NaiveDate, Utc};

use crate::state::{DataState, FreshnessManager};
use crate::storage::{CentreRepository, SqliteStorage, SummaryRepository, TransactionRepository};
use crate::SyncError;

/// Snapshot of what the mirror holds
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatistics {
    pub centres: u64,
    pub districts: u64,
    pub summaries: u64,
    pub transactions: u64,

    /// Summed over every stored summary
    pub total_quantity: f64,
    pub total_amount: f64,

    /// Earliest and latest summary dates
    pub date_span: Option<(NaiveDate, NaiveDate)>,

    /// Summary count per data state as of load time
    pub summaries_by_state: Vec<(DataState, u64)>,
}

impl SyncStatistics {
    pub fn state_count(&self, state: DataState) -> u64 {
        self.summaries_by_state
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// Loads statistics from storage, bucketing summaries by their state at `now`
pub fn load_statistics(
    storage: &SqliteStorage,
    freshness: &FreshnessManager,
    now: DateTime<Utc>,
) -> Result<SyncStatistics, SyncError> {
    let (total_quantity, total_amount) = storage.summary_totals()?;

    let mut summaries_by_state: Vec<(DataState, u64)> = Vec::new();
    for (date, count) in storage.count_summaries_by_date()? {
        let state = freshness.data_state(date, now);
        match summaries_by_state.iter_mut().find(|(s, _)| *s == state) {
            Some((_, total)) => *total += count,
            None => summaries_by_state.push((state, count)),
        }
    }

    Ok(SyncStatistics {
        centres: storage.count_centres()?,
        districts: storage.count_districts()?,
        summaries: storage.count_summaries()?,
        transactions: storage.count_transactions()?,
        total_quantity,
        total_amount,
        date_span: storage.date_span()?,
        summaries_by_state,
    })
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &SyncStatistics) {
    println!("=== Mirror Statistics ===\n");

    println!("Overview:");
    println!("  Centres: {} in {} districts", stats.centres, stats.districts);
    println!("  Date-wise summaries: {}", stats.summaries);
    println!("  Farmer transactions: {}", stats.transactions);
    match stats.date_span {
        Some((first, last)) => println!("  Dates covered: {} to {}", first, last),
        None => println!("  Dates covered: none"),
    }
    println!();

    println!("Totals:");
    println!("  Quantity: {:.2}", stats.total_quantity);
    println!("  Amount: {:.2}", stats.total_amount);
    println!();

    println!("Summaries by State:");
    for state in [DataState::Open, DataState::Closing, DataState::Closed] {
        let count = stats.state_count(state);
        let percentage = if stats.summaries > 0 {
            (count as f64 / stats.summaries as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
}
