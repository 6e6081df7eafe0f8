//! Storage module for the local procurement mirror
//!
//! The sync core only talks to the repository traits in [`traits`]; the
//! SQLite backend is the reference implementation. Handles are cheap to open,
//! and each worker of a full sync opens its own.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{SqliteLogSink, SqliteStorage, StoredLog};
pub use traits::{
    CentreRepository, Storage, StorageError, StorageResult, SummaryRepository,
    TransactionRepository,
};

use crate::parser::{SummaryRow, TransactionRow};
use crate::state::DataState;
use crate::SyncError;

use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;

/// Opens (creating if needed) the SQLite store at `path`
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SyncError> {
    SqliteStorage::new(path)
}

/// A procurement centre
#[derive(Debug, Clone, PartialEq)]
pub struct Centre {
    pub id: i64,
    pub name: String,

    /// Discovered link to the centre's date-wise summary page
    pub url: String,
    pub district: Option<String>,
}

/// One day of procurement at a centre
#[derive(Debug, Clone, PartialEq)]
pub struct DateSummary {
    pub id: i64,
    pub centre_id: i64,
    pub date: NaiveDate,
    pub farmer_count: u32,
    pub quantity: f64,
    pub amount: f64,
    pub details_url: Option<String>,

    /// State as of the last sync; callers recompute it before relying on it
    pub data_state: DataState,
    pub html_hash: Option<String>,
    pub last_synced: DateTime<Utc>,
}

/// Values written by a summary upsert
#[derive(Debug, Clone, PartialEq)]
pub struct NewSummary {
    pub date: NaiveDate,
    pub farmer_count: u32,
    pub quantity: f64,
    pub amount: f64,
    pub details_url: Option<String>,
    pub data_state: DataState,
    pub html_hash: Option<String>,
}

impl NewSummary {
    pub fn from_row(row: &SummaryRow, data_state: DataState, html_hash: &str) -> Self {
        Self {
            date: row.date,
            farmer_count: row.farmer_count,
            quantity: row.quantity,
            amount: row.amount,
            details_url: row.details_url.clone(),
            data_state,
            html_hash: Some(html_hash.to_string()),
        }
    }
}

/// A stored farmer-level purchase
#[derive(Debug, Clone, PartialEq)]
pub struct FarmerTransaction {
    pub id: i64,
    pub centre_id: i64,
    pub date: NaiveDate,
    pub farmer_id: String,
    pub farmer_name: String,
    pub village: String,
    pub quantity: f64,
    pub amount: f64,
    pub transaction_time: String,
    pub last_synced: DateTime<Utc>,
}

/// Values written by a transaction insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub farmer_id: String,
    pub farmer_name: String,
    pub village: String,
    pub quantity: f64,
    pub amount: f64,
    pub transaction_time: String,
}

impl From<&TransactionRow> for NewTransaction {
    fn from(row: &TransactionRow) -> Self {
        Self {
            farmer_id: row.farmer_id.clone(),
            farmer_name: row.farmer_name.clone(),
            village: row.village.clone(),
            quantity: row.quantity,
            amount: row.amount,
            transaction_time: row.transaction_time.clone(),
        }
    }
}
