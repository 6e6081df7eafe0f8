//! Repository traits and error types
//!
//! Writes take `&mut self` and reads `&self`; a handle is owned by exactly
//! one engine at a time, so implementations need not be `Sync`.

use chrono::NaiveDate;
use thiserror::Error;

use crate::storage::{Centre, DateSummary, FarmerTransaction, NewSummary, NewTransaction};

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Centre not found: {0}")]
    CentreNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Centres discovered on the list page
pub trait CentreRepository {
    /// Inserts or updates a centre by name, returning its id
    ///
    /// A `None` district keeps whatever district is already stored.
    fn create_or_update_centre(
        &mut self,
        name: &str,
        url: &str,
        district: Option<&str>,
    ) -> StorageResult<i64>;

    fn get_centre_by_name(&self, name: &str) -> StorageResult<Option<Centre>>;

    /// All centres ordered by name
    fn list_centres(&self) -> StorageResult<Vec<Centre>>;

    fn list_centres_by_district(&self, district: &str) -> StorageResult<Vec<Centre>>;

    fn set_centre_district(&mut self, centre_id: i64, district: &str) -> StorageResult<()>;

    fn count_centres(&self) -> StorageResult<u64>;
}

/// Date-wise summaries keyed by `(centre_id, date)`
pub trait SummaryRepository {
    /// Inserts or replaces the summary for `(centre_id, summary.date)`,
    /// stamping `last_synced` with the current time
    fn create_or_update_summary(
        &mut self,
        centre_id: i64,
        summary: &NewSummary,
    ) -> StorageResult<i64>;

    fn get_summary(&self, centre_id: i64, date: NaiveDate) -> StorageResult<Option<DateSummary>>;

    /// All summaries of a centre ordered by date
    fn list_summaries_by_centre(&self, centre_id: i64) -> StorageResult<Vec<DateSummary>>;

    /// Summaries with `from <= date <= to`, ordered by date
    fn list_summaries_in_range(
        &self,
        centre_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StorageResult<Vec<DateSummary>>;

    /// The summary with the most recent date
    fn latest_summary(&self, centre_id: i64) -> StorageResult<Option<DateSummary>>;

    /// Page hash recorded by the most recent summary sync of a centre
    fn last_summary_hash(&self, centre_id: i64) -> StorageResult<Option<String>>;

    /// Refreshes `last_synced` on every summary of a centre
    fn touch_summaries(&mut self, centre_id: i64) -> StorageResult<usize>;

    fn count_summaries(&self) -> StorageResult<u64>;
}

/// Farmer-level purchases keyed by `(centre_id, date)`
pub trait TransactionRepository {
    /// Inserts a transaction unless an identical row already exists
    ///
    /// Returns true if a row was inserted. An identical row only has its
    /// `last_synced` refreshed.
    fn create_or_update_transaction(
        &mut self,
        centre_id: i64,
        date: NaiveDate,
        transaction: &NewTransaction,
    ) -> StorageResult<bool>;

    fn delete_transactions_by_centre_and_date(
        &mut self,
        centre_id: i64,
        date: NaiveDate,
    ) -> StorageResult<usize>;

    /// Transactions for one date ordered by farmer name
    fn list_transactions_by_centre_and_date(
        &self,
        centre_id: i64,
        date: NaiveDate,
    ) -> StorageResult<Vec<FarmerTransaction>>;

    fn count_transactions(&self) -> StorageResult<u64>;

    /// Replaces the stored set for `(centre_id, date)` with `transactions`
    ///
    /// Returns the number of rows inserted. Backends with transactions
    /// should override this to make the swap atomic.
    fn replace_transactions(
        &mut self,
        centre_id: i64,
        date: NaiveDate,
        transactions: &[NewTransaction],
    ) -> StorageResult<usize> {
        self.delete_transactions_by_centre_and_date(centre_id, date)?;
        let mut inserted = 0;
        for transaction in transactions {
            if self.create_or_update_transaction(centre_id, date, transaction)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

/// A complete storage backend
pub trait Storage: CentreRepository + SummaryRepository + TransactionRepository + Send {}

impl<T> Storage for T where T: CentreRepository + SummaryRepository + TransactionRepository + Send {}
