//! SQLite storage implementation
//!
//! This module provides the SQLite-backed repositories and the activity log
//! sink. Every handle opens its own connection; WAL mode plus a busy timeout
//! lets parallel workers write to the same file.

use crate::logging::{forward_to_tracing, LogLevel, LogSink};
use crate::normalize::{from_storage_key, to_storage_key};
use crate::state::DataState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    CentreRepository, StorageError, StorageResult, SummaryRepository, TransactionRepository,
};
use crate::storage::{Centre, DateSummary, FarmerTransaction, NewSummary, NewTransaction};
use crate::SyncError;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SUMMARY_COLUMNS: &str = "id, centre_id, date, farmer_count, quantity, amount, details_url,
     data_state, html_hash, last_synced";

const TRANSACTION_COLUMNS: &str = "id, centre_id, date, farmer_id, farmer_name, village,
     quantity, amount, transaction_time, last_synced";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

/// Opens a file-backed connection configured for concurrent writers
fn open_connection(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA temp_store = MEMORY;
    ",
    )?;

    initialize_schema(&conn)?;
    Ok(conn)
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> Result<Self, SyncError> {
        let conn = open_connection(path)?;
        Ok(Self { conn })
    }

    /// Creates a private in-memory database
    pub fn new_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Summed quantity and amount across all stored summaries
    pub fn summary_totals(&self) -> StorageResult<(f64, f64)> {
        let totals = self.conn.query_row(
            "SELECT COALESCE(SUM(quantity), 0), COALESCE(SUM(amount), 0) FROM datewise_summaries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(totals)
    }

    /// Earliest and latest stored summary dates
    pub fn date_span(&self) -> StorageResult<Option<(NaiveDate, NaiveDate)>> {
        let span: (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(date), MAX(date) FROM datewise_summaries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(match span {
            (Some(first), Some(last)) => from_storage_key(&first).zip(from_storage_key(&last)),
            _ => None,
        })
    }

    /// Number of distinct districts recorded on centres
    pub fn count_districts(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT district) FROM centres WHERE district IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Summary count per date, oldest first
    pub fn count_summaries_by_date(&self) -> StorageResult<Vec<(NaiveDate, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, COUNT(*) FROM datewise_summaries GROUP BY date ORDER BY date")?;

        let rows = stmt.query_map([], |row| {
            Ok((date_column(row, 0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (date, count) = row?;
            counts.push((date, count as u64));
        }
        Ok(counts)
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    from_storage_key(&raw).ok_or_else(|| conversion_error(idx, format!("invalid date '{}'", raw)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("invalid timestamp '{}': {}", raw, e)))
}

fn centre_from_row(row: &Row<'_>) -> rusqlite::Result<Centre> {
    Ok(Centre {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        district: row.get(3)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<DateSummary> {
    let state: String = row.get(7)?;
    Ok(DateSummary {
        id: row.get(0)?,
        centre_id: row.get(1)?,
        date: date_column(row, 2)?,
        farmer_count: row.get(3)?,
        quantity: row.get(4)?,
        amount: row.get(5)?,
        details_url: row.get(6)?,
        data_state: DataState::from_db_string(&state)
            .ok_or_else(|| conversion_error(7, format!("unknown data state '{}'", state)))?,
        html_hash: row.get(8)?,
        last_synced: timestamp_column(row, 9)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<FarmerTransaction> {
    Ok(FarmerTransaction {
        id: row.get(0)?,
        centre_id: row.get(1)?,
        date: date_column(row, 2)?,
        farmer_id: row.get(3)?,
        farmer_name: row.get(4)?,
        village: row.get(5)?,
        quantity: row.get(6)?,
        amount: row.get(7)?,
        transaction_time: row.get(8)?,
        last_synced: timestamp_column(row, 9)?,
    })
}

/// Inserts `transaction` unless an identical row exists; returns true on insert
fn insert_or_touch_transaction(
    conn: &Connection,
    centre_id: i64,
    date_key: &str,
    transaction: &NewTransaction,
    now: &str,
) -> rusqlite::Result<bool> {
    let existing: Option<i64> = conn
        .prepare_cached(
            "SELECT id FROM farmer_transactions
             WHERE centre_id = ?1 AND date = ?2 AND farmer_id = ?3 AND farmer_name = ?4
             AND village = ?5 AND quantity = ?6 AND amount = ?7 AND transaction_time = ?8",
        )?
        .query_row(
            params![
                centre_id,
                date_key,
                transaction.farmer_id,
                transaction.farmer_name,
                transaction.village,
                transaction.quantity,
                transaction.amount,
                transaction.transaction_time,
            ],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        conn.prepare_cached("UPDATE farmer_transactions SET last_synced = ?1 WHERE id = ?2")?
            .execute(params![now, id])?;
        return Ok(false);
    }

    conn.prepare_cached(
        "INSERT INTO farmer_transactions
         (centre_id, date, farmer_id, farmer_name, village, quantity, amount, transaction_time, last_synced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?
    .execute(params![
        centre_id,
        date_key,
        transaction.farmer_id,
        transaction.farmer_name,
        transaction.village,
        transaction.quantity,
        transaction.amount,
        transaction.transaction_time,
        now,
    ])?;
    Ok(true)
}

impl CentreRepository for SqliteStorage {
    fn create_or_update_centre(
        &mut self,
        name: &str,
        url: &str,
        district: Option<&str>,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO centres (name, url, district, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(name) DO UPDATE SET
                url = excluded.url,
                district = COALESCE(excluded.district, centres.district),
                updated_at = excluded.updated_at",
            params![name, url, district, now],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM centres WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_centre_by_name(&self, name: &str) -> StorageResult<Option<Centre>> {
        let centre = self
            .conn
            .query_row(
                "SELECT id, name, url, district FROM centres WHERE name = ?1",
                params![name],
                centre_from_row,
            )
            .optional()?;
        Ok(centre)
    }

    fn list_centres(&self) -> StorageResult<Vec<Centre>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, url, district FROM centres ORDER BY name")?;
        let centres = stmt
            .query_map([], centre_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(centres)
    }

    fn list_centres_by_district(&self, district: &str) -> StorageResult<Vec<Centre>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, url, district FROM centres WHERE district = ?1 ORDER BY name",
        )?;
        let centres = stmt
            .query_map(params![district], centre_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(centres)
    }

    fn set_centre_district(&mut self, centre_id: i64, district: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE centres SET district = ?1, updated_at = ?2 WHERE id = ?3",
            params![district, Utc::now().to_rfc3339(), centre_id],
        )?;
        if updated == 0 {
            return Err(StorageError::CentreNotFound(centre_id));
        }
        Ok(())
    }

    fn count_centres(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM centres", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl SummaryRepository for SqliteStorage {
    fn create_or_update_summary(
        &mut self,
        centre_id: i64,
        summary: &NewSummary,
    ) -> StorageResult<i64> {
        let date_key = to_storage_key(summary.date);
        self.conn.execute(
            "INSERT INTO datewise_summaries
             (centre_id, date, farmer_count, quantity, amount, details_url, data_state, html_hash, last_synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(centre_id, date) DO UPDATE SET
                farmer_count = excluded.farmer_count,
                quantity = excluded.quantity,
                amount = excluded.amount,
                details_url = excluded.details_url,
                data_state = excluded.data_state,
                html_hash = excluded.html_hash,
                last_synced = excluded.last_synced",
            params![
                centre_id,
                date_key,
                summary.farmer_count,
                summary.quantity,
                summary.amount,
                summary.details_url,
                summary.data_state.to_db_string(),
                summary.html_hash,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM datewise_summaries WHERE centre_id = ?1 AND date = ?2",
            params![centre_id, date_key],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_summary(&self, centre_id: i64, date: NaiveDate) -> StorageResult<Option<DateSummary>> {
        let summary = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM datewise_summaries WHERE centre_id = ?1 AND date = ?2",
                    SUMMARY_COLUMNS
                ),
                params![centre_id, to_storage_key(date)],
                summary_from_row,
            )
            .optional()?;
        Ok(summary)
    }

    fn list_summaries_by_centre(&self, centre_id: i64) -> StorageResult<Vec<DateSummary>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM datewise_summaries WHERE centre_id = ?1 ORDER BY date",
            SUMMARY_COLUMNS
        ))?;
        let summaries = stmt
            .query_map(params![centre_id], summary_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    fn list_summaries_in_range(
        &self,
        centre_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StorageResult<Vec<DateSummary>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM datewise_summaries
             WHERE centre_id = ?1 AND date BETWEEN ?2 AND ?3 ORDER BY date",
            SUMMARY_COLUMNS
        ))?;
        let summaries = stmt
            .query_map(
                params![centre_id, to_storage_key(from), to_storage_key(to)],
                summary_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    fn latest_summary(&self, centre_id: i64) -> StorageResult<Option<DateSummary>> {
        let summary = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM datewise_summaries WHERE centre_id = ?1
                     ORDER BY date DESC LIMIT 1",
                    SUMMARY_COLUMNS
                ),
                params![centre_id],
                summary_from_row,
            )
            .optional()?;
        Ok(summary)
    }

    fn last_summary_hash(&self, centre_id: i64) -> StorageResult<Option<String>> {
        let hash: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT html_hash FROM datewise_summaries
                 WHERE centre_id = ?1 AND html_hash IS NOT NULL
                 ORDER BY last_synced DESC LIMIT 1",
                params![centre_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash.flatten())
    }

    fn touch_summaries(&mut self, centre_id: i64) -> StorageResult<usize> {
        let updated = self.conn.execute(
            "UPDATE datewise_summaries SET last_synced = ?1 WHERE centre_id = ?2",
            params![Utc::now().to_rfc3339(), centre_id],
        )?;
        Ok(updated)
    }

    fn count_summaries(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM datewise_summaries", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }
}

impl TransactionRepository for SqliteStorage {
    fn create_or_update_transaction(
        &mut self,
        centre_id: i64,
        date: NaiveDate,
        transaction: &NewTransaction,
    ) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = insert_or_touch_transaction(
            &self.conn,
            centre_id,
            &to_storage_key(date),
            transaction,
            &now,
        )?;
        Ok(inserted)
    }

    fn delete_transactions_by_centre_and_date(
        &mut self,
        centre_id: i64,
        date: NaiveDate,
    ) -> StorageResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM farmer_transactions WHERE centre_id = ?1 AND date = ?2",
            params![centre_id, to_storage_key(date)],
        )?;
        Ok(deleted)
    }

    fn list_transactions_by_centre_and_date(
        &self,
        centre_id: i64,
        date: NaiveDate,
    ) -> StorageResult<Vec<FarmerTransaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM farmer_transactions
             WHERE centre_id = ?1 AND date = ?2 ORDER BY farmer_name, id",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map(
                params![centre_id, to_storage_key(date)],
                transaction_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    fn count_transactions(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM farmer_transactions", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    fn replace_transactions(
        &mut self,
        centre_id: i64,
        date: NaiveDate,
        transactions: &[NewTransaction],
    ) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let date_key = to_storage_key(date);

        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM farmer_transactions WHERE centre_id = ?1 AND date = ?2",
            params![centre_id, date_key],
        )?;

        let mut inserted = 0;
        for transaction in transactions {
            if insert_or_touch_transaction(&tx, centre_id, &date_key, transaction, &now)? {
                inserted += 1;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }
}

/// An activity log row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLog {
    pub id: i64,
    pub timestamp: String,
    pub component: String,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<String>,
}

/// Log sink that appends to the `activity_logs` table and forwards to tracing
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    /// Opens the activity log in the database at `path`
    pub fn new(path: &Path) -> Result<Self, SyncError> {
        let conn = open_connection(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// The most recent `limit` records, newest first
    pub fn recent(&self, limit: usize) -> StorageResult<Vec<StoredLog>> {
        self.query_logs(
            "SELECT id, timestamp, component, level, message, details FROM activity_logs
             ORDER BY id DESC LIMIT ?1",
            params![limit as i64],
        )
    }

    /// The most recent `limit` records at `level`, newest first
    pub fn by_level(&self, level: LogLevel, limit: usize) -> StorageResult<Vec<StoredLog>> {
        self.query_logs(
            "SELECT id, timestamp, component, level, message, details FROM activity_logs
             WHERE level = ?1 ORDER BY id DESC LIMIT ?2",
            params![level.to_db_string(), limit as i64],
        )
    }

    fn query_logs(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> StorageResult<Vec<StoredLog>> {
        let conn = match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut stmt = conn.prepare(sql)?;
        let logs = stmt
            .query_map(params, |row| {
                let level: String = row.get(3)?;
                Ok(StoredLog {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    component: row.get(2)?,
                    level: LogLevel::from_db_string(&level).unwrap_or(LogLevel::Info),
                    message: row.get(4)?,
                    details: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }
}

impl LogSink for SqliteLogSink {
    fn log(&self, component: &str, level: LogLevel, message: &str, details: Option<&str>) {
        forward_to_tracing(component, level, message, details);

        let conn = match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = conn.execute(
            "INSERT INTO activity_logs (timestamp, component, level, message, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Utc::now().to_rfc3339(),
                component,
                level.to_db_string(),
                message,
                details
            ],
        ) {
            tracing::warn!("Failed to persist activity log: {}", e);
        }
    }
}
