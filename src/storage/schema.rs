//! Database schema definitions
//!
//! Dates are ISO `YYYY-MM-DD` text so range filters and ordering work
//! lexicographically. Timestamps are RFC 3339 UTC.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS centres (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    district TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_centres_district ON centres(district);

CREATE TABLE IF NOT EXISTS datewise_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    centre_id INTEGER NOT NULL REFERENCES centres(id),
    date TEXT NOT NULL,
    farmer_count INTEGER NOT NULL DEFAULT 0,
    quantity REAL NOT NULL DEFAULT 0,
    amount REAL NOT NULL DEFAULT 0,
    details_url TEXT,
    data_state TEXT NOT NULL,
    html_hash TEXT,
    last_synced TEXT NOT NULL,
    UNIQUE(centre_id, date)
);

CREATE INDEX IF NOT EXISTS idx_summaries_centre_date ON datewise_summaries(centre_id, date);

CREATE TABLE IF NOT EXISTS farmer_transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    centre_id INTEGER NOT NULL REFERENCES centres(id),
    date TEXT NOT NULL,
    farmer_id TEXT NOT NULL,
    farmer_name TEXT NOT NULL,
    village TEXT NOT NULL,
    quantity REAL NOT NULL DEFAULT 0,
    amount REAL NOT NULL DEFAULT 0,
    transaction_time TEXT NOT NULL,
    last_synced TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_centre_date ON farmer_transactions(centre_id, date);

CREATE TABLE IF NOT EXISTS activity_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    component TEXT NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    details TEXT
);

CREATE INDEX IF NOT EXISTS idx_activity_logs_level ON activity_logs(level);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
