//! Engine tests: one fetch-parse-persist operation at a time

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use procure_sync::config::Config;
use procure_sync::fetcher::{Fetcher, RateLimiter};
use procure_sync::logging::{LogLevel, MemorySink};
use procure_sync::state::DataState;
use procure_sync::storage::{
    CentreRepository, NewTransaction, SummaryRepository, TransactionRepository,
};
use tempfile::TempDir;
use tokio::time::Instant;

use crate::fixtures::{build_engine, start_site, test_config, BINDKI, KHAGA, SUMMARY_PATH};

fn db_in(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("mirror.db")
}

#[tokio::test]
async fn test_sync_centres_upserts_by_name() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &db_in(&dir));
    let mut engine = build_engine(config, Arc::new(MemorySink::new())).await;

    assert_eq!(engine.sync_centres().await.unwrap(), 2);
    assert_eq!(engine.sync_centres().await.unwrap(), 2);
    assert_eq!(engine.storage().count_centres().unwrap(), 2);

    let khaga = engine.storage().get_centre_by_name(KHAGA).unwrap().unwrap();
    assert_eq!(
        khaga.url,
        format!("{}{}?c=101", site.server.uri(), SUMMARY_PATH)
    );
    let bindki = engine.storage().get_centre_by_name(BINDKI).unwrap().unwrap();
    assert_eq!(
        bindki.url,
        format!("{}{}?c=102", site.server.uri(), SUMMARY_PATH)
    );
}

#[tokio::test]
async fn test_sync_summaries_excludes_totals_row() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &db_in(&dir));
    let sink = Arc::new(MemorySink::new());
    let mut engine = build_engine(config, sink.clone()).await;

    engine.sync_centres().await.unwrap();
    assert_eq!(engine.sync_centre_summaries(KHAGA).await.unwrap(), 3);

    let centre = engine.storage().get_centre_by_name(KHAGA).unwrap().unwrap();
    assert_eq!(centre.district.as_deref(), Some("फतेहपुर"));

    let summaries = engine.storage().list_summaries_by_centre(centre.id).unwrap();
    assert_eq!(summaries.len(), 3);

    let quantity: f64 = summaries.iter().map(|s| s.quantity).sum();
    let amount: f64 = summaries.iter().map(|s| s.amount).sum();
    assert!((quantity - 105.5).abs() < 1e-9);
    assert!((amount - 242_650.0).abs() < 1e-9);

    assert_eq!(summaries[0].date, site.days_ago(30));
    assert_eq!(summaries[0].data_state, DataState::Closed);
    assert_eq!(summaries[1].data_state, DataState::Closing);
    assert_eq!(summaries[2].data_state, DataState::Open);
    assert_eq!(summaries[2].details_url, None);
    assert_eq!(
        summaries[0].details_url.as_deref(),
        Some(format!("{}/Report/Farmer.aspx?d=1", site.server.uri()).as_str())
    );

    let hash = summaries[0].html_hash.as_deref().unwrap();
    assert_eq!(hash.len(), 64);
    assert!(summaries.iter().all(|s| s.html_hash.as_deref() == Some(hash)));

    assert!(sink.contains("sync_engine", "finished: 3 records"));
}

#[tokio::test]
async fn test_unknown_centre_is_not_an_error() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &db_in(&dir));
    let sink = Arc::new(MemorySink::new());
    let mut engine = build_engine(config, sink.clone()).await;

    assert_eq!(engine.sync_centre_summaries("Nowhere").await.unwrap(), 0);
    assert_eq!(
        engine
            .sync_farmer_details("Nowhere", site.today)
            .await
            .unwrap(),
        0
    );
    assert!(sink.contains("sync_engine", "'Nowhere' not found"));
    assert_eq!(site.request_count().await, 0);
}

#[tokio::test]
async fn test_details_without_link_return_zero() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &db_in(&dir));
    let mut engine = build_engine(config, Arc::new(MemorySink::new())).await;

    engine.sync_centres().await.unwrap();
    engine.sync_centre_summaries(KHAGA).await.unwrap();
    let before = site.request_count().await;

    // Today's row has no published details yet, and no summary exists for
    // the day before the oldest row.
    assert_eq!(engine.sync_farmer_details(KHAGA, site.today).await.unwrap(), 0);
    assert_eq!(
        engine
            .sync_farmer_details(KHAGA, site.days_ago(31))
            .await
            .unwrap(),
        0
    );
    assert_eq!(site.request_count().await, before);
}

#[tokio::test]
async fn test_sync_farmer_details_is_idempotent() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &db_in(&dir));
    let mut engine = build_engine(config, Arc::new(MemorySink::new())).await;

    engine.sync_centres().await.unwrap();
    engine.sync_centre_summaries(KHAGA).await.unwrap();
    let date = site.days_ago(30);
    let centre = engine.storage().get_centre_by_name(KHAGA).unwrap().unwrap();

    let snapshot = |engine: &procure_sync::SyncEngine<procure_sync::storage::SqliteStorage>| {
        let mut rows: Vec<(String, String, f64, f64)> = engine
            .storage()
            .list_transactions_by_centre_and_date(centre.id, date)
            .unwrap()
            .into_iter()
            .map(|t| (t.farmer_id, t.farmer_name, t.quantity, t.amount))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    };

    assert_eq!(engine.sync_farmer_details(KHAGA, date).await.unwrap(), 2);
    let first = snapshot(&engine);

    assert_eq!(engine.sync_farmer_details(KHAGA, date).await.unwrap(), 2);
    let second = snapshot(&engine);

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(engine.storage().count_transactions().unwrap(), 2);
    assert_eq!(first[0].0, "XXXX1001");
    assert_eq!(first[0].3, 58_650.0);
}

#[tokio::test]
async fn test_detail_sync_replaces_stale_rows() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &db_in(&dir));
    let mut engine = build_engine(config, Arc::new(MemorySink::new())).await;

    engine.sync_centres().await.unwrap();
    engine.sync_centre_summaries(KHAGA).await.unwrap();
    let date = site.days_ago(3);
    let centre = engine.storage().get_centre_by_name(KHAGA).unwrap().unwrap();

    let withdrawn = NewTransaction {
        farmer_id: "XXXX9999".to_string(),
        farmer_name: "Withdrawn".to_string(),
        village: "Nowhere".to_string(),
        quantity: 1.0,
        amount: 1.0,
        transaction_time: "00:00".to_string(),
    };
    engine
        .storage_mut()
        .create_or_update_transaction(centre.id, date, &withdrawn)
        .unwrap();

    assert_eq!(engine.sync_farmer_details(KHAGA, date).await.unwrap(), 1);

    let stored = engine
        .storage()
        .list_transactions_by_centre_and_date(centre.id, date)
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].farmer_id, "XXXX2001");
}

#[tokio::test]
async fn test_fetch_error_propagates() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &db_in(&dir));
    let sink = Arc::new(MemorySink::new());
    let mut engine = build_engine(config, sink.clone()).await;

    let broken_url = format!("{}/Report/Missing.aspx?c=404", site.server.uri());
    engine
        .storage_mut()
        .create_or_update_centre("Ghost", &broken_url, None)
        .unwrap();

    let err = engine.sync_centre_summaries("Ghost").await.unwrap_err();
    assert!(err.is_fetch_error());
    assert_eq!(sink.count_at(LogLevel::Error), 1);
}

#[tokio::test]
async fn test_skip_unchanged_refreshes_without_reparse() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&site.entry_url(), &db_in(&dir));
    config.sync.skip_unchanged = true;
    let sink = Arc::new(MemorySink::new());
    let mut engine = build_engine(config, sink.clone()).await;

    engine.sync_centres().await.unwrap();
    assert_eq!(engine.sync_centre_summaries(KHAGA).await.unwrap(), 3);
    let centre = engine.storage().get_centre_by_name(KHAGA).unwrap().unwrap();
    let first = engine.storage().latest_summary(centre.id).unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(engine.sync_centre_summaries(KHAGA).await.unwrap(), 3);

    let second = engine.storage().latest_summary(centre.id).unwrap().unwrap();
    assert!(second.last_synced >= first.last_synced);
    assert!(sink.contains("sync_engine", "unchanged"));
}

fn throttled_config(entry_url: &str, db: &Path, delay_ms: u64) -> Config {
    let mut config = test_config(entry_url, db);
    config.fetcher.request_delay_ms = delay_ms;
    config
}

#[tokio::test]
async fn test_consecutive_requests_respect_delay() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = throttled_config(&site.entry_url(), &db_in(&dir), 200);
    let fetcher = Fetcher::new(&config, None).unwrap();

    let started = Instant::now();
    fetcher.get(&site.entry_url()).await.unwrap();
    fetcher.get(&site.entry_url()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_shared_limiter_spaces_separate_fetchers() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = throttled_config(&site.entry_url(), &db_in(&dir), 150);
    let limiter = Arc::new(RateLimiter::new(config.fetcher.request_delay()));

    let first = Fetcher::new(&config, Some(limiter.clone())).unwrap();
    let second = Fetcher::new(&config, Some(limiter.clone())).unwrap();

    let started = Instant::now();
    let url = site.entry_url();
    let (a, b) = tokio::join!(first.get(&url), second.get(&url));
    a.unwrap();
    b.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(limiter.request_count("127.0.0.1"), 2);
}
