//! Full sync tests: four phases across a worker pool

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use procure_sync::logging::{LogSink, MemorySink};
use procure_sync::storage::{
    CentreRepository, SqliteStorage, SummaryRepository, TransactionRepository,
};
use procure_sync::sync::{FullSyncOrchestrator, SqliteStorageFactory, SyncWatchdog};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{
    centre_list_html, start_site, start_site_with, test_config, BINDKI, ENTRY_PATH, KHAGA,
};

fn counts(db: &Path) -> (u64, u64, u64) {
    let storage = SqliteStorage::new(db).unwrap();
    (
        storage.count_centres().unwrap(),
        storage.count_summaries().unwrap(),
        storage.count_transactions().unwrap(),
    )
}

#[tokio::test]
async fn test_full_sync_end_to_end() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("mirror.db");
    let config = Arc::new(test_config(&site.entry_url(), &db));
    let sink = Arc::new(MemorySink::new());

    let orchestrator = FullSyncOrchestrator::sqlite(config, sink.clone());
    let report = orchestrator.run().await.unwrap();

    let names: Vec<&str> = report.phases.iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["discover", "load", "summaries", "details"]);

    let discover = report.phase("discover").unwrap();
    assert_eq!((discover.succeeded, discover.records), (1, 2));
    assert_eq!(report.phase("load").unwrap().records, 2);

    let summaries = report.phase("summaries").unwrap();
    assert_eq!(summaries.submitted, 2);
    assert_eq!(summaries.succeeded, 2);
    assert_eq!(summaries.records, 4);

    // Today's row at Khaga has no details link and is never queued
    let details = report.phase("details").unwrap();
    assert_eq!(details.submitted, 3);
    assert_eq!(details.succeeded, 3);
    assert_eq!(details.records, 6);

    assert_eq!(report.total_failed(), 0);
    assert_eq!(counts(&db), (2, 4, 6));
    assert!(sink.contains("orchestrator", "Phase 'details' finished"));
}

#[tokio::test]
async fn test_full_sync_is_idempotent() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("mirror.db");
    let config = Arc::new(test_config(&site.entry_url(), &db));
    let sink: Arc<dyn LogSink> = Arc::new(MemorySink::new());

    let orchestrator = FullSyncOrchestrator::new(
        config.clone(),
        SqliteStorageFactory::new(&db),
        sink,
    );
    orchestrator.run().await.unwrap();
    let first = counts(&db);
    orchestrator.run().await.unwrap();

    assert_eq!(counts(&db), first);

    let storage = SqliteStorage::new(&db).unwrap();
    let bindki = storage.get_centre_by_name(BINDKI).unwrap().unwrap();
    let summary = storage.latest_summary(bindki.id).unwrap().unwrap();
    assert_eq!(
        storage
            .list_transactions_by_centre_and_date(bindki.id, summary.date)
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn test_failed_task_does_not_abort_phase() {
    let site = start_site_with(true).await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("mirror.db");
    let config = Arc::new(test_config(&site.entry_url(), &db));
    let sink = Arc::new(MemorySink::new());

    let report = FullSyncOrchestrator::sqlite(config, sink.clone())
        .run()
        .await
        .unwrap();

    let summaries = report.phase("summaries").unwrap();
    assert_eq!(summaries.submitted, 2);
    assert_eq!(summaries.succeeded, 1);
    assert_eq!(summaries.failed, 1);

    // Only Khaga's two linked dates reach phase 4
    let details = report.phase("details").unwrap();
    assert_eq!(details.submitted, 2);
    assert_eq!(details.succeeded, 2);

    assert!(sink.contains("orchestrator", "summaries of 'Bindki' failed"));
    assert_eq!(counts(&db), (2, 3, 3));
}

#[tokio::test]
async fn test_unreachable_entry_continues_with_stored_centres() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("mirror.db");
    let entry = format!("{}/Report/CentreList.aspx?k=XyZ", server.uri());
    let config = Arc::new(test_config(&entry, &db));
    let sink = Arc::new(MemorySink::new());

    let report = FullSyncOrchestrator::sqlite(config, sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase("discover").unwrap().failed, 1);
    assert_eq!(report.phase("load").unwrap().records, 0);
    assert_eq!(report.phase("summaries").unwrap().submitted, 0);
    assert_eq!(report.phase("details").unwrap().submitted, 0);
    assert!(sink.contains("orchestrator", "continuing with stored centres"));
}

#[tokio::test]
async fn test_phases_register_with_watchdog() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("mirror.db");
    let mut config = test_config(&site.entry_url(), &db);
    config.sync.workers = 1;
    config.fetcher.request_delay_ms = 10;
    let config = Arc::new(config);
    let sink = Arc::new(MemorySink::new());

    let watchdog = Arc::new(SyncWatchdog::with_timing(
        Duration::from_secs(30),
        Duration::from_millis(10),
        sink.clone(),
    ));
    watchdog.start();

    let report = FullSyncOrchestrator::sqlite(config, sink.clone())
        .with_watchdog(watchdog.clone())
        .run()
        .await
        .unwrap();
    watchdog.stop().await;

    assert_eq!(report.total_failed(), 0);
    assert!(watchdog.active_jobs().is_empty());
    assert!(!sink.contains("watchdog", "timed out"));

    let storage = SqliteStorage::new(&db).unwrap();
    assert!(storage.get_centre_by_name(KHAGA).unwrap().is_some());
}

#[tokio::test]
async fn test_discovery_reuses_entry_fetch_as_session() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("mirror.db");
    let mut config = test_config(&site.entry_url(), &db);
    config.source.bootstrap = true;
    config.sync.workers = 1;
    let config = Arc::new(config);

    let report = FullSyncOrchestrator::sqlite(config, Arc::new(MemorySink::new()))
        .run()
        .await
        .unwrap();
    assert_eq!(report.total_failed(), 0);

    // Discovery fetches the entry page once; each phase's single worker
    // bootstraps its own session.
    assert_eq!(site.requests_to(ENTRY_PATH).await, 3);
    assert_eq!(counts(&db), (2, 4, 6));
}

#[tokio::test]
async fn test_stalled_discovery_is_reported_by_watchdog() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ENTRY_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(centre_list_html())
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("mirror.db");
    let entry = format!("{}{}?k=XyZ", server.uri(), ENTRY_PATH);
    let config = Arc::new(test_config(&entry, &db));
    let sink = Arc::new(MemorySink::new());

    let watchdog = Arc::new(SyncWatchdog::with_timing(
        Duration::from_millis(50),
        Duration::from_millis(10),
        sink.clone(),
    ));
    watchdog.start();

    let report = FullSyncOrchestrator::sqlite(config, sink.clone())
        .with_watchdog(watchdog.clone())
        .run()
        .await
        .unwrap();
    watchdog.stop().await;

    assert_eq!(report.phase("discover").unwrap().records, 2);
    assert!(sink.contains("watchdog", "full-sync:discover timed out"));
    assert!(watchdog.job("full-sync:discover").is_none());
}
