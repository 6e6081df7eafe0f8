//! Router tests: serve, sync or report missing

use std::sync::Arc;

use procure_sync::logging::MemorySink;
use procure_sync::router::{DataSource, RequestContext, RequestRouter, RouteStatus};
use procure_sync::state::DataState;
use procure_sync::storage::CentreRepository;
use tempfile::TempDir;
use wiremock::MockServer;

use crate::fixtures::{build_engine, start_site, test_config, BINDKI, KHAGA};

#[tokio::test]
async fn test_missing_data_when_sync_disabled() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &dir.path().join("mirror.db"));
    let mut router = RequestRouter::new(build_engine(config, Arc::new(MemorySink::new())).await);

    let ctx = RequestContext::new().centre(KHAGA).sync_if_missing(false);
    let response = router.route(&ctx).await;

    assert_eq!(response.status, RouteStatus::MissingData);
    assert_eq!(response.source, DataSource::None);
    assert!(response.data.is_empty());
    assert!(response.message.contains("not available"));
    assert_eq!(site.request_count().await, 0);
}

#[tokio::test]
async fn test_missing_centre_is_synced_then_served() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &dir.path().join("mirror.db"));
    let mut router = RequestRouter::new(build_engine(config, Arc::new(MemorySink::new())).await);

    let response = router.route(&RequestContext::new().centre(KHAGA)).await;

    assert_eq!(response.status, RouteStatus::Synced);
    assert_eq!(response.source, DataSource::Source);
    assert_eq!(response.data.len(), 1);
    assert_eq!(response.data[0].centre.name, KHAGA);
    assert_eq!(response.summary_count(), 3);
    assert_eq!(response.transaction_count(), 0);

    // Centre list and Khaga's summary page only
    assert_eq!(site.request_count().await, 2);
}

#[tokio::test]
async fn test_fresh_cache_is_served_without_fetching() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &dir.path().join("mirror.db"));
    let mut router = RequestRouter::new(build_engine(config, Arc::new(MemorySink::new())).await);

    let ctx = RequestContext::new().centre(KHAGA);
    router.route(&ctx).await;
    let fetched = site.request_count().await;

    let response = router.route(&ctx).await;
    assert_eq!(response.status, RouteStatus::Served);
    assert_eq!(response.source, DataSource::Cache);
    assert_eq!(response.summary_count(), 3);
    assert_eq!(site.request_count().await, fetched);

    let states: Vec<DataState> = response.data[0]
        .summaries
        .iter()
        .map(|s| s.data_state)
        .collect();
    assert_eq!(
        states,
        vec![DataState::Closed, DataState::Closing, DataState::Open]
    );
}

#[tokio::test]
async fn test_force_refresh_always_syncs() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &dir.path().join("mirror.db"));
    let mut router = RequestRouter::new(build_engine(config, Arc::new(MemorySink::new())).await);

    router.route(&RequestContext::new().centre(KHAGA)).await;
    let fetched = site.request_count().await;

    let ctx = RequestContext::new().centre(KHAGA).force_refresh(true);
    let response = router.route(&ctx).await;

    assert_eq!(response.status, RouteStatus::Synced);
    assert_eq!(site.request_count().await, fetched + 1);

    // Force refresh wins even when syncing on miss is disabled
    let ctx = ctx.sync_if_missing(false);
    assert_eq!(router.route(&ctx).await.status, RouteStatus::Synced);
    assert_eq!(site.request_count().await, fetched + 2);
}

#[tokio::test]
async fn test_stale_cache_reported_when_sync_disabled() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&site.entry_url(), &dir.path().join("mirror.db"));
    config.freshness.open_hours = 0;
    config.freshness.closing_hours = 0;
    config.freshness.closed_hours = 0;
    let mut router = RequestRouter::new(build_engine(config, Arc::new(MemorySink::new())).await);

    router.route(&RequestContext::new().centre(KHAGA)).await;

    let ctx = RequestContext::new().centre(KHAGA).sync_if_missing(false);
    let response = router.route(&ctx).await;
    assert_eq!(response.status, RouteStatus::MissingData);
    assert!(response.message.contains("stale"));
    assert!(response.data.is_empty());

    // With syncing allowed, the stale cache is refreshed
    let response = router.route(&RequestContext::new().centre(KHAGA)).await;
    assert_eq!(response.status, RouteStatus::Synced);
}

#[tokio::test]
async fn test_unknown_single_date_is_not_available() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &dir.path().join("mirror.db"));
    let mut router = RequestRouter::new(build_engine(config, Arc::new(MemorySink::new())).await);

    router.route(&RequestContext::new().centre(KHAGA)).await;

    let ctx = RequestContext::new()
        .centre(KHAGA)
        .date(site.days_ago(5))
        .sync_if_missing(false);
    let response = router.route(&ctx).await;
    assert_eq!(response.status, RouteStatus::MissingData);

    let ctx = RequestContext::new()
        .centre(KHAGA)
        .date(site.days_ago(3))
        .sync_if_missing(false);
    let response = router.route(&ctx).await;
    assert_eq!(response.status, RouteStatus::Served);
    assert_eq!(response.summary_count(), 1);
}

#[tokio::test]
async fn test_latest_and_range_scopes() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &dir.path().join("mirror.db"));
    let mut router = RequestRouter::new(build_engine(config, Arc::new(MemorySink::new())).await);

    router.route(&RequestContext::new().centre(KHAGA)).await;

    let latest = router
        .route(&RequestContext::new().centre(KHAGA).latest())
        .await;
    assert_eq!(latest.status, RouteStatus::Served);
    assert_eq!(latest.data[0].summaries[0].date, site.today);

    let range = router
        .route(
            &RequestContext::new()
                .centre(KHAGA)
                .range(Some(site.days_ago(31)), Some(site.days_ago(1))),
        )
        .await;
    assert_eq!(range.status, RouteStatus::Served);
    assert_eq!(range.summary_count(), 2);
}

#[tokio::test]
async fn test_include_details_syncs_detail_pages() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &dir.path().join("mirror.db"));
    let mut router = RequestRouter::new(build_engine(config, Arc::new(MemorySink::new())).await);

    let ctx = RequestContext::new()
        .centre(KHAGA)
        .date(site.days_ago(30))
        .include_details(true);

    let response = router.route(&ctx).await;
    assert_eq!(response.status, RouteStatus::Synced);
    assert_eq!(response.summary_count(), 1);
    assert_eq!(response.transaction_count(), 2);

    let fetched = site.request_count().await;
    let response = router.route(&ctx).await;
    assert_eq!(response.status, RouteStatus::Served);
    assert_eq!(response.transaction_count(), 2);
    assert_eq!(site.request_count().await, fetched);
}

#[tokio::test]
async fn test_all_scope_syncs_every_centre() {
    let site = start_site().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&site.entry_url(), &dir.path().join("mirror.db"));
    let mut router = RequestRouter::new(build_engine(config, Arc::new(MemorySink::new())).await);

    let response = router.route(&RequestContext::new()).await;

    assert_eq!(response.status, RouteStatus::Synced);
    let names: Vec<&str> = response.data.iter().map(|c| c.centre.name.as_str()).collect();
    assert_eq!(names, vec![BINDKI, KHAGA]);
    assert_eq!(response.summary_count(), 4);

    let selected = router
        .route(&RequestContext::new().centres([KHAGA, BINDKI]).sync_if_missing(false))
        .await;
    assert_eq!(selected.status, RouteStatus::Served);
    assert_eq!(selected.data.len(), 2);
}

#[tokio::test]
async fn test_unreachable_source_fails_without_panicking() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let entry = format!("{}/Report/CentreList.aspx?k=XyZ", server.uri());
    let config = test_config(&entry, &dir.path().join("mirror.db"));
    let sink = Arc::new(MemorySink::new());
    let mut router = RequestRouter::new(build_engine(config, sink.clone()).await);

    let response = router.route(&RequestContext::new().centre(KHAGA)).await;

    assert_eq!(response.status, RouteStatus::Failed);
    assert!(response.data.is_empty());
    assert!(response.message.contains("404"));
    assert!(sink.contains("router", "Sync failed"));
    assert_eq!(router.engine().storage().count_centres().unwrap(), 0);
}
