//! Fetch → parse → persist for one entity at a time
//!
//! The engine only ever follows links it has seen: the configured entry URL,
//! centre links from the list page, and detail links from summary pages.
//! "Nothing to sync" (unknown centre, unpublished details) is `Ok(0)`; fetch
//! and storage failures propagate to the caller.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use url::Url;

use crate::config::Config;
use crate::fetcher::{DeltaChecker, FetchedPage, Fetcher};
use crate::logging::LogSink;
use crate::parser::{
    parse_centre_list, parse_datewise_summary, parse_farmer_details, TableScan,
};
use crate::state::FreshnessManager;
use crate::storage::{NewSummary, NewTransaction, Storage};
use crate::Result;

const COMPONENT: &str = "sync_engine";

/// Syncs centres, summaries and farmer details into a storage handle
pub struct SyncEngine<S: Storage> {
    config: Arc<Config>,
    fetcher: Fetcher,
    storage: S,
    freshness: FreshnessManager,
    sink: Arc<dyn LogSink>,
}

impl<S: Storage> SyncEngine<S> {
    pub fn new(config: Arc<Config>, fetcher: Fetcher, storage: S, sink: Arc<dyn LogSink>) -> Self {
        let freshness = FreshnessManager::new(&config.freshness);
        Self {
            config,
            fetcher,
            storage,
            freshness,
            sink,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn freshness(&self) -> &FreshnessManager {
        &self.freshness
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    /// Fetches the entry page and upserts every listed centre by name
    ///
    /// Returns the number of centres found on the page.
    pub async fn sync_centres(&mut self) -> Result<usize> {
        self.sink.info(COMPONENT, "Centre list sync started");
        let result = self.store_centres().await;
        self.report("Centre list sync", &result);
        result
    }

    /// Refreshes the date-wise summaries of one centre
    ///
    /// Returns the number of summary rows written, or 0 if the centre is
    /// unknown.
    pub async fn sync_centre_summaries(&mut self, centre_name: &str) -> Result<usize> {
        self.sink.info(
            COMPONENT,
            &format!("Summary sync started for '{}'", centre_name),
        );
        let result = self.store_summaries(centre_name).await;
        self.report(&format!("Summary sync for '{}'", centre_name), &result);
        result
    }

    /// Replaces the farmer transactions of one centre and date
    ///
    /// Returns the number of transactions inserted, or 0 if the centre, the
    /// summary, or its details link is missing.
    pub async fn sync_farmer_details(&mut self, centre_name: &str, date: NaiveDate) -> Result<usize> {
        self.sink.info(
            COMPONENT,
            &format!("Detail sync started for '{}' on {}", centre_name, date),
        );
        let result = self.store_details(centre_name, date).await;
        self.report(
            &format!("Detail sync for '{}' on {}", centre_name, date),
            &result,
        );
        result
    }

    async fn store_centres(&mut self) -> Result<usize> {
        let entry_url = self.fetcher.entry_url().to_string();
        let page = self.fetcher.get(&entry_url).await?;
        let base = base_url(&page, &entry_url)?;

        let parsed = parse_centre_list(&page.text(), &base);
        self.check_scan("centre list", &entry_url, &parsed.scan);

        for centre in &parsed.centres {
            self.storage
                .create_or_update_centre(&centre.name, &centre.url, None)?;
        }

        Ok(parsed.centres.len())
    }

    async fn store_summaries(&mut self, centre_name: &str) -> Result<usize> {
        let Some(centre) = self.storage.get_centre_by_name(centre_name)? else {
            self.sink.warn(
                COMPONENT,
                &format!("Centre '{}' not found; sync the centre list first", centre_name),
            );
            return Ok(0);
        };

        let page = self.fetcher.get(&centre.url).await?;
        let html_hash = DeltaChecker::hash(&page.body);

        if self.config.sync.skip_unchanged {
            let previous = self.storage.last_summary_hash(centre.id)?;
            if !DeltaChecker::changed(&page.body, previous.as_deref()) {
                let touched = self.storage.touch_summaries(centre.id)?;
                self.sink.info(
                    COMPONENT,
                    &format!(
                        "Summary page for '{}' unchanged; refreshed {} summaries",
                        centre.name, touched
                    ),
                );
                return Ok(touched);
            }
        }

        let base = base_url(&page, &centre.url)?;
        let parsed = parse_datewise_summary(&page.text(), &base);
        self.check_scan("date-wise summary", &centre.url, &parsed.scan);

        if let Some(district) = parsed.district.as_deref() {
            if centre.district.as_deref() != Some(district) {
                self.storage.set_centre_district(centre.id, district)?;
            }
        }
        if let Some(page_name) = parsed.centre_name.as_deref() {
            if page_name != centre.name {
                tracing::debug!("Summary page names centre '{}' as '{}'", centre.name, page_name);
            }
        }

        let now = Utc::now();
        for row in &parsed.rows {
            let state = self.freshness.data_state(row.date, now);

            if let Some(previous) = self.storage.get_summary(centre.id, row.date)? {
                if previous.data_state != state {
                    self.sink.info(
                        COMPONENT,
                        &format!(
                            "Data state of '{}' on {} changed {} -> {}",
                            centre.name, row.date, previous.data_state, state
                        ),
                    );
                }
            }

            self.storage
                .create_or_update_summary(centre.id, &NewSummary::from_row(row, state, &html_hash))?;
        }

        Ok(parsed.rows.len())
    }

    async fn store_details(&mut self, centre_name: &str, date: NaiveDate) -> Result<usize> {
        let Some(centre) = self.storage.get_centre_by_name(centre_name)? else {
            self.sink.warn(
                COMPONENT,
                &format!("Centre '{}' not found; sync the centre list first", centre_name),
            );
            return Ok(0);
        };

        let details_url = match self.storage.get_summary(centre.id, date)? {
            Some(summary) => summary.details_url,
            None => None,
        };
        let Some(details_url) = details_url else {
            self.sink.info(
                COMPONENT,
                &format!("No details link for '{}' on {}", centre.name, date),
            );
            return Ok(0);
        };

        let page = self.fetcher.get(&details_url).await?;
        tracing::debug!(
            "Detail page for '{}' on {} hashed {}",
            centre.name,
            date,
            DeltaChecker::hash(&page.body)
        );

        let parsed = parse_farmer_details(&page.text());
        self.check_scan("farmer details", &details_url, &parsed.scan);

        if let Some(page_date) = parsed.date {
            if page_date != date {
                self.sink.warn(
                    COMPONENT,
                    &format!(
                        "Detail page for '{}' on {} reports purchase date {}",
                        centre.name, date, page_date
                    ),
                );
            }
        }

        let transactions: Vec<NewTransaction> =
            parsed.transactions.iter().map(NewTransaction::from).collect();
        let inserted = self
            .storage
            .replace_transactions(centre.id, date, &transactions)?;

        Ok(inserted)
    }

    /// Reports parser degradations through the sink
    fn check_scan(&self, page_kind: &str, url: &str, scan: &TableScan) {
        if !scan.table_found {
            self.sink.log(
                COMPONENT,
                crate::LogLevel::Warning,
                &format!("No data table on {} page", page_kind),
                Some(url),
            );
        } else if !scan.is_anchored() {
            self.sink.log(
                COMPONENT,
                crate::LogLevel::Warning,
                &format!("Header row missing on {} page; used fallback row offset", page_kind),
                Some(url),
            );
        }
        if scan.skipped_rows > 0 {
            tracing::debug!("Skipped {} rows on {} page {}", scan.skipped_rows, page_kind, url);
        }
    }

    fn report(&self, label: &str, result: &Result<usize>) {
        match result {
            Ok(count) => self
                .sink
                .info(COMPONENT, &format!("{} finished: {} records", label, count)),
            Err(e) => self
                .sink
                .error(COMPONENT, &format!("{} failed", label), Some(&e.to_string())),
        }
    }
}

/// Resolves relative links against the URL the page was actually served from
fn base_url(page: &FetchedPage, requested: &str) -> Result<Url> {
    match Url::parse(&page.final_url) {
        Ok(url) => Ok(url),
        Err(_) => Ok(Url::parse(requested)?),
    }
}
