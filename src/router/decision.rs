//! Serve-versus-sync decisions
//!
//! The router keeps no state between requests. Each call inspects storage,
//! applies the freshness policy and picks one of three actions.

use chrono::{DateTime, Utc};

use super::context::{scope_names, RequestContext, ResolvedDates, Scope};
use crate::storage::{Centre, DateSummary, FarmerTransaction, Storage};
use crate::sync::SyncEngine;
use crate::Result;

const COMPONENT: &str = "router";

/// Final outcome of a routed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    /// Answered from a fresh cache
    Served,
    /// Answered after syncing from the source
    Synced,
    /// Cache missing or stale and syncing was not allowed
    MissingData,
    Failed,
}

impl RouteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Served => "served",
            Self::Synced => "synced",
            Self::MissingData => "missing_data",
            Self::Failed => "failed",
        }
    }
}

/// Where the payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Cache,
    Source,
    None,
}

/// Stored data of one centre within the request scope
#[derive(Debug, Clone, PartialEq)]
pub struct CentreData {
    pub centre: Centre,

    /// Ordered by date, with `data_state` recomputed for now
    pub summaries: Vec<DateSummary>,

    /// Empty unless details were requested
    pub transactions: Vec<FarmerTransaction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub status: RouteStatus,
    pub source: DataSource,
    pub message: String,
    pub data: Vec<CentreData>,
}

impl RouteResponse {
    fn missing(message: impl Into<String>) -> Self {
        Self {
            status: RouteStatus::MissingData,
            source: DataSource::None,
            message: message.into(),
            data: Vec::new(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            status: RouteStatus::Failed,
            source: DataSource::None,
            message: message.into(),
            data: Vec::new(),
        }
    }

    pub fn summary_count(&self) -> usize {
        self.data.iter().map(|c| c.summaries.len()).sum()
    }

    pub fn transaction_count(&self) -> usize {
        self.data.iter().map(|c| c.transactions.len()).sum()
    }
}

/// Action picked by the decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    ServeCached,
    SyncThenServe,
    ReportMissing,
}

/// The routing decision table
pub fn decide(available: bool, fresh: bool, force_refresh: bool, sync_if_missing: bool) -> RouteAction {
    if force_refresh {
        RouteAction::SyncThenServe
    } else if available && fresh {
        RouteAction::ServeCached
    } else if sync_if_missing {
        RouteAction::SyncThenServe
    } else {
        RouteAction::ReportMissing
    }
}

/// Centres and summaries selected for a request
#[derive(Debug, Default)]
struct Selection {
    centres: Vec<(Centre, Vec<DateSummary>)>,

    /// Something the scope names is not stored
    incomplete: bool,
}

/// Routes requests to the cache or a sync
pub struct RequestRouter<S: Storage> {
    engine: SyncEngine<S>,
}

impl<S: Storage> RequestRouter<S> {
    pub fn new(engine: SyncEngine<S>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SyncEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SyncEngine<S> {
        &mut self.engine
    }

    pub fn into_engine(self) -> SyncEngine<S> {
        self.engine
    }

    /// Answers a request, syncing first when the decision table says so
    ///
    /// Never returns an error: failures become a `Failed` response.
    pub async fn route(&mut self, ctx: &RequestContext) -> RouteResponse {
        let scope = ctx.resolve_scope();
        let dates = ctx.resolve_date_scope();
        let now = Utc::now();

        let (available, fresh) = match self.check_cache(&scope, &dates, ctx.include_details, now) {
            Ok(check) => check,
            Err(e) => return self.fail("Cache check failed", e),
        };
        let action = decide(available, fresh, ctx.force_refresh, ctx.sync_if_missing);
        tracing::debug!(
            "Route scope={:?} dates={} available={} fresh={} -> {:?}",
            scope,
            dates.as_str(),
            available,
            fresh,
            action
        );

        match action {
            RouteAction::ServeCached => match self.collect(&scope, &dates, ctx.include_details, now) {
                Ok(data) => RouteResponse {
                    status: RouteStatus::Served,
                    source: DataSource::Cache,
                    message: "Served from cache".to_string(),
                    data,
                },
                Err(e) => self.fail("Reading cache failed", e),
            },
            RouteAction::ReportMissing => {
                let reason = if available { "stale" } else { "not available" };
                RouteResponse::missing(format!(
                    "Requested data is {} in the database and sync is disabled",
                    reason
                ))
            }
            RouteAction::SyncThenServe => {
                let records = match self.sync_scope(&scope, &dates, ctx).await {
                    Ok(records) => records,
                    Err(e) => return self.fail("Sync failed", e),
                };
                match self.collect(&scope, &dates, ctx.include_details, Utc::now()) {
                    Ok(data) => RouteResponse {
                        status: RouteStatus::Synced,
                        source: DataSource::Source,
                        message: format!("Synced {} records from source", records),
                        data,
                    },
                    Err(e) => self.fail("Reading synced data failed", e),
                }
            }
        }
    }

    fn fail(&self, context: &str, error: crate::SyncError) -> RouteResponse {
        let details = error.to_string();
        self.engine.sink().error(COMPONENT, context, Some(&details));
        RouteResponse::failed(format!("{}: {}", context, details))
    }

    /// Returns `(available, fresh)` for the request scope
    fn check_cache(
        &self,
        scope: &Scope,
        dates: &ResolvedDates,
        include_details: bool,
        now: DateTime<Utc>,
    ) -> Result<(bool, bool)> {
        let selection = self.select(scope, dates)?;
        if selection.incomplete || selection.centres.is_empty() {
            return Ok((false, false));
        }

        let storage = self.engine.storage();
        let freshness = self.engine.freshness();
        let sink = self.engine.sink();

        let mut available = true;
        let mut fresh = true;
        for (centre, summaries) in &selection.centres {
            if summaries.is_empty() {
                available = false;
            }

            for summary in summaries {
                let verdict = freshness.evaluate(
                    summary.date,
                    summary.last_synced,
                    Some(summary.data_state),
                    now,
                );
                if verdict.state_changed {
                    sink.info(
                        COMPONENT,
                        &format!(
                            "Data state of '{}' on {} is now {} (stored {})",
                            centre.name, summary.date, verdict.state, summary.data_state
                        ),
                    );
                }
                fresh &= verdict.fresh;

                if include_details
                    && summary.details_url.is_some()
                    && summary.farmer_count > 0
                    && storage
                        .list_transactions_by_centre_and_date(centre.id, summary.date)?
                        .is_empty()
                {
                    available = false;
                }
            }
        }

        Ok((available, fresh))
    }

    /// Looks up the centres and summaries a request covers
    fn select(&self, scope: &Scope, dates: &ResolvedDates) -> Result<Selection> {
        let storage = self.engine.storage();
        let mut selection = Selection::default();

        let centres = match scope_names(scope) {
            None => storage.list_centres()?,
            Some(names) => {
                let mut found = Vec::with_capacity(names.len());
                for name in &names {
                    match storage.get_centre_by_name(name)? {
                        Some(centre) => found.push(centre),
                        None => selection.incomplete = true,
                    }
                }
                found
            }
        };

        for centre in centres {
            let summaries = match dates {
                ResolvedDates::All => storage.list_summaries_by_centre(centre.id)?,
                ResolvedDates::Range(from, to) => {
                    storage.list_summaries_in_range(centre.id, *from, *to)?
                }
                ResolvedDates::Latest => storage.latest_summary(centre.id)?.into_iter().collect(),
                ResolvedDates::Single(date) => {
                    let found = storage.get_summary(centre.id, *date)?;
                    selection.incomplete |= found.is_none();
                    found.into_iter().collect()
                }
                ResolvedDates::Batch(wanted) => {
                    let mut found = Vec::with_capacity(wanted.len());
                    for date in wanted {
                        match storage.get_summary(centre.id, *date)? {
                            Some(summary) => found.push(summary),
                            None => selection.incomplete = true,
                        }
                    }
                    found
                }
            };
            selection.centres.push((centre, summaries));
        }

        Ok(selection)
    }

    /// Builds the payload from storage
    fn collect(
        &self,
        scope: &Scope,
        dates: &ResolvedDates,
        include_details: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<CentreData>> {
        let storage = self.engine.storage();
        let freshness = self.engine.freshness();
        let selection = self.select(scope, dates)?;

        let mut data = Vec::with_capacity(selection.centres.len());
        for (centre, mut summaries) in selection.centres {
            let mut transactions = Vec::new();
            for summary in &mut summaries {
                summary.data_state = freshness.data_state(summary.date, now);
                if include_details {
                    transactions
                        .extend(storage.list_transactions_by_centre_and_date(centre.id, summary.date)?);
                }
            }
            data.push(CentreData {
                centre,
                summaries,
                transactions,
            });
        }

        Ok(data)
    }

    /// Syncs every centre in scope, plus detail pages when requested
    async fn sync_scope(
        &mut self,
        scope: &Scope,
        dates: &ResolvedDates,
        ctx: &RequestContext,
    ) -> Result<usize> {
        let mut records = 0;

        let names = match scope_names(scope) {
            Some(names) => {
                let mut unknown = false;
                for name in &names {
                    unknown |= self.engine.storage().get_centre_by_name(name)?.is_none();
                }
                if unknown {
                    records += self.engine.sync_centres().await?;
                }
                names
            }
            None => {
                if ctx.force_refresh || self.engine.storage().count_centres()? == 0 {
                    records += self.engine.sync_centres().await?;
                }
                self.engine
                    .storage()
                    .list_centres()?
                    .into_iter()
                    .map(|centre| centre.name)
                    .collect()
            }
        };

        for name in &names {
            records += self.engine.sync_centre_summaries(name).await?;
        }

        if ctx.include_details {
            let selection = self.select(scope, dates)?;
            let targets: Vec<_> = selection
                .centres
                .iter()
                .flat_map(|(centre, summaries)| {
                    summaries
                        .iter()
                        .filter(|s| s.details_url.is_some())
                        .map(|s| (centre.name.clone(), s.date))
                })
                .collect();

            for (name, date) in targets {
                records += self.engine.sync_farmer_details(&name, date).await?;
            }
        }

        Ok(records)
    }
}
