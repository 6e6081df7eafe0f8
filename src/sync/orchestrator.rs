//! Full sync orchestration
//!
//! A full sync runs four phases, each a barrier for the next:
//! 1. Discover centres from the entry page
//! 2. Load the centre list from storage
//! 3. Refresh every centre's date-wise summaries in parallel
//! 4. Refresh farmer details for every summary that links to them, in parallel
//!
//! Each worker builds its own fetcher and storage handle. Only the rate
//! limiter is shared, so politeness toward the site holds across workers.
//! Every phase, discovery included, is registered with the watchdog when
//! one is attached.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use crate::config::Config;
use crate::fetcher::{Fetcher, RateLimiter};
use crate::logging::LogSink;
use crate::storage::{CentreRepository, SqliteStorage, Storage, SummaryRepository};
use crate::sync::{SyncEngine, SyncWatchdog};
use crate::Result;

const COMPONENT: &str = "orchestrator";

/// Opens a fresh storage handle for each worker
pub trait StorageFactory: Send + Sync + 'static {
    type Storage: Storage + 'static;

    fn open(&self) -> Result<Self::Storage>;
}

/// Opens SQLite connections to one database file
#[derive(Debug, Clone)]
pub struct SqliteStorageFactory {
    path: PathBuf,
}

impl SqliteStorageFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StorageFactory for SqliteStorageFactory {
    type Storage = SqliteStorage;

    fn open(&self) -> Result<SqliteStorage> {
        SqliteStorage::new(&self.path)
    }
}

/// Outcome of one phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub name: &'static str,
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,

    /// Records written by the successful tasks
    pub records: usize,
    pub elapsed: Duration,
}

impl PhaseReport {
    fn single(name: &'static str, outcome: &Result<usize>, elapsed: Duration) -> Self {
        let (succeeded, records) = match outcome {
            Ok(records) => (1, *records),
            Err(_) => (0, 0),
        };
        Self {
            name,
            submitted: 1,
            succeeded,
            failed: 1 - succeeded,
            records,
            elapsed,
        }
    }
}

/// Outcome of a full sync
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FullSyncReport {
    pub phases: Vec<PhaseReport>,
    pub elapsed: Duration,
}

impl FullSyncReport {
    pub fn phase(&self, name: &str) -> Option<&PhaseReport> {
        self.phases.iter().find(|phase| phase.name == name)
    }

    pub fn total_failed(&self) -> usize {
        self.phases.iter().map(|phase| phase.failed).sum()
    }
}

/// One unit of parallel work
#[derive(Debug, Clone, PartialEq, Eq)]
enum PhaseTask {
    Summaries(String),
    Details(String, NaiveDate),
}

impl PhaseTask {
    async fn run<S: Storage>(&self, engine: &mut SyncEngine<S>) -> Result<usize> {
        match self {
            Self::Summaries(centre) => engine.sync_centre_summaries(centre).await,
            Self::Details(centre, date) => engine.sync_farmer_details(centre, *date).await,
        }
    }
}

impl fmt::Display for PhaseTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Summaries(centre) => write!(f, "summaries of '{}'", centre),
            Self::Details(centre, date) => write!(f, "details of '{}' on {}", centre, date),
        }
    }
}

/// State shared by the workers of one phase
struct WorkerContext<F: StorageFactory> {
    config: Arc<Config>,
    factory: Arc<F>,
    limiter: Arc<RateLimiter>,
    sink: Arc<dyn LogSink>,
    watchdog: Option<Arc<SyncWatchdog>>,
    job_id: String,
    queue: Arc<Mutex<VecDeque<PhaseTask>>>,
    succeeded: Arc<AtomicUsize>,
    records: Arc<AtomicUsize>,
}

/// Builds an engine with its own fetcher and storage handle
pub async fn build_engine<F: StorageFactory>(
    config: &Arc<Config>,
    factory: &F,
    limiter: Option<Arc<RateLimiter>>,
    sink: Arc<dyn LogSink>,
) -> Result<SyncEngine<F::Storage>> {
    let storage = factory.open()?;
    let fetcher = Fetcher::connect(config, limiter).await?;
    Ok(SyncEngine::new(Arc::clone(config), fetcher, storage, sink))
}

fn phase_job_id(name: &str) -> String {
    format!("full-sync:{}", name)
}

fn next_task(queue: &Mutex<VecDeque<PhaseTask>>) -> Option<PhaseTask> {
    match queue.lock() {
        Ok(mut guard) => guard.pop_front(),
        Err(poisoned) => poisoned.into_inner().pop_front(),
    }
}

fn queue_len(queue: &Mutex<VecDeque<PhaseTask>>) -> usize {
    match queue.lock() {
        Ok(guard) => guard.len(),
        Err(poisoned) => poisoned.into_inner().len(),
    }
}

async fn run_worker<F: StorageFactory>(worker_id: usize, ctx: WorkerContext<F>) {
    let mut engine = match build_engine(
        &ctx.config,
        ctx.factory.as_ref(),
        Some(Arc::clone(&ctx.limiter)),
        Arc::clone(&ctx.sink),
    )
    .await
    {
        Ok(engine) => engine,
        Err(e) => {
            ctx.sink.error(
                COMPONENT,
                &format!("Worker {} could not start", worker_id),
                Some(&e.to_string()),
            );
            return;
        }
    };

    while let Some(task) = next_task(&ctx.queue) {
        match task.run(&mut engine).await {
            Ok(records) => {
                ctx.succeeded.fetch_add(1, Ordering::Relaxed);
                ctx.records.fetch_add(records, Ordering::Relaxed);
            }
            Err(e) => ctx.sink.error(
                COMPONENT,
                &format!("Worker {}: {} failed", worker_id, task),
                Some(&e.to_string()),
            ),
        }

        if let Some(watchdog) = &ctx.watchdog {
            watchdog.checkin(&ctx.job_id);
        }
    }

    tracing::debug!("Worker {} drained its queue", worker_id);
}

/// Runs the four-phase full sync
pub struct FullSyncOrchestrator<F: StorageFactory> {
    config: Arc<Config>,
    factory: Arc<F>,
    limiter: Arc<RateLimiter>,
    sink: Arc<dyn LogSink>,
    watchdog: Option<Arc<SyncWatchdog>>,
}

impl FullSyncOrchestrator<SqliteStorageFactory> {
    /// Orchestrator writing to the database named in the config
    pub fn sqlite(config: Arc<Config>, sink: Arc<dyn LogSink>) -> Self {
        let factory = SqliteStorageFactory::new(&config.output.database_path);
        Self::new(config, factory, sink)
    }
}

impl<F: StorageFactory> FullSyncOrchestrator<F> {
    pub fn new(config: Arc<Config>, factory: F, sink: Arc<dyn LogSink>) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.fetcher.request_delay()));
        Self {
            config,
            factory: Arc::new(factory),
            limiter,
            sink,
            watchdog: None,
        }
    }

    /// Registers each phase with `watchdog`
    pub fn with_watchdog(mut self, watchdog: Arc<SyncWatchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Runs all four phases
    ///
    /// Only a failure to open storage or reach the centre list in storage is
    /// fatal; every other failure is logged and counted in the report.
    pub async fn run(&self) -> Result<FullSyncReport> {
        let started = Instant::now();
        let mut report = FullSyncReport::default();
        self.sink.info(COMPONENT, "Full sync started");

        // Phase 1. The entry page request opens the session, so this fetcher
        // skips the separate bootstrap.
        let phase_start = Instant::now();
        let storage = self.factory.open()?;
        let fetcher = Fetcher::new(&self.config, Some(Arc::clone(&self.limiter)))?;
        let mut engine =
            SyncEngine::new(Arc::clone(&self.config), fetcher, storage, Arc::clone(&self.sink));

        let job_id = phase_job_id("discover");
        self.watch(&job_id);
        let discovered = engine.sync_centres().await;
        self.unwatch(&job_id);
        if let Err(e) = &discovered {
            self.sink.error(
                COMPONENT,
                "Centre discovery failed; continuing with stored centres",
                Some(&e.to_string()),
            );
        }
        report
            .phases
            .push(PhaseReport::single("discover", &discovered, phase_start.elapsed()));

        // Phase 2
        let phase_start = Instant::now();
        let centres = engine.storage().list_centres()?;
        report.phases.push(PhaseReport::single(
            "load",
            &Ok(centres.len()),
            phase_start.elapsed(),
        ));
        self.sink.info(
            COMPONENT,
            &format!("Loaded {} centres from storage", centres.len()),
        );

        // Phase 3
        let tasks = centres
            .iter()
            .map(|centre| PhaseTask::Summaries(centre.name.clone()))
            .collect();
        report.phases.push(self.run_phase("summaries", tasks).await);

        // Phase 4
        let mut tasks = Vec::new();
        for centre in &centres {
            for summary in engine.storage().list_summaries_by_centre(centre.id)? {
                if summary.details_url.is_some() {
                    tasks.push(PhaseTask::Details(centre.name.clone(), summary.date));
                }
            }
        }
        report.phases.push(self.run_phase("details", tasks).await);

        report.elapsed = started.elapsed();
        self.sink.info(
            COMPONENT,
            &format!(
                "Full sync finished in {:.1}s with {} failed tasks",
                report.elapsed.as_secs_f64(),
                report.total_failed()
            ),
        );

        Ok(report)
    }

    fn watch(&self, job_id: &str) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.register(job_id);
        }
    }

    fn unwatch(&self, job_id: &str) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.unregister(job_id);
        }
    }

    /// Drains `tasks` through a bounded worker pool
    async fn run_phase(&self, name: &'static str, tasks: Vec<PhaseTask>) -> PhaseReport {
        let started = Instant::now();
        let submitted = tasks.len();
        let width = (self.config.sync.workers as usize).min(submitted);
        let job_id = phase_job_id(name);

        self.sink.info(
            COMPONENT,
            &format!("Phase '{}' started: {} tasks on {} workers", name, submitted, width),
        );
        self.watch(&job_id);

        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let succeeded = Arc::new(AtomicUsize::new(0));
        let records = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(width);
        for worker_id in 0..width {
            let ctx = WorkerContext {
                config: Arc::clone(&self.config),
                factory: Arc::clone(&self.factory),
                limiter: Arc::clone(&self.limiter),
                sink: Arc::clone(&self.sink),
                watchdog: self.watchdog.clone(),
                job_id: job_id.clone(),
                queue: Arc::clone(&queue),
                succeeded: Arc::clone(&succeeded),
                records: Arc::clone(&records),
            };
            handles.push(tokio::spawn(run_worker(worker_id, ctx)));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                self.sink
                    .error(COMPONENT, "Worker task aborted", Some(&e.to_string()));
            }
        }

        let undrained = queue_len(&queue);
        if undrained > 0 {
            self.sink.error(
                COMPONENT,
                &format!("Phase '{}' left {} tasks unprocessed", name, undrained),
                None,
            );
        }

        self.unwatch(&job_id);

        let succeeded = succeeded.load(Ordering::Relaxed);
        let report = PhaseReport {
            name,
            submitted,
            succeeded,
            failed: submitted - succeeded,
            records: records.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        };

        self.sink.info(
            COMPONENT,
            &format!(
                "Phase '{}' finished: {}/{} succeeded, {} records",
                name, report.succeeded, report.submitted, report.records
            ),
        );

        report
    }
}
