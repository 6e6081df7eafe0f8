//! Advisory liveness monitor for long-running sync jobs
//!
//! Jobs register, check in as they make progress, and unregister when done.
//! A background task polls the registry and flags any job whose last check-in
//! is older than the timeout. Flagging only logs; the job keeps running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::WatchdogConfig;
use crate::logging::{LogLevel, LogSink};

const COMPONENT: &str = "watchdog";

/// A job tracked by the watchdog
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub job_id: String,
    pub start_time: Instant,
    pub last_checkin: Instant,

    /// Set once the job went quiet for longer than the timeout; never cleared
    pub timed_out: bool,
}

type JobTable = Arc<Mutex<HashMap<String, SyncJob>>>;

/// Flags jobs that stop checking in
pub struct SyncWatchdog {
    timeout: Duration,
    poll_interval: Duration,
    jobs: JobTable,
    sink: Arc<dyn LogSink>,
    shutdown_tx: broadcast::Sender<()>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

fn lock_jobs(jobs: &Mutex<HashMap<String, SyncJob>>) -> MutexGuard<'_, HashMap<String, SyncJob>> {
    match jobs.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Flags newly timed-out jobs and returns their ids
fn scan_jobs(jobs: &Mutex<HashMap<String, SyncJob>>, timeout: Duration, sink: &dyn LogSink) -> Vec<String> {
    let now = Instant::now();
    let mut flagged = Vec::new();

    for job in lock_jobs(jobs).values_mut() {
        let quiet = now.duration_since(job.last_checkin);
        if !job.timed_out && quiet > timeout {
            job.timed_out = true;
            flagged.push(job.job_id.clone());
            sink.log(
                COMPONENT,
                LogLevel::Warning,
                &format!("Job {} timed out after {:.1}s without check-in", job.job_id, quiet.as_secs_f64()),
                Some(&format!("running for {:.1}s", now.duration_since(job.start_time).as_secs_f64())),
            );
        }
    }

    flagged
}

impl SyncWatchdog {
    pub fn new(config: &WatchdogConfig, sink: Arc<dyn LogSink>) -> Self {
        Self::with_timing(config.timeout(), config.poll_interval(), sink)
    }

    pub fn with_timing(timeout: Duration, poll_interval: Duration, sink: Arc<dyn LogSink>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            timeout,
            poll_interval,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            sink,
            shutdown_tx,
            monitor: Mutex::new(None),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Starts tracking `job_id`, replacing any previous job with that id
    pub fn register(&self, job_id: &str) {
        let now = Instant::now();
        lock_jobs(&self.jobs).insert(
            job_id.to_string(),
            SyncJob {
                job_id: job_id.to_string(),
                start_time: now,
                last_checkin: now,
                timed_out: false,
            },
        );
        tracing::debug!("Watchdog registered job {}", job_id);
    }

    /// Records progress for `job_id`; unknown ids are ignored
    pub fn checkin(&self, job_id: &str) {
        if let Some(job) = lock_jobs(&self.jobs).get_mut(job_id) {
            job.last_checkin = Instant::now();
        }
    }

    pub fn unregister(&self, job_id: &str) {
        lock_jobs(&self.jobs).remove(job_id);
    }

    /// A copy of the tracked job, if registered
    pub fn job(&self, job_id: &str) -> Option<SyncJob> {
        lock_jobs(&self.jobs).get(job_id).cloned()
    }

    pub fn active_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock_jobs(&self.jobs).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// True if the job was flagged or has been quiet longer than the timeout
    pub fn is_stuck(&self, job_id: &str) -> bool {
        match lock_jobs(&self.jobs).get(job_id) {
            Some(job) => job.timed_out || job.last_checkin.elapsed() > self.timeout,
            None => false,
        }
    }

    /// Runs one monitoring pass immediately
    pub fn scan(&self) -> Vec<String> {
        scan_jobs(&self.jobs, self.timeout, self.sink.as_ref())
    }

    /// Spawns the monitoring task; does nothing if it is already running
    pub fn start(&self) {
        let mut monitor = match self.monitor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if monitor.is_some() {
            return;
        }

        let jobs = Arc::clone(&self.jobs);
        let sink = Arc::clone(&self.sink);
        let timeout = self.timeout;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut interval = tokio::time::interval(self.poll_interval.max(Duration::from_millis(1)));

        *monitor = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        scan_jobs(&jobs, timeout, sink.as_ref());
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Watchdog received shutdown signal");
                        break;
                    }
                }
            }
        }));
    }

    /// Stops the monitoring task and waits for it to exit
    pub async fn stop(&self) {
        let handle = match self.monitor.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(handle) = handle {
            let _ = self.shutdown_tx.send(());
            if let Err(e) = handle.await {
                tracing::warn!("Watchdog task ended abnormally: {}", e);
            }
        }
    }
}
