//! Sync engine, full-sync orchestration and job liveness monitoring

mod engine;
mod orchestrator;
mod watchdog;

pub use engine::SyncEngine;
pub use orchestrator::{
    build_engine, FullSyncOrchestrator, FullSyncReport, PhaseReport, SqliteStorageFactory,
    StorageFactory,
};
pub use watchdog::{SyncJob, SyncWatchdog};
