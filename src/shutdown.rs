//! Process-level shutdown on Ctrl-C or SIGTERM
//!
//! Cleanup callbacks are registered up front and run exactly once, however
//! many signals arrive. There is no mid-task cancellation: once the callbacks
//! have run, the process exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

type Callback = Box<dyn FnOnce() + Send>;

/// Cleanup callbacks to run on shutdown
#[derive(Default)]
pub struct ShutdownRegistry {
    callbacks: Mutex<Vec<Callback>>,
    triggered: AtomicBool,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a callback; callbacks run in registration order
    pub fn register<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.callbacks.lock() {
            Ok(mut callbacks) => callbacks.push(Box::new(callback)),
            Err(poisoned) => poisoned.into_inner().push(Box::new(callback)),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Runs every registered callback on the first call only
    ///
    /// Returns the number of callbacks run.
    pub fn run_callbacks(&self) -> usize {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let callbacks = match self.callbacks.lock() {
            Ok(mut callbacks) => std::mem::take(&mut *callbacks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }

    /// Spawns a task that runs the callbacks and exits on the first signal
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            wait_for_signal().await;
            let ran = registry.run_callbacks();
            info!("Ran {} shutdown callbacks, exiting", ran);
            std::process::exit(0);
        })
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C signal received");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("SIGTERM signal received");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
