//! Request spacing
//!
//! A [`Throttle`] hands out request slots at least `delay` apart. The
//! critical section only covers choosing the slot; the caller sleeps after
//! the lock is released, so concurrent callers queue up behind each other
//! without holding the lock across the wait.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use url::Url;

/// Slot reservation for a single request stream
#[derive(Debug, Default)]
pub struct Throttle {
    last_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next slot no earlier than `delay` after the previous one
    pub fn reserve(&self, delay: Duration) -> Instant {
        let now = Instant::now();
        let mut last = match self.last_slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = match *last {
            Some(previous) => now.max(previous + delay),
            None => now,
        };
        *last = Some(slot);
        slot
    }

    /// Waits for the next slot
    pub async fn wait(&self, delay: Duration) {
        let slot = self.reserve(delay);
        tokio::time::sleep_until(slot).await;
    }
}

/// Per-host spacing shared across workers
#[derive(Debug)]
struct HostState {
    last_slot: Instant,
    request_count: u64,
}

/// Cross-worker rate limiter keyed by host
///
/// Every fetcher holding the same limiter observes the same per-host delay,
/// so the enforced spacing is global rather than per worker.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    hosts: Mutex<HashMap<String, HostState>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Reserves the next slot for `host`
    pub fn reserve(&self, host: &str) -> Instant {
        let now = Instant::now();
        let mut hosts = match self.hosts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let state = hosts.entry(host.to_string()).or_insert(HostState {
            last_slot: now,
            request_count: 0,
        });

        let slot = if state.request_count == 0 {
            now
        } else {
            now.max(state.last_slot + self.delay)
        };
        state.last_slot = slot;
        state.request_count += 1;
        slot
    }

    /// Waits until a request to `url`'s host may be issued
    pub async fn acquire(&self, url: &Url) {
        let host = url.host_str().unwrap_or_default();
        let slot = self.reserve(host);

        let now = Instant::now();
        if slot > now {
            tracing::trace!("Rate limit wait {:?} for {}", slot - now, host);
        }
        tokio::time::sleep_until(slot).await;
    }

    /// Number of slots handed out for `host`
    pub fn request_count(&self, host: &str) -> u64 {
        self.hosts
            .lock()
            .ok()
            .and_then(|hosts| hosts.get(host).map(|s| s.request_count))
            .unwrap_or(0)
    }
}
