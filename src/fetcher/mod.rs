//! Fetching pages from the reporting site
//!
//! # Politeness
//!
//! Each [`Fetcher`] waits out its configured delay since its own previous
//! request. When fetchers run in parallel they share one [`RateLimiter`], so
//! the delay also holds across workers for the same host.

mod client;
mod delta;
mod rate_limit;

pub use client::{build_http_client, FetchedPage, Fetcher};
pub use delta::DeltaChecker;
pub use rate_limit::{RateLimiter, Throttle};
