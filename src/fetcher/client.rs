//! Session-holding HTTP client
//!
//! One [`Fetcher`] is one browsing session: it keeps the site's cookies,
//! sends browser-like headers, and spaces its own requests. Fetchers that
//! share a [`RateLimiter`] additionally space requests across each other.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use url::Url;

use super::rate_limit::{RateLimiter, Throttle};
use crate::config::Config;
use crate::{Result, SyncError};

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchedPage {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Rate-limited GET client with a persistent cookie session
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    entry_url: Url,
    delay: Duration,
    throttle: Throttle,
    shared: Option<Arc<RateLimiter>>,
}

/// Builds an HTTP client that presents itself like a desktop browser
pub fn build_http_client(timeout: Duration) -> std::result::Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9,hi;q=0.8"),
    );

    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .cookie_store(true)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

impl Fetcher {
    /// Creates a fetcher without contacting the site
    pub fn new(config: &Config, shared: Option<Arc<RateLimiter>>) -> Result<Self> {
        let entry_url = Url::parse(&config.source.entry_url)?;
        let client = build_http_client(config.source.request_timeout())?;

        Ok(Self {
            client,
            entry_url,
            delay: config.fetcher.request_delay(),
            throttle: Throttle::new(),
            shared,
        })
    }

    /// Creates a fetcher and, if configured, opens the session
    pub async fn connect(config: &Config, shared: Option<Arc<RateLimiter>>) -> Result<Self> {
        let fetcher = Self::new(config, shared)?;
        if config.source.bootstrap {
            fetcher.bootstrap().await;
        }
        Ok(fetcher)
    }

    /// Requests the entry page once to pick up session cookies
    ///
    /// Failure is logged and otherwise ignored; later requests surface any
    /// real connectivity problem.
    pub async fn bootstrap(&self) {
        let url = self.entry_url.to_string();
        match self.get(&url).await {
            Ok(page) => tracing::debug!("Session bootstrapped ({} bytes)", page.body.len()),
            Err(e) => tracing::warn!("Session bootstrap failed: {}", e),
        }
    }

    /// The fixed entry URL this fetcher was configured with
    pub fn entry_url(&self) -> &Url {
        &self.entry_url
    }

    /// Fetches `url`, failing on transport errors and non-2xx statuses
    pub async fn get(&self, url: &str) -> Result<FetchedPage> {
        let parsed = Url::parse(url)?;

        self.throttle.wait(self.delay).await;
        if let Some(limiter) = &self.shared {
            limiter.acquire(&parsed).await;
        }

        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|source| SyncError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|source| SyncError::Http {
                url: url.to_string(),
                source,
            })?
            .to_vec();

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            headers,
            body,
        })
    }
}
