//! HTTP retrieval with politeness limits and exponential backoff.
//!
//! The module uses a trait-based design so the orchestrator never depends on
//! a concrete network stack:
//! - [`Fetch`]: core trait, "fetch URL, get raw bytes or fail"
//! - [`HttpFetcher`]: single-attempt `reqwest` GET gated by [`Politeness`]
//! - [`RetryFetch`]: decorator that adds retry logic to any [`Fetch`]
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```
//!
//! Only [`FetchError::is_retryable`] failures are retried. A `Retry-After`
//! header on a 429/503 raises the delay to at least that value, still capped
//! at `max_delay`.

use crate::error::FetchError;
use async_trait::async_trait;
use rand::{Rng, rng};
use reqwest::header::RETRY_AFTER;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, instrument, warn};
use url::Url;

/// Retrieve the raw bytes behind a URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// Politeness constraints for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostLimit {
    pub max_concurrent: usize,
    pub min_interval: Duration,
}

struct HostGate {
    permits: Arc<Semaphore>,
    next_slot: AsyncMutex<Instant>,
    min_interval: Duration,
}

impl HostGate {
    fn new(limit: HostLimit) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max_concurrent.max(1))),
            next_slot: AsyncMutex::new(Instant::now()),
            min_interval: limit.min_interval,
        }
    }
}

/// Held for the duration of one request to a host.
pub struct HostPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Per-host concurrency ceilings and request spacing.
///
/// These counters are the only fetch-side state shared between concurrent
/// tasks.
pub struct Politeness {
    default: HostLimit,
    gates: Mutex<HashMap<String, Arc<HostGate>>>,
}

impl fmt::Debug for Politeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Politeness")
            .field("default", &self.default)
            .finish()
    }
}

impl Politeness {
    /// Create an empty registry.
    ///
    /// # Arguments
    ///
    /// * `default` - Limit applied to any host without a dedicated one from
    ///   [`Politeness::set_limit`]
    pub fn new(default: HostLimit) -> Self {
        Self {
            default,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Install a dedicated limit for `host`, replacing any existing gate.
    pub fn set_limit(&self, host: &str, limit: HostLimit) {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates.insert(host.to_ascii_lowercase(), Arc::new(HostGate::new(limit)));
    }

    fn gate(&self, host: &str) -> Arc<HostGate> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates
            .entry(host.to_ascii_lowercase())
            .or_insert_with(|| Arc::new(HostGate::new(self.default)))
            .clone()
    }

    /// Wait for a free slot on `host`, then for its next spacing window.
    pub async fn acquire(&self, host: &str) -> HostPermit {
        let gate = self.gate(host);
        let permit = gate.permits.clone().acquire_owned().await.ok();

        let slot = {
            let mut next = gate.next_slot.lock().await;
            let slot = (*next).max(Instant::now());
            *next = slot + gate.min_interval;
            slot
        };
        sleep_until(slot).await;

        HostPermit { _permit: permit }
    }
}

/// Host key used for politeness bookkeeping.
pub fn host_key(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}

/// Single-attempt HTTP fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
    politeness: Arc<Politeness>,
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("politeness", &self.politeness)
            .finish()
    }
}

impl HttpFetcher {
    /// Build a fetcher on a fresh `reqwest` client.
    ///
    /// # Arguments
    ///
    /// * `user_agent` - Value of the `User-Agent` header on every request
    /// * `politeness` - Per-host gates, shared with anything else hitting the
    ///   same sites
    ///
    /// # Returns
    ///
    /// The fetcher, or the `reqwest` error if the TLS backend cannot be
    /// initialized.
    pub fn new(user_agent: &str, politeness: Arc<Politeness>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, politeness })
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout)
    } else if e.is_redirect() || e.is_builder() {
        FetchError::Request(e.to_string())
    } else if e.is_connect() || e.is_request() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Request(e.to_string())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let _permit = self.politeness.acquire(&host_key(url)).await;

        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            debug!(status = status.as_u16(), ?retry_after, "Non-success status");
            return Err(FetchError::Status {
                status: status.as_u16(),
                retry_after,
            });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Body(e.to_string())
            }
        })?;
        debug!(bytes = body.len(), "Fetched");
        Ok(body.to_vec())
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`].
pub struct RetryFetch<T> {
    inner: T,
    /// Total attempts including the first one.
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
}

impl<T> RetryFetch<T>
where
    T: Fetch,
{
    pub fn new(inner: T, max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff before retry number `attempt` (1-based), jitter excluded.
    fn backoff(&self, attempt: usize, err: &FetchError) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let mut delay = self.base_delay.saturating_mul(1u32 << shift);
        if let Some(retry_after) = err.retry_after() {
            delay = delay.max(retry_after);
        }
        delay.min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T> Fetch for RetryFetch<T>
where
    T: Fetch,
{
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let err = match self.inner.fetch(url, timeout).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if !err.is_retryable() {
                debug!(attempt, error = %err, "Terminal fetch failure");
                return Err(err);
            }
            if attempt >= self.max_attempts {
                error!(
                    attempt,
                    max = self.max_attempts,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    error = %err,
                    "fetch() exhausted retries"
                );
                return Err(err);
            }

            let mut delay = self.backoff(attempt, &err);
            let jitter_ms = self.jitter.as_millis() as u64;
            if jitter_ms > 0 {
                delay += Duration::from_millis(rng().random_range(0..=jitter_ms));
            }
            warn!(
                attempt,
                max = self.max_attempts,
                ?delay,
                error = %err,
                "fetch() attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }
}
