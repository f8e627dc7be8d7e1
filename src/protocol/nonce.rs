//! Pooled replay-nonce management.
//!
//! Every signed request consumes one nonce and most responses return one in
//! `Replay-Nonce`. The manager amortizes HEAD `newNonce` round trips across
//! concurrent requests: takers wait FIFO on a per-namespace pool, refills are
//! coalesced to a single in-flight loop per namespace, and nonces harvested
//! from responses flow back into the pool.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{AcmeError, Result};
use crate::protocol::problem::map_problem;
use crate::transport::{EndpointClass, HttpClient, HttpResponse, RateLimiter};

/// Header carrying fresh nonces on every ACME response
pub const REPLAY_NONCE_HEADER: &str = "replay-nonce";

/// Default attempt cap for [`NonceManager::with_nonce_retry`]
pub const DEFAULT_NONCE_RETRY_ATTEMPTS: u32 = 3;

/// Opaque key isolating nonce pools.
///
/// Nonces never cross namespace boundaries. Callers pick the granularity;
/// the typical construction is the CA origin, optionally augmented with the
/// account key thumbprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonceNamespace(String);

impl NonceNamespace {
    /// Create a namespace from an opaque key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Namespace scoped to one account at one CA
    pub fn for_account(origin: &str, thumbprint: &str) -> Self {
        Self(format!("{}#{}", origin, thumbprint))
    }

    /// The namespace key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonceNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Nonce pool configuration
#[derive(Debug, Clone)]
pub struct NonceConfig {
    /// Age past which a pooled nonce is discarded
    pub max_age: Duration,
    /// Pool capacity; the oldest entries are evicted on overflow
    pub max_pool: usize,
    /// Prefetch trigger; 0 disables prefetch
    pub prefetch_low_water: usize,
    /// Prefetch target once triggered; must be >= the low water mark
    pub prefetch_high_water: usize,
    /// Per-call bound on how long `take` waits for a refill
    pub take_timeout: Duration,
    /// Watchdog bounding any single refill cycle
    pub refill_watchdog: Duration,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(120),
            max_pool: 32,
            prefetch_low_water: 0,
            prefetch_high_water: 0,
            take_timeout: Duration::from_secs(30),
            refill_watchdog: Duration::from_secs(10),
        }
    }
}

/// Source of fresh nonces; the transport dependency is explicit so tests can
/// substitute a stub
#[async_trait]
pub trait NonceFetcher: Send + Sync {
    /// Fetch fresh nonces with a single request to the CA
    async fn fetch_nonces(&self) -> Result<Vec<String>>;
}

/// Production fetcher: HEAD `newNonce` through the rate limiter
pub struct HttpNonceFetcher {
    transport: Arc<HttpClient>,
    rate_limiter: Arc<RateLimiter>,
    new_nonce_url: String,
}

impl HttpNonceFetcher {
    /// Create a fetcher for the given `newNonce` endpoint
    pub fn new(
        transport: Arc<HttpClient>,
        rate_limiter: Arc<RateLimiter>,
        new_nonce_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            rate_limiter,
            new_nonce_url: new_nonce_url.into(),
        }
    }
}

#[async_trait]
impl NonceFetcher for HttpNonceFetcher {
    async fn fetch_nonces(&self) -> Result<Vec<String>> {
        let transport = self.transport.clone();
        let url = self.new_nonce_url.clone();
        let response = self
            .rate_limiter
            .execute(EndpointClass::NewNonce, move || {
                let transport = transport.clone();
                let url = url.clone();
                async move { transport.head(&url).await }
            })
            .await?;

        if !response.is_success() {
            if let Some(problem) = response.problem() {
                return Err(map_problem(&problem, Some(&response)));
            }
            return Err(AcmeError::protocol(format!(
                "Failed to fetch nonce: HTTP {}",
                response.status
            )));
        }

        let values: Vec<String> = response.header_values(REPLAY_NONCE_HEADER).to_vec();
        if values.is_empty() {
            return Err(AcmeError::protocol(
                "newNonce response is missing the Replay-Nonce header",
            ));
        }
        Ok(values)
    }
}

struct PooledNonce {
    value: String,
    fetched_at: Instant,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Result<String>>,
}

#[derive(Default)]
struct PoolState {
    entries: VecDeque<PooledNonce>,
    waiters: VecDeque<Waiter>,
    refill_active: bool,
}

struct ManagerState {
    pools: HashMap<NonceNamespace, PoolState>,
    next_waiter_id: u64,
    closed: bool,
}

struct NonceManagerInner {
    fetcher: Arc<dyn NonceFetcher>,
    config: NonceConfig,
    state: Mutex<ManagerState>,
}

/// Per-namespace nonce pools with coalesced refill and waiter queues
#[derive(Clone)]
pub struct NonceManager {
    inner: Arc<NonceManagerInner>,
}

impl NonceManager {
    /// Create a manager over an arbitrary fetcher
    pub fn new(fetcher: Arc<dyn NonceFetcher>, config: NonceConfig) -> Self {
        Self {
            inner: Arc::new(NonceManagerInner {
                fetcher,
                config,
                state: Mutex::new(ManagerState {
                    pools: HashMap::new(),
                    next_waiter_id: 0,
                    closed: false,
                }),
            }),
        }
    }

    /// Create a manager that HEADs the given `newNonce` endpoint
    pub fn for_endpoint(
        transport: Arc<HttpClient>,
        rate_limiter: Arc<RateLimiter>,
        new_nonce_url: impl Into<String>,
        config: NonceConfig,
    ) -> Self {
        Self::new(
            Arc::new(HttpNonceFetcher::new(transport, rate_limiter, new_nonce_url)),
            config,
        )
    }

    /// Take the freshest non-expired pooled nonce, waiting on a refill when
    /// the pool is empty.
    ///
    /// A nonce handed out here is never handed out again. Waiters are served
    /// in FIFO order and fail with [`AcmeError::NonceTimeout`] after the
    /// configured bound.
    pub async fn take(&self, namespace: &NonceNamespace) -> Result<String> {
        let mut spawn_refill = false;
        let waiting = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(AcmeError::NonceManagerCleanedUp);
            }

            let id = state.next_waiter_id;
            state.next_waiter_id += 1;

            let config = &self.inner.config;
            let max_age = config.max_age;
            let low_water = config.prefetch_low_water;
            let pool = state.pools.entry(namespace.clone()).or_default();
            prune_expired(pool, max_age);

            if let Some(nonce) = pool.entries.pop_back() {
                if low_water > 0 && pool.entries.len() < low_water && !pool.refill_active {
                    pool.refill_active = true;
                    spawn_refill = true;
                }
                Ok(nonce.value)
            } else {
                let (tx, rx) = oneshot::channel();
                pool.waiters.push_back(Waiter { id, tx });
                if !pool.refill_active {
                    pool.refill_active = true;
                    spawn_refill = true;
                }
                Err((id, rx))
            }
        };

        if spawn_refill {
            self.spawn_refill(namespace.clone());
        }

        let (waiter_id, rx) = match waiting {
            Ok(nonce) => return Ok(nonce),
            Err(pending) => pending,
        };

        match tokio::time::timeout(self.inner.config.take_timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a result; only happens on teardown
            Ok(Err(_)) => Err(AcmeError::NonceManagerCleanedUp),
            Err(_) => {
                let mut state = self.inner.state.lock().await;
                if let Some(pool) = state.pools.get_mut(namespace) {
                    pool.waiters.retain(|w| w.id != waiter_id);
                }
                Err(AcmeError::NonceTimeout)
            }
        }
    }

    /// Insert nonces carried by a response (`Replay-Nonce`, single or
    /// folded) and satisfy queued waiters.
    pub async fn harvest(&self, namespace: &NonceNamespace, response: &HttpResponse) {
        let values = response.header_values(REPLAY_NONCE_HEADER);
        if values.is_empty() {
            return;
        }

        let mut state = self.inner.state.lock().await;
        if state.closed {
            return;
        }
        let max_pool = self.inner.config.max_pool;
        let pool = state.pools.entry(namespace.clone()).or_default();
        for value in values {
            insert_nonce(pool, value.clone(), max_pool);
        }
        drain_waiters(pool);
    }

    /// Run a signed request with transparent `badNonce` recovery.
    ///
    /// Takes a nonce, invokes `request`, harvests the response, and returns
    /// it on 2xx/3xx. A `badNonce` problem is retried with a fresh nonce up
    /// to `max_attempts`; every other response is returned for the caller to
    /// map. Transport errors propagate.
    pub async fn with_nonce_retry<F, Fut>(
        &self,
        namespace: &NonceNamespace,
        max_attempts: u32,
        mut request: F,
    ) -> Result<HttpResponse>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<HttpResponse>>,
    {
        let mut attempt = 1;
        loop {
            let nonce = self.take(namespace).await?;
            let response = request(nonce).await?;
            self.harvest(namespace, &response).await;

            if response.status < 400 {
                return Ok(response);
            }
            if attempt < max_attempts
                && response.problem().is_some_and(|p| p.is_bad_nonce())
            {
                debug!(%namespace, attempt, "stale nonce rejected, retrying with a fresh one");
                attempt += 1;
                continue;
            }
            return Ok(response);
        }
    }

    /// Drop expired nonces from every pool
    pub async fn sweep_expired(&self) {
        let mut state = self.inner.state.lock().await;
        let max_age = self.inner.config.max_age;
        for pool in state.pools.values_mut() {
            prune_expired(pool, max_age);
        }
    }

    /// Reject all outstanding waiters and empty every pool.
    ///
    /// Idempotent; the manager becomes terminally unusable and subsequent
    /// `take` calls fail fast.
    pub async fn cleanup(&self) {
        let mut state = self.inner.state.lock().await;
        state.closed = true;
        for pool in state.pools.values_mut() {
            for waiter in pool.waiters.drain(..) {
                let _ = waiter.tx.send(Err(AcmeError::NonceManagerCleanedUp));
            }
            pool.entries.clear();
        }
        state.pools.clear();
    }

    /// Current pool size for a namespace (diagnostics and tests)
    pub async fn pool_size(&self, namespace: &NonceNamespace) -> usize {
        let state = self.inner.state.lock().await;
        state
            .pools
            .get(namespace)
            .map(|pool| pool.entries.len())
            .unwrap_or(0)
    }

    fn spawn_refill(&self, namespace: NonceNamespace) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            NonceManagerInner::run_refill(inner, namespace).await;
        });
    }
}

impl NonceManagerInner {
    async fn run_refill(inner: Arc<NonceManagerInner>, namespace: NonceNamespace) {
        loop {
            let outcome = tokio::time::timeout(
                inner.config.refill_watchdog,
                inner.refill_cycle(&namespace),
            )
            .await;

            let mut state = inner.state.lock().await;
            let Some(pool) = state.pools.get_mut(&namespace) else {
                return;
            };
            pool.refill_active = false;

            match outcome {
                Ok(Ok(())) => {
                    // A waiter may have queued between the final need-check
                    // and this lock; run another cycle rather than strand it
                    if pool.waiters.is_empty() {
                        return;
                    }
                    pool.refill_active = true;
                }
                Ok(Err(err)) => {
                    warn!(%namespace, error = %err, "nonce refill failed, rejecting waiters");
                    reject_waiters(pool, || waiter_error(&err));
                    return;
                }
                Err(_) => {
                    warn!(%namespace, "nonce refill watchdog expired, rejecting waiters");
                    reject_waiters(pool, || AcmeError::RefillTimeout);
                    return;
                }
            }
        }
    }

    async fn refill_cycle(&self, namespace: &NonceNamespace) -> Result<()> {
        let config = &self.config;
        let hard_cap = std::cmp::max(8, config.max_pool);
        // Prefetch refills continue past the trigger up to the high water mark
        let prefetch_target = if config.prefetch_high_water > 0 {
            config.prefetch_high_water
        } else {
            config.prefetch_low_water
        };

        for iteration in 0..hard_cap {
            let need = {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Ok(());
                }
                let pool = state.pools.entry(namespace.clone()).or_default();
                prune_expired(pool, config.max_age);

                let queue_need = pool.waiters.len();
                let pool_len = pool.entries.len();
                let mut need = queue_need > 0
                    || (config.prefetch_low_water > 0 && pool_len < prefetch_target);
                if pool_len >= config.max_pool {
                    need = false;
                }
                need
            };

            if !need {
                debug!(%namespace, iteration, "nonce refill complete");
                return Ok(());
            }

            let nonces = self.fetcher.fetch_nonces().await?;

            let mut state = self.state.lock().await;
            if state.closed {
                return Ok(());
            }
            let pool = state.pools.entry(namespace.clone()).or_default();
            for value in nonces {
                insert_nonce(pool, value, config.max_pool);
            }
            drain_waiters(pool);
        }

        Ok(())
    }
}

fn prune_expired(pool: &mut PoolState, max_age: Duration) {
    // Entries sit in insertion order, so expired ones cluster at the front
    while let Some(front) = pool.entries.front() {
        if front.fetched_at.elapsed() > max_age {
            pool.entries.pop_front();
        } else {
            break;
        }
    }
}

fn insert_nonce(pool: &mut PoolState, value: String, max_pool: usize) {
    if pool.entries.iter().any(|n| n.value == value) {
        return;
    }
    pool.entries.push_back(PooledNonce {
        value,
        fetched_at: Instant::now(),
    });
    while pool.entries.len() > max_pool {
        pool.entries.pop_front();
    }
}

fn drain_waiters(pool: &mut PoolState) {
    loop {
        if pool.entries.is_empty() {
            return;
        }
        let Some(waiter) = pool.waiters.pop_front() else {
            return;
        };
        let Some(nonce) = pool.entries.pop_back() else {
            pool.waiters.push_front(waiter);
            return;
        };
        let fetched_at = nonce.fetched_at;
        if let Err(returned) = waiter.tx.send(Ok(nonce.value)) {
            // The waiter timed out between queueing and delivery; keep the
            // nonce for the next taker
            if let Ok(value) = returned {
                pool.entries.push_back(PooledNonce { value, fetched_at });
            }
        }
    }
}

fn reject_waiters<F>(pool: &mut PoolState, make_error: F)
where
    F: Fn() -> AcmeError,
{
    for waiter in pool.waiters.drain(..) {
        let _ = waiter.tx.send(Err(make_error()));
    }
}

/// Derive the per-waiter rejection error from a refill failure.
///
/// Rate-limit failures keep their type and `Retry-After`; everything else
/// collapses into `NonceRefill` carrying the source description.
fn waiter_error(err: &AcmeError) -> AcmeError {
    match err {
        AcmeError::RateLimited { retry_after } => AcmeError::RateLimited {
            retry_after: *retry_after,
        },
        other => AcmeError::NonceRefill(other.to_string()),
    }
}
