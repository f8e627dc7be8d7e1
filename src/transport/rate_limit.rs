//! Rate-limit coordination: Retry-After handling and exponential backoff

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{AcmeError, Result};
use crate::transport::http_client::HttpResponse;

/// Logical endpoint classes; each class shares one backoff window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// Directory document fetch
    Directory,
    /// `newNonce` HEAD requests
    NewNonce,
    /// `newAccount` registration
    NewAccount,
    /// `newOrder` creation
    NewOrder,
    /// Authorization fetches
    Authorization,
    /// Challenge notifications
    Challenge,
    /// Order finalization
    Finalize,
    /// Certificate download
    Certificate,
    /// Certificate revocation
    Revoke,
    /// Account key rollover
    KeyChange,
    /// Generic POST-as-GET resource fetch
    Resource,
}

/// Backoff policy applied per endpoint class
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Attempts before a `RateLimited` error is surfaced
    pub max_attempts: u32,
    /// First backoff delay; doubles per attempt
    pub base_delay: Duration,
    /// Upper bound for computed backoff and server-supplied Retry-After
    pub max_delay: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Global coordinator honoring `Retry-After` on 429/503 responses.
///
/// Backoff windows are shared per endpoint class: concurrent callers hitting
/// the same class sleep until the same deadline instead of retrying in a
/// thundering herd.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    windows: Mutex<HashMap<EndpointClass, Instant>>,
}

impl RateLimiter {
    /// Create a rate limiter with the given policy
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Create a rate limiter with the default policy
    pub fn with_defaults() -> Self {
        Self::new(RateLimitPolicy::default())
    }

    /// Run `op`, retrying on 429/503 within the attempt cap.
    ///
    /// Transport errors propagate immediately; only rate-limit statuses are
    /// retried. When attempts are exhausted the caller observes
    /// [`AcmeError::RateLimited`] carrying the last delay.
    pub async fn execute<F, Fut>(&self, class: EndpointClass, op: F) -> Result<HttpResponse>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<HttpResponse>>,
    {
        let mut last_delay = None;

        for attempt in 1..=self.policy.max_attempts {
            self.wait_for_window(class).await;

            let response = op().await?;
            if response.status != 429 && response.status != 503 {
                return Ok(response);
            }

            let delay = response
                .retry_after()
                .map(|d| d.min(self.policy.max_delay))
                .unwrap_or_else(|| self.backoff(attempt));
            warn!(
                ?class,
                status = response.status,
                delay_ms = delay.as_millis() as u64,
                attempt,
                "rate limited, backing off"
            );
            last_delay = Some(delay);
            self.extend_window(class, delay).await;
        }

        Err(AcmeError::RateLimited {
            retry_after: last_delay,
        })
    }

    /// Sleep until the class backoff window has passed
    async fn wait_for_window(&self, class: EndpointClass) {
        let deadline = { self.windows.lock().await.get(&class).copied() };
        if let Some(deadline) = deadline
            && deadline > Instant::now()
        {
            tokio::time::sleep_until(deadline).await;
        }
    }

    /// Push the class backoff window out; never pulls an existing window in
    async fn extend_window(&self, class: EndpointClass, delay: Duration) {
        let deadline = Instant::now() + delay;
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(class).or_insert(deadline);
        if *entry < deadline {
            *entry = deadline;
        }
    }

    /// `min(max_delay, base · 2^(attempt−1)) · (1 + jitter)`, jitter in [0, 0.25]
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.policy.base_delay.as_millis() as f64
            * 2f64.powi(attempt.saturating_sub(1) as i32);
        let capped = exp.min(self.policy.max_delay.as_millis() as f64);
        let jitter: f64 = rand::rng().random_range(0.0..0.25);
        Duration::from_millis((capped * (1.0 + jitter)) as u64)
    }
}
