mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use acmeflow::prelude::*;
use acmeflow::protocol::nonce::{NonceFetcher, REPLAY_NONCE_HEADER};
use acmeflow::{AcmeError, HttpResponse};

use common::MockAcmeServer;

/// Fetcher issuing `n-0`, `n-1`, ... with a configurable per-fetch delay
struct CountingFetcher {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingFetcher {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NonceFetcher for CountingFetcher {
    async fn fetch_nonces(&self) -> acmeflow::Result<Vec<String>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(vec![format!("n-{}", n)])
    }
}

/// Fetcher that never completes
struct StallFetcher;

#[async_trait]
impl NonceFetcher for StallFetcher {
    async fn fetch_nonces(&self) -> acmeflow::Result<Vec<String>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![])
    }
}

/// Fetcher failing its first call, succeeding afterwards
struct FlakyFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl NonceFetcher for FlakyFetcher {
    async fn fetch_nonces(&self) -> acmeflow::Result<Vec<String>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if n == 0 {
            Err(AcmeError::transport("connection refused"))
        } else {
            Ok(vec![format!("n-{}", n)])
        }
    }
}

fn ns(key: &str) -> NonceNamespace {
    NonceNamespace::new(key)
}

fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> HttpResponse {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        map.entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }
    HttpResponse {
        status,
        headers: map,
        body: body.to_vec(),
    }
}

// Burst of concurrent takes: every nonce distinct, HEAD count bounded by
// the number of takers
#[tokio::test]
async fn burst_take_returns_distinct_nonces() {
    let fetcher = CountingFetcher::new(Duration::from_millis(2));
    let manager = NonceManager::new(fetcher.clone(), NonceConfig::default());
    let namespace = ns("ca");

    let mut handles = Vec::new();
    for _ in 0..20 {
        let manager = manager.clone();
        let namespace = namespace.clone();
        handles.push(tokio::spawn(async move { manager.take(&namespace).await }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let nonce = handle.await.unwrap().unwrap();
        assert!(seen.insert(nonce), "a nonce was handed out twice");
    }

    let calls = fetcher.calls();
    assert!(calls >= 1, "at least one fetch must happen");
    assert!(calls <= 20, "refills must be coalesced, got {} fetches", calls);
}

// Waiters queued on one namespace are satisfied in enqueue order
#[tokio::test]
async fn waiters_are_served_fifo() {
    let fetcher = CountingFetcher::new(Duration::from_millis(40));
    let manager = NonceManager::new(fetcher, NonceConfig::default());
    let namespace = ns("ca");

    let first = {
        let manager = manager.clone();
        let namespace = namespace.clone();
        tokio::spawn(async move { manager.take(&namespace).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let manager = manager.clone();
        let namespace = namespace.clone();
        tokio::spawn(async move { manager.take(&namespace).await })
    };

    assert_eq!(first.await.unwrap().unwrap(), "n-0");
    assert_eq!(second.await.unwrap().unwrap(), "n-1");
}

// A badNonce rejection is retried transparently; the caller sees the 2xx
#[tokio::test]
async fn bad_nonce_is_retried_transparently() {
    let manager = NonceManager::new(
        CountingFetcher::new(Duration::ZERO),
        NonceConfig::default(),
    );
    let namespace = ns("ca");
    let attempts = AtomicUsize::new(0);

    let result = manager
        .with_nonce_retry(&namespace, 3, |_nonce| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Ok(response(
                        400,
                        &[
                            ("content-type", "application/problem+json"),
                            (REPLAY_NONCE_HEADER, "fresh-after-reject"),
                        ],
                        br#"{"type":"urn:ietf:params:acme:error:badNonce","detail":"bad nonce"}"#,
                    ))
                } else {
                    Ok(response(200, &[(REPLAY_NONCE_HEADER, "fresh-ok")], b"{}"))
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(result.status, 200);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

// badNonce responses beyond the attempt cap are returned, not retried forever
#[tokio::test]
async fn bad_nonce_attempts_are_capped() {
    let manager = NonceManager::new(
        CountingFetcher::new(Duration::ZERO),
        NonceConfig::default(),
    );
    let namespace = ns("ca");
    let attempts = AtomicUsize::new(0);

    let result = manager
        .with_nonce_retry(&namespace, 3, |_nonce| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(response(
                    400,
                    &[("content-type", "application/problem+json")],
                    br#"{"type":"urn:ietf:params:acme:error:badNonce"}"#,
                ))
            }
        })
        .await
        .unwrap();

    assert_eq!(result.status, 400);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

// Cleanup rejects in-flight takers promptly and fails later ones fast
#[tokio::test(start_paused = true)]
async fn cleanup_rejects_all_waiters() {
    let manager = NonceManager::new(Arc::new(StallFetcher), NonceConfig::default());
    let namespace = ns("ca");

    let waiting = {
        let manager = manager.clone();
        let namespace = namespace.clone();
        tokio::spawn(async move { manager.take(&namespace).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    manager.cleanup().await;

    let result = tokio::time::timeout(Duration::from_secs(1), waiting)
        .await
        .expect("waiter must resolve promptly after cleanup")
        .unwrap();
    assert!(matches!(result, Err(AcmeError::NonceManagerCleanedUp)));

    let err = manager.take(&namespace).await.unwrap_err();
    assert!(matches!(err, AcmeError::NonceManagerCleanedUp));
}

// A failed refill rejects every queued waiter once; the manager stays usable
#[tokio::test]
async fn refill_failure_rejects_queued_waiters() {
    let manager = NonceManager::new(
        Arc::new(FlakyFetcher {
            calls: AtomicUsize::new(0),
        }),
        NonceConfig::default(),
    );
    let namespace = ns("ca");

    let first = {
        let manager = manager.clone();
        let namespace = namespace.clone();
        tokio::spawn(async move { manager.take(&namespace).await })
    };
    let second = {
        let manager = manager.clone();
        let namespace = namespace.clone();
        tokio::spawn(async move { manager.take(&namespace).await })
    };

    for handle in [first, second] {
        let err = handle.await.unwrap().unwrap_err();
        assert!(
            matches!(err, AcmeError::NonceRefill(ref msg) if msg.contains("connection refused")),
            "expected NonceRefill, got {err:?}"
        );
    }

    // The next take starts a fresh refill and succeeds
    let nonce = manager.take(&namespace).await.unwrap();
    assert_eq!(nonce, "n-1");
}

// A taker is dequeued cleanly when its per-call bound expires
#[tokio::test(start_paused = true)]
async fn take_times_out_when_refill_stalls() {
    let config = NonceConfig {
        take_timeout: Duration::from_millis(100),
        refill_watchdog: Duration::from_secs(3600),
        ..NonceConfig::default()
    };
    let manager = NonceManager::new(Arc::new(StallFetcher), config);

    let err = manager.take(&ns("ca")).await.unwrap_err();
    assert!(matches!(err, AcmeError::NonceTimeout));
}

// The refill watchdog rejects waiters when a cycle hangs
#[tokio::test(start_paused = true)]
async fn refill_watchdog_rejects_waiters() {
    let config = NonceConfig {
        take_timeout: Duration::from_secs(300),
        refill_watchdog: Duration::from_millis(100),
        ..NonceConfig::default()
    };
    let manager = NonceManager::new(Arc::new(StallFetcher), config);

    let err = manager.take(&ns("ca")).await.unwrap_err();
    assert!(matches!(err, AcmeError::RefillTimeout));
}

// End-to-end over HTTP: the fetcher HEADs newNonce and reads Replay-Nonce
#[tokio::test]
async fn http_fetcher_pulls_from_new_nonce_endpoint() {
    let mock = MockAcmeServer::start().await;

    let transport = Arc::new(HttpClient::with_defaults().unwrap());
    let rate_limiter = Arc::new(RateLimiter::with_defaults());
    let manager = NonceManager::for_endpoint(
        transport,
        rate_limiter,
        format!("{}/new-nonce", mock.uri()),
        NonceConfig::default(),
    );
    let namespace = ns(&mock.uri());

    let first = manager.take(&namespace).await.unwrap();
    let second = manager.take(&namespace).await.unwrap();
    assert_ne!(first, second);
    assert!(first.starts_with("head-nonce-"));
    assert!(mock.head_nonce_calls() >= 2);
}

// A newNonce endpoint that omits Replay-Nonce is a protocol failure
#[tokio::test]
async fn missing_replay_nonce_header_fails_takers() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/new-nonce"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let manager = NonceManager::for_endpoint(
        Arc::new(HttpClient::with_defaults().unwrap()),
        Arc::new(RateLimiter::with_defaults()),
        format!("{}/new-nonce", server.uri()),
        NonceConfig::default(),
    );

    let err = manager.take(&ns("ca")).await.unwrap_err();
    assert!(
        matches!(err, AcmeError::NonceRefill(ref msg) if msg.contains("Replay-Nonce")),
        "expected a Replay-Nonce protocol failure, got {err:?}"
    );
}
