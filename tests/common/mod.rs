use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Mock ACME server: directory plus a `newNonce` endpoint issuing a unique
/// nonce per HEAD, so pool deduplication never starves concurrent takers.
pub struct MockAcmeServer {
    pub server: MockServer,
    nonce_counter: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockAcmeServer {
    pub async fn start() -> Self {
        Self::start_with_meta(json!({ "termsOfService": "https://ca.test/tos" })).await
    }

    pub async fn start_with_meta(meta: serde_json::Value) -> Self {
        let server = MockServer::start().await;
        let nonce_counter = Arc::new(AtomicUsize::new(0));

        Mock::given(method("GET"))
            .and(path("/directory"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({
                    "newNonce": format!("{}/new-nonce", server.uri()),
                    "newAccount": format!("{}/new-account", server.uri()),
                    "newOrder": format!("{}/new-order", server.uri()),
                    "revokeCert": format!("{}/revoke-cert", server.uri()),
                    "keyChange": format!("{}/key-change", server.uri()),
                    "meta": meta,
                })),
            )
            .mount(&server)
            .await;

        Mock::given(method("HEAD"))
            .and(path("/new-nonce"))
            .respond_with(UniqueNonce {
                counter: Arc::clone(&nonce_counter),
            })
            .mount(&server)
            .await;

        Self {
            server,
            nonce_counter,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn directory_url(&self) -> String {
        format!("{}/directory", self.server.uri())
    }

    /// Number of HEAD `newNonce` requests served so far
    pub fn head_nonce_calls(&self) -> usize {
        self.nonce_counter.load(Ordering::SeqCst)
    }

    /// Mount a plain successful registration endpoint
    pub async fn mock_new_account(&self) {
        Mock::given(method("POST"))
            .and(path("/new-account"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("{}/acct/1", self.server.uri()).as_str())
                    .insert_header("Replay-Nonce", "post-nonce-account")
                    .set_body_json(json!({
                        "status": "valid",
                        "contact": ["mailto:admin@example.test"],
                        "orders": format!("{}/acct/1/orders", self.server.uri()),
                    })),
            )
            .mount(&self.server)
            .await;
    }

    /// All request bodies POSTed to a path, parsed as flattened JWS JSON
    pub async fn jws_bodies(&self, to_path: &str) -> Vec<serde_json::Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.to_string().eq_ignore_ascii_case("post") && r.url.path() == to_path)
            .map(|r| serde_json::from_slice(&r.body).expect("JWS body is JSON"))
            .collect()
    }
}

/// Responds to HEAD `newNonce` with a unique `Replay-Nonce` per call
pub struct UniqueNonce {
    pub counter: Arc<AtomicUsize>,
}

impl Respond for UniqueNonce {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(200)
            .insert_header("Replay-Nonce", format!("head-nonce-{}", n).as_str())
    }
}

/// Decode a base64url JWS segment into JSON; an empty segment (POST-as-GET)
/// decodes to `null`.
#[allow(dead_code)]
pub fn decode_jws_segment(segment: &str) -> serde_json::Value {
    use base64::Engine;

    if segment.is_empty() {
        return serde_json::Value::Null;
    }
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .expect("valid base64url");
    serde_json::from_slice(&bytes).expect("JSON segment")
}
