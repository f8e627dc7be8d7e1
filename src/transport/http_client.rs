//! HTTP client wrapping reqwest with ACME content-type handling

use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{AcmeError, Result};
use crate::protocol::jws::JoseBody;
use crate::protocol::problem::Problem;

const CONTENT_TYPE_JOSE_JSON: &str = "application/jose+json";

/// HTTP response with folded headers and the raw body
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers, keyed by lowercase name; repeated headers are folded
    pub headers: HashMap<String, Vec<String>>,
    /// Response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// First value of a header, if present
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values of a header; repeated headers arrive as separate entries
    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The response Content-Type without parameters
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
    }

    /// Get the response body as a string
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.clone())
            .map_err(|e| AcmeError::transport(format!("Invalid UTF-8: {}", e)))
    }

    /// Get the response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| AcmeError::transport(format!("JSON parse error: {}", e)))
    }

    /// Decode an RFC 7807 problem document if the response carries one
    pub fn problem(&self) -> Option<Problem> {
        if self.content_type() != Some("application/problem+json") {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }

    /// Parse a `Retry-After` header, either delta-seconds or an HTTP-date
    pub fn retry_after(&self) -> Option<Duration> {
        let raw = self.header("retry-after")?.trim();

        if let Ok(secs) = raw.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }

        // HTTP-date (RFC 7231 IMF-fixdate uses RFC 2822 syntax)
        let when = jiff::fmt::rfc2822::parse(raw).ok()?;
        let delta = when.timestamp().as_second() - jiff::Timestamp::now().as_second();
        Some(Duration::from_secs(delta.max(0) as u64))
    }

    /// Check for a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check for a client error status (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check for a server error status (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("acmeflow/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP client with keep-alive connection reuse.
///
/// Redirects are followed for GET and HEAD but never for POST, so two inner
/// reqwest clients are held with different redirect policies.
pub struct HttpClient {
    idempotent: reqwest::Client,
    post: reqwest::Client,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let idempotent = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| AcmeError::transport(format!("Failed to create client: {}", e)))?;

        let post = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| AcmeError::transport(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            idempotent,
            post,
            config,
        })
    }

    /// Create a client with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(HttpClientConfig::default())
    }

    /// Execute a GET request
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.execute_request(self.idempotent.get(url)).await
    }

    /// Execute a HEAD request
    pub async fn head(&self, url: &str) -> Result<HttpResponse> {
        self.execute_request(self.idempotent.head(url)).await
    }

    /// Execute a signed POST with `Content-Type: application/jose+json`
    pub async fn post_jose(&self, url: &str, body: &JoseBody) -> Result<HttpResponse> {
        let body = serde_json::to_vec(body)?;
        let request = self
            .post
            .post(url)
            .header("Content-Type", CONTENT_TYPE_JOSE_JSON)
            .body(body);
        self.execute_request(request).await
    }

    async fn execute_request(&self, request: reqwest::RequestBuilder) -> Result<HttpResponse> {
        let response = request
            .send()
            .await
            .map_err(|e| AcmeError::transport(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_ascii_lowercase())
                    .or_default()
                    .push(value.to_string());
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| AcmeError::transport(format!("Failed to read body: {}", e)))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Get the client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_header(name: &str, values: &[&str]) -> HttpResponse {
        let mut headers = HashMap::new();
        headers.insert(
            name.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        HttpResponse {
            status: 200,
            headers,
            body: vec![],
        }
    }

    #[test]
    fn test_http_response_status() {
        let response = HttpResponse {
            status: 200,
            headers: Default::default(),
            body: vec![],
        };

        assert!(response.is_success());
        assert!(!response.is_client_error());
        assert!(!response.is_server_error());
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let response = response_with_header("replay-nonce", &["abc", "def"]);
        assert_eq!(response.header("Replay-Nonce"), Some("abc"));
        assert_eq!(response.header_values("REPLAY-NONCE").len(), 2);
        assert!(response.header_values("location").is_empty());
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let response = response_with_header("content-type", &["application/json; charset=utf-8"]);
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[test]
    fn test_retry_after_delta_seconds() {
        let response = response_with_header("retry-after", &["2"]);
        assert_eq!(response.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_retry_after_http_date_in_past() {
        let response = response_with_header("retry-after", &["Fri, 31 Dec 1999 23:59:59 GMT"]);
        // Past dates clamp to zero rather than parsing as an error
        assert_eq!(response.retry_after(), Some(Duration::ZERO));
    }

    #[test]
    fn test_retry_after_garbage() {
        let response = response_with_header("retry-after", &["soon"]);
        assert_eq!(response.retry_after(), None);
    }

    #[test]
    fn test_problem_requires_content_type() {
        let body = br#"{"type":"urn:ietf:params:acme:error:badNonce"}"#.to_vec();
        let mut response = response_with_header("content-type", &["application/problem+json"]);
        response.body = body.clone();
        assert!(response.problem().is_some());

        let mut response = response_with_header("content-type", &["application/json"]);
        response.body = body;
        assert!(response.problem().is_none());
    }

    #[tokio::test]
    async fn test_http_client_creation() {
        let client = HttpClient::with_defaults();
        assert!(client.is_ok());
    }
}
