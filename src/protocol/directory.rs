/// ACME directory document fetching and caching
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{AcmeError, Result};
use crate::protocol::problem::map_problem;
use crate::transport::{EndpointClass, HttpClient, RateLimiter};

/// ACME directory endpoints and metadata
#[derive(Debug, Clone)]
pub struct Directory {
    /// New nonce endpoint
    pub new_nonce: String,
    /// New account endpoint
    pub new_account: String,
    /// New order endpoint
    pub new_order: String,
    /// Certificate revocation endpoint
    pub revoke_cert: String,
    /// Key change endpoint; optional per RFC 8555
    pub key_change: Option<String>,
    /// Directory metadata
    pub meta: DirectoryMeta,
}

/// Directory metadata
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryMeta {
    /// Terms of Service URL
    #[serde(rename = "termsOfService")]
    pub terms_of_service: Option<String>,

    /// Website URL
    pub website: Option<String>,

    /// CAA identities
    #[serde(rename = "caaIdentities", default)]
    pub caa_identities: Vec<String>,

    /// Whether registration requires external account binding
    #[serde(rename = "externalAccountRequired", default)]
    pub external_account_required: bool,
}

#[derive(Deserialize)]
struct RawDirectory {
    #[serde(rename = "newNonce")]
    new_nonce: Option<String>,
    #[serde(rename = "newAccount")]
    new_account: Option<String>,
    #[serde(rename = "newOrder")]
    new_order: Option<String>,
    #[serde(rename = "revokeCert")]
    revoke_cert: Option<String>,
    #[serde(rename = "keyChange")]
    key_change: Option<String>,
    #[serde(default)]
    meta: Option<DirectoryMeta>,
}

impl TryFrom<RawDirectory> for Directory {
    type Error = AcmeError;

    fn try_from(raw: RawDirectory) -> Result<Self> {
        fn required(field: Option<String>, name: &str) -> Result<String> {
            field.ok_or_else(|| {
                AcmeError::configuration(format!("directory is missing the {} endpoint", name))
            })
        }

        Ok(Directory {
            new_nonce: required(raw.new_nonce, "newNonce")?,
            new_account: required(raw.new_account, "newAccount")?,
            new_order: required(raw.new_order, "newOrder")?,
            revoke_cert: required(raw.revoke_cert, "revokeCert")?,
            key_change: raw.key_change,
            meta: raw.meta.unwrap_or_default(),
        })
    }
}

impl Directory {
    /// Parse and validate a directory document
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let raw: RawDirectory = serde_json::from_slice(body)
            .map_err(|e| AcmeError::protocol(format!("Failed to parse directory: {}", e)))?;
        raw.try_into()
    }
}

/// Fetches the directory once per client instance and memoizes it.
///
/// The cache is write-once; after initialization readers take the read lock
/// and clone.
pub struct DirectoryManager {
    url: String,
    transport: Arc<HttpClient>,
    rate_limiter: Arc<RateLimiter>,
    directory: RwLock<Option<Directory>>,
}

impl DirectoryManager {
    /// Create a new directory manager for one CA
    pub fn new(
        url: impl Into<String>,
        transport: Arc<HttpClient>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            url: url.into(),
            transport,
            rate_limiter,
            directory: RwLock::new(None),
        }
    }

    /// Fetch a fresh directory from the server and cache it
    pub async fn fetch(&self) -> Result<Directory> {
        let transport = self.transport.clone();
        let url = self.url.clone();
        let response = self
            .rate_limiter
            .execute(EndpointClass::Directory, move || {
                let transport = transport.clone();
                let url = url.clone();
                async move { transport.get(&url).await }
            })
            .await?;

        if !response.is_success() {
            if let Some(problem) = response.problem() {
                return Err(map_problem(&problem, Some(&response)));
            }
            return Err(AcmeError::protocol(format!(
                "Failed to fetch directory: HTTP {}",
                response.status
            )));
        }

        let directory = Directory::from_json(&response.body)?;
        info!(url = %self.url, "ACME directory loaded");

        let mut cached = self.directory.write().await;
        *cached = Some(directory.clone());

        Ok(directory)
    }

    /// Get the cached directory, fetching it on first use
    pub async fn get(&self) -> Result<Directory> {
        {
            let cached = self.directory.read().await;
            if let Some(dir) = cached.clone() {
                return Ok(dir);
            }
        }

        self.fetch().await
    }

    /// The directory URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The CA origin (`scheme://authority`), used as a nonce namespace key
    pub fn origin(&self) -> Result<String> {
        let parsed = reqwest::Url::parse(&self.url)
            .map_err(|e| AcmeError::configuration(format!("Invalid directory URL: {}", e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| AcmeError::configuration("Directory URL has no host"))?;
        Ok(match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_parsing() {
        let json = br#"{
            "newNonce": "https://example.com/acme/new-nonce",
            "newAccount": "https://example.com/acme/new-account",
            "newOrder": "https://example.com/acme/new-order",
            "revokeCert": "https://example.com/acme/revoke-cert",
            "keyChange": "https://example.com/acme/key-change"
        }"#;

        let dir = Directory::from_json(json).unwrap();
        assert_eq!(dir.new_nonce, "https://example.com/acme/new-nonce");
        assert_eq!(
            dir.key_change.as_deref(),
            Some("https://example.com/acme/key-change")
        );
        assert!(!dir.meta.external_account_required);
    }

    #[test]
    fn test_directory_missing_required_endpoint() {
        let json = br#"{
            "newNonce": "https://example.com/acme/new-nonce",
            "newAccount": "https://example.com/acme/new-account",
            "newOrder": "https://example.com/acme/new-order"
        }"#;

        let err = Directory::from_json(json).unwrap_err();
        assert!(err.to_string().contains("revokeCert"));
    }

    #[test]
    fn test_directory_with_meta() {
        let json = br#"{
            "newNonce": "https://example.com/acme/new-nonce",
            "newAccount": "https://example.com/acme/new-account",
            "newOrder": "https://example.com/acme/new-order",
            "revokeCert": "https://example.com/acme/revoke-cert",
            "meta": {
                "termsOfService": "https://example.com/tos",
                "externalAccountRequired": true
            }
        }"#;

        let dir = Directory::from_json(json).unwrap();
        assert!(dir.key_change.is_none());
        assert_eq!(
            dir.meta.terms_of_service.as_deref(),
            Some("https://example.com/tos")
        );
        assert!(dir.meta.external_account_required);
    }

    #[test]
    fn test_origin() {
        let manager = DirectoryManager::new(
            "https://acme.example.com:14000/dir",
            Arc::new(HttpClient::with_defaults().unwrap()),
            Arc::new(RateLimiter::with_defaults()),
        );
        assert_eq!(manager.origin().unwrap(), "https://acme.example.com:14000");

        let manager = DirectoryManager::new(
            "https://acme-v02.api.letsencrypt.org/directory",
            Arc::new(HttpClient::with_defaults().unwrap()),
            Arc::new(RateLimiter::with_defaults()),
        );
        assert_eq!(
            manager.origin().unwrap(),
            "https://acme-v02.api.letsencrypt.org"
        );
    }
}
