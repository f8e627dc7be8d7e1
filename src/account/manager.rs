/// Account management: registration, key-id assignment and POST-as-GET
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::info;

use crate::account::credentials::{AccountKeyPair, EabCredentials};
use crate::error::{AcmeError, Result};
use crate::protocol::directory::DirectoryManager;
use crate::protocol::jws::{JwsSigner, KeyAddressing};
use crate::protocol::nonce::{DEFAULT_NONCE_RETRY_ATTEMPTS, NonceManager, NonceNamespace};
use crate::protocol::problem::{ProblemKind, ServerProblem, map_problem};
use crate::transport::{EndpointClass, HttpClient, HttpResponse, RateLimiter};
use crate::types::Contact;

/// How a signed request addresses the account key
#[derive(Debug, Clone)]
pub(crate) enum Addressing {
    /// Embed the public JWK (new-account only)
    EmbeddedJwk,
    /// Reference the registered account URL
    KeyId(String),
}

/// Account manager bound to one key pair and one CA.
///
/// Every signed request flows through the nonce manager (transparent
/// `badNonce` retry), the rate limiter and the transport; `Replay-Nonce`
/// values on responses are harvested back into the pool.
pub struct AccountManager {
    transport: Arc<HttpClient>,
    rate_limiter: Arc<RateLimiter>,
    directory: Arc<DirectoryManager>,
    nonces: NonceManager,
    signer: JwsSigner,
    namespace: NonceNamespace,
    key_id: RwLock<Option<String>>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(
        transport: Arc<HttpClient>,
        rate_limiter: Arc<RateLimiter>,
        directory: Arc<DirectoryManager>,
        nonces: NonceManager,
        key: Arc<AccountKeyPair>,
        namespace: NonceNamespace,
    ) -> Self {
        Self {
            transport,
            rate_limiter,
            directory,
            nonces,
            signer: JwsSigner::new(key),
            namespace,
            key_id: RwLock::new(None),
        }
    }

    /// Resume a previously registered account by its persisted URL
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        *self.key_id.get_mut() = Some(key_id.into());
        self
    }

    /// Register the account, or return the known key ID.
    ///
    /// Idempotent: once a key ID is assigned for this key pair it never
    /// changes. Fails locally with `externalAccountRequired` when the CA
    /// demands EAB and none is supplied.
    pub async fn ensure_registered(
        &self,
        contacts: &[Contact],
        tos_agreed: bool,
        eab: Option<&EabCredentials>,
    ) -> Result<String> {
        if let Some(kid) = self.key_id.read().await.clone() {
            return Ok(kid);
        }

        let directory = self.directory.get().await?;
        if directory.meta.external_account_required && eab.is_none() {
            return Err(AcmeError::Server(ServerProblem::local(
                ProblemKind::ExternalAccountRequired,
                "the CA requires external account binding credentials",
            )));
        }

        let mut payload = json!({ "termsOfServiceAgreed": tos_agreed });
        let contact_uris: Vec<String> = contacts.iter().map(Contact::to_uri).collect();
        if !contact_uris.is_empty() {
            payload["contact"] = json!(contact_uris);
        }
        if let Some(eab) = eab {
            payload["externalAccountBinding"] = self
                .signer
                .external_account_binding(&directory.new_account, eab)?;
        }

        let response = self
            .signed_post(
                &directory.new_account,
                Some(payload),
                Addressing::EmbeddedJwk,
                EndpointClass::NewAccount,
            )
            .await?;

        let kid = response
            .header("location")
            .ok_or_else(|| {
                AcmeError::protocol("Missing Location header in registration response")
            })?
            .to_string();

        // First writer wins; the key ID is immutable for this key pair
        let mut guard = self.key_id.write().await;
        let kid = guard.get_or_insert_with(|| kid.clone()).clone();
        info!(%kid, "ACME account ready");
        Ok(kid)
    }

    /// The assigned account URL, if registered
    pub async fn key_id(&self) -> Option<String> {
        self.key_id.read().await.clone()
    }

    /// Fetch any ACME resource via POST-as-GET and parse the JSON body
    pub async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.fetch_response(url).await?;
        response.json()
    }

    /// Fetch any ACME resource via POST-as-GET, returning the raw response
    /// (certificate downloads arrive as PEM text)
    pub async fn fetch_response(&self, url: &str) -> Result<HttpResponse> {
        let kid = self.require_key_id().await?;
        self.signed_post(url, None, Addressing::KeyId(kid), EndpointClass::Resource)
            .await
    }

    /// Key authorization for a challenge token
    pub fn key_authorization(&self, token: &str) -> Result<String> {
        self.signer.key_authorization(token)
    }

    /// Deactivate the account at the CA
    pub async fn deactivate(&self) -> Result<()> {
        let kid = self.require_key_id().await?;
        self.signed_post(
            &kid.clone(),
            Some(json!({ "status": "deactivated" })),
            Addressing::KeyId(kid),
            EndpointClass::Resource,
        )
        .await?;
        info!("ACME account deactivated");
        Ok(())
    }

    /// The JWS signer for this account
    pub fn signer(&self) -> &JwsSigner {
        &self.signer
    }

    /// The nonce manager shared by this account's requests
    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    /// The nonce namespace this account draws from
    pub fn namespace(&self) -> &NonceNamespace {
        &self.namespace
    }

    /// The directory manager for this CA
    pub fn directory(&self) -> &DirectoryManager {
        &self.directory
    }

    pub(crate) async fn require_key_id(&self) -> Result<String> {
        self.key_id
            .read()
            .await
            .clone()
            .ok_or(AcmeError::AccountNotRegistered)
    }

    /// Sign and POST a request, with badNonce retry, rate limiting, nonce
    /// harvesting and problem mapping.
    pub(crate) async fn signed_post(
        &self,
        url: &str,
        payload: Option<Value>,
        addressing: Addressing,
        class: EndpointClass,
    ) -> Result<HttpResponse> {
        let response = self
            .nonces
            .with_nonce_retry(&self.namespace, DEFAULT_NONCE_RETRY_ATTEMPTS, |nonce| {
                // Each attempt signs with its own fresh nonce
                let jws = match &addressing {
                    Addressing::EmbeddedJwk => self.signer.sign(
                        url,
                        &nonce,
                        KeyAddressing::EmbeddedJwk,
                        payload.as_ref(),
                    ),
                    Addressing::KeyId(kid) => {
                        self.signer
                            .sign(url, &nonce, KeyAddressing::KeyId(kid), payload.as_ref())
                    }
                };
                let transport = self.transport.clone();
                let rate_limiter = self.rate_limiter.clone();
                let url = url.to_string();

                async move {
                    let jws = jws?;
                    rate_limiter
                        .execute(class, move || {
                            let transport = transport.clone();
                            let url = url.clone();
                            let jws = jws.clone();
                            async move { transport.post_jose(&url, &jws).await }
                        })
                        .await
                }
            })
            .await?;

        if response.status < 400 {
            return Ok(response);
        }
        if let Some(problem) = response.problem() {
            return Err(map_problem(&problem, Some(&response)));
        }
        Err(AcmeError::protocol(format!(
            "HTTP {} from {}: {}",
            response.status,
            url,
            String::from_utf8_lossy(&response.body)
        )))
    }
}
