/// High-level ACME client wiring all protocol components for one CA
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::account::{AccountKeyPair, AccountManager, EabCredentials};
use crate::challenge::ChallengeSetup;
use crate::config::AcmeSettings;
use crate::error::Result;
use crate::order::{
    CertKeyAlgorithm, CsrGenerator, OrderManager, parse_certificate_chain,
    verify_certificate_domains,
};
use crate::protocol::{DirectoryManager, NonceManager, NonceNamespace};
use crate::transport::{HttpClient, RateLimiter};
use crate::types::{ChallengeType, Contact, Identifier, OrderStatus, RevocationReason};

/// Configuration for an ACME client
#[derive(Clone)]
pub struct AcmeConfig {
    /// ACME directory URL
    pub directory_url: String,
    /// Contact URIs registered with the account
    pub contacts: Vec<Contact>,
    /// Terms of service agreement flag
    pub terms_of_service_agreed: bool,
    /// External account binding credentials, when the CA requires them
    pub eab: Option<EabCredentials>,
    /// Previously persisted account URL, if resuming
    pub account_url: Option<String>,
    /// Engine tunables
    pub settings: AcmeSettings,
}

impl AcmeConfig {
    /// Create a configuration for the given directory URL
    pub fn new(directory_url: impl Into<String>) -> Self {
        Self {
            directory_url: directory_url.into(),
            contacts: Vec::new(),
            terms_of_service_agreed: false,
            eab: None,
            account_url: None,
            settings: AcmeSettings::default(),
        }
    }

    /// Add a contact
    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contacts.push(contact);
        self
    }

    /// Set the terms-of-service agreement flag
    pub fn with_tos_agreed(mut self, agreed: bool) -> Self {
        self.terms_of_service_agreed = agreed;
        self
    }

    /// Supply external account binding credentials
    pub fn with_eab(mut self, eab: EabCredentials) -> Self {
        self.eab = Some(eab);
        self
    }

    /// Resume a previously registered account by its URL
    pub fn with_account_url(mut self, url: impl Into<String>) -> Self {
        self.account_url = Some(url.into());
        self
    }

    /// Override the engine settings
    pub fn with_settings(mut self, settings: AcmeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Let's Encrypt staging directory
    pub fn lets_encrypt_staging() -> Self {
        Self::new("https://acme-staging-v02.api.letsencrypt.org/directory")
    }

    /// Let's Encrypt production directory
    pub fn lets_encrypt() -> Self {
        Self::new("https://acme-v02.api.letsencrypt.org/directory")
    }
}

/// High-level ACME client.
///
/// One client instance holds one directory cache, one nonce manager and one
/// account; the nonce namespace binds the CA origin to the account key
/// thumbprint so nonces never leak across CAs or accounts.
pub struct AcmeClient {
    config: AcmeConfig,
    directory: Arc<DirectoryManager>,
    nonces: NonceManager,
    account: Arc<AccountManager>,
}

impl AcmeClient {
    /// Create a client, fetching and validating the CA directory
    pub async fn new(config: AcmeConfig, key: Arc<AccountKeyPair>) -> Result<Self> {
        let transport = Arc::new(HttpClient::new(config.settings.http.clone())?);
        let rate_limiter = Arc::new(RateLimiter::new(config.settings.rate_limit.clone()));

        let directory = Arc::new(DirectoryManager::new(
            &config.directory_url,
            transport.clone(),
            rate_limiter.clone(),
        ));
        let resolved = directory.get().await?;

        let namespace = NonceNamespace::for_account(&directory.origin()?, &key.thumbprint()?);
        let nonces = NonceManager::for_endpoint(
            transport.clone(),
            rate_limiter.clone(),
            &resolved.new_nonce,
            config.settings.nonce.clone(),
        );

        let mut account = AccountManager::new(
            transport,
            rate_limiter,
            directory.clone(),
            nonces.clone(),
            key,
            namespace,
        );
        if let Some(url) = &config.account_url {
            account = account.with_key_id(url.clone());
        }

        Ok(Self {
            config,
            directory,
            nonces,
            account: Arc::new(account),
        })
    }

    /// Register the account (or return the known key ID)
    pub async fn ensure_account(&self) -> Result<String> {
        self.account
            .ensure_registered(
                &self.config.contacts,
                self.config.terms_of_service_agreed,
                self.config.eab.as_ref(),
            )
            .await
    }

    /// The account manager
    pub fn account(&self) -> Arc<AccountManager> {
        self.account.clone()
    }

    /// The directory manager
    pub fn directory(&self) -> &DirectoryManager {
        &self.directory
    }

    /// The nonce manager
    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    /// An order manager using the configured polling cadence
    pub fn orders(&self) -> OrderManager {
        OrderManager::new(self.account.clone())
            .with_poll_policy(self.config.settings.poll.clone())
    }

    /// Full issuance: register, order, solve, finalize, download.
    ///
    /// `prepare` publishes the challenge data and `wait_for` confirms it is
    /// visible; both are opaque to the engine.
    pub async fn issue_certificate<P, PF, W, WF>(
        &self,
        identifiers: Vec<Identifier>,
        challenge_type: ChallengeType,
        cert_algorithm: CertKeyAlgorithm,
        prepare: P,
        wait_for: W,
    ) -> Result<CertificateBundle>
    where
        P: Fn(ChallengeSetup) -> PF,
        PF: Future<Output = Result<()>>,
        W: Fn(ChallengeSetup) -> WF,
        WF: Future<Output = Result<()>>,
    {
        self.ensure_account().await?;
        let orders = self.orders();

        let order = orders.create_order(&identifiers).await?;
        let order = orders
            .solve_challenge(&order, challenge_type, prepare, wait_for)
            .await?;

        let (csr_der, private_key_pem) = CsrGenerator::new(identifiers.clone())
            .with_algorithm(cert_algorithm)
            .generate()?;

        let order = if order.is_ready() {
            orders.finalize(&order, &csr_der).await?
        } else {
            order
        };
        let order = if order.is_valid() {
            order
        } else {
            orders
                .wait_order(
                    &order.url,
                    &[OrderStatus::Valid],
                    self.config.settings.poll.max_attempts,
                    self.config.settings.poll.interval,
                )
                .await?
        };

        let certificate_pem = orders.download_certificate(&order).await?;

        // Cross-check the leaf against what was ordered; mismatches are a CA
        // bug, so only warn
        let dns_names: Vec<String> = identifiers
            .iter()
            .filter(|id| id.id_type == "dns")
            .map(|id| id.value.clone())
            .collect();
        if let Ok(chain) = parse_certificate_chain(&certificate_pem)
            && let Some(leaf) = chain.first()
            && !verify_certificate_domains(leaf, &dns_names).unwrap_or(true)
        {
            warn!("issued certificate does not cover every requested domain");
        }

        Ok(CertificateBundle {
            certificate_pem,
            private_key_pem,
            identifiers,
        })
    }

    /// Revoke a certificate by its DER encoding
    pub async fn revoke_certificate(
        &self,
        cert_der: &[u8],
        reason: Option<RevocationReason>,
    ) -> Result<()> {
        self.ensure_account().await?;
        self.orders().revoke_certificate(cert_der, reason).await
    }

    /// Tear the client down, rejecting any outstanding nonce waiters
    pub async fn shutdown(&self) {
        self.nonces.cleanup().await;
    }
}

/// Certificate chain and private key produced by an issuance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateBundle {
    /// Certificate chain in PEM format, leaf first
    pub certificate_pem: String,
    /// Certificate private key in PEM format
    pub private_key_pem: String,
    /// Identifiers covered by the certificate
    pub identifiers: Vec<Identifier>,
}

impl CertificateBundle {
    /// The chain as DER certificates, leaf first
    pub fn certificate_der(&self) -> Result<Vec<Vec<u8>>> {
        parse_certificate_chain(&self.certificate_pem)
    }
}
