//! # acmeflow - ACME v2 protocol engine
//!
//! An RFC 8555 client library built around a request-authentication
//! pipeline: every request is a flattened JWS carrying a replay nonce drawn
//! from a pooled, namespace-isolated nonce manager, sent through a
//! rate-limit-aware transport, with RFC 7807 problem documents mapped into a
//! closed typed error taxonomy.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use acmeflow::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> acmeflow::Result<()> {
//!     let config = AcmeConfig::lets_encrypt_staging()
//!         .with_contact(Contact::email("admin@example.com"))
//!         .with_tos_agreed(true);
//!     let key = Arc::new(AccountKeyPair::generate(KeyAlgorithm::EcdsaP256)?);
//!
//!     let client = AcmeClient::new(config, key).await?;
//!     let key_id = client.ensure_account().await?;
//!     println!("account: {key_id}");
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod account;
pub mod challenge;
pub mod cli;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod order;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use account::{AccountKeyPair, AccountManager, EabCredentials, KeyAlgorithm, KeyRollover};
pub use challenge::{ChallengeSetup, prepare_challenge};
pub use client::{AcmeClient, AcmeConfig, CertificateBundle};
pub use config::AcmeSettings;
pub use error::{AcmeError, Result};
pub use order::{
    Authorization, CertKeyAlgorithm, Challenge, CsrGenerator, Order, OrderManager, PollPolicy,
    parse_certificate_chain, verify_certificate_domains,
};
pub use protocol::{
    Directory, DirectoryManager, Jwk, JwsSigner, NonceConfig, NonceManager, NonceNamespace,
    Problem, ProblemKind, ServerProblem,
};
pub use transport::{EndpointClass, HttpClient, HttpResponse, RateLimitPolicy, RateLimiter};
pub use types::{
    AuthorizationStatus, ChallengeStatus, ChallengeType, Contact, Identifier, OrderStatus,
    RevocationReason,
};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        account::{AccountKeyPair, AccountManager, EabCredentials, KeyAlgorithm},
        challenge::ChallengeSetup,
        client::{AcmeClient, AcmeConfig, CertificateBundle},
        config::AcmeSettings,
        error::{AcmeError, Result},
        order::{CertKeyAlgorithm, CsrGenerator, Order, OrderManager, PollPolicy},
        protocol::{DirectoryManager, Jwk, JwsSigner, NonceConfig, NonceManager, NonceNamespace},
        transport::{HttpClient, RateLimitPolicy, RateLimiter},
        types::{
            AuthorizationStatus, ChallengeStatus, ChallengeType, Contact, Identifier,
            OrderStatus, RevocationReason,
        },
    };
}
