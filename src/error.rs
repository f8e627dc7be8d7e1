/// Comprehensive error handling for the ACME protocol engine
use std::time::Duration;

use thiserror::Error;

use crate::protocol::problem::ServerProblem;

/// Result type for ACME operations
pub type Result<T> = std::result::Result<T, AcmeError>;

/// Error types for ACME operations
#[derive(Error, Debug)]
pub enum AcmeError {
    /// Typed problem document returned by the ACME server
    #[error("{0}")]
    Server(ServerProblem),

    /// Rate limited by the server; carries the delay the caller should wait
    #[error("rate limited by server (retry after {})", format_retry_after(.retry_after))]
    RateLimited {
        /// Delay taken from `Retry-After` or synthesized from backoff
        retry_after: Option<Duration>,
    },

    /// HTTP transport error (DNS, TCP, TLS, timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol-level error from the ACME server
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Cryptographic operation error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A `take` call waited too long for a nonce
    #[error("timed out waiting for a nonce")]
    NonceTimeout,

    /// A nonce refill cycle exceeded its watchdog window
    #[error("nonce refill did not complete within the watchdog window")]
    RefillTimeout,

    /// A nonce refill cycle failed; queued waiters are rejected with this
    #[error("nonce refill failed: {0}")]
    NonceRefill(String),

    /// The nonce manager was cleaned up and no longer serves requests
    #[error("nonce manager has been cleaned up")]
    NonceManagerCleanedUp,

    /// Order polling exhausted its attempt budget
    #[error("order did not reach {target} after {attempts} polls (last status: {last_status})")]
    OrderTimeout {
        target: String,
        attempts: u32,
        last_status: String,
    },

    /// Order carries no finalize URL
    #[error("order has no finalize URL")]
    MissingFinalizeUrl,

    /// Order carries no certificate URL
    #[error("order has no certificate URL")]
    MissingCertificateUrl,

    /// A kid-addressed request was attempted before registration
    #[error("account is not registered with the CA yet")]
    AccountNotRegistered,

    /// The requested challenge type is absent from an authorization
    #[error("no {challenge_type} challenge in authorization for {identifier}")]
    ChallengeNotFound {
        challenge_type: String,
        identifier: String,
    },
}

fn format_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!("{}s", d.as_secs()),
        None => "unspecified".to_string(),
    }
}

impl AcmeError {
    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        AcmeError::Transport(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        AcmeError::Protocol(msg.into())
    }

    /// Create a crypto error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        AcmeError::Crypto(msg.into())
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        AcmeError::Configuration(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        AcmeError::InvalidInput(msg.into())
    }

    /// Whether this error is a `badNonce` problem from the server
    pub fn is_bad_nonce(&self) -> bool {
        matches!(
            self,
            AcmeError::Server(p) if p.kind == crate::protocol::problem::ProblemKind::BadNonce
        )
    }

    /// The server problem carried by this error, if any
    pub fn server_problem(&self) -> Option<&ServerProblem> {
        match self {
            AcmeError::Server(p) => Some(p),
            _ => None,
        }
    }
}
