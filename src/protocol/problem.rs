//! RFC 7807 problem documents and the typed ACME error taxonomy

use serde::{Deserialize, Serialize};

use crate::error::AcmeError;
use crate::transport::http_client::HttpResponse;
use crate::types::Identifier;

/// Prefix of every ACME error type URN (RFC 8555 section 6.7)
pub const ERROR_URN_PREFIX: &str = "urn:ietf:params:acme:error:";

/// Raw RFC 7807 problem document as sent by the server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Problem {
    /// Error type URN
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<String>,

    /// Short human-readable summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Human-readable explanation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// HTTP status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Problem instance URL (e.g. updated terms of service)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Per-identifier subproblems
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subproblems: Option<Vec<Problem>>,

    /// Algorithms the server would accept (`badSignatureAlgorithm`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithms: Option<Vec<String>>,

    /// Identifier a subproblem applies to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Identifier>,
}

impl Problem {
    /// The typed kind selected by the `type` URN
    pub fn kind(&self) -> ProblemKind {
        match &self.problem_type {
            Some(urn) => ProblemKind::from_urn(urn),
            None => ProblemKind::Unknown,
        }
    }

    /// Whether this is a `badNonce` problem
    pub fn is_bad_nonce(&self) -> bool {
        self.kind() == ProblemKind::BadNonce
    }
}

/// Closed taxonomy of ACME problem types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    /// Replay nonce was stale or invalid
    BadNonce,
    /// The account public key is not supported
    BadPublicKey,
    /// The JWS signature algorithm is not supported; `algorithms` lists accepted ones
    BadSignatureAlgorithm,
    /// The client lacks sufficient authorization
    Unauthorized,
    /// The user must visit `instance` (typically updated terms of service)
    UserActionRequired,
    /// No account matches the provided key
    AccountDoesNotExist,
    /// The CA requires external account binding
    ExternalAccountRequired,
    /// A contact URL could not be parsed
    InvalidContact,
    /// A contact URL scheme is not supported
    UnsupportedContact,
    /// The CSR is unacceptable
    BadCsr,
    /// Finalize was requested before the order was ready
    OrderNotReady,
    /// The server will not issue for the identifier
    RejectedIdentifier,
    /// Identifier type is not supported
    UnsupportedIdentifier,
    /// The certificate was already revoked
    AlreadyRevoked,
    /// The revocation reason code is not allowed
    BadRevocationReason,
    /// CAA records forbid issuance
    Caa,
    /// The validator could not connect to the host
    Connection,
    /// A DNS lookup failed during validation
    Dns,
    /// The challenge response did not match
    IncorrectResponse,
    /// A TLS error occurred during validation
    Tls,
    /// Internal server error
    ServerInternal,
    /// The CA is down for maintenance
    ServerMaintenance,
    /// The request exceeded a rate limit
    RateLimited,
    /// The request message was malformed
    Malformed,
    /// Aggregate of several subproblems
    Compound,
    /// Unrecognized type URN
    Unknown,
}

impl ProblemKind {
    /// Map a type URN to a kind; unknown URNs yield [`ProblemKind::Unknown`]
    pub fn from_urn(urn: &str) -> Self {
        let name = urn.strip_prefix(ERROR_URN_PREFIX).unwrap_or(urn);
        match name {
            "badNonce" => ProblemKind::BadNonce,
            "badPublicKey" => ProblemKind::BadPublicKey,
            "badSignatureAlgorithm" => ProblemKind::BadSignatureAlgorithm,
            "unauthorized" => ProblemKind::Unauthorized,
            "userActionRequired" => ProblemKind::UserActionRequired,
            "accountDoesNotExist" => ProblemKind::AccountDoesNotExist,
            "externalAccountRequired" => ProblemKind::ExternalAccountRequired,
            "invalidContact" => ProblemKind::InvalidContact,
            "unsupportedContact" => ProblemKind::UnsupportedContact,
            "badCSR" => ProblemKind::BadCsr,
            "orderNotReady" => ProblemKind::OrderNotReady,
            "rejectedIdentifier" => ProblemKind::RejectedIdentifier,
            "unsupportedIdentifier" => ProblemKind::UnsupportedIdentifier,
            "alreadyRevoked" => ProblemKind::AlreadyRevoked,
            "badRevocationReason" => ProblemKind::BadRevocationReason,
            "caa" => ProblemKind::Caa,
            "connection" => ProblemKind::Connection,
            "dns" => ProblemKind::Dns,
            "incorrectResponse" => ProblemKind::IncorrectResponse,
            "tls" => ProblemKind::Tls,
            "serverInternal" => ProblemKind::ServerInternal,
            "rateLimited" => ProblemKind::RateLimited,
            "malformed" => ProblemKind::Malformed,
            "compound" => ProblemKind::Compound,
            _ => ProblemKind::Unknown,
        }
    }

    /// Short name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            ProblemKind::BadNonce => "badNonce",
            ProblemKind::BadPublicKey => "badPublicKey",
            ProblemKind::BadSignatureAlgorithm => "badSignatureAlgorithm",
            ProblemKind::Unauthorized => "unauthorized",
            ProblemKind::UserActionRequired => "userActionRequired",
            ProblemKind::AccountDoesNotExist => "accountDoesNotExist",
            ProblemKind::ExternalAccountRequired => "externalAccountRequired",
            ProblemKind::InvalidContact => "invalidContact",
            ProblemKind::UnsupportedContact => "unsupportedContact",
            ProblemKind::BadCsr => "badCSR",
            ProblemKind::OrderNotReady => "orderNotReady",
            ProblemKind::RejectedIdentifier => "rejectedIdentifier",
            ProblemKind::UnsupportedIdentifier => "unsupportedIdentifier",
            ProblemKind::AlreadyRevoked => "alreadyRevoked",
            ProblemKind::BadRevocationReason => "badRevocationReason",
            ProblemKind::Caa => "caa",
            ProblemKind::Connection => "connection",
            ProblemKind::Dns => "dns",
            ProblemKind::IncorrectResponse => "incorrectResponse",
            ProblemKind::Tls => "tls",
            ProblemKind::ServerInternal => "serverInternal",
            ProblemKind::ServerMaintenance => "serverMaintenance",
            ProblemKind::RateLimited => "rateLimited",
            ProblemKind::Malformed => "malformed",
            ProblemKind::Compound => "compound",
            ProblemKind::Unknown => "unknown",
        }
    }
}

/// Typed server error carried by [`AcmeError::Server`]
#[derive(Debug, Clone)]
pub struct ServerProblem {
    /// The typed problem kind
    pub kind: ProblemKind,
    /// The original type URN, when the server sent one
    pub raw_type: Option<String>,
    /// Human-readable explanation
    pub detail: Option<String>,
    /// HTTP status code
    pub status: Option<u16>,
    /// Problem instance URL
    pub instance: Option<String>,
    /// Accepted algorithms for `badSignatureAlgorithm`
    pub algorithms: Vec<String>,
    /// Identifier this problem applies to
    pub identifier: Option<Identifier>,
    /// Flattened subproblems, recursively mapped
    pub subproblems: Vec<ServerProblem>,
}

impl ServerProblem {
    /// Build a locally-originated problem, e.g. a pre-flight rejection
    pub fn local(kind: ProblemKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            raw_type: None,
            detail: Some(detail.into()),
            status: None,
            instance: None,
            algorithms: Vec::new(),
            identifier: None,
            subproblems: Vec::new(),
        }
    }

    fn from_problem(problem: &Problem, kind: ProblemKind) -> Self {
        Self {
            kind,
            raw_type: problem.problem_type.clone(),
            detail: problem.detail.clone(),
            status: problem.status,
            instance: problem.instance.clone(),
            algorithms: problem.algorithms.clone().unwrap_or_default(),
            identifier: problem.identifier.clone(),
            subproblems: problem
                .subproblems
                .iter()
                .flatten()
                .map(|sub| ServerProblem::from_problem(sub, sub.kind()))
                .collect(),
        }
    }
}

impl std::fmt::Display for ServerProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match (&self.kind, &self.raw_type) {
            (ProblemKind::Unknown, Some(raw)) => raw.as_str(),
            (kind, _) => kind.name(),
        };
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", name, detail)?,
            None => write!(f, "{}", name)?,
        }
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        if !self.subproblems.is_empty() {
            write!(f, " [{} subproblems]", self.subproblems.len())?;
        }
        Ok(())
    }
}

/// Translate a problem document into a typed error.
///
/// The response, when available, supplies `Retry-After` for rate limits and
/// the HTTP status when the document omits one.
pub fn map_problem(problem: &Problem, response: Option<&HttpResponse>) -> AcmeError {
    let mut kind = problem.kind();
    let status = problem.status.or(response.map(|r| r.status));

    // Some CAs report validation failures as a bare serverInternal wrapper
    // around per-identifier subproblems
    let has_subproblems = problem
        .subproblems
        .as_ref()
        .is_some_and(|subs| !subs.is_empty());
    if matches!(kind, ProblemKind::Unknown | ProblemKind::ServerInternal)
        && problem.detail.as_deref() == Some("Errors during validation")
        && has_subproblems
    {
        kind = ProblemKind::Compound;
    }

    if matches!(kind, ProblemKind::ServerInternal | ProblemKind::Unknown) {
        let maintenance_detail = problem
            .detail
            .as_deref()
            .is_some_and(|d| d.to_ascii_lowercase().contains("maintenance"));
        if status == Some(503) || maintenance_detail {
            kind = ProblemKind::ServerMaintenance;
        }
    }

    if kind == ProblemKind::RateLimited {
        return AcmeError::RateLimited {
            retry_after: response.and_then(HttpResponse::retry_after),
        };
    }

    let mut mapped = ServerProblem::from_problem(problem, kind);
    mapped.status = status;
    AcmeError::Server(mapped)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn problem(urn: &str, detail: &str) -> Problem {
        Problem {
            problem_type: Some(urn.to_string()),
            detail: Some(detail.to_string()),
            status: Some(400),
            ..Problem::default()
        }
    }

    #[test]
    fn test_every_rfc8555_urn_maps_to_its_kind() {
        let table = [
            ("accountDoesNotExist", ProblemKind::AccountDoesNotExist),
            ("alreadyRevoked", ProblemKind::AlreadyRevoked),
            ("badCSR", ProblemKind::BadCsr),
            ("badNonce", ProblemKind::BadNonce),
            ("badPublicKey", ProblemKind::BadPublicKey),
            ("badRevocationReason", ProblemKind::BadRevocationReason),
            ("badSignatureAlgorithm", ProblemKind::BadSignatureAlgorithm),
            ("caa", ProblemKind::Caa),
            ("compound", ProblemKind::Compound),
            ("connection", ProblemKind::Connection),
            ("dns", ProblemKind::Dns),
            ("externalAccountRequired", ProblemKind::ExternalAccountRequired),
            ("incorrectResponse", ProblemKind::IncorrectResponse),
            ("invalidContact", ProblemKind::InvalidContact),
            ("malformed", ProblemKind::Malformed),
            ("orderNotReady", ProblemKind::OrderNotReady),
            ("rejectedIdentifier", ProblemKind::RejectedIdentifier),
            ("serverInternal", ProblemKind::ServerInternal),
            ("tls", ProblemKind::Tls),
            ("unauthorized", ProblemKind::Unauthorized),
            ("unsupportedContact", ProblemKind::UnsupportedContact),
            ("unsupportedIdentifier", ProblemKind::UnsupportedIdentifier),
            ("userActionRequired", ProblemKind::UserActionRequired),
        ];

        for (name, expected) in table {
            let urn = format!("{}{}", ERROR_URN_PREFIX, name);
            let doc = problem(&urn, "boom");
            let mapped = map_problem(&doc, None);
            let server = mapped.server_problem().unwrap_or_else(|| {
                panic!("{} should map to a server problem", name);
            });
            assert_eq!(server.kind, expected, "urn {}", name);
            assert_eq!(server.detail.as_deref(), Some("boom"));
            assert_eq!(server.status, Some(400));
        }
    }

    #[test]
    fn test_rate_limited_maps_to_rate_limited_error() {
        let doc = problem("urn:ietf:params:acme:error:rateLimited", "slow down");
        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        headers.insert("retry-after".to_string(), vec!["7".to_string()]);
        let response = HttpResponse {
            status: 429,
            headers,
            body: vec![],
        };

        match map_problem(&doc, Some(&response)) {
            AcmeError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(std::time::Duration::from_secs(7)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_urn_maps_to_unknown_kind() {
        let doc = problem("urn:ietf:params:acme:error:futureProblem", "??");
        let mapped = map_problem(&doc, None);
        let server = mapped.server_problem().unwrap();
        assert_eq!(server.kind, ProblemKind::Unknown);
        assert_eq!(
            server.raw_type.as_deref(),
            Some("urn:ietf:params:acme:error:futureProblem")
        );
    }

    #[test]
    fn test_compound_reclassification_heuristic() {
        let doc = Problem {
            problem_type: Some("urn:ietf:params:acme:error:serverInternal".to_string()),
            detail: Some("Errors during validation".to_string()),
            subproblems: Some(vec![problem("urn:ietf:params:acme:error:caa", "CAA forbids")]),
            ..Problem::default()
        };

        let server = map_problem(&doc, None).server_problem().cloned().unwrap();
        assert_eq!(server.kind, ProblemKind::Compound);
        assert_eq!(server.subproblems.len(), 1);
        assert_eq!(server.subproblems[0].kind, ProblemKind::Caa);
        assert_eq!(server.subproblems[0].detail.as_deref(), Some("CAA forbids"));
    }

    #[test]
    fn test_maintenance_reclassification() {
        let doc = Problem {
            problem_type: Some("urn:ietf:params:acme:error:serverInternal".to_string()),
            detail: Some("down for scheduled maintenance".to_string()),
            status: Some(500),
            ..Problem::default()
        };
        let server = map_problem(&doc, None).server_problem().cloned().unwrap();
        assert_eq!(server.kind, ProblemKind::ServerMaintenance);

        let doc = Problem {
            problem_type: Some("urn:ietf:params:acme:error:serverInternal".to_string()),
            status: Some(503),
            ..Problem::default()
        };
        let server = map_problem(&doc, None).server_problem().cloned().unwrap();
        assert_eq!(server.kind, ProblemKind::ServerMaintenance);

        // A plain 500 serverInternal stays serverInternal
        let doc = problem("urn:ietf:params:acme:error:serverInternal", "oops");
        let server = map_problem(&doc, None).server_problem().cloned().unwrap();
        assert_eq!(server.kind, ProblemKind::ServerInternal);
    }

    #[test]
    fn test_bad_signature_algorithm_carries_algorithms() {
        let doc = Problem {
            problem_type: Some("urn:ietf:params:acme:error:badSignatureAlgorithm".to_string()),
            algorithms: Some(vec!["ES256".to_string(), "RS256".to_string()]),
            ..Problem::default()
        };
        let server = map_problem(&doc, None).server_problem().cloned().unwrap();
        assert_eq!(server.algorithms, vec!["ES256", "RS256"]);
    }

    #[test]
    fn test_display_formats_kind_and_detail() {
        let server = ServerProblem::local(ProblemKind::Caa, "CAA forbids");
        assert_eq!(server.to_string(), "caa: CAA forbids");
    }
}
