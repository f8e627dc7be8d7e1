/// Wire objects for orders, authorizations and challenges
use serde::{Deserialize, Serialize};

use crate::protocol::problem::Problem;
use crate::types::{AuthorizationStatus, ChallengeStatus, ChallengeType, Identifier, OrderStatus};

/// A challenge inside an authorization.
///
/// The type is kept as the raw string so servers can advertise challenge
/// types this client does not know; [`Challenge::challenge_type`] resolves
/// the known ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    /// Challenge type ("http-01", "dns-01", "tls-alpn-01", ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Challenge URL; POSTing `{}` here triggers validation
    pub url: String,

    /// Challenge status
    pub status: ChallengeStatus,

    /// Challenge token
    #[serde(default)]
    pub token: String,

    /// Validation timestamp, set once `valid`
    #[serde(default)]
    pub validated: Option<String>,

    /// Error document embedded after a failed validation
    #[serde(default)]
    pub error: Option<Problem>,
}

impl Challenge {
    /// The typed challenge kind, when recognized
    pub fn challenge_type(&self) -> Option<ChallengeType> {
        self.kind.parse().ok()
    }
}

/// Authorization for one identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    /// The identifier under validation
    pub identifier: Identifier,

    /// Authorization status
    pub status: AuthorizationStatus,

    /// Expiration timestamp
    #[serde(default)]
    pub expires: Option<String>,

    /// Offered challenges
    pub challenges: Vec<Challenge>,

    /// Set when the authorization covers a wildcard identifier
    #[serde(default)]
    pub wildcard: Option<bool>,
}

impl Authorization {
    /// Find the challenge of a given type
    pub fn challenge(&self, challenge_type: ChallengeType) -> Option<&Challenge> {
        self.challenges
            .iter()
            .find(|c| c.challenge_type() == Some(challenge_type))
    }

    /// The first embedded challenge error, if any validation already failed
    pub fn embedded_error(&self) -> Option<&Problem> {
        self.challenges.iter().find_map(|c| c.error.as_ref())
    }
}

/// An ACME order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order URL from the `Location` header; not part of the wire body
    #[serde(skip)]
    pub url: String,

    /// Order status
    pub status: OrderStatus,

    /// Expiration timestamp
    #[serde(default)]
    pub expires: Option<String>,

    /// Identifiers in this order
    pub identifiers: Vec<Identifier>,

    /// Authorization URLs
    #[serde(default)]
    pub authorizations: Vec<String>,

    /// Finalization URL
    #[serde(default)]
    pub finalize: Option<String>,

    /// Certificate URL, populated once `valid`
    #[serde(default)]
    pub certificate: Option<String>,

    /// Requested notBefore
    #[serde(default, rename = "notBefore")]
    pub not_before: Option<String>,

    /// Requested notAfter
    #[serde(default, rename = "notAfter")]
    pub not_after: Option<String>,

    /// Error document set when the order failed
    #[serde(default)]
    pub error: Option<Problem>,
}

impl Order {
    /// Check whether the order awaits authorization
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Check whether the order is ready for finalization
    pub fn is_ready(&self) -> bool {
        self.status == OrderStatus::Ready
    }

    /// Check whether the certificate has been issued
    pub fn is_valid(&self) -> bool {
        self.status == OrderStatus::Valid
    }
}

/// New order request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    /// Identifiers to order
    pub identifiers: Vec<Identifier>,

    /// Not before (optional)
    #[serde(skip_serializing_if = "Option::is_none", rename = "notBefore")]
    pub not_before: Option<String>,

    /// Not after (optional)
    #[serde(skip_serializing_if = "Option::is_none", rename = "notAfter")]
    pub not_after: Option<String>,
}

impl NewOrderRequest {
    /// Create a request for the given identifiers
    pub fn new(identifiers: Vec<Identifier>) -> Self {
        Self {
            identifiers,
            not_before: None,
            not_after: None,
        }
    }
}

/// Finalization request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationRequest {
    /// Certificate signing request, base64url DER
    pub csr: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_parsing() {
        let json = r#"{
            "type": "http-01",
            "url": "https://ca.test/acme/challenge/123",
            "status": "pending",
            "token": "test-token"
        }"#;

        let challenge: Challenge = serde_json::from_str(json).unwrap();
        assert_eq!(challenge.challenge_type(), Some(ChallengeType::Http01));
        assert_eq!(challenge.token, "test-token");
        assert_eq!(challenge.status, ChallengeStatus::Pending);
    }

    #[test]
    fn test_unknown_challenge_type_is_preserved() {
        let json = r#"{
            "type": "token-device-attest-01",
            "url": "https://ca.test/acme/challenge/9",
            "status": "pending",
            "token": "t"
        }"#;

        let challenge: Challenge = serde_json::from_str(json).unwrap();
        assert_eq!(challenge.challenge_type(), None);
        assert_eq!(challenge.kind, "token-device-attest-01");
    }

    #[test]
    fn test_authorization_challenge_lookup() {
        let json = r#"{
            "identifier": {"type": "dns", "value": "example.com"},
            "status": "pending",
            "expires": "2026-09-01T00:00:00Z",
            "challenges": [
                {"type": "http-01", "url": "https://ca.test/c/1", "status": "pending", "token": "t1"},
                {"type": "dns-01", "url": "https://ca.test/c/2", "status": "pending", "token": "t2"}
            ]
        }"#;

        let auth: Authorization = serde_json::from_str(json).unwrap();
        assert!(auth.challenge(ChallengeType::Http01).is_some());
        assert!(auth.challenge(ChallengeType::Dns01).is_some());
        assert!(auth.challenge(ChallengeType::TlsAlpn01).is_none());
        assert!(auth.embedded_error().is_none());
    }

    #[test]
    fn test_authorization_embedded_error() {
        let json = r#"{
            "identifier": {"type": "dns", "value": "example.com"},
            "status": "pending",
            "challenges": [
                {
                    "type": "dns-01",
                    "url": "https://ca.test/c/2",
                    "status": "invalid",
                    "token": "t2",
                    "error": {"type": "urn:ietf:params:acme:error:caa", "detail": "CAA forbids"}
                }
            ]
        }"#;

        let auth: Authorization = serde_json::from_str(json).unwrap();
        let error = auth.embedded_error().unwrap();
        assert_eq!(error.detail.as_deref(), Some("CAA forbids"));
    }

    #[test]
    fn test_order_parsing_and_predicates() {
        let mut order: Order = serde_json::from_str(
            r#"{
                "status": "pending",
                "expires": "2026-09-01T00:00:00Z",
                "identifiers": [{"type": "dns", "value": "example.com"}],
                "authorizations": ["https://ca.test/authz/1"],
                "finalize": "https://ca.test/order/1/finalize"
            }"#,
        )
        .unwrap();

        assert!(order.is_pending());
        assert!(order.url.is_empty());

        order.status = OrderStatus::Ready;
        assert!(order.is_ready());

        order.status = OrderStatus::Valid;
        assert!(order.is_valid());
    }

    #[test]
    fn test_new_order_request_serialization() {
        let request = NewOrderRequest::new(vec![Identifier::dns("example.com")]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["identifiers"][0]["type"], "dns");
        assert_eq!(value["identifiers"][0]["value"], "example.com");
        assert!(value.get("notBefore").is_none());
    }
}
