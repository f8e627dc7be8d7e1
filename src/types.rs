/// Common types and structures for the ACME protocol
use serde::{Deserialize, Serialize};

/// Identifier for domain authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// Type: "dns" or "ip"
    #[serde(rename = "type")]
    pub id_type: String,
    /// Value: domain name or IP address
    pub value: String,
}

impl Identifier {
    /// Create a DNS identifier
    pub fn dns(domain: impl Into<String>) -> Self {
        Self {
            id_type: "dns".to_string(),
            value: domain.into(),
        }
    }

    /// Create an IP identifier
    pub fn ip(ip: impl Into<String>) -> Self {
        Self {
            id_type: "ip".to_string(),
            value: ip.into(),
        }
    }

    /// Create an identifier from a raw value, detecting IP addresses
    pub fn detect(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.parse::<std::net::IpAddr>().is_ok() {
            Self::ip(value)
        } else {
            Self::dns(value)
        }
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Certificate revocation reason (RFC 5280 CRLReason codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RevocationReason {
    /// Reason unspecified
    Unspecified = 0,
    /// Key compromise
    KeyCompromise = 1,
    /// CA compromise
    CaCompromise = 2,
    /// Affiliation changed
    AffiliationChanged = 3,
    /// Superseded
    Superseded = 4,
    /// Cessation of operation
    CessationOfOperation = 5,
    /// Certificate hold
    CertificateHold = 6,
    /// Remove from CRL
    RemoveFromCRL = 8,
    /// Privilege withdrawn
    PrivilegeWithdrawn = 9,
    /// AA compromise
    AACompromise = 10,
}

impl RevocationReason {
    /// Get the numeric value
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Contact information for an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// Email address
    pub email: Option<String>,
    /// URL
    pub url: Option<String>,
}

impl Contact {
    /// Create an email contact
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            url: None,
        }
    }

    /// Create a URL contact
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            email: None,
            url: Some(url.into()),
        }
    }

    /// Convert to ACME URI format
    pub fn to_uri(&self) -> String {
        if let Some(email) = &self.email {
            if email.starts_with("mailto:") {
                email.clone()
            } else {
                format!("mailto:{}", email)
            }
        } else if let Some(url) = &self.url {
            url.clone()
        } else {
            String::new()
        }
    }
}

/// Challenge type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeType {
    /// HTTP-01 challenge
    #[serde(rename = "http-01")]
    Http01,
    /// DNS-01 challenge
    #[serde(rename = "dns-01")]
    Dns01,
    /// TLS-ALPN-01 challenge
    #[serde(rename = "tls-alpn-01")]
    TlsAlpn01,
}

impl ChallengeType {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::Http01 => "http-01",
            ChallengeType::Dns01 => "dns-01",
            ChallengeType::TlsAlpn01 => "tls-alpn-01",
        }
    }
}

impl std::str::FromStr for ChallengeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "http-01" => Ok(ChallengeType::Http01),
            "dns-01" => Ok(ChallengeType::Dns01),
            "tls-alpn-01" => Ok(ChallengeType::TlsAlpn01),
            _ => Err(format!("Unknown challenge type: {}", s)),
        }
    }
}

impl std::fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Pending authorization
    Pending,
    /// Validated and ready for finalization
    Ready,
    /// Processing finalization
    Processing,
    /// Certificate issued
    Valid,
    /// Invalid
    Invalid,
}

impl OrderStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Ready => "ready",
            OrderStatus::Processing => "processing",
            OrderStatus::Valid => "valid",
            OrderStatus::Invalid => "invalid",
        }
    }

    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Valid | OrderStatus::Invalid)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authorization status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    /// Pending validation
    Pending,
    /// Validated
    Valid,
    /// Invalid
    Invalid,
    /// Deactivated
    Deactivated,
    /// Expired
    Expired,
    /// Revoked
    Revoked,
}

impl AuthorizationStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorizationStatus::Pending => "pending",
            AuthorizationStatus::Valid => "valid",
            AuthorizationStatus::Invalid => "invalid",
            AuthorizationStatus::Deactivated => "deactivated",
            AuthorizationStatus::Expired => "expired",
            AuthorizationStatus::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Challenge status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    /// Pending client action
    Pending,
    /// Server-side validation in progress
    Processing,
    /// Validated
    Valid,
    /// Invalid
    Invalid,
}

impl ChallengeStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Pending => "pending",
            ChallengeStatus::Processing => "processing",
            ChallengeStatus::Valid => "valid",
            ChallengeStatus::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
