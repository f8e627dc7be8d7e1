//! Challenge preparers: pure computations of what a caller must publish.
//!
//! Provisioning (installing DNS records, serving files) belongs to the
//! caller; these functions only derive the publication target and value for
//! each challenge type.

pub mod dns01;
pub mod http01;
pub mod tls_alpn01;

use crate::types::{ChallengeType, Identifier};

/// Everything a caller needs to publish for one challenge
#[derive(Debug, Clone)]
pub struct ChallengeSetup {
    /// The challenge type being prepared
    pub challenge_type: ChallengeType,
    /// The identifier under validation
    pub identifier: Identifier,
    /// The server-issued challenge token
    pub token: String,
    /// `token + "." + base64url(thumbprint)`
    pub key_authorization: String,
    /// Where the value must be published
    pub target: String,
    /// What must be published there
    pub value: String,
}

/// Compute the publication target and value for a challenge.
///
/// For `tls-alpn-01` the string value is the hex digest; callers installing
/// the acmeIdentifier certificate extension want the raw bytes from
/// [`tls_alpn01::digest`].
pub fn prepare_challenge(
    challenge_type: ChallengeType,
    identifier: &Identifier,
    token: &str,
    key_authorization: &str,
) -> ChallengeSetup {
    let (target, value) = match challenge_type {
        ChallengeType::Http01 => http01::prepare(&identifier.value, token, key_authorization),
        ChallengeType::Dns01 => (
            dns01::txt_record_name(&identifier.value),
            dns01::txt_record_value(key_authorization),
        ),
        ChallengeType::TlsAlpn01 => (
            identifier.value.clone(),
            crate::crypto::HexEncoding::encode(&tls_alpn01::digest(key_authorization)),
        ),
    };

    ChallengeSetup {
        challenge_type,
        identifier: identifier.clone(),
        token: token.to_string(),
        key_authorization: key_authorization.to_string(),
        target,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_http01() {
        let setup = prepare_challenge(
            ChallengeType::Http01,
            &Identifier::dns("example.test"),
            "TOK",
            "TOK.THUMB",
        );
        assert_eq!(
            setup.target,
            "http://example.test/.well-known/acme-challenge/TOK"
        );
        assert_eq!(setup.value, "TOK.THUMB");
    }

    #[test]
    fn test_prepare_dns01() {
        let setup = prepare_challenge(
            ChallengeType::Dns01,
            &Identifier::dns("example.test"),
            "TOK",
            "TOK.THUMB",
        );
        assert_eq!(setup.target, "_acme-challenge.example.test");
        assert_eq!(setup.value, dns01::txt_record_value("TOK.THUMB"));
    }

    #[test]
    fn test_prepare_tls_alpn01() {
        let setup = prepare_challenge(
            ChallengeType::TlsAlpn01,
            &Identifier::dns("example.test"),
            "TOK",
            "TOK.THUMB",
        );
        assert_eq!(setup.target, "example.test");
        assert_eq!(setup.value.len(), 64);
    }
}
