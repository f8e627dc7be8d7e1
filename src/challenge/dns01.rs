/// DNS-01 challenge preparation
use crate::crypto::Sha256Hash;

/// TXT record name for an identifier.
///
/// Wildcard identifiers are validated at the base domain; the `*.` label is
/// stripped before prefixing.
pub fn txt_record_name(identifier: &str) -> String {
    let base = identifier.strip_prefix("*.").unwrap_or(identifier);
    format!("_acme-challenge.{}", base)
}

/// TXT record value: `base64url(sha256(keyAuthorization))`
pub fn txt_record_value(key_authorization: &str) -> String {
    Sha256Hash::digest_base64(key_authorization.as_bytes())
}
