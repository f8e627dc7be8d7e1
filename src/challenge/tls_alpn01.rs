/// TLS-ALPN-01 challenge preparation
use crate::crypto::Sha256Hash;

/// Raw digest for the `acmeIdentifier` certificate extension.
///
/// The caller installs these 32 bytes into a self-signed certificate served
/// under the `acme-tls/1` ALPN protocol; building that certificate is out of
/// scope here.
pub fn digest(key_authorization: &str) -> [u8; 32] {
    Sha256Hash::digest(key_authorization.as_bytes())
}
