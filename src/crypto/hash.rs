//! SHA-256 digests for thumbprints and challenge values

use sha2::{Digest, Sha256};

use crate::crypto::encoding::Base64Encoding;

/// SHA-256 helper
pub struct Sha256Hash;

impl Sha256Hash {
    /// Compute a SHA-256 digest
    pub fn digest(data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    /// Compute a SHA-256 digest and return it base64url encoded
    pub fn digest_base64(data: &[u8]) -> String {
        Base64Encoding::encode(Self::digest(data))
    }
}
