//! Base64, PEM and hex encoding helpers

use crate::error::{AcmeError, Result};
use base64::Engine;

/// URL-safe base64 without padding, the encoding every ACME field uses
pub struct Base64Encoding;

impl Base64Encoding {
    /// Encode using URL-safe base64 (no padding)
    pub fn encode(data: impl AsRef<[u8]>) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
    }

    /// Decode URL-safe base64 (no padding)
    pub fn decode(data: &str) -> Result<Vec<u8>> {
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(data)
            .map_err(|e| AcmeError::crypto(format!("Base64 decode error: {}", e)))
    }

    /// Decode a key that may be URL-safe or standard base64.
    ///
    /// EAB HMAC secrets are handed out by CAs in both alphabets.
    pub fn decode_lenient(data: &str) -> Result<Vec<u8>> {
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(data)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(data))
            .map_err(|e| AcmeError::crypto(format!("Base64 decode error: {}", e)))
    }
}

/// PEM encode/decode helpers
pub struct PemEncoding;

impl PemEncoding {
    /// Encode binary data as PEM with the given label
    pub fn encode(data: &[u8], label: &str) -> String {
        let pem = pem::Pem::new(label.to_string(), data.to_vec());
        pem::encode(&pem)
    }

    /// Decode one PEM block, returning its label and contents
    pub fn decode(pem_data: &str) -> Result<(String, Vec<u8>)> {
        let pem = pem::parse(pem_data)
            .map_err(|e| AcmeError::crypto(format!("PEM parse error: {}", e)))?;
        Ok((pem.tag().to_string(), pem.contents().to_vec()))
    }

    /// Extract the contents of a PEM block, checking the label when given
    pub fn extract_data(pem_data: &str, expected_label: Option<&str>) -> Result<Vec<u8>> {
        let (label, data) = Self::decode(pem_data)?;

        if let Some(expected) = expected_label
            && label != expected
        {
            return Err(AcmeError::crypto(format!(
                "Expected PEM label '{}', got '{}'",
                expected, label
            )));
        }

        Ok(data)
    }
}

/// Hex encoding helper
pub struct HexEncoding;

impl HexEncoding {
    /// Encode as a lowercase hex string
    pub fn encode(data: &[u8]) -> String {
        const HEX_CHARS: &[u8] = b"0123456789abcdef";
        let mut result = String::with_capacity(data.len() * 2);
        for &byte in data {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0xf) as usize] as char);
        }
        result
    }
}
