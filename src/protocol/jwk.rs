/// JSON Web Key (JWK) representation for ACME account keys
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::crypto::{Base64Encoding, Sha256Hash};
use crate::error::{AcmeError, Result};

/// JSON Web Key representation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type ("RSA" or "EC")
    pub kty: String,

    /// Additional parameters (flattened into the JWK)
    #[serde(flatten)]
    pub params: HashMap<String, Value>,
}

impl Jwk {
    /// Create a new JWK from an RSA public key (base64url modulus and exponent)
    pub fn new_rsa(n: impl Into<String>, e: impl Into<String>) -> Self {
        let mut params = HashMap::new();
        params.insert("n".to_string(), Value::String(n.into()));
        params.insert("e".to_string(), Value::String(e.into()));

        Self {
            kty: "RSA".to_string(),
            params,
        }
    }

    /// Create a new JWK from an EC public key (curve name and base64url coordinates)
    pub fn new_ec(crv: impl Into<String>, x: impl Into<String>, y: impl Into<String>) -> Self {
        let mut params = HashMap::new();
        params.insert("crv".to_string(), Value::String(crv.into()));
        params.insert("x".to_string(), Value::String(x.into()));
        params.insert("y".to_string(), Value::String(y.into()));

        Self {
            kty: "EC".to_string(),
            params,
        }
    }

    fn param(&self, name: &str) -> Result<&str> {
        self.params
            .get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AcmeError::invalid_input(format!("Missing {} '{}' parameter", self.kty, name))
            })
    }

    /// Generate the JWK thumbprint (RFC 7638, SHA-256).
    ///
    /// Only the required members are hashed, serialized with
    /// lexicographically ordered keys and no whitespace.
    pub fn thumbprint_sha256(&self) -> Result<String> {
        let required = match self.kty.as_str() {
            "RSA" => json!({
                "e": self.param("e")?,
                "kty": "RSA",
                "n": self.param("n")?,
            }),
            "EC" => json!({
                "crv": self.param("crv")?,
                "kty": "EC",
                "x": self.param("x")?,
                "y": self.param("y")?,
            }),
            other => {
                return Err(AcmeError::invalid_input(format!(
                    "Unsupported key type: {}",
                    other
                )));
            }
        };

        // serde_json sorts object keys, which is exactly the canonical form
        Ok(Base64Encoding::encode(Sha256Hash::digest(
            required.to_string().as_bytes(),
        )))
    }

    /// Convert to a JSON value for embedding in a JWS protected header
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(AcmeError::from)
    }
}
