/// JWS (JSON Web Signature) signing for ACME requests
use std::sync::Arc;

use ring::hmac;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::account::credentials::{AccountKeyPair, EabCredentials};
use crate::crypto::Base64Encoding;
use crate::error::Result;

/// Flattened JWS as POSTed to every ACME endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoseBody {
    /// Base64url-encoded protected header
    pub protected: String,
    /// Base64url-encoded payload; empty string for POST-as-GET
    pub payload: String,
    /// Base64url-encoded signature over `protected.payload`
    pub signature: String,
}

/// How the protected header identifies the account key.
///
/// Exactly one of `jwk` and `kid` appears: the embedded JWK is used for
/// new-account requests and key rollover, the key ID everywhere else.
#[derive(Debug, Clone, Copy)]
pub enum KeyAddressing<'a> {
    /// Embed the full public JWK
    EmbeddedJwk,
    /// Reference the account URL assigned at registration
    KeyId(&'a str),
}

/// JWS signer bound to one account key
#[derive(Clone)]
pub struct JwsSigner {
    key: Arc<AccountKeyPair>,
}

impl JwsSigner {
    /// Create a signer for the given account key
    pub fn new(key: Arc<AccountKeyPair>) -> Self {
        Self { key }
    }

    /// The account key behind this signer
    pub fn key(&self) -> &AccountKeyPair {
        &self.key
    }

    /// Produce a flattened JWS for one request.
    ///
    /// `payload` of `None` signs the empty octet string (POST-as-GET).
    pub fn sign(
        &self,
        url: &str,
        nonce: &str,
        addressing: KeyAddressing<'_>,
        payload: Option<&Value>,
    ) -> Result<JoseBody> {
        let mut header = json!({
            "alg": self.key.jws_algorithm(),
            "nonce": nonce,
            "url": url,
        });
        match addressing {
            KeyAddressing::EmbeddedJwk => {
                header["jwk"] = self.key.public_jwk()?.to_value()?;
            }
            KeyAddressing::KeyId(kid) => {
                header["kid"] = json!(kid);
            }
        }

        let protected = Base64Encoding::encode(header.to_string());
        let payload = match payload {
            Some(value) => Base64Encoding::encode(value.to_string()),
            None => String::new(),
        };

        let signing_input = format!("{}.{}", protected, payload);
        let signature = Base64Encoding::encode(self.key.sign(signing_input.as_bytes())?);

        Ok(JoseBody {
            protected,
            payload,
            signature,
        })
    }

    /// Inner JWS for account key rollover, signed by the *new* key.
    ///
    /// Per RFC 8555 section 7.3.5 the inner JWS embeds the new key's JWK and
    /// carries no nonce.
    pub fn sign_rollover_inner(
        new_key: &AccountKeyPair,
        key_change_url: &str,
        payload: &Value,
    ) -> Result<JoseBody> {
        let header = json!({
            "alg": new_key.jws_algorithm(),
            "jwk": new_key.public_jwk()?.to_value()?,
            "url": key_change_url,
        });

        let protected = Base64Encoding::encode(header.to_string());
        let payload = Base64Encoding::encode(payload.to_string());
        let signing_input = format!("{}.{}", protected, payload);
        let signature = Base64Encoding::encode(new_key.sign(signing_input.as_bytes())?);

        Ok(JoseBody {
            protected,
            payload,
            signature,
        })
    }

    /// Key authorization for a challenge token:
    /// `token + "." + base64url(sha256-thumbprint(jwk))`
    pub fn key_authorization(&self, token: &str) -> Result<String> {
        Ok(format!("{}.{}", token, self.key.thumbprint()?))
    }

    /// Build the `externalAccountBinding` object for a registration payload.
    ///
    /// An HS256 JWS whose payload is the account public JWK, keyed with the
    /// CA-provided HMAC secret.
    pub fn external_account_binding(
        &self,
        new_account_url: &str,
        eab: &EabCredentials,
    ) -> Result<Value> {
        let protected = json!({
            "alg": "HS256",
            "kid": eab.kid,
            "url": new_account_url,
        });
        let payload = self.key.public_jwk()?.to_value()?;

        let protected_b64 = Base64Encoding::encode(protected.to_string());
        let payload_b64 = Base64Encoding::encode(payload.to_string());
        let signing_input = format!("{}.{}", protected_b64, payload_b64);

        let key_bytes = Base64Encoding::decode_lenient(&eab.hmac_key)?;
        let key = hmac::Key::new(hmac::HMAC_SHA256, &key_bytes);
        let signature = hmac::sign(&key, signing_input.as_bytes());

        Ok(json!({
            "protected": protected_b64,
            "payload": payload_b64,
            "signature": Base64Encoding::encode(signature.as_ref()),
        }))
    }
}
