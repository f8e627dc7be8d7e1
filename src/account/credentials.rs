//! Account key pairs used exclusively for ACME request authentication.
//!
//! Account keys are never reused as certificate keys. Callers own
//! persistence; PKCS#8 PEM import/export is provided for that purpose.

use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_FIXED_SIGNING, ECDSA_P384_SHA384_FIXED_SIGNING, EcdsaKeyPair,
    KeyPair as _, RSA_PKCS1_SHA256, RsaKeyPair, RsaPublicKeyComponents,
};

use crate::crypto::{Base64Encoding, PemEncoding};
use crate::error::{AcmeError, Result};
use crate::protocol::jwk::Jwk;

const PRIVATE_KEY_PEM_LABEL: &str = "PRIVATE KEY";

/// Supported account key algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// ECDSA over P-256 (JWS `ES256`)
    EcdsaP256,
    /// ECDSA over P-384 (JWS `ES384`)
    EcdsaP384,
    /// ECDSA over P-521 (JWS `ES512`); accepted by the API surface but not
    /// by the ring backend
    EcdsaP521,
    /// RSA 2048 (JWS `RS256`)
    Rsa2048,
    /// RSA 3072 (JWS `RS256`)
    Rsa3072,
    /// RSA 4096 (JWS `RS256`)
    Rsa4096,
}

impl KeyAlgorithm {
    /// JWS algorithm identifier derived from the key type
    pub fn jws_algorithm(&self) -> &'static str {
        match self {
            KeyAlgorithm::EcdsaP256 => "ES256",
            KeyAlgorithm::EcdsaP384 => "ES384",
            KeyAlgorithm::EcdsaP521 => "ES512",
            KeyAlgorithm::Rsa2048 | KeyAlgorithm::Rsa3072 | KeyAlgorithm::Rsa4096 => "RS256",
        }
    }
}

impl std::str::FromStr for KeyAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p256" | "p-256" | "ec256" => Ok(KeyAlgorithm::EcdsaP256),
            "p384" | "p-384" | "ec384" => Ok(KeyAlgorithm::EcdsaP384),
            "p521" | "p-521" | "ec521" => Ok(KeyAlgorithm::EcdsaP521),
            "rsa2048" => Ok(KeyAlgorithm::Rsa2048),
            "rsa3072" => Ok(KeyAlgorithm::Rsa3072),
            "rsa4096" => Ok(KeyAlgorithm::Rsa4096),
            other => Err(format!("Unknown key algorithm: {}", other)),
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeyAlgorithm::EcdsaP256 => "ECDSA-P256",
            KeyAlgorithm::EcdsaP384 => "ECDSA-P384",
            KeyAlgorithm::EcdsaP521 => "ECDSA-P521",
            KeyAlgorithm::Rsa2048 => "RSA-2048",
            KeyAlgorithm::Rsa3072 => "RSA-3072",
            KeyAlgorithm::Rsa4096 => "RSA-4096",
        };
        write!(f, "{}", name)
    }
}

/// External Account Binding credentials handed out by the CA
#[derive(Debug, Clone)]
pub struct EabCredentials {
    /// Key identifier assigned by the CA
    pub kid: String,
    /// HMAC secret, base64url (or standard base64) encoded
    pub hmac_key: String,
}

enum KeyMaterial {
    P256(EcdsaKeyPair),
    P384(EcdsaKeyPair),
    Rsa(RsaKeyPair),
}

/// An ACME account key pair
pub struct AccountKeyPair {
    algorithm: KeyAlgorithm,
    material: KeyMaterial,
    pkcs8: Vec<u8>,
}

impl AccountKeyPair {
    /// Generate a fresh account key.
    ///
    /// RSA account keys can be imported from PKCS#8 but not generated here;
    /// the ring backend has no RSA key generation.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        let rng = SystemRandom::new();
        let signing_alg = match algorithm {
            KeyAlgorithm::EcdsaP256 => &ECDSA_P256_SHA256_FIXED_SIGNING,
            KeyAlgorithm::EcdsaP384 => &ECDSA_P384_SHA384_FIXED_SIGNING,
            KeyAlgorithm::EcdsaP521 => {
                return Err(AcmeError::crypto(
                    "ECDSA P-521 account keys are not supported by the ring backend",
                ));
            }
            KeyAlgorithm::Rsa2048 | KeyAlgorithm::Rsa3072 | KeyAlgorithm::Rsa4096 => {
                return Err(AcmeError::crypto(format!(
                    "{} account keys cannot be generated; import a PKCS#8 key instead",
                    algorithm
                )));
            }
        };

        let pkcs8 = EcdsaKeyPair::generate_pkcs8(signing_alg, &rng)
            .map_err(|_| AcmeError::crypto("Failed to generate account key"))?;
        Self::from_pkcs8_der(pkcs8.as_ref())
    }

    /// Load an account key from PKCS#8 DER, detecting the algorithm
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let rng = SystemRandom::new();

        if let Ok(key) = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, der, &rng) {
            return Ok(Self {
                algorithm: KeyAlgorithm::EcdsaP256,
                material: KeyMaterial::P256(key),
                pkcs8: der.to_vec(),
            });
        }
        if let Ok(key) = EcdsaKeyPair::from_pkcs8(&ECDSA_P384_SHA384_FIXED_SIGNING, der, &rng) {
            return Ok(Self {
                algorithm: KeyAlgorithm::EcdsaP384,
                material: KeyMaterial::P384(key),
                pkcs8: der.to_vec(),
            });
        }
        if let Ok(key) = RsaKeyPair::from_pkcs8(der) {
            let bits = key.public_key().modulus_len() * 8;
            let algorithm = match bits {
                2048 => KeyAlgorithm::Rsa2048,
                3072 => KeyAlgorithm::Rsa3072,
                4096 => KeyAlgorithm::Rsa4096,
                other => {
                    return Err(AcmeError::crypto(format!(
                        "Unsupported RSA modulus size: {} bits",
                        other
                    )));
                }
            };
            return Ok(Self {
                algorithm,
                material: KeyMaterial::Rsa(key),
                pkcs8: der.to_vec(),
            });
        }

        Err(AcmeError::crypto(
            "Unsupported or malformed PKCS#8 account key",
        ))
    }

    /// Load an account key from PKCS#8 PEM
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let der = PemEncoding::extract_data(pem, Some(PRIVATE_KEY_PEM_LABEL))?;
        Self::from_pkcs8_der(&der)
    }

    /// Serialize the key as PKCS#8 PEM for caller-owned persistence
    pub fn to_pkcs8_pem(&self) -> String {
        PemEncoding::encode(&self.pkcs8, PRIVATE_KEY_PEM_LABEL)
    }

    /// The key algorithm
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// JWS algorithm identifier for the protected header
    pub fn jws_algorithm(&self) -> &'static str {
        self.algorithm.jws_algorithm()
    }

    /// Export the public key as a JWK
    pub fn public_jwk(&self) -> Result<Jwk> {
        match &self.material {
            KeyMaterial::P256(key) => ec_jwk("P-256", 32, key.public_key().as_ref()),
            KeyMaterial::P384(key) => ec_jwk("P-384", 48, key.public_key().as_ref()),
            KeyMaterial::Rsa(key) => {
                let components = RsaPublicKeyComponents::<Vec<u8>>::from(key.public_key());
                Ok(Jwk::new_rsa(
                    Base64Encoding::encode(&components.n),
                    Base64Encoding::encode(&components.e),
                ))
            }
        }
    }

    /// RFC 7638 SHA-256 thumbprint of the public JWK
    pub fn thumbprint(&self) -> Result<String> {
        self.public_jwk()?.thumbprint_sha256()
    }

    /// Sign arbitrary data with the account key
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let rng = SystemRandom::new();
        match &self.material {
            KeyMaterial::P256(key) | KeyMaterial::P384(key) => key
                .sign(&rng, data)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|_| AcmeError::crypto("ECDSA signing failed")),
            KeyMaterial::Rsa(key) => {
                let mut signature = vec![0; key.public_key().modulus_len()];
                key.sign(&RSA_PKCS1_SHA256, &rng, data, &mut signature)
                    .map_err(|_| AcmeError::crypto("RSA signing failed"))?;
                Ok(signature)
            }
        }
    }
}

impl std::fmt::Debug for AccountKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKeyPair")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

fn ec_jwk(curve: &str, coordinate_len: usize, public_key: &[u8]) -> Result<Jwk> {
    // Uncompressed SEC1 point: 0x04 || X || Y
    if public_key.len() != 1 + 2 * coordinate_len || public_key[0] != 0x04 {
        return Err(AcmeError::crypto("Unexpected EC public key format"));
    }
    let x = &public_key[1..1 + coordinate_len];
    let y = &public_key[1 + coordinate_len..];
    Ok(Jwk::new_ec(
        curve,
        Base64Encoding::encode(x),
        Base64Encoding::encode(y),
    ))
}
