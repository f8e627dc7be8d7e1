/// Certificate Signing Request generation and chain helpers
use crate::error::{AcmeError, Result};
use crate::types::Identifier;

/// Certificate key algorithms the generator can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertKeyAlgorithm {
    /// ECDSA over P-256
    EcdsaP256,
    /// ECDSA over P-384
    EcdsaP384,
}

impl std::str::FromStr for CertKeyAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p256" | "p-256" | "ec256" => Ok(CertKeyAlgorithm::EcdsaP256),
            "p384" | "p-384" | "ec384" => Ok(CertKeyAlgorithm::EcdsaP384),
            other => Err(format!("Unknown certificate key algorithm: {}", other)),
        }
    }
}

/// CSR generator for the identifiers of one order.
///
/// The certificate key is generated fresh and never reused as an account
/// key.
pub struct CsrGenerator {
    identifiers: Vec<Identifier>,
    algorithm: CertKeyAlgorithm,
}

impl CsrGenerator {
    /// Create a generator for the given identifiers
    pub fn new(identifiers: Vec<Identifier>) -> Self {
        Self {
            identifiers,
            algorithm: CertKeyAlgorithm::EcdsaP256,
        }
    }

    /// Select the certificate key algorithm
    pub fn with_algorithm(mut self, algorithm: CertKeyAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Generate the CSR, returning `(csr DER, private key PEM)`
    pub fn generate(&self) -> Result<(Vec<u8>, String)> {
        let primary = self
            .identifiers
            .first()
            .ok_or_else(|| AcmeError::invalid_input("cannot build a CSR without identifiers"))?;

        let mut params = rcgen::CertificateParams::default();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, primary.value.clone());

        let mut sans = Vec::new();
        for identifier in &self.identifiers {
            if identifier.id_type == "ip" {
                let addr = identifier.value.parse().map_err(|e| {
                    AcmeError::invalid_input(format!("invalid IP identifier: {}", e))
                })?;
                sans.push(rcgen::SanType::IpAddress(addr));
            } else {
                let dns_name = identifier.value.clone().try_into().map_err(|e| {
                    AcmeError::invalid_input(format!("invalid DNS identifier: {}", e))
                })?;
                sans.push(rcgen::SanType::DnsName(dns_name));
            }
        }
        params.subject_alt_names = sans;

        let key_pair = match self.algorithm {
            CertKeyAlgorithm::EcdsaP256 => rcgen::KeyPair::generate(),
            CertKeyAlgorithm::EcdsaP384 => {
                rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384)
            }
        }
        .map_err(|e| AcmeError::crypto(format!("Failed to generate certificate key: {}", e)))?;

        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| AcmeError::crypto(format!("Failed to build CSR: {}", e)))?;

        Ok((csr.der().to_vec(), key_pair.serialize_pem()))
    }
}

/// Split a PEM certificate chain into DER certificates, leaf first
pub fn parse_certificate_chain(pem: &str) -> Result<Vec<Vec<u8>>> {
    let mut certs = Vec::new();

    for pem_item in pem::parse_many(pem.as_bytes())
        .map_err(|e| AcmeError::crypto(format!("Failed to parse PEM chain: {}", e)))?
    {
        if pem_item.tag() == "CERTIFICATE" {
            certs.push(pem_item.contents().to_vec());
        }
    }

    if certs.is_empty() {
        return Err(AcmeError::crypto("No certificates found in PEM chain"));
    }

    Ok(certs)
}

/// Check that a certificate covers every expected domain via its SANs
pub fn verify_certificate_domains(cert_der: &[u8], expected_domains: &[String]) -> Result<bool> {
    use x509_parser::prelude::*;

    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| AcmeError::crypto(format!("Failed to parse certificate: {}", e)))?;

    let mut cert_domains = Vec::new();
    if let Ok(Some(ext)) = cert.subject_alternative_name() {
        for san in &ext.value.general_names {
            if let GeneralName::DNSName(domain) = san {
                cert_domains.push((*domain).to_string());
            }
        }
    }

    Ok(expected_domains
        .iter()
        .all(|expected| cert_domains.iter().any(|d| d == expected)))
}
