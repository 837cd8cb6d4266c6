//! X.509 certificates and their public keys

use attest_core::crypto::sha256_hex;
use ed25519_dalek::pkcs8::DecodePublicKey as _;
use p256::pkcs8::DecodePublicKey as _;
use p384::pkcs8::DecodePublicKey as _;
use rsa::pkcs8::DecodePublicKey as _;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use crate::error::{IdentityError, Result};

/// id-ecPublicKey
pub const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// rsaEncryption
pub const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// id-Ed25519
pub const OID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// Public key taken from a certificate's SubjectPublicKeyInfo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertPublicKey {
    EcdsaP256(p256::ecdsa::VerifyingKey),
    EcdsaP384(p384::ecdsa::VerifyingKey),
    Rsa(Box<rsa::RsaPublicKey>),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl CertPublicKey {
    /// Parse a DER SubjectPublicKeyInfo
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        let spki = x509_cert::spki::SubjectPublicKeyInfoRef::from_der(der)
            .map_err(|e| IdentityError::InvalidCertificate(format!("Invalid SPKI: {}", e)))?;
        let oid = spki.algorithm.oid;

        if oid == OID_EC_PUBLIC_KEY {
            // The curve OID decides which parser accepts the key
            if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(der) {
                return Ok(CertPublicKey::EcdsaP256(key));
            }
            p384::ecdsa::VerifyingKey::from_public_key_der(der)
                .map(CertPublicKey::EcdsaP384)
                .map_err(|_| {
                    IdentityError::UnsupportedKeyType("ECDSA curve other than P-256 or P-384".to_string())
                })
        } else if oid == OID_RSA_ENCRYPTION {
            rsa::RsaPublicKey::from_public_key_der(der)
                .map(|key| CertPublicKey::Rsa(Box::new(key)))
                .map_err(|e| IdentityError::InvalidCertificate(format!("Invalid RSA key: {}", e)))
        } else if oid == OID_ED25519 {
            ed25519_dalek::VerifyingKey::from_public_key_der(der)
                .map(CertPublicKey::Ed25519)
                .map_err(|e| IdentityError::InvalidCertificate(format!("Invalid Ed25519 key: {}", e)))
        } else {
            Err(IdentityError::UnsupportedKeyType(format!("algorithm {}", oid)))
        }
    }

    /// Short algorithm name for logs and messages
    pub fn algorithm(&self) -> &'static str {
        match self {
            CertPublicKey::EcdsaP256(_) => "ECDSA P-256",
            CertPublicKey::EcdsaP384(_) => "ECDSA P-384",
            CertPublicKey::Rsa(_) => "RSA",
            CertPublicKey::Ed25519(_) => "Ed25519",
        }
    }
}

/// A parsed certificate together with its exact DER encoding
#[derive(Debug, Clone)]
pub struct SigningCertificate {
    der: Vec<u8>,
    certificate: Certificate,
}

impl SigningCertificate {
    /// Parse a DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let certificate = Certificate::from_der(der)
            .map_err(|e| IdentityError::InvalidCertificate(e.to_string()))?;
        Ok(Self {
            der: der.to_vec(),
            certificate,
        })
    }

    /// DER bytes exactly as loaded
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Lowercase hex SHA-256 of the DER encoding (SPKIFP)
    pub fn cert_hash(&self) -> String {
        cert_hash(&self.der)
    }

    /// Subject distinguished name
    pub fn subject(&self) -> String {
        self.certificate.tbs_certificate.subject.to_string()
    }

    /// The certificate's subject public key
    pub fn public_key(&self) -> Result<CertPublicKey> {
        let spki_der = self
            .certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| IdentityError::InvalidCertificate(format!("Invalid SPKI: {}", e)))?;
        CertPublicKey::from_spki_der(&spki_der)
    }
}

/// Lowercase hex SHA-256 of DER certificate bytes
pub fn cert_hash(der: &[u8]) -> String {
    sha256_hex(der)
}
