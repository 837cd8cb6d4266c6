//! Certificate private keys (ECDSA P-256/P-384, RSA, Ed25519)

use ed25519_dalek::pkcs8::DecodePrivateKey as _;
use p256::pkcs8::DecodePrivateKey as _;
use p384::pkcs8::DecodePrivateKey as _;
use rsa::pkcs1::DecodeRsaPrivateKey as _;
use rsa::pkcs8::DecodePrivateKey as _;
use x509_cert::der::Decode;

use crate::certificate::{CertPublicKey, OID_ED25519, OID_EC_PUBLIC_KEY, OID_RSA_ENCRYPTION};
use crate::error::{IdentityError, Result};

/// Private key that signs identity proofs
pub enum CertPrivateKey {
    EcdsaP256(p256::ecdsa::SigningKey),
    EcdsaP384(p384::ecdsa::SigningKey),
    Rsa(Box<rsa::RsaPrivateKey>),
    Ed25519(ed25519_dalek::SigningKey),
}

impl std::fmt::Debug for CertPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CertPrivateKey")
            .field(&self.algorithm())
            .finish()
    }
}

impl CertPrivateKey {
    /// Parse a PKCS#8 `PrivateKeyInfo`, dispatching on the algorithm OID
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = p256::pkcs8::PrivateKeyInfo::from_der(der)
            .map_err(|e| IdentityError::InvalidPrivateKey(format!("Invalid PKCS8: {}", e)))?;
        let oid = info.algorithm.oid;

        if oid == OID_EC_PUBLIC_KEY {
            if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
                return Ok(CertPrivateKey::EcdsaP256(key));
            }
            p384::ecdsa::SigningKey::from_pkcs8_der(der)
                .map(CertPrivateKey::EcdsaP384)
                .map_err(|_| {
                    IdentityError::UnsupportedKeyType("ECDSA curve other than P-256 or P-384".to_string())
                })
        } else if oid == OID_RSA_ENCRYPTION {
            rsa::RsaPrivateKey::from_pkcs8_der(der)
                .map(|key| CertPrivateKey::Rsa(Box::new(key)))
                .map_err(|e| IdentityError::InvalidPrivateKey(format!("Invalid RSA key: {}", e)))
        } else if oid == OID_ED25519 {
            ed25519_dalek::SigningKey::from_pkcs8_der(der)
                .map(CertPrivateKey::Ed25519)
                .map_err(|e| IdentityError::InvalidPrivateKey(format!("Invalid Ed25519 key: {}", e)))
        } else {
            Err(IdentityError::UnsupportedKeyType(format!("algorithm {}", oid)))
        }
    }

    /// Parse a PKCS#1 `RSAPrivateKey`
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self> {
        rsa::RsaPrivateKey::from_pkcs1_der(der)
            .map(|key| CertPrivateKey::Rsa(Box::new(key)))
            .map_err(|e| IdentityError::InvalidPrivateKey(format!("Invalid PKCS1 key: {}", e)))
    }

    /// Parse a SEC1 `ECPrivateKey`
    pub fn from_sec1_der(der: &[u8]) -> Result<Self> {
        if let Ok(secret) = p256::SecretKey::from_sec1_der(der) {
            return Ok(CertPrivateKey::EcdsaP256(secret.into()));
        }
        let secret = p384::SecretKey::from_sec1_der(der).map_err(|_| {
            IdentityError::UnsupportedKeyType("SEC1 key is not on P-256 or P-384".to_string())
        })?;
        Ok(CertPrivateKey::EcdsaP384(secret.into()))
    }

    /// Parse a decoded PEM block by its label
    pub fn from_pem_block(label: &str, der: &[u8]) -> Result<Self> {
        match label {
            "PRIVATE KEY" => Self::from_pkcs8_der(der),
            "RSA PRIVATE KEY" => Self::from_pkcs1_der(der),
            "EC PRIVATE KEY" => Self::from_sec1_der(der),
            "ENCRYPTED PRIVATE KEY" => Err(IdentityError::UnsupportedKeyType(
                "encrypted PEM private key; decrypt it or use a PKCS12 file".to_string(),
            )),
            other => Err(IdentityError::InvalidPrivateKey(format!(
                "Unexpected PEM block: {}",
                other
            ))),
        }
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            CertPrivateKey::EcdsaP256(_) => "ECDSA P-256",
            CertPrivateKey::EcdsaP384(_) => "ECDSA P-384",
            CertPrivateKey::Rsa(_) => "RSA",
            CertPrivateKey::Ed25519(_) => "Ed25519",
        }
    }

    /// The matching public key
    pub fn public_key(&self) -> CertPublicKey {
        match self {
            CertPrivateKey::EcdsaP256(key) => {
                CertPublicKey::EcdsaP256(p256::ecdsa::VerifyingKey::from(key))
            }
            CertPrivateKey::EcdsaP384(key) => {
                CertPublicKey::EcdsaP384(p384::ecdsa::VerifyingKey::from(key))
            }
            CertPrivateKey::Rsa(key) => CertPublicKey::Rsa(Box::new(key.to_public_key())),
            CertPrivateKey::Ed25519(key) => CertPublicKey::Ed25519(key.verifying_key()),
        }
    }
}

/// Whether a PEM label names a private key
pub(crate) fn is_private_key_label(label: &str) -> bool {
    label.ends_with("PRIVATE KEY")
}
