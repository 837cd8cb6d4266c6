//! Error types for certificate loading and identity proofs

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for identity operations
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors that can occur while loading certificates or handling proofs
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] attest_core::CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Java KeyStore detected; carries the conversion command
    #[error(
        "Java KeyStore files are not supported: {}\nConvert it to PKCS12 with:\n  {}",
        .path.display(),
        jks_conversion_command(.path)
    )]
    JavaKeyStore { path: PathBuf },

    /// PKCS12 container without a password
    #[error("A password is required to open PKCS12 file {0}")]
    MissingPassword(String),

    /// Unrecognised file extension
    #[error("Unsupported certificate file type: {0} (expected .p12, .pfx, .pem, .crt or .cer)")]
    UnsupportedFileType(String),

    /// No private key found for a certificate
    #[error("Private key not found: {0}")]
    PrivateKeyNotFound(String),

    /// No certificate found in a container
    #[error("Certificate not found: {0}")]
    CertificateNotFound(String),

    /// Private key does not belong to the certificate
    #[error("Private key does not match the certificate public key")]
    KeyMismatch,

    /// Key algorithm or curve not supported
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Certificate could not be parsed
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Private key could not be parsed
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// PKCS12 decoding failed (wrong password or corrupt file)
    #[error("PKCS12 error: {0}")]
    Pkcs12(String),

    /// Signature bytes are malformed
    #[error("Invalid signature encoding: {0}")]
    SignatureEncoding(String),

    /// Proof expires at or before its creation time
    #[error("Invalid expiry: expiry {expiry} is not after created_at {created_at}")]
    InvalidExpiry { created_at: u64, expiry: u64 },

    /// Target public key is not 64 hex characters
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Event does not carry a well-formed proof
    #[error("Malformed identity proof event: {0}")]
    MalformedProofEvent(String),

    /// Signing or verification failure
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl IdentityError {
    /// The keytool command that converts a Java KeyStore, if this is that error
    pub fn conversion_command(&self) -> Option<String> {
        match self {
            IdentityError::JavaKeyStore { path } => Some(jks_conversion_command(path)),
            _ => None,
        }
    }
}

fn jks_conversion_command(path: &Path) -> String {
    let target = path.with_extension("p12");
    format!(
        "keytool -importkeystore -srckeystore {} -destkeystore {} -deststoretype PKCS12",
        path.display(),
        target.display()
    )
}
