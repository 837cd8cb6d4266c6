//! Error types for event signers

use thiserror::Error;

/// Result type alias for signer operations
pub type Result<T> = std::result::Result<T, SignerError>;

/// Errors that can occur while creating or using a signer
#[derive(Debug, Error)]
pub enum SignerError {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] attest_core::CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection string not recognised
    #[error(
        "Invalid signing method '{0}': expected nsec1... (local key), npub1... (unsigned), \
         bunker://<pubkey>?relay=<url>&secret=<token> (remote signer), or browser (extension)"
    )]
    InvalidSigningMethod(String),

    /// Malformed bunker URL
    #[error("Invalid bunker URL: {0}")]
    InvalidBunkerUri(String),

    /// Could not reach a relay or remote signer
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Connection dropped while a request was outstanding
    #[error("Remote signer disconnected")]
    Disconnected,

    /// Remote side refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Timed out waiting for approval or a response
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Bridge returned a different number of events than requested
    #[error("Expected {expected} signed events, received {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// A signer returned data that breaks the signing protocol
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Browser bridge failure
    #[error("Browser bridge error: {0}")]
    Bridge(String),

    /// Cancelled by the caller
    #[error("Interrupted")]
    Interrupted,
}

impl SignerError {
    /// Whether the error is a cancellation rather than a failure
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SignerError::Interrupted)
    }
}

impl From<serde_json::Error> for SignerError {
    fn from(e: serde_json::Error) -> Self {
        SignerError::Serialization(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SignerError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SignerError::Connection(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_is_distinct() {
        assert!(SignerError::Interrupted.is_interrupted());
        assert!(!SignerError::Disconnected.is_interrupted());
        assert!(!SignerError::Timeout("approval".into()).is_interrupted());
    }

    #[test]
    fn test_invalid_method_lists_all_forms() {
        let message = SignerError::InvalidSigningMethod("ftp://x".into()).to_string();
        for form in ["nsec1", "npub1", "bunker://", "browser"] {
            assert!(message.contains(form), "{}", form);
        }
    }
}
