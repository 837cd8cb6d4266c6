//! Error types for the attest core library

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid bech32 entity: {0}")]
    InvalidBech32(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Event id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}
