//! Hashing and BIP-340 verification helpers

use k256::schnorr::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// Hash data using SHA256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash multiple pieces of data using SHA256
pub fn sha256_multi(data: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for d in data {
        hasher.update(d);
    }
    hasher.finalize().into()
}

/// Lowercase hex SHA256 digest
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Parse an x-only public key from 64 hex characters
pub fn parse_public_key(pubkey_hex: &str) -> Result<VerifyingKey> {
    let bytes = decode_hex_32(pubkey_hex)?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| CoreError::InvalidKey(format!("Invalid public key {}: {}", pubkey_hex, e)))
}

/// Check that a string is a well-formed x-only public key
pub fn is_valid_public_key(pubkey_hex: &str) -> bool {
    parse_public_key(pubkey_hex).is_ok()
}

/// Verify a BIP-340 signature over a 32-byte digest
pub fn verify_schnorr(pubkey_hex: &str, digest: &[u8; 32], sig_hex: &str) -> Result<()> {
    let verifying_key = parse_public_key(pubkey_hex)?;

    let sig_bytes = hex::decode(sig_hex)?;
    let signature = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| CoreError::InvalidSignature(format!("Malformed signature: {}", e)))?;

    verifying_key
        .verify_prehash(digest, &signature)
        .map_err(|_| CoreError::InvalidSignature("Signature verification failed".to_string()))
}

/// Decode exactly 32 bytes of hex
pub fn decode_hex_32(s: &str) -> Result<[u8; 32]> {
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(s, &mut bytes)?;
    Ok(bytes)
}
