//! NIP-19 bech32 encoding of keys (`nsec1...`, `npub1...`)

use bech32::{Bech32, Hrp};

use crate::error::{CoreError, Result};

pub const NSEC_PREFIX: &str = "nsec";
pub const NPUB_PREFIX: &str = "npub";

fn encode(prefix: &str, data: &[u8; 32]) -> Result<String> {
    let hrp = Hrp::parse(prefix).map_err(|e| CoreError::InvalidBech32(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, data).map_err(|e| CoreError::InvalidBech32(e.to_string()))
}

fn decode(expected_prefix: &str, s: &str) -> Result<[u8; 32]> {
    let (hrp, data) = bech32::decode(s).map_err(|e| CoreError::InvalidBech32(e.to_string()))?;

    if hrp.as_str() != expected_prefix {
        return Err(CoreError::InvalidBech32(format!(
            "Expected {} prefix, got {}",
            expected_prefix,
            hrp.as_str()
        )));
    }

    data.as_slice().try_into().map_err(|_| {
        CoreError::InvalidBech32(format!("Expected 32 data bytes, got {}", data.len()))
    })
}

/// Encode a secret key as `nsec1...`
pub fn encode_nsec(secret: &[u8; 32]) -> Result<String> {
    encode(NSEC_PREFIX, secret)
}

/// Decode `nsec1...` to secret key bytes
pub fn decode_nsec(s: &str) -> Result<[u8; 32]> {
    decode(NSEC_PREFIX, s)
}

/// Encode an x-only public key as `npub1...`
pub fn encode_npub(pubkey: &[u8; 32]) -> Result<String> {
    encode(NPUB_PREFIX, pubkey)
}

/// Decode `npub1...` to public key bytes
pub fn decode_npub(s: &str) -> Result<[u8; 32]> {
    decode(NPUB_PREFIX, s)
}

/// Decode `npub1...` straight to lowercase hex
pub fn npub_to_hex(s: &str) -> Result<String> {
    Ok(hex::encode(decode_npub(s)?))
}
