//! BIP-340 key pairs used to author events

use std::fmt;

use k256::schnorr::SigningKey;
use k256::SecretKey;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};
use crate::event::Event;
use crate::nip19;

/// secp256k1 key pair for signing events
#[derive(Clone)]
pub struct Keys {
    secret: SecretKey,
    signing_key: SigningKey,
}

impl Keys {
    /// Generate a fresh random key pair
    pub fn generate() -> Self {
        loop {
            let secret = SecretKey::random(&mut OsRng);
            if let Ok(keys) = Self::from_secret_key(secret) {
                return keys;
            }
        }
    }

    /// Create from 32 raw secret bytes
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| CoreError::InvalidKey(format!("Invalid secret key: {}", e)))?;
        Self::from_secret_key(secret)
    }

    /// Create from a 64-character hex secret
    pub fn from_secret_hex(s: &str) -> Result<Self> {
        let bytes = Zeroizing::new(crate::crypto::decode_hex_32(s)?);
        Self::from_secret_bytes(&bytes)
    }

    /// Create from a bech32 `nsec1...` string
    pub fn parse_nsec(nsec: &str) -> Result<Self> {
        let bytes = Zeroizing::new(nip19::decode_nsec(nsec)?);
        Self::from_secret_bytes(&bytes)
    }

    fn from_secret_key(secret: SecretKey) -> Result<Self> {
        let signing_key = SigningKey::from_bytes(&secret.to_bytes())
            .map_err(|e| CoreError::InvalidKey(format!("Invalid signing key: {}", e)))?;
        Ok(Self {
            secret,
            signing_key,
        })
    }

    /// X-only public key as lowercase hex
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// X-only public key bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes().into()
    }

    /// Secret key bytes (for ECDH and re-encoding)
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes().into())
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Encode the secret key as `nsec1...`
    pub fn to_nsec(&self) -> Result<String> {
        nip19::encode_nsec(&self.secret_bytes())
    }

    /// Encode the public key as `npub1...`
    pub fn to_npub(&self) -> Result<String> {
        nip19::encode_npub(&self.public_key_bytes())
    }

    /// Sign a 32-byte digest, returning the signature as hex
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<String> {
        let mut aux_rand = [0u8; 32];
        OsRng.fill_bytes(&mut aux_rand);

        let signature = self
            .signing_key
            .sign_prehash_with_aux_rand(digest, &aux_rand)
            .map_err(|e| CoreError::InvalidSignature(format!("Signing failed: {}", e)))?;

        Ok(hex::encode(signature.to_bytes()))
    }

    /// Stamp the author, compute the id, and sign an event in place
    pub fn sign_event(&self, event: &mut Event) -> Result<()> {
        event.pubkey = self.public_key_hex();
        let id = event.finalize_id()?;
        event.sig = self.sign_digest(&id)?;
        Ok(())
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds;

    #[test]
    fn test_nsec_roundtrip() {
        let keys = Keys::generate();
        let nsec = keys.to_nsec().unwrap();
        assert!(nsec.starts_with("nsec1"));

        let parsed = Keys::parse_nsec(&nsec).unwrap();
        assert_eq!(keys.public_key_hex(), parsed.public_key_hex());
    }

    #[test]
    fn test_sign_event_produces_verifiable_event() {
        let keys = Keys::generate();
        let mut event = Event::new(kinds::RELEASE, "notes", vec![vec!["d".into(), "app@1.0".into()]]);
        event.created_at = 1_700_000_000;

        keys.sign_event(&mut event).unwrap();

        assert_eq!(event.pubkey, keys.public_key_hex());
        assert!(event.is_signed());
        event.verify().unwrap();
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let keys = Keys::from_secret_bytes(&[0x11; 32]).unwrap();
        let debug = format!("{:?}", keys);
        assert!(!debug.contains(&hex::encode([0x11u8; 32])));
    }
}
