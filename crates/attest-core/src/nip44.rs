//! NIP-44 v2 payload encryption
//!
//! ECDH over secp256k1 (x coordinate only), HKDF-SHA256 key schedule,
//! ChaCha20 with padded plaintext, and HMAC-SHA256 over `nonce || ciphertext`.
//! Used as the envelope for remote-signing requests.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::decode_hex_32;
use crate::error::{CoreError, Result};
use crate::keys::Keys;

/// Payload version byte
pub const VERSION: u8 = 2;

/// Largest plaintext the padding scheme can carry
pub const MAX_PLAINTEXT_LEN: usize = 65535;

const SALT: &[u8] = b"nip44-v2";
const MIN_PAYLOAD_LEN: usize = 132;
const MAX_PAYLOAD_LEN: usize = 87472;
const MIN_DECODED_LEN: usize = 99;
const MAX_DECODED_LEN: usize = 65603;

/// Shared key between two parties, symmetric in its inputs
#[derive(Clone)]
pub struct ConversationKey(Zeroizing<[u8; 32]>);

impl ConversationKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

struct MessageKeys {
    chacha_key: Zeroizing<[u8; 32]>,
    chacha_nonce: [u8; 12],
    hmac_key: Zeroizing<[u8; 32]>,
}

/// Derive the conversation key between our secret and a peer's x-only public key
pub fn conversation_key(keys: &Keys, peer_pubkey_hex: &str) -> Result<ConversationKey> {
    let peer_x = decode_hex_32(peer_pubkey_hex)?;
    let mut sec1 = [0u8; 33];
    sec1[0] = 0x02;
    sec1[1..].copy_from_slice(&peer_x);

    let peer = k256::PublicKey::from_sec1_bytes(&sec1)
        .map_err(|e| CoreError::InvalidKey(format!("Invalid peer public key: {}", e)))?;

    let shared = k256::ecdh::diffie_hellman(keys.secret_key().to_nonzero_scalar(), peer.as_affine());
    let (prk, _) = Hkdf::<Sha256>::extract(Some(SALT), shared.raw_secret_bytes());

    let mut key = [0u8; 32];
    key.copy_from_slice(&prk);
    Ok(ConversationKey(Zeroizing::new(key)))
}

fn message_keys(conversation_key: &ConversationKey, nonce: &[u8; 32]) -> Result<MessageKeys> {
    let hkdf = Hkdf::<Sha256>::from_prk(conversation_key.as_bytes())
        .map_err(|e| CoreError::Encryption(format!("Invalid conversation key: {}", e)))?;

    let mut okm = Zeroizing::new([0u8; 76]);
    hkdf.expand(nonce, okm.as_mut())
        .map_err(|e| CoreError::Encryption(format!("Key expansion failed: {}", e)))?;

    let mut chacha_key = Zeroizing::new([0u8; 32]);
    let mut chacha_nonce = [0u8; 12];
    let mut hmac_key = Zeroizing::new([0u8; 32]);
    chacha_key.copy_from_slice(&okm[0..32]);
    chacha_nonce.copy_from_slice(&okm[32..44]);
    hmac_key.copy_from_slice(&okm[44..76]);

    Ok(MessageKeys {
        chacha_key,
        chacha_nonce,
        hmac_key,
    })
}

/// Padded length for a plaintext of the given size
pub fn calc_padded_len(unpadded_len: usize) -> usize {
    if unpadded_len <= 32 {
        return 32;
    }
    let next_power = 1usize << (usize::BITS - (unpadded_len - 1).leading_zeros());
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((unpadded_len - 1) / chunk + 1)
}

fn pad(plaintext: &[u8]) -> Result<Vec<u8>> {
    let len = plaintext.len();
    if len == 0 || len > MAX_PLAINTEXT_LEN {
        return Err(CoreError::Encryption(format!(
            "Plaintext length {} outside 1..={}",
            len, MAX_PLAINTEXT_LEN
        )));
    }

    let mut padded = Vec::with_capacity(2 + calc_padded_len(len));
    padded.extend_from_slice(&(len as u16).to_be_bytes());
    padded.extend_from_slice(plaintext);
    padded.resize(2 + calc_padded_len(len), 0);
    Ok(padded)
}

fn unpad(padded: &[u8]) -> Result<String> {
    if padded.len() < 2 {
        return Err(CoreError::Decryption("Padded plaintext too short".to_string()));
    }
    let len = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    if len == 0 || padded.len() != 2 + calc_padded_len(len) {
        return Err(CoreError::Decryption("Invalid padding".to_string()));
    }
    String::from_utf8(padded[2..2 + len].to_vec())
        .map_err(|_| CoreError::Decryption("Plaintext is not UTF-8".to_string()))
}

fn compute_mac(hmac_key: &[u8; 32], nonce: &[u8; 32], ciphertext: &[u8]) -> Result<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|e| CoreError::Encryption(format!("Invalid HMAC key: {}", e)))?;
    mac.update(nonce);
    mac.update(ciphertext);
    Ok(mac)
}

/// Encrypt with a random nonce
pub fn encrypt(conversation_key: &ConversationKey, plaintext: &str) -> Result<String> {
    let mut nonce = [0u8; 32];
    OsRng.fill_bytes(&mut nonce);
    encrypt_with_nonce(conversation_key, plaintext, &nonce)
}

/// Encrypt with a caller-chosen nonce
pub fn encrypt_with_nonce(
    conversation_key: &ConversationKey,
    plaintext: &str,
    nonce: &[u8; 32],
) -> Result<String> {
    let keys = message_keys(conversation_key, nonce)?;

    let mut ciphertext = pad(plaintext.as_bytes())?;
    let mut cipher = ChaCha20::new(
        chacha20::Key::from_slice(keys.chacha_key.as_ref()),
        chacha20::Nonce::from_slice(&keys.chacha_nonce),
    );
    cipher.apply_keystream(&mut ciphertext);

    let mac = compute_mac(&keys.hmac_key, nonce, &ciphertext)?.finalize().into_bytes();

    let mut payload = Vec::with_capacity(1 + 32 + ciphertext.len() + 32);
    payload.push(VERSION);
    payload.extend_from_slice(nonce);
    payload.extend_from_slice(&ciphertext);
    payload.extend_from_slice(&mac);

    Ok(BASE64.encode(payload))
}

/// Decrypt and authenticate a payload
pub fn decrypt(conversation_key: &ConversationKey, payload: &str) -> Result<String> {
    if payload.is_empty() || payload.starts_with('#') {
        return Err(CoreError::Decryption("Unsupported payload version".to_string()));
    }
    if !(MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN).contains(&payload.len()) {
        return Err(CoreError::Decryption(format!(
            "Invalid payload length: {}",
            payload.len()
        )));
    }

    let decoded = BASE64
        .decode(payload)
        .map_err(|e| CoreError::Decryption(format!("Invalid base64: {}", e)))?;
    if !(MIN_DECODED_LEN..=MAX_DECODED_LEN).contains(&decoded.len()) {
        return Err(CoreError::Decryption(format!(
            "Invalid decoded length: {}",
            decoded.len()
        )));
    }
    if decoded[0] != VERSION {
        return Err(CoreError::Decryption(format!(
            "Unknown version: {}",
            decoded[0]
        )));
    }

    let mut nonce = [0u8; 32];
    nonce.copy_from_slice(&decoded[1..33]);
    let (ciphertext, mac) = decoded[33..].split_at(decoded.len() - 33 - 32);

    let keys = message_keys(conversation_key, &nonce)?;
    compute_mac(&keys.hmac_key, &nonce, ciphertext)?
        .verify_slice(mac)
        .map_err(|_| CoreError::Decryption("Invalid MAC".to_string()))?;

    let mut plaintext = ciphertext.to_vec();
    let mut cipher = ChaCha20::new(
        chacha20::Key::from_slice(keys.chacha_key.as_ref()),
        chacha20::Nonce::from_slice(&keys.chacha_nonce),
    );
    cipher.apply_keystream(&mut plaintext);

    unpad(&plaintext)
}
