//! NIP-C1 identity proofs
//!
//! A proof is a signature by a code-signing key over
//!
//! ```text
//! Verifying at {created_at} until {expiry} that I control the following Nostr public key: {pubkey}
//! ```
//!
//! The timestamps are part of the signed bytes, so a proof cannot be
//! replayed with a different validity window.

use std::time::Duration;

use attest_core::crypto::sha256;
use attest_core::Event;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::{Pkcs1v15Sign, Pss};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::certificate::{CertPublicKey, SigningCertificate};
use crate::error::{IdentityError, Result};
use crate::event::REVOKED_TAG;
use crate::keys::CertPrivateKey;

/// Default proof lifetime
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A certificate-to-pubkey binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProof {
    /// SHA-256 of the certificate DER (hex)
    pub cert_hash: String,
    /// Base64 signature over the proof message
    pub signature: String,
    pub created_at: u64,
    pub expiry: u64,
}

impl IdentityProof {
    /// Expired strictly after the expiry second
    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.expiry
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Event::now())
    }

    /// The exact message this proof signs for `pubkey_hex`
    pub fn message(&self, pubkey_hex: &str) -> String {
        proof_message(self.created_at, self.expiry, pubkey_hex)
    }
}

/// Proof generation options
#[derive(Debug, Clone)]
pub struct ProofOptions {
    pub expiry: Duration,
}

impl Default for ProofOptions {
    fn default() -> Self {
        Self {
            expiry: DEFAULT_EXPIRY,
        }
    }
}

impl ProofOptions {
    pub fn with_expiry_days(days: u64) -> Self {
        Self {
            expiry: Duration::from_secs(days * 24 * 60 * 60),
        }
    }
}

/// Outcome of verifying a proof; never persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub valid_signature: bool,
    pub cert_hash_match: bool,
    pub expired: bool,
    pub revoked: bool,
    pub revoke_reason: Option<String>,
    pub error: Option<String>,
}

/// Build the signed message
pub fn proof_message(created_at: u64, expiry: u64, pubkey_hex: &str) -> String {
    format!(
        "Verifying at {} until {} that I control the following Nostr public key: {}",
        created_at, expiry, pubkey_hex
    )
}

fn check_pubkey_hex(pubkey_hex: &str) -> Result<()> {
    if pubkey_hex.len() != 64 || !pubkey_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(IdentityError::InvalidPublicKey(format!(
            "expected 64 hex characters, got '{}'",
            pubkey_hex
        )));
    }
    Ok(())
}

/// Generate a proof starting now
pub fn generate_proof(
    key: &CertPrivateKey,
    cert_hash: &str,
    pubkey_hex: &str,
    options: &ProofOptions,
) -> Result<IdentityProof> {
    generate_proof_at(key, cert_hash, pubkey_hex, options, Event::now())
}

/// Generate a proof with an explicit creation time
pub fn generate_proof_at(
    key: &CertPrivateKey,
    cert_hash: &str,
    pubkey_hex: &str,
    options: &ProofOptions,
    created_at: u64,
) -> Result<IdentityProof> {
    check_pubkey_hex(pubkey_hex)?;

    let expiry = created_at.saturating_add(options.expiry.as_secs());
    if expiry <= created_at {
        return Err(IdentityError::InvalidExpiry { created_at, expiry });
    }

    let message = proof_message(created_at, expiry, pubkey_hex);
    let signature = sign_message(key, message.as_bytes())?;
    debug!("Generated {} identity proof for {}", key.algorithm(), pubkey_hex);

    Ok(IdentityProof {
        cert_hash: cert_hash.to_ascii_lowercase(),
        signature: BASE64.encode(signature),
        created_at,
        expiry,
    })
}

fn sign_message(key: &CertPrivateKey, message: &[u8]) -> Result<Vec<u8>> {
    match key {
        CertPrivateKey::EcdsaP256(key) => {
            use p256::ecdsa::signature::hazmat::PrehashSigner;
            let signature: p256::ecdsa::Signature = key
                .sign_prehash(&sha256(message))
                .map_err(|e| IdentityError::Crypto(format!("ECDSA signing failed: {}", e)))?;
            Ok(signature.to_der().as_bytes().to_vec())
        }
        CertPrivateKey::EcdsaP384(key) => {
            use p384::ecdsa::signature::hazmat::PrehashSigner;
            let signature: p384::ecdsa::Signature = key
                .sign_prehash(&sha256(message))
                .map_err(|e| IdentityError::Crypto(format!("ECDSA signing failed: {}", e)))?;
            Ok(signature.to_der().as_bytes().to_vec())
        }
        CertPrivateKey::Rsa(key) => key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &sha256(message))
            .map_err(|e| IdentityError::Crypto(format!("RSA signing failed: {}", e))),
        CertPrivateKey::Ed25519(key) => {
            use ed25519_dalek::Signer;
            Ok(key.sign(message).to_bytes().to_vec())
        }
    }
}

/// RSA padding schemes tried in order
#[derive(Debug, Clone, Copy)]
enum RsaScheme {
    Pkcs1v15,
    Pss,
}

const RSA_VERIFY_ORDER: [RsaScheme; 2] = [RsaScheme::Pkcs1v15, RsaScheme::Pss];

/// Verify a raw signature over `message` with a certificate public key
pub fn verify_signature(key: &CertPublicKey, message: &[u8], signature: &[u8]) -> Result<()> {
    match key {
        CertPublicKey::EcdsaP256(key) => {
            use p256::ecdsa::signature::hazmat::PrehashVerifier;
            let signature = p256::ecdsa::Signature::from_der(signature)
                .map_err(|e| IdentityError::SignatureEncoding(format!("ECDSA: {}", e)))?;
            key.verify_prehash(&sha256(message), &signature)
                .map_err(|_| IdentityError::Crypto("ECDSA signature verification failed".to_string()))
        }
        CertPublicKey::EcdsaP384(key) => {
            use p384::ecdsa::signature::hazmat::PrehashVerifier;
            let signature = p384::ecdsa::Signature::from_der(signature)
                .map_err(|e| IdentityError::SignatureEncoding(format!("ECDSA: {}", e)))?;
            key.verify_prehash(&sha256(message), &signature)
                .map_err(|_| IdentityError::Crypto("ECDSA signature verification failed".to_string()))
        }
        CertPublicKey::Rsa(key) => {
            let digest = sha256(message);
            let verified = RSA_VERIFY_ORDER.iter().any(|scheme| {
                let outcome = match scheme {
                    RsaScheme::Pkcs1v15 => key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature),
                    RsaScheme::Pss => key.verify(Pss::new::<Sha256>(), &digest, signature),
                };
                outcome.is_ok()
            });
            if verified {
                Ok(())
            } else {
                Err(IdentityError::Crypto("RSA signature verification failed".to_string()))
            }
        }
        CertPublicKey::Ed25519(key) => {
            use ed25519_dalek::Verifier;
            let signature = ed25519_dalek::Signature::from_slice(signature)
                .map_err(|e| IdentityError::SignatureEncoding(format!("Ed25519: {}", e)))?;
            key.verify(message, &signature)
                .map_err(|_| IdentityError::Crypto("Ed25519 signature verification failed".to_string()))
        }
    }
}

/// Verify a proof against a certificate, now
pub fn verify_proof(
    proof: &IdentityProof,
    event: &Event,
    pubkey_hex: &str,
    certificate: Option<&SigningCertificate>,
) -> Result<VerificationResult> {
    verify_proof_at(proof, event, pubkey_hex, certificate, Event::now())
}

/// Verify a proof against a certificate at a given time
///
/// Expiry, hash match and revocation are reported as fields; only a
/// structurally impossible expiry is an error.
pub fn verify_proof_at(
    proof: &IdentityProof,
    event: &Event,
    pubkey_hex: &str,
    certificate: Option<&SigningCertificate>,
    now: u64,
) -> Result<VerificationResult> {
    let mut result = evaluate(proof, event, now)?;

    let Some(certificate) = certificate else {
        result.error = Some("No certificate supplied; signature cannot be checked".to_string());
        return Ok(result);
    };

    result.cert_hash_match = certificate.cert_hash() == proof.cert_hash.to_ascii_lowercase();

    match certificate.public_key() {
        Ok(key) => check_signature(&mut result, proof, pubkey_hex, &key),
        Err(e) => result.error = Some(e.to_string()),
    }
    Ok(result)
}

/// Verify a proof with a bare public key
///
/// Without the certificate the hash binding cannot be confirmed, so
/// `cert_hash_match` is always false.
pub fn verify_proof_with_key(
    proof: &IdentityProof,
    event: &Event,
    pubkey_hex: &str,
    key: &CertPublicKey,
    now: u64,
) -> Result<VerificationResult> {
    let mut result = evaluate(proof, event, now)?;
    check_signature(&mut result, proof, pubkey_hex, key);
    Ok(result)
}

fn evaluate(proof: &IdentityProof, event: &Event, now: u64) -> Result<VerificationResult> {
    if proof.expiry <= event.created_at {
        return Err(IdentityError::InvalidExpiry {
            created_at: event.created_at,
            expiry: proof.expiry,
        });
    }

    let revoke_tag = event.tags_named(REVOKED_TAG).next();
    Ok(VerificationResult {
        expired: proof.is_expired_at(now),
        revoked: revoke_tag.is_some(),
        revoke_reason: revoke_tag.and_then(|tag| tag.get(1)).cloned(),
        ..Default::default()
    })
}

fn check_signature(
    result: &mut VerificationResult,
    proof: &IdentityProof,
    pubkey_hex: &str,
    key: &CertPublicKey,
) {
    let signature = match BASE64.decode(&proof.signature) {
        Ok(bytes) => bytes,
        Err(e) => {
            result.error = Some(IdentityError::SignatureEncoding(format!("base64: {}", e)).to_string());
            return;
        }
    };

    let message = proof.message(pubkey_hex);
    match verify_signature(key, message.as_bytes(), &signature) {
        Ok(()) => result.valid_signature = true,
        Err(e) => result.error = Some(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FixtureKeyType};

    const PUBKEY: &str = "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e";
    const NOW: u64 = 1_700_000_000;

    fn proof_event(proof: &IdentityProof) -> Event {
        proof.to_event(PUBKEY)
    }

    #[test]
    fn test_message_format() {
        assert_eq!(
            proof_message(1, 2, "ab"),
            "Verifying at 1 until 2 that I control the following Nostr public key: ab"
        );
    }

    #[test]
    fn test_roundtrip_all_key_types() {
        for key_type in FixtureKeyType::ALL {
            let fixture = testing::fixture(key_type);
            let cert = fixture.certificate();
            let proof = generate_proof_at(
                &fixture.private_key(),
                &cert.cert_hash(),
                PUBKEY,
                &ProofOptions::default(),
                NOW,
            )
            .unwrap();

            let result = verify_proof_at(&proof, &proof_event(&proof), PUBKEY, Some(&cert), NOW).unwrap();
            assert!(result.valid_signature, "{:?}: {:?}", key_type, result.error);
            assert!(result.cert_hash_match);
            assert!(!result.expired);
            assert!(!result.revoked);
        }
    }

    #[test]
    fn test_rsa_pss_signatures_verify() {
        let fixture = testing::fixture(FixtureKeyType::Rsa);
        let cert = fixture.certificate();
        let CertPrivateKey::Rsa(key) = fixture.private_key() else {
            panic!("expected RSA key");
        };

        let message = proof_message(NOW, NOW + 60, PUBKEY);
        let signature = key
            .sign_with_rng(&mut rand::rngs::OsRng, Pss::new::<Sha256>(), &sha256(message.as_bytes()))
            .unwrap();
        let proof = IdentityProof {
            cert_hash: cert.cert_hash(),
            signature: BASE64.encode(signature),
            created_at: NOW,
            expiry: NOW + 60,
        };

        let result = verify_proof_at(&proof, &proof_event(&proof), PUBKEY, Some(&cert), NOW).unwrap();
        assert!(result.valid_signature, "{:?}", result.error);
    }

    #[test]
    fn test_tampering_invalidates_signature() {
        let fixture = testing::fixture(FixtureKeyType::EcdsaP256);
        let cert = fixture.certificate();
        let proof = generate_proof_at(
            &fixture.private_key(),
            &cert.cert_hash(),
            PUBKEY,
            &ProofOptions::default(),
            NOW,
        )
        .unwrap();

        let mut later = proof.clone();
        later.expiry += 1;
        let result = verify_proof_at(&later, &proof_event(&later), PUBKEY, Some(&cert), NOW).unwrap();
        assert!(!result.valid_signature);
        assert!(result.error.is_some());

        let mut earlier = proof.clone();
        earlier.created_at -= 1;
        let result = verify_proof_at(&earlier, &proof_event(&earlier), PUBKEY, Some(&cert), NOW).unwrap();
        assert!(!result.valid_signature);

        let other_key = "ff".repeat(32);
        let result = verify_proof_at(&proof, &proof_event(&proof), &other_key, Some(&cert), NOW).unwrap();
        assert!(!result.valid_signature);
    }

    #[test]
    fn test_expiry_boundary() {
        let proof = IdentityProof {
            cert_hash: "00".repeat(32),
            signature: String::new(),
            created_at: NOW,
            expiry: NOW + 10,
        };
        assert!(!proof.is_expired_at(NOW + 9));
        assert!(!proof.is_expired_at(NOW + 10));
        assert!(proof.is_expired_at(NOW + 11));
    }

    #[test]
    fn test_expired_proof_keeps_valid_signature() {
        let fixture = testing::fixture(FixtureKeyType::Ed25519);
        let cert = fixture.certificate();
        let proof = generate_proof_at(
            &fixture.private_key(),
            &cert.cert_hash(),
            PUBKEY,
            &ProofOptions::with_expiry_days(1),
            NOW,
        )
        .unwrap();

        let result = verify_proof_at(&proof, &proof_event(&proof), PUBKEY, Some(&cert), NOW + 2 * 86_400).unwrap();
        assert!(result.expired);
        assert!(result.valid_signature);
    }

    #[test]
    fn test_expiry_before_event_timestamp_is_error() {
        let proof = IdentityProof {
            cert_hash: "00".repeat(32),
            signature: String::new(),
            created_at: NOW,
            expiry: NOW,
        };
        let event = proof.to_event(PUBKEY);
        assert!(matches!(
            verify_proof_at(&proof, &event, PUBKEY, None, NOW),
            Err(IdentityError::InvalidExpiry { .. })
        ));
    }

    #[test]
    fn test_other_certificate_hash_mismatch() {
        let fixture = testing::fixture(FixtureKeyType::EcdsaP256);
        let other = testing::fixture(FixtureKeyType::EcdsaP256).certificate();
        let proof = generate_proof_at(
            &fixture.private_key(),
            &fixture.certificate().cert_hash(),
            PUBKEY,
            &ProofOptions::default(),
            NOW,
        )
        .unwrap();

        let result = verify_proof_at(&proof, &proof_event(&proof), PUBKEY, Some(&other), NOW).unwrap();
        assert!(!result.cert_hash_match);
        assert!(!result.valid_signature);
    }

    #[test]
    fn test_pubkey_only_verification() {
        let fixture = testing::fixture(FixtureKeyType::EcdsaP256);
        let cert = fixture.certificate();
        let proof = generate_proof_at(
            &fixture.private_key(),
            &cert.cert_hash(),
            PUBKEY,
            &ProofOptions::default(),
            NOW,
        )
        .unwrap();

        let key = cert.public_key().unwrap();
        let result = verify_proof_with_key(&proof, &proof_event(&proof), PUBKEY, &key, NOW).unwrap();
        assert!(result.valid_signature);
        assert!(!result.cert_hash_match);

        let no_cert = verify_proof_at(&proof, &proof_event(&proof), PUBKEY, None, NOW).unwrap();
        assert!(!no_cert.valid_signature);
        assert!(no_cert.error.is_some());
    }

    #[test]
    fn test_invalid_target_pubkey() {
        let fixture = testing::fixture(FixtureKeyType::Ed25519);
        assert!(matches!(
            generate_proof(&fixture.private_key(), "00", "npub1xyz", &ProofOptions::default()),
            Err(IdentityError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_zero_expiry_rejected() {
        let fixture = testing::fixture(FixtureKeyType::Ed25519);
        let options = ProofOptions {
            expiry: Duration::from_secs(0),
        };
        assert!(matches!(
            generate_proof(&fixture.private_key(), "00", PUBKEY, &options),
            Err(IdentityError::InvalidExpiry { .. })
        ));
    }
}
