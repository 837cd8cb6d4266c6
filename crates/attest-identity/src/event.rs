//! Mapping between identity proofs and kind 30509 events

use std::fmt;
use std::str::FromStr;

use attest_core::{kinds, Event};
use serde::{Deserialize, Serialize};

use crate::certificate::SigningCertificate;
use crate::error::{IdentityError, Result};
use crate::proof::{verify_proof_at, IdentityProof, VerificationResult};

pub const CERT_HASH_TAG: &str = "d";
pub const SIGNATURE_TAG: &str = "signature";
pub const EXPIRY_TAG: &str = "expiry";
pub const REVOKED_TAG: &str = "revoked";

/// Why a proof was revoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevocationReason {
    KeyCompromised,
    KeyRetired,
    Superseded,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::KeyCompromised => "key-compromised",
            RevocationReason::KeyRetired => "key-retired",
            RevocationReason::Superseded => "superseded",
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevocationReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "key-compromised" => Ok(RevocationReason::KeyCompromised),
            "key-retired" => Ok(RevocationReason::KeyRetired),
            "superseded" => Ok(RevocationReason::Superseded),
            other => Err(format!(
                "unknown revocation reason '{}' (expected key-compromised, key-retired or superseded)",
                other
            )),
        }
    }
}

impl IdentityProof {
    /// Unsigned proof event; `created_at` is the proof's own timestamp
    pub fn to_event(&self, pubkey_hex: &str) -> Event {
        let mut event = Event::new(
            kinds::IDENTITY_PROOF,
            "",
            vec![
                vec![CERT_HASH_TAG.to_string(), self.cert_hash.clone()],
                vec![SIGNATURE_TAG.to_string(), self.signature.clone()],
                vec![EXPIRY_TAG.to_string(), self.expiry.to_string()],
            ],
        );
        event.pubkey = pubkey_hex.to_string();
        event.created_at = self.created_at;
        event
    }

    /// Proof event that also marks the proof revoked
    pub fn to_revoked_event(&self, pubkey_hex: &str, reason: RevocationReason) -> Event {
        let mut event = self.to_event(pubkey_hex);
        event.push_tag([REVOKED_TAG, reason.as_str()]);
        event
    }

    /// Read a proof back from its event
    pub fn from_event(event: &Event) -> Result<Self> {
        if event.kind != kinds::IDENTITY_PROOF {
            return Err(IdentityError::MalformedProofEvent(format!(
                "expected kind {}, got {}",
                kinds::IDENTITY_PROOF,
                event.kind
            )));
        }

        let missing: Vec<&str> = [CERT_HASH_TAG, SIGNATURE_TAG, EXPIRY_TAG]
            .into_iter()
            .filter(|name| event.tag_value(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(IdentityError::MalformedProofEvent(format!(
                "missing tags: {}",
                missing.join(", ")
            )));
        }

        let cert_hash = event.tag_value(CERT_HASH_TAG).unwrap_or_default();
        let signature = event.tag_value(SIGNATURE_TAG).unwrap_or_default();
        let expiry = event
            .tag_value(EXPIRY_TAG)
            .unwrap_or_default()
            .parse::<u64>()
            .map_err(|e| IdentityError::MalformedProofEvent(format!("invalid expiry: {}", e)))?;

        Ok(Self {
            cert_hash: cert_hash.to_string(),
            signature: signature.to_string(),
            created_at: event.created_at,
            expiry,
        })
    }
}

/// Unsigned revocation event for a certificate hash
pub fn revocation_event(cert_hash: &str, reason: RevocationReason) -> Event {
    Event::new(
        kinds::IDENTITY_PROOF,
        "",
        vec![
            vec![CERT_HASH_TAG.to_string(), cert_hash.to_ascii_lowercase()],
            vec![REVOKED_TAG.to_string(), reason.as_str().to_string()],
        ],
    )
}

/// Parse and verify a proof event
pub fn verify_identity_event(
    event: &Event,
    certificate: Option<&SigningCertificate>,
    pubkey_hex: &str,
) -> Result<VerificationResult> {
    verify_identity_event_at(event, certificate, pubkey_hex, Event::now())
}

/// Parse and verify a proof event at a given time
///
/// A bare revocation (no proof tags) still reports `revoked`.
pub fn verify_identity_event_at(
    event: &Event,
    certificate: Option<&SigningCertificate>,
    pubkey_hex: &str,
    now: u64,
) -> Result<VerificationResult> {
    let revoke_tag = event.tags_named(REVOKED_TAG).next();

    let proof = match IdentityProof::from_event(event) {
        Ok(proof) => proof,
        Err(IdentityError::MalformedProofEvent(reason))
            if revoke_tag.is_some() && event.kind == kinds::IDENTITY_PROOF =>
        {
            return Ok(VerificationResult {
                revoked: true,
                revoke_reason: revoke_tag.and_then(|tag| tag.get(1)).cloned(),
                cert_hash_match: match (certificate, event.tag_value(CERT_HASH_TAG)) {
                    (Some(cert), Some(hash)) => cert.cert_hash() == hash.to_ascii_lowercase(),
                    _ => false,
                },
                error: Some(reason),
                ..Default::default()
            });
        }
        Err(e) => return Err(e),
    };

    verify_proof_at(&proof, event, pubkey_hex, certificate, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::{generate_proof_at, ProofOptions};
    use crate::testing::{self, FixtureKeyType};

    const PUBKEY: &str = "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e";
    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_event_tags() {
        let proof = IdentityProof {
            cert_hash: "ab".repeat(32),
            signature: "c2lnbmF0dXJl".into(),
            created_at: NOW,
            expiry: NOW + 100,
        };
        let event = proof.to_event(PUBKEY);

        assert_eq!(event.kind, kinds::IDENTITY_PROOF);
        assert_eq!(event.created_at, NOW);
        assert_eq!(event.tag_value("d"), Some(proof.cert_hash.as_str()));
        assert_eq!(event.tag_value("signature"), Some("c2lnbmF0dXJl"));
        assert_eq!(event.tag_value("expiry"), Some("1700000100"));
        assert_eq!(IdentityProof::from_event(&event).unwrap(), proof);
    }

    #[test]
    fn test_revocation_reason_strings() {
        for reason in [
            RevocationReason::KeyCompromised,
            RevocationReason::KeyRetired,
            RevocationReason::Superseded,
        ] {
            assert_eq!(reason.as_str().parse::<RevocationReason>().unwrap(), reason);
        }
        assert!("lost".parse::<RevocationReason>().is_err());
    }

    #[test]
    fn test_revoked_proof_reports_reason() {
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

        let event = proof.to_revoked_event(PUBKEY, RevocationReason::KeyCompromised);
        assert_eq!(event.tag_value("d"), Some(cert.cert_hash().as_str()));

        let result = verify_identity_event_at(&event, Some(&cert), PUBKEY, NOW).unwrap();
        assert!(result.revoked);
        assert_eq!(result.revoke_reason.as_deref(), Some("key-compromised"));
        assert!(result.valid_signature);
    }

    #[test]
    fn test_bare_revocation_event() {
        let fixture = testing::fixture(FixtureKeyType::EcdsaP256);
        let cert = fixture.certificate();
        let mut event = revocation_event(&cert.cert_hash(), RevocationReason::Superseded);
        event.created_at = NOW;

        let result = verify_identity_event_at(&event, Some(&cert), PUBKEY, NOW).unwrap();
        assert!(result.revoked);
        assert!(result.cert_hash_match);
        assert!(!result.valid_signature);
        assert_eq!(result.revoke_reason.as_deref(), Some("superseded"));
        assert!(result.error.unwrap().contains("signature"));
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let event = Event::new(kinds::RELEASE, "", vec![]);
        assert!(matches!(
            verify_identity_event(&event, None, PUBKEY),
            Err(IdentityError::MalformedProofEvent(_))
        ));
    }

    #[test]
    fn test_unknown_revocation_reason_is_preserved() {
        let proof = IdentityProof {
            cert_hash: "ab".repeat(32),
            signature: String::new(),
            created_at: NOW,
            expiry: NOW + 100,
        };
        let mut event = proof.to_event(PUBKEY);
        event.push_tag(["revoked", "lost-laptop"]);

        let result = verify_identity_event_at(&event, None, PUBKEY, NOW).unwrap();
        assert!(result.revoked);
        assert_eq!(result.revoke_reason.as_deref(), Some("lost-laptop"));
    }
}
