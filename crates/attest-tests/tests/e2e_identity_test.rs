//! End-to-end identity proof tests
//!
//! Certificate on disk -> proof event signed by a Nostr key -> verification,
//! including revocation of a previously published proof.

use attest_cli::{Cli, Outcome};
use attest_core::{kinds, Event, Keys};
use attest_identity::testing::{self, FixtureKeyType};
use attest_identity::{
    cert_hash, generate_proof, generate_proof_at, load_signing_identity, verify_identity_event, IdentityProof,
    ProofOptions, RevocationReason,
};
use attest_signer::{CancellationToken, LocalKeySigner, Signer};
use clap::Parser;
use std::path::Path;
use std::time::Duration;

/// Proof event for `cert_path` signed by `signer`
async fn publish_proof(signer: &dyn Signer, cert_path: &Path) -> Event {
    let cancel = CancellationToken::new();
    let identity = load_signing_identity(cert_path, None).unwrap();
    let pubkey = signer.public_key_hex(&cancel).await.unwrap();

    let proof = generate_proof(
        &identity.private_key,
        &identity.cert_hash(),
        &pubkey,
        &ProofOptions::default(),
    )
    .unwrap();
    let mut event = proof.to_event(&pubkey);
    signer.sign(&mut event, &cancel).await.unwrap();
    event
}

/// Helper to run the CLI with a throwaway config and a local key
async fn run_cli(config: &Path, nsec: &str, args: Vec<String>) -> Outcome {
    let mut argv = vec![
        "attest".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--sign-with".to_string(),
        nsec.to_string(),
    ];
    argv.extend(args);
    attest_cli::run(Cli::try_parse_from(argv).unwrap(), CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_generate_and_verify_ecdsa_proof() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = testing::fixture(FixtureKeyType::EcdsaP256);
    let cert_path = fixture.write_pem_pair(dir.path(), "release");

    let keys = Keys::generate();
    let pubkey = keys.public_key_hex();
    let signer = LocalKeySigner::new(keys);

    let event = publish_proof(&signer, &cert_path).await;
    event.verify().unwrap();
    assert_eq!(event.kind, kinds::IDENTITY_PROOF);
    assert_eq!(event.tag_value("d"), Some(cert_hash(&fixture.cert_der).as_str()));

    let result = verify_identity_event(&event, Some(&fixture.certificate()), &pubkey).unwrap();
    assert!(result.valid_signature);
    assert!(result.cert_hash_match);
    assert!(!result.expired);
    assert!(!result.revoked);
    assert!(result.error.is_none());

    // The proof binds one key only
    let other = Keys::generate().public_key_hex();
    let result = verify_identity_event(&event, Some(&fixture.certificate()), &other).unwrap();
    assert!(!result.valid_signature);
}

#[tokio::test]
async fn test_revoked_proof_supersedes_valid_one() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = testing::fixture(FixtureKeyType::Ed25519);
    let cert_path = fixture.write_combined_pem(dir.path(), "release.pem");

    let keys = Keys::generate();
    let pubkey = keys.public_key_hex();
    let signer = LocalKeySigner::new(keys);
    let cancel = CancellationToken::new();

    let published = publish_proof(&signer, &cert_path).await;
    let proof = IdentityProof::from_event(&published).unwrap();

    // Same discriminant, so relays keep only this document
    let mut revoked = proof.to_revoked_event(&pubkey, RevocationReason::KeyCompromised);
    signer.sign(&mut revoked, &cancel).await.unwrap();
    assert_eq!(revoked.tag_value("d"), published.tag_value("d"));

    let result = verify_identity_event(&revoked, Some(&fixture.certificate()), &pubkey).unwrap();
    assert!(result.valid_signature);
    assert!(result.revoked);
    assert_eq!(result.revoke_reason.as_deref(), Some("key-compromised"));
    assert!(result.cert_hash_match);
}

#[tokio::test]
async fn test_cli_identity_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = testing::fixture(FixtureKeyType::Rsa);
    let cert_path = fixture.write_pem_pair(dir.path(), "signing");
    let cert_only = dir.path().join("verify.pem");
    std::fs::write(&cert_only, fixture.cert_pem()).unwrap();
    let config = dir.path().join("config.json");
    let proof_path = dir.path().join("proof.json");
    let revocation_path = dir.path().join("revocation.json");

    let nsec = Keys::generate().to_nsec().unwrap();
    let run = |args: Vec<String>| run_cli(&config, &nsec, args);
    let arg = |s: &str| s.to_string();
    let path = |p: &Path| p.display().to_string();

    // ==========================================
    // Generate
    // ==========================================
    let outcome = run(vec![
        arg("identity"),
        arg("generate"),
        arg("--cert"),
        path(&cert_path),
        arg("--expiry-days"),
        arg("30"),
        arg("--output"),
        path(&proof_path),
    ])
    .await;
    assert_eq!(outcome, Outcome::Success);

    let event = Event::from_json(&std::fs::read_to_string(&proof_path).unwrap()).unwrap();
    let proof = IdentityProof::from_event(&event).unwrap();
    assert_eq!(proof.expiry - proof.created_at, 30 * 24 * 60 * 60);

    // ==========================================
    // Verify
    // ==========================================
    let outcome = run(vec![
        arg("identity"),
        arg("verify"),
        arg("--event"),
        path(&proof_path),
        arg("--cert"),
        path(&cert_only),
    ])
    .await;
    assert_eq!(outcome, Outcome::Success);

    // ==========================================
    // Revoke, then verification fails
    // ==========================================
    let outcome = run(vec![
        arg("identity"),
        arg("revoke"),
        arg("--cert-hash"),
        proof.cert_hash.clone(),
        arg("--reason"),
        arg("superseded"),
        arg("--output"),
        path(&revocation_path),
    ])
    .await;
    assert_eq!(outcome, Outcome::Success);

    let outcome = run(vec![
        arg("identity"),
        arg("verify"),
        arg("--event"),
        path(&revocation_path),
        arg("--cert"),
        path(&cert_only),
    ])
    .await;
    assert_eq!(outcome, Outcome::VerificationFailed);
}

#[tokio::test]
async fn test_cli_expired_p384_proof_only_warns() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = testing::fixture(FixtureKeyType::EcdsaP384);
    let cert_path = dir.path().join("verify.pem");
    std::fs::write(&cert_path, fixture.cert_pem()).unwrap();
    let config = dir.path().join("config.json");
    let proof_path = dir.path().join("expired.json");

    let keys = Keys::generate();
    let nsec = keys.to_nsec().unwrap();
    let pubkey = keys.public_key_hex();
    let signer = LocalKeySigner::new(keys);

    // A one-day proof issued in 2023
    let options = ProofOptions {
        expiry: Duration::from_secs(24 * 60 * 60),
    };
    let proof = generate_proof_at(
        &fixture.private_key(),
        &cert_hash(&fixture.cert_der),
        &pubkey,
        &options,
        1_700_000_000,
    )
    .unwrap();
    let mut event = proof.to_event(&pubkey);
    signer.sign(&mut event, &CancellationToken::new()).await.unwrap();
    std::fs::write(&proof_path, event.to_json().unwrap()).unwrap();

    let result = verify_identity_event(&event, Some(&fixture.certificate()), &pubkey).unwrap();
    assert!(result.valid_signature);
    assert!(result.expired);
    assert!(!result.revoked);

    let outcome = run_cli(
        &config,
        &nsec,
        vec![
            "identity".to_string(),
            "verify".to_string(),
            "--event".to_string(),
            proof_path.display().to_string(),
            "--cert".to_string(),
            cert_path.display().to_string(),
        ],
    )
    .await;
    assert_eq!(outcome, Outcome::Success);
}
