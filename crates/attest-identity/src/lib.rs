//! Attest Identity - Certificate loading and NIP-C1 identity proofs
//!
//! Binds a code-signing certificate (ECDSA P-256, RSA or Ed25519) to a
//! Nostr public key. Certificates come from PKCS12 or PEM files; Java
//! KeyStore files are detected and rejected with a conversion command.

pub mod certificate;
pub mod error;
pub mod event;
pub mod keys;
pub mod loader;
pub mod proof;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use certificate::{cert_hash, CertPublicKey, SigningCertificate};
pub use error::{IdentityError, Result};
pub use event::{
    revocation_event, verify_identity_event, verify_identity_event_at, RevocationReason,
};
pub use keys::CertPrivateKey;
pub use loader::{
    detect_format, load_certificate, load_pem_pair, load_signing_identity, ContainerFormat,
    SigningIdentity,
};
pub use proof::{
    generate_proof, generate_proof_at, proof_message, verify_proof, verify_proof_at,
    verify_proof_with_key, IdentityProof, ProofOptions, VerificationResult,
};
