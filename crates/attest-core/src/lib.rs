//! Attest Core - Event model, keys, and encryption primitives
//!
//! This crate provides the signable event type shared by every signing
//! backend, BIP-340 keys, NIP-19 key encoding, NIP-44 payload encryption,
//! and the release bundle whose events reference each other by id.

pub mod bundle;
pub mod crypto;
pub mod error;
pub mod event;
pub mod keys;
pub mod kinds;
pub mod nip19;
pub mod nip44;

pub use bundle::{add_asset_reference, ReleaseBundle, ASSET_REFERENCE_TAG};
pub use crypto::{sha256, sha256_hex};
pub use error::{CoreError, Result};
pub use event::{Event, Tags, UnsignedEvent};
pub use keys::Keys;
pub use nip44::ConversationKey;

/// Length of a hex-encoded x-only public key
pub const PUBKEY_HEX_LEN: usize = 64;

/// Length of a hex-encoded event id
pub const EVENT_ID_HEX_LEN: usize = 64;

/// Length of a hex-encoded BIP-340 signature
pub const SIGNATURE_HEX_LEN: usize = 128;
