//! Attest Signer - Event signing backends
//!
//! A [`Signer`] is selected by connection string:
//!
//! - `nsec1...` signs locally
//! - `npub1...` produces unsigned events for signing elsewhere
//! - `bunker://<pubkey>?relay=<url>&secret=<token>` asks a NIP-46 remote signer
//! - `browser` brokers requests to a NIP-07 browser extension
//!
//! [`sign_release_bundle`] signs a release bundle with whichever backend is
//! chosen, keeping the release's asset references consistent.

pub mod browser;
pub mod bundle;
pub mod bunker;
pub mod config;
pub mod error;
pub mod local;
pub mod passthrough;
pub mod signer;

pub use browser::{BridgeMode, BrowserBridge};
pub use bundle::{sign_release_bundle, verify_bundle_wiring, BundleSigningMode};
pub use bunker::{BunkerSigner, BunkerUri};
pub use config::{ApprovalCallback, BrowserLauncher, SignerConfig, SignerOptions};
pub use error::{Result, SignerError};
pub use local::LocalKeySigner;
pub use passthrough::PassThroughSigner;
pub use signer::{create_signer, BatchSigner, Signer, SignerKind, BROWSER_CONNECTION};

pub use tokio_util::sync::CancellationToken;
