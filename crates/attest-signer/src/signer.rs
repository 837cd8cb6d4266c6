//! Signer abstraction over the four signing backends
//!
//! - Local key (`nsec1...`): signs in process
//! - Pass-through (`npub1...`): stamps author and id, leaves the signature empty
//! - Bunker (`bunker://...`): NIP-46 remote signer over a relay
//! - Browser bridge (`browser`): local page brokering a NIP-07 extension
//!
//! Only the browser bridge can sign several events with one approval; callers
//! discover that through [`Signer::as_batch`].

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use attest_core::Event;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::browser::BrowserBridge;
use crate::bunker::{BunkerSigner, BunkerUri};
use crate::config::SignerOptions;
use crate::error::{Result, SignerError};
use crate::local::LocalKeySigner;
use crate::passthrough::PassThroughSigner;

/// Connection string selecting the browser bridge
pub const BROWSER_CONNECTION: &str = "browser";

/// Which backend a signer is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignerKind {
    LocalKey,
    PassThrough,
    Bunker,
    BrowserBridge,
}

impl fmt::Display for SignerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignerKind::LocalKey => "local key",
            SignerKind::PassThrough => "pass-through (unsigned)",
            SignerKind::Bunker => "remote bunker",
            SignerKind::BrowserBridge => "browser extension",
        };
        f.write_str(name)
    }
}

/// Signs events on behalf of one public key
///
/// Implementations are not designed for concurrent calls; callers
/// serialise requests to one instance.
#[async_trait]
pub trait Signer: Send + Sync {
    fn kind(&self) -> SignerKind;

    /// Public key of the signing identity (hex)
    async fn public_key_hex(&self, cancel: &CancellationToken) -> Result<String>;

    /// Set the author, id and signature of `event`
    ///
    /// A `created_at` already present is kept; otherwise it is set to now.
    async fn sign(&self, event: &mut Event, cancel: &CancellationToken) -> Result<()>;

    /// Release sockets and listeners
    async fn close(&self) -> Result<()>;

    /// Batch capability, when the backend has one
    fn as_batch(&self) -> Option<&dyn BatchSigner> {
        None
    }
}

/// Signs several events with a single approval
#[async_trait]
pub trait BatchSigner: Signer {
    /// Sign all events at once; ids, authors and signatures are written back in order
    async fn sign_batch(&self, events: &mut [Event], cancel: &CancellationToken) -> Result<()>;
}

/// Create a signer from a connection string
pub async fn create_signer(
    connection: &str,
    options: &SignerOptions,
    cancel: &CancellationToken,
) -> Result<Box<dyn Signer>> {
    let connection = connection.trim();

    let signer: Box<dyn Signer> = if connection.starts_with("nsec1") {
        Box::new(LocalKeySigner::from_nsec(connection)?)
    } else if connection.starts_with("npub1") {
        Box::new(PassThroughSigner::from_npub(connection)?)
    } else if connection.starts_with("bunker://") {
        let uri = BunkerUri::parse(connection)?;
        Box::new(BunkerSigner::connect(&uri, options, cancel).await?)
    } else if connection == BROWSER_CONNECTION {
        Box::new(BrowserBridge::start(options.clone()).await?)
    } else {
        return Err(SignerError::InvalidSigningMethod(redact(connection)));
    };

    info!("Using {} signer", signer.kind());
    Ok(signer)
}

/// Avoid echoing anything that might be a secret
fn redact(connection: &str) -> String {
    match connection.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &connection[..idx]),
        None => connection.to_string(),
    }
}

/// Race a future against cancellation
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SignerError::Interrupted),
        result = fut => result,
    }
}
