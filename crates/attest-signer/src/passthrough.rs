//! Signer that produces unsigned events for out-of-band signing

use async_trait::async_trait;
use attest_core::{nip19, Event};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::signer::{Signer, SignerKind};

/// Stamps author and id but never signs
///
/// Callers tell the result apart with [`Event::is_signed`].
#[derive(Debug, Clone)]
pub struct PassThroughSigner {
    pubkey_hex: String,
}

impl PassThroughSigner {
    pub fn new(pubkey_hex: impl Into<String>) -> Self {
        Self {
            pubkey_hex: pubkey_hex.into(),
        }
    }

    pub fn from_npub(npub: &str) -> Result<Self> {
        Ok(Self::new(nip19::npub_to_hex(npub)?))
    }
}

#[async_trait]
impl Signer for PassThroughSigner {
    fn kind(&self) -> SignerKind {
        SignerKind::PassThrough
    }

    async fn public_key_hex(&self, _cancel: &CancellationToken) -> Result<String> {
        Ok(self.pubkey_hex.clone())
    }

    async fn sign(&self, event: &mut Event, _cancel: &CancellationToken) -> Result<()> {
        event.stamp_created_at();
        event.pubkey = self.pubkey_hex.clone();
        event.sig.clear();
        event.finalize_id()?;
        debug!("Prepared unsigned kind {} event {}", event.kind, event.id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
