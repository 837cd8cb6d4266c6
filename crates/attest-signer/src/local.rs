//! Signer holding a private key in process

use async_trait::async_trait;
use attest_core::{Event, Keys};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::signer::{Signer, SignerKind};

/// Signs with an in-memory BIP-340 key
#[derive(Debug)]
pub struct LocalKeySigner {
    keys: Keys,
}

impl LocalKeySigner {
    pub fn new(keys: Keys) -> Self {
        Self { keys }
    }

    pub fn from_nsec(nsec: &str) -> Result<Self> {
        Ok(Self::new(Keys::parse_nsec(nsec)?))
    }
}

#[async_trait]
impl Signer for LocalKeySigner {
    fn kind(&self) -> SignerKind {
        SignerKind::LocalKey
    }

    async fn public_key_hex(&self, _cancel: &CancellationToken) -> Result<String> {
        Ok(self.keys.public_key_hex())
    }

    async fn sign(&self, event: &mut Event, _cancel: &CancellationToken) -> Result<()> {
        event.stamp_created_at();
        self.keys.sign_event(event)?;
        debug!("Signed kind {} event {}", event.kind, event.id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
