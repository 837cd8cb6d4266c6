//! NIP-46 remote signer ("bunker")
//!
//! The bunker holds the key; we talk to it through a relay with an
//! ephemeral client key, NIP-44 encrypted JSON-RPC in kind 24133 events.
//! Connecting may need a human approval on the remote side, announced with
//! an `auth_url` response that is forwarded to the approval callback.

mod client;
pub mod rpc;
mod uri;

pub use client::BunkerClient;
pub use uri::BunkerUri;

use async_trait::async_trait;
use attest_core::{Event, Keys};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SignerOptions;
use crate::error::{Result, SignerError};
use crate::signer::{Signer, SignerKind};

/// Signer backed by a remote bunker
pub struct BunkerSigner {
    client: BunkerClient,
    uri: BunkerUri,
    options: SignerOptions,
    public_key: OnceCell<String>,
}

impl BunkerSigner {
    /// Connect through the first reachable relay and wait for the bunker to accept
    pub async fn connect(
        uri: &BunkerUri,
        options: &SignerOptions,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let mut last_error = None;
        let mut client = None;
        for relay in &uri.relays {
            match BunkerClient::connect(
                relay,
                Keys::generate(),
                &uri.remote_pubkey,
                options.on_auth_url.clone(),
            )
            .await
            {
                Ok(connected) => {
                    client = Some(connected);
                    break;
                }
                Err(e) => {
                    warn!("Relay {} unavailable: {}", relay, e);
                    last_error = Some(e);
                }
            }
        }
        let client = client.ok_or_else(|| {
            last_error.unwrap_or_else(|| SignerError::Connection("no relays".to_string()))
        })?;

        let mut params = vec![uri.remote_pubkey.clone()];
        if let Some(secret) = &uri.secret {
            params.push(secret.clone());
        }

        info!("Waiting for remote signer {} to accept the connection", uri.remote_pubkey);
        let ack = client
            .request(rpc::METHOD_CONNECT, params, options.bunker_connect_timeout, cancel)
            .await;
        let ack = match ack {
            Ok(ack) => ack,
            Err(e) => {
                client.close().await;
                return Err(e);
            }
        };
        if ack != "ack" && Some(&ack) != uri.secret.as_ref() {
            debug!("Unexpected connect result '{}', continuing", ack);
        }
        info!("Remote signer connected");

        Ok(Self {
            client,
            uri: uri.clone(),
            options: options.clone(),
            public_key: OnceCell::new(),
        })
    }

    pub fn uri(&self) -> &BunkerUri {
        &self.uri
    }
}

#[async_trait]
impl Signer for BunkerSigner {
    fn kind(&self) -> SignerKind {
        SignerKind::Bunker
    }

    async fn public_key_hex(&self, cancel: &CancellationToken) -> Result<String> {
        let pubkey = self
            .public_key
            .get_or_try_init(|| async {
                let pubkey = self
                    .client
                    .request(
                        rpc::METHOD_GET_PUBLIC_KEY,
                        Vec::new(),
                        self.options.bunker_request_timeout,
                        cancel,
                    )
                    .await?;
                if !attest_core::crypto::is_valid_public_key(&pubkey) {
                    return Err(SignerError::ProtocolViolation(format!(
                        "bunker returned an invalid public key: {}",
                        pubkey
                    )));
                }
                Ok(pubkey)
            })
            .await?;
        Ok(pubkey.clone())
    }

    async fn sign(&self, event: &mut Event, cancel: &CancellationToken) -> Result<()> {
        event.stamp_created_at();
        event.pubkey = self.public_key_hex(cancel).await?;

        let unsigned = serde_json::json!({
            "kind": event.kind,
            "content": event.content,
            "tags": event.tags,
            "created_at": event.created_at,
            "pubkey": event.pubkey,
        });

        let response = self
            .client
            .request(
                rpc::METHOD_SIGN_EVENT,
                vec![serde_json::to_string(&unsigned)?],
                self.options.bunker_request_timeout,
                cancel,
            )
            .await?;

        let signed = Event::from_json(&response)?;
        if signed.kind != event.kind
            || signed.content != event.content
            || signed.tags != event.tags
            || signed.created_at != event.created_at
            || signed.pubkey != event.pubkey
        {
            return Err(SignerError::ProtocolViolation(
                "bunker changed the event while signing".to_string(),
            ));
        }
        signed
            .verify()
            .map_err(|e| SignerError::ProtocolViolation(format!("bunker signature invalid: {}", e)))?;

        event.id = signed.id;
        event.sig = signed.sig;
        debug!("Bunker signed kind {} event {}", event.kind, event.id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.client.close().await;
        Ok(())
    }
}
