//! Relay connection carrying encrypted NIP-46 requests
//!
//! One reader task routes responses to waiting requests by id, one writer
//! task owns the socket sink. When the socket closes every waiting request
//! fails with `Disconnected`; there is no reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use attest_core::{kinds, nip44, ConversationKey, Event, Keys};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::rpc::{self, RelayMessage, RpcRequest, RpcResponse};
use crate::config::ApprovalCallback;
use crate::error::{Result, SignerError};
use crate::signer::cancellable;

type PendingMap = HashMap<String, oneshot::Sender<Result<RpcResponse>>>;

struct Shared {
    keys: Keys,
    remote_pubkey: String,
    conversation_key: ConversationKey,
    pending: Mutex<PendingMap>,
    /// Envelope event id to request id, for relay `OK` replies
    envelopes: Mutex<HashMap<String, String>>,
    closed: AtomicBool,
    on_auth_url: Option<ApprovalCallback>,
}

impl Shared {
    fn take_pending(&self, id: &str) -> Option<oneshot::Sender<Result<RpcResponse>>> {
        self.pending.lock().ok().and_then(|mut pending| pending.remove(id))
    }

    fn forget_envelope(&self, event_id: &str) -> Option<String> {
        self.envelopes.lock().ok().and_then(|mut envelopes| envelopes.remove(event_id))
    }

    /// Fail the request whose envelope the relay refused to store
    fn reject(&self, event_id: &str, message: &str) {
        let Some(id) = self.forget_envelope(event_id) else {
            debug!("Relay rejected unknown event {}: {}", event_id, message);
            return;
        };
        warn!("Relay rejected request {}: {}", id, message);
        if let Some(waiter) = self.take_pending(&id) {
            let _ = waiter.send(Err(SignerError::Connection(format!(
                "relay rejected request: {}",
                message
            ))));
        }
    }

    fn fail_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut pending) = self.pending.lock() {
            // Dropping the senders wakes every waiter with a receive error
            pending.clear();
        }
        if let Ok(mut envelopes) = self.envelopes.lock() {
            envelopes.clear();
        }
    }

    /// Decrypt a remote-signing event addressed to us
    fn open(&self, event: &Event) -> Option<RpcResponse> {
        if event.kind != kinds::REMOTE_SIGNING || event.pubkey != self.remote_pubkey {
            return None;
        }
        if let Err(e) = event.verify() {
            warn!("Dropping remote-signing event with bad signature: {}", e);
            return None;
        }
        let plaintext = match nip44::decrypt(&self.conversation_key, &event.content) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!("Could not decrypt bunker response: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&plaintext) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("Malformed bunker response: {}", e);
                None
            }
        }
    }

    fn dispatch(&self, response: RpcResponse) {
        if let Some(url) = response.auth_challenge() {
            info!("Remote signer requires approval");
            match &self.on_auth_url {
                Some(callback) => callback(url),
                None => warn!("Approve the request at {}", url),
            }
            return;
        }

        match self.take_pending(&response.id) {
            Some(waiter) => {
                let _ = waiter.send(Ok(response));
            }
            None => debug!("Response for unknown request {}", response.id),
        }
    }
}

/// Connection to a remote signer through one relay
pub struct BunkerClient {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Message>,
    next_id: AtomicU64,
    subscription_id: String,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl BunkerClient {
    /// Open the websocket and subscribe to responses addressed to `keys`
    pub async fn connect(
        relay: &str,
        keys: Keys,
        remote_pubkey: &str,
        on_auth_url: Option<ApprovalCallback>,
    ) -> Result<Self> {
        let (socket, _) = tokio_tungstenite::connect_async(relay)
            .await
            .map_err(|e| SignerError::Connection(format!("{}: {}", relay, e)))?;
        info!("Connected to relay {}", relay);

        let conversation_key = nip44::conversation_key(&keys, remote_pubkey)?;
        let client_pubkey = keys.public_key_hex();
        let shared = Arc::new(Shared {
            keys,
            remote_pubkey: remote_pubkey.to_string(),
            conversation_key,
            pending: Mutex::new(HashMap::new()),
            envelopes: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            on_auth_url,
        });

        let (mut sink, mut stream) = socket.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!("Relay write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader_shared = Arc::clone(&shared);
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!("Relay read failed: {}", e);
                        break;
                    }
                };
                trace!("Relay: {}", text);

                match RelayMessage::from_json(&text) {
                    Ok(RelayMessage::Event { event, .. }) => {
                        if let Some(response) = reader_shared.open(&event) {
                            reader_shared.dispatch(response);
                        }
                    }
                    Ok(RelayMessage::Ok { event_id, accepted: false, message }) => {
                        reader_shared.reject(&event_id, &message);
                    }
                    Ok(RelayMessage::Ok { event_id, accepted: true, .. }) => {
                        reader_shared.forget_envelope(&event_id);
                    }
                    Ok(RelayMessage::Notice { message }) => debug!("Relay notice: {}", message),
                    Ok(_) => {}
                    Err(e) => debug!("Ignoring relay message: {}", e),
                }
            }
            info!("Relay connection closed");
            reader_shared.fail_all();
        });

        let subscription_id = format!("attest-{}", &client_pubkey[..8]);
        let client = Self {
            shared,
            outgoing,
            next_id: AtomicU64::new(1),
            subscription_id,
            reader,
            writer,
        };

        // Allow for clock skew between us and the relay
        let since = Event::now().saturating_sub(10);
        client.send_text(rpc::client_subscribe(
            &client.subscription_id,
            kinds::REMOTE_SIGNING,
            &client_pubkey,
            since,
        )?)?;

        Ok(client)
    }

    pub fn client_pubkey(&self) -> String {
        self.shared.keys.public_key_hex()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn send_text(&self, text: String) -> Result<()> {
        self.outgoing
            .send(Message::Text(text))
            .map_err(|_| SignerError::Disconnected)
    }

    /// Send one request and wait for its response
    pub async fn request(
        &self,
        method: &str,
        params: Vec<String>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if self.is_closed() {
            return Err(SignerError::Disconnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let request = RpcRequest::new(id.clone(), method, params);
        let envelope = self.seal(&request)?;

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .map_err(|_| SignerError::Connection("pending request table poisoned".to_string()))?
            .insert(id.clone(), tx);
        if let Ok(mut envelopes) = self.shared.envelopes.lock() {
            envelopes.insert(envelope.id.clone(), id.clone());
        }

        debug!("Sending {} request {}", method, id);
        if let Err(e) = self.send_text(rpc::client_event(&envelope)?) {
            self.shared.take_pending(&id);
            self.shared.forget_envelope(&envelope.id);
            return Err(e);
        }

        let wait = async {
            match tokio::time::timeout(timeout, rx).await {
                Err(_) => Err(SignerError::Timeout(format!(
                    "no response to {} after {}s",
                    method,
                    timeout.as_secs()
                ))),
                Ok(Err(_)) => Err(SignerError::Disconnected),
                Ok(Ok(response)) => response.and_then(RpcResponse::into_result),
            }
        };

        let result = cancellable(cancel, wait).await;
        if result.is_err() {
            self.shared.take_pending(&id);
        }
        self.shared.forget_envelope(&envelope.id);
        result
    }

    /// Encrypt and sign a request as a kind 24133 event
    fn seal(&self, request: &RpcRequest) -> Result<Event> {
        let plaintext = serde_json::to_string(request)?;
        let content = nip44::encrypt(&self.shared.conversation_key, &plaintext)?;
        let mut event = Event::new(
            kinds::REMOTE_SIGNING,
            content,
            vec![vec!["p".to_string(), self.shared.remote_pubkey.clone()]],
        );
        event.stamp_created_at();
        self.shared.keys.sign_event(&mut event)?;
        Ok(event)
    }

    /// Unsubscribe and close the socket
    pub async fn close(&self) {
        if let Ok(close) = rpc::client_close(&self.subscription_id) {
            let _ = self.send_text(close);
        }
        let _ = self.outgoing.send(Message::Close(None));
        self.shared.fail_all();
        self.reader.abort();
        if tokio::time::timeout(Duration::from_secs(2), async {
            while !self.writer.is_finished() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_err()
        {
            self.writer.abort();
        }
    }
}

impl Drop for BunkerClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
