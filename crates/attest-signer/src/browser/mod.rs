//! Browser-extension bridge signer
//!
//! Starts a local HTTP server and opens a page in the user's browser. The
//! page polls for work, asks the NIP-07 extension for a public key or
//! signatures, and posts the results back. State lives in this instance
//! only, so several bridges can run one after another without sharing
//! anything.
//!
//! ```text
//! idle --public_key_hex--> publicKey --posted key--> idle
//! idle --sign/sign_batch--> sign --posted events--> idle
//! ```

mod server;

pub use server::{BridgeMode, BridgeState, PublicKeyBody, SignedEventBody};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use attest_core::crypto::is_valid_public_key;
use attest_core::Event;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SignerOptions;
use crate::error::{Result, SignerError};
use crate::signer::{cancellable, BatchSigner, Signer, SignerKind};
use server::BridgeShared;

/// Signer that brokers requests to a browser extension
pub struct BrowserBridge {
    shared: Arc<BridgeShared>,
    public_key_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
    signed_rx: tokio::sync::Mutex<mpsc::Receiver<Vec<SignedEventBody>>>,
    public_key: tokio::sync::Mutex<Option<String>>,
    browser_opened: AtomicBool,
    local_addr: SocketAddr,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    server: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    options: SignerOptions,
}

impl BrowserBridge {
    /// Bind `127.0.0.1:<bridge_port>` and start serving; port 0 picks a free port
    pub async fn start(options: SignerOptions) -> Result<Self> {
        let (public_key_tx, public_key_rx) = mpsc::channel(1);
        let (signed_tx, signed_rx) = mpsc::channel(1);
        let shared = Arc::new(BridgeShared::new(public_key_tx, signed_tx));

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", options.bridge_port))
            .await
            .map_err(|e| {
                SignerError::Bridge(format!("cannot listen on port {}: {}", options.bridge_port, e))
            })?;
        let local_addr = listener.local_addr()?;
        info!("Browser bridge listening on http://{}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = server::router(Arc::clone(&shared));
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(Self {
            shared,
            public_key_rx: tokio::sync::Mutex::new(public_key_rx),
            signed_rx: tokio::sync::Mutex::new(signed_rx),
            public_key: tokio::sync::Mutex::new(None),
            browser_opened: AtomicBool::new(false),
            local_addr,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            server: Mutex::new(Some(server)),
            options,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.local_addr)
    }

    /// Current mode, as the page would see it
    pub fn mode(&self) -> BridgeMode {
        self.shared.snapshot().mode
    }

    /// Open the page once per bridge instance
    fn open_browser_once(&self) {
        if self.browser_opened.swap(true, Ordering::SeqCst) {
            return;
        }

        let url = self.url();
        if let Some(launcher) = &self.options.browser_launcher {
            if let Err(e) = launcher(&url) {
                warn!("Could not open browser: {}", e);
            }
        } else if self.options.open_browser {
            info!("Opening {} in your browser", url);
            if let Err(e) = webbrowser::open(&url) {
                warn!("Could not open browser ({}); visit {} manually", e, url);
            }
        } else {
            info!("Open {} in a browser with a NIP-07 extension", url);
        }
    }
}

/// Puts the bridge back to idle when a request ends, including when the
/// waiting future is dropped
struct IdleOnDrop<'a>(&'a BridgeShared);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_mode(BridgeMode::Idle, Vec::new());
    }
}

/// Throw away results posted after their request ended
fn drain<T>(rx: &mut mpsc::Receiver<T>) {
    while rx.try_recv().is_ok() {
        debug!("Discarded stale bridge result");
    }
}

#[async_trait]
impl Signer for BrowserBridge {
    fn kind(&self) -> SignerKind {
        SignerKind::BrowserBridge
    }

    async fn public_key_hex(&self, cancel: &CancellationToken) -> Result<String> {
        let mut cached = self.public_key.lock().await;
        if let Some(pubkey) = cached.as_ref() {
            return Ok(pubkey.clone());
        }

        let mut rx = self.public_key_rx.lock().await;
        drain(&mut rx);
        self.shared.set_mode(BridgeMode::PublicKey, Vec::new());
        let idle = IdleOnDrop(&self.shared);
        self.open_browser_once();

        let timeout = self.options.public_key_timeout;
        let result = cancellable(cancel, async {
            match tokio::time::timeout(timeout, rx.recv()).await {
                Err(_) => Err(SignerError::Timeout(format!(
                    "no public key from the browser after {}s",
                    timeout.as_secs()
                ))),
                Ok(None) => Err(SignerError::Bridge("bridge server stopped".to_string())),
                Ok(Some(pubkey)) => Ok(pubkey),
            }
        })
        .await;
        drop(idle);

        let pubkey = result?.to_ascii_lowercase();
        if !is_valid_public_key(&pubkey) {
            return Err(SignerError::ProtocolViolation(format!(
                "browser returned an invalid public key: {}",
                pubkey
            )));
        }
        info!("Browser extension public key {}", pubkey);
        *cached = Some(pubkey.clone());
        Ok(pubkey)
    }

    async fn sign(&self, event: &mut Event, cancel: &CancellationToken) -> Result<()> {
        self.sign_batch(std::slice::from_mut(event), cancel).await
    }

    async fn close(&self) -> Result<()> {
        let shutdown_tx = self.shutdown_tx.lock().ok().and_then(|mut tx| tx.take());
        let Some(shutdown_tx) = shutdown_tx else {
            return Ok(());
        };

        self.shared.request_close();
        tokio::time::sleep(self.options.close_grace).await;
        let _ = shutdown_tx.send(());

        let server = self.server.lock().ok().and_then(|mut server| server.take());
        if let Some(server) = server {
            let abort = server.abort_handle();
            match tokio::time::timeout(self.options.shutdown_timeout, server).await {
                Ok(Ok(Ok(()))) => debug!("Browser bridge stopped"),
                Ok(Ok(Err(e))) => warn!("Browser bridge server error: {}", e),
                Ok(Err(e)) => warn!("Browser bridge task failed: {}", e),
                Err(_) => {
                    warn!("Browser bridge did not stop in time; aborting");
                    abort.abort();
                }
            }
        }
        Ok(())
    }

    fn as_batch(&self) -> Option<&dyn BatchSigner> {
        Some(self)
    }
}

#[async_trait]
impl BatchSigner for BrowserBridge {
    async fn sign_batch(&self, events: &mut [Event], cancel: &CancellationToken) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        for event in events.iter_mut() {
            event.stamp_created_at();
        }
        let payload = events.iter().map(Event::unsigned_payload).collect();

        let mut rx = self.signed_rx.lock().await;
        drain(&mut rx);
        self.shared.set_mode(BridgeMode::Sign, payload);
        let idle = IdleOnDrop(&self.shared);
        self.open_browser_once();
        info!("Waiting for the browser extension to sign {} event(s)", events.len());

        let result = cancellable(cancel, async {
            rx.recv()
                .await
                .ok_or_else(|| SignerError::Bridge("bridge server stopped".to_string()))
        })
        .await;
        drop(idle);
        let signed = result?;

        if signed.len() != events.len() {
            return Err(SignerError::CountMismatch {
                expected: events.len(),
                actual: signed.len(),
            });
        }

        // Check everything before touching the caller's events
        let mut updated = Vec::with_capacity(events.len());
        for (index, (event, body)) in events.iter().zip(signed).enumerate() {
            let mut candidate = event.clone();
            candidate.id = body.id;
            candidate.pubkey = body.pubkey;
            candidate.sig = body.sig;
            candidate.verify().map_err(|e| {
                SignerError::ProtocolViolation(format!("signed event {} failed verification: {}", index, e))
            })?;
            updated.push(candidate);
        }

        for (event, candidate) in events.iter_mut().zip(updated) {
            *event = candidate;
        }
        Ok(())
    }
}

impl Drop for BrowserBridge {
    fn drop(&mut self) {
        if let Ok(mut server) = self.server.lock() {
            if let Some(server) = server.take() {
                server.abort();
            }
        }
    }
}
