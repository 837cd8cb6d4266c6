//! HTTP side of the browser bridge
//!
//! The page polls `/api/state` for work and `/api/shutdown` for the close
//! flag, and posts results to `/public-key` and `/signed-events`. Results go
//! into one-slot channels with `try_send`; a duplicate or late post is
//! dropped instead of blocking the handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use attest_core::UnsignedEvent;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

const PAGE: &str = include_str!("page.html");

/// What the page should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BridgeMode {
    Idle,
    PublicKey,
    Sign,
}

/// Body of `GET /api/state`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeState {
    pub mode: BridgeMode,
    pub data: Vec<UnsignedEvent>,
}

impl Default for BridgeState {
    fn default() -> Self {
        Self {
            mode: BridgeMode::Idle,
            data: Vec::new(),
        }
    }
}

/// Body of `POST /public-key`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyBody {
    pub public_key: String,
}

/// One element of `POST /signed-events`; other event fields are ignored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEventBody {
    pub id: String,
    pub pubkey: String,
    pub sig: String,
}

/// State owned by one bridge instance and shared with its handlers
pub(crate) struct BridgeShared {
    state: Mutex<BridgeState>,
    should_close: AtomicBool,
    public_key_tx: mpsc::Sender<String>,
    signed_tx: mpsc::Sender<Vec<SignedEventBody>>,
}

impl BridgeShared {
    pub(crate) fn new(
        public_key_tx: mpsc::Sender<String>,
        signed_tx: mpsc::Sender<Vec<SignedEventBody>>,
    ) -> Self {
        Self {
            state: Mutex::new(BridgeState::default()),
            should_close: AtomicBool::new(false),
            public_key_tx,
            signed_tx,
        }
    }

    pub(crate) fn set_mode(&self, mode: BridgeMode, data: Vec<UnsignedEvent>) {
        debug!("Bridge mode -> {:?}", mode);
        match self.state.lock() {
            Ok(mut state) => *state = BridgeState { mode, data },
            Err(poisoned) => *poisoned.into_inner() = BridgeState { mode, data },
        }
    }

    pub(crate) fn snapshot(&self) -> BridgeState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn request_close(&self) {
        self.should_close.store(true, Ordering::SeqCst);
    }

    pub(crate) fn should_close(&self) -> bool {
        self.should_close.load(Ordering::SeqCst)
    }
}

pub(crate) fn router(shared: Arc<BridgeShared>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/state", get(state))
        .route("/api/shutdown", get(shutdown))
        .route("/public-key", post(public_key))
        .route("/signed-events", post(signed_events))
        .with_state(shared)
        .layer(TraceLayer::new_for_http())
}

// Bridge page
async fn index() -> impl IntoResponse {
    Html(PAGE)
}

// Current mode and payload
async fn state(State(shared): State<Arc<BridgeShared>>) -> impl IntoResponse {
    Json(shared.snapshot())
}

// Close flag
async fn shutdown(State(shared): State<Arc<BridgeShared>>) -> impl IntoResponse {
    Json(serde_json::json!({ "shouldClose": shared.should_close() }))
}

// Public key from the extension
async fn public_key(
    State(shared): State<Arc<BridgeShared>>,
    Json(body): Json<PublicKeyBody>,
) -> impl IntoResponse {
    if shared.public_key_tx.try_send(body.public_key).is_err() {
        warn!("Discarding public key: no request waiting");
    }
    (StatusCode::OK, Json(serde_json::json!({ "ok": true })))
}

// Signed events from the extension
async fn signed_events(
    State(shared): State<Arc<BridgeShared>>,
    Json(body): Json<Vec<SignedEventBody>>,
) -> impl IntoResponse {
    debug!("Received {} signed events", body.len());
    if shared.signed_tx.try_send(body).is_err() {
        warn!("Discarding signed events: no request waiting");
    }
    (StatusCode::OK, Json(serde_json::json!({ "ok": true })))
}
