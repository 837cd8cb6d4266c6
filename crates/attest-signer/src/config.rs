//! Signer configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SignerError};

/// Default port of the browser bridge
pub const DEFAULT_BRIDGE_PORT: u16 = 17007;

/// Persistent signer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Connection string (nsec1, npub1, bunker:// or browser)
    pub sign_with: Option<String>,

    /// Local port for the browser bridge (0 picks a free port)
    pub bridge_port: u16,

    /// How long to wait for the browser to hand over a public key
    pub public_key_timeout_secs: u64,

    /// Grace period for the bridge page to notice shutdown
    pub close_grace_millis: u64,

    /// Bound on HTTP server shutdown
    pub shutdown_timeout_secs: u64,

    /// How long to wait for a bunker to accept the connection
    pub bunker_connect_timeout_secs: u64,

    /// How long to wait for a bunker to answer a request
    pub bunker_request_timeout_secs: u64,

    /// Relay hint added to asset references
    pub relay_hint: Option<String>,

    /// Identity proof lifetime
    pub proof_expiry_days: u64,

    /// Open the system browser for the bridge page
    pub open_browser: bool,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            sign_with: None,
            bridge_port: DEFAULT_BRIDGE_PORT,
            public_key_timeout_secs: 120,
            close_grace_millis: 500,
            shutdown_timeout_secs: 5,
            bunker_connect_timeout_secs: 120,
            bunker_request_timeout_secs: 300,
            relay_hint: None,
            proof_expiry_days: 365,
            open_browser: true,
        }
    }
}

impl SignerConfig {
    /// `$ATTEST_CONFIG`, else `<config dir>/attest/config.json`
    pub fn default_path() -> PathBuf {
        std::env::var_os("ATTEST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("attest")
                    .join("config.json")
            })
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load from file if it exists, else defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `SIGN_WITH` and `ATTEST_BRIDGE_PORT`
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(
            std::env::var("SIGN_WITH").ok(),
            std::env::var("ATTEST_BRIDGE_PORT").ok(),
        )
    }

    fn apply_overrides(&mut self, sign_with: Option<String>, bridge_port: Option<String>) -> Result<()> {
        if let Some(sign_with) = sign_with.filter(|s| !s.trim().is_empty()) {
            self.sign_with = Some(sign_with.trim().to_string());
        }
        if let Some(port) = bridge_port {
            self.bridge_port = port
                .trim()
                .parse()
                .map_err(|_| SignerError::Config(format!("Invalid ATTEST_BRIDGE_PORT: {}", port)))?;
        }
        Ok(())
    }
}

/// Called with a human-readable approval prompt (usually a URL)
pub type ApprovalCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Opens a URL for the user
pub type BrowserLauncher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Runtime options handed to signer backends
#[derive(Clone)]
pub struct SignerOptions {
    pub bridge_port: u16,
    pub public_key_timeout: Duration,
    pub close_grace: Duration,
    pub shutdown_timeout: Duration,
    pub bunker_connect_timeout: Duration,
    pub bunker_request_timeout: Duration,
    pub open_browser: bool,
    pub on_auth_url: Option<ApprovalCallback>,
    pub browser_launcher: Option<BrowserLauncher>,
}

impl std::fmt::Debug for SignerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerOptions")
            .field("bridge_port", &self.bridge_port)
            .field("public_key_timeout", &self.public_key_timeout)
            .field("close_grace", &self.close_grace)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("bunker_connect_timeout", &self.bunker_connect_timeout)
            .field("bunker_request_timeout", &self.bunker_request_timeout)
            .field("open_browser", &self.open_browser)
            .field("on_auth_url", &self.on_auth_url.is_some())
            .field("browser_launcher", &self.browser_launcher.is_some())
            .finish()
    }
}

impl Default for SignerOptions {
    fn default() -> Self {
        Self::from(&SignerConfig::default())
    }
}

impl From<&SignerConfig> for SignerOptions {
    fn from(config: &SignerConfig) -> Self {
        Self {
            bridge_port: config.bridge_port,
            public_key_timeout: Duration::from_secs(config.public_key_timeout_secs),
            close_grace: Duration::from_millis(config.close_grace_millis),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            bunker_connect_timeout: Duration::from_secs(config.bunker_connect_timeout_secs),
            bunker_request_timeout: Duration::from_secs(config.bunker_request_timeout_secs),
            open_browser: config.open_browser,
            on_auth_url: None,
            browser_launcher: None,
        }
    }
}

impl SignerOptions {
    pub fn with_auth_callback(mut self, callback: ApprovalCallback) -> Self {
        self.on_auth_url = Some(callback);
        self
    }

    pub fn with_browser_launcher(mut self, launcher: BrowserLauncher) -> Self {
        self.browser_launcher = Some(launcher);
        self
    }
}
