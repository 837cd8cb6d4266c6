//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use attest_core::{crypto::decode_hex_32, nip19, Event, ReleaseBundle};
use attest_identity::{
    generate_proof, load_certificate, load_pem_pair, load_signing_identity, revocation_event,
    verify_identity_event, ProofOptions, RevocationReason, SigningIdentity, VerificationResult,
};
use attest_signer::{
    create_signer, sign_release_bundle, verify_bundle_wiring, CancellationToken, Signer,
    SignerConfig, SignerError, SignerOptions,
};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

/// Environment variable holding the PKCS12 password
pub const CERT_PASSWORD_ENV: &str = "ATTEST_CERT_PASSWORD";

/// Attest - sign release events and certificate identity proofs
#[derive(Parser, Debug)]
#[command(name = "attest")]
#[command(about = "Sign release events and certificate identity proofs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Connection string: nsec1..., npub1..., bunker://... or browser
    #[arg(long, global = true)]
    pub sign_with: Option<String>,

    /// Configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the signer's public key
    Pubkey,

    /// Sign a release bundle (app, release and asset events)
    SignBundle {
        /// Bundle JSON: {"app": {...}, "release": {...}, "assets": [...]}
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the signed bundle (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Relay hint added to asset references
        #[arg(long)]
        relay_hint: Option<String>,
    },

    /// Certificate identity proofs
    #[command(subcommand)]
    Identity(IdentityCommands),
}

#[derive(Subcommand, Debug)]
pub enum IdentityCommands {
    /// Bind a signing certificate to the signer's public key
    Generate {
        /// PKCS12 or PEM certificate (password from ATTEST_CERT_PASSWORD)
        #[arg(long)]
        cert: PathBuf,

        /// Private key file, when not next to or inside the certificate
        #[arg(long)]
        key: Option<PathBuf>,

        /// Proof lifetime in days
        #[arg(long)]
        expiry_days: Option<u64>,

        /// Where to write the proof event (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify a proof event against a certificate
    Verify {
        /// Proof event JSON
        #[arg(long)]
        event: PathBuf,

        /// Certificate (PEM or DER)
        #[arg(long)]
        cert: Option<PathBuf>,

        /// Public key the proof should bind (defaults to the event author)
        #[arg(long)]
        pubkey: Option<String>,
    },

    /// Publish-ready revocation of a certificate's proof
    Revoke {
        /// Certificate hash (hex)
        #[arg(long)]
        cert_hash: String,

        /// key-compromised, key-retired or superseded
        #[arg(long)]
        reason: RevocationReason,

        /// Where to write the revocation event (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// How a command finished, for the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Interrupted,
    /// Proof revoked, signature invalid, or not valid for the certificate
    VerificationFailed,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Success | Outcome::Interrupted => 0,
            Outcome::VerificationFailed => 2,
        }
    }
}

/// Load config from `path` (or the default location) and apply overrides
pub fn load_config(path: Option<&Path>, sign_with: Option<&str>) -> Result<SignerConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(SignerConfig::default_path);
    let mut config = SignerConfig::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    debug!("Config loaded from {}", path.display());

    config.apply_env()?;
    if let Some(sign_with) = sign_with {
        config.sign_with = Some(sign_with.to_string());
    }
    Ok(config)
}

/// Run the CLI
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<Outcome> {
    let config = load_config(cli.config.as_deref(), cli.sign_with.as_deref())?;
    let result = dispatch(cli.command, &config, &cancel).await;

    match result {
        Err(e) if is_interrupted(&e) => Ok(Outcome::Interrupted),
        other => other,
    }
}

fn is_interrupted(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<SignerError>()
        .map(SignerError::is_interrupted)
        .unwrap_or(false)
}

async fn dispatch(command: Commands, config: &SignerConfig, cancel: &CancellationToken) -> Result<Outcome> {
    match command {
        Commands::Pubkey => {
            let signer = connect(config, cancel).await?;
            let result = print_public_key(signer.as_ref(), cancel).await;
            signer.close().await?;
            result?;
        }

        Commands::SignBundle {
            input,
            output,
            relay_hint,
        } => {
            let json = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let mut bundle: ReleaseBundle =
                serde_json::from_str(&json).context("Invalid release bundle JSON")?;
            let relay_hint = relay_hint.or_else(|| config.relay_hint.clone());

            let signer = connect(config, cancel).await?;
            let result = sign_release_bundle(signer.as_ref(), &mut bundle, relay_hint.as_deref(), cancel).await;
            signer.close().await?;
            let mode = result?;

            verify_bundle_wiring(&bundle)?;
            info!("Signed {} events ({:?})", bundle.assets.len() + 2, mode);
            write_output(output.as_deref(), &serde_json::to_string_pretty(&bundle)?)?;
        }

        Commands::Identity(command) => return identity(command, config, cancel).await,
    }

    Ok(Outcome::Success)
}

async fn identity(
    command: IdentityCommands,
    config: &SignerConfig,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    match command {
        IdentityCommands::Generate {
            cert,
            key,
            expiry_days,
            output,
        } => {
            let identity = load_identity(&cert, key.as_deref())?;
            let options = ProofOptions::with_expiry_days(expiry_days.unwrap_or(config.proof_expiry_days));

            let signer = connect(config, cancel).await?;
            let result = sign_proof(signer.as_ref(), &identity, &options, cancel).await;
            signer.close().await?;
            let event = result?;

            if let Some(expiry) = event.tag_value("expiry").and_then(|e| e.parse::<i64>().ok()) {
                if let Some(expiry) = chrono::DateTime::from_timestamp(expiry, 0) {
                    info!("Proof for {} valid until {}", identity.cert_hash(), expiry.to_rfc3339());
                }
            }
            write_output(output.as_deref(), &serde_json::to_string_pretty(&event)?)?;
        }

        IdentityCommands::Verify { event, cert, pubkey } => {
            let json = std::fs::read_to_string(&event)
                .with_context(|| format!("Failed to read {}", event.display()))?;
            let event = Event::from_json(&json)?;
            let certificate = cert.as_deref().map(load_certificate).transpose()?;
            let pubkey = pubkey.unwrap_or_else(|| event.pubkey.clone());

            if event.is_signed() {
                if let Err(e) = event.verify() {
                    eprintln!("Proof event signature is invalid: {}", e);
                    return Ok(Outcome::VerificationFailed);
                }
            }

            let result = verify_identity_event(&event, certificate.as_ref(), &pubkey)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.expired {
                let expiry = event
                    .tag_value("expiry")
                    .and_then(|e| e.parse::<i64>().ok())
                    .and_then(|e| chrono::DateTime::from_timestamp(e, 0))
                    .map(|e| e.to_rfc3339())
                    .unwrap_or_else(|| "an unknown date".to_string());
                warn!("Identity proof expired on {}", expiry);
            }
            if !verification_passed(&result, certificate.is_some()) {
                return Ok(Outcome::VerificationFailed);
            }
        }

        IdentityCommands::Revoke {
            cert_hash,
            reason,
            output,
        } => {
            let mut event = revocation_event(&cert_hash.to_ascii_lowercase(), reason);

            let signer = connect(config, cancel).await?;
            let result = signer.sign(&mut event, cancel).await;
            signer.close().await?;
            result?;

            write_output(output.as_deref(), &serde_json::to_string_pretty(&event)?)?;
        }
    }

    Ok(Outcome::Success)
}

/// Whether a verification result should count as a pass; expiry only warns
pub fn verification_passed(result: &VerificationResult, has_certificate: bool) -> bool {
    result.valid_signature
        && !result.revoked
        && (!has_certificate || result.cert_hash_match)
}

async fn connect(config: &SignerConfig, cancel: &CancellationToken) -> Result<Box<dyn Signer>> {
    let Some(connection) = config.sign_with.as_deref() else {
        bail!("No signer configured: pass --sign-with or set SIGN_WITH");
    };

    let options = SignerOptions::from(config).with_auth_callback(Arc::new(|url: &str| {
        eprintln!("Approve the connection at: {}", url);
    }));
    Ok(create_signer(connection, &options, cancel).await?)
}

async fn print_public_key(signer: &dyn Signer, cancel: &CancellationToken) -> Result<()> {
    let pubkey = signer.public_key_hex(cancel).await?;
    let npub = nip19::encode_npub(&decode_hex_32(&pubkey)?)?;
    println!("{}", pubkey);
    println!("{}", npub);
    Ok(())
}

fn load_identity(cert: &Path, key: Option<&Path>) -> Result<SigningIdentity> {
    let identity = match key {
        Some(key) => load_pem_pair(cert, key)?,
        None => {
            let mut password = std::env::var(CERT_PASSWORD_ENV).ok().map(String::into_bytes);
            load_signing_identity(cert, password.as_deref_mut())?
        }
    };
    info!(
        "Loaded {} certificate {}",
        identity.private_key.algorithm(),
        identity.certificate.subject()
    );
    Ok(identity)
}

async fn sign_proof(
    signer: &dyn Signer,
    identity: &SigningIdentity,
    options: &ProofOptions,
    cancel: &CancellationToken,
) -> Result<Event> {
    let pubkey = signer.public_key_hex(cancel).await?;
    let proof = generate_proof(&identity.private_key, &identity.cert_hash(), &pubkey, options)?;
    let mut event = proof.to_event(&pubkey);
    signer.sign(&mut event, cancel).await?;
    Ok(event)
}

fn write_output(path: Option<&Path>, contents: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", contents),
    }
    Ok(())
}
