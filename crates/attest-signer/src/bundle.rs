//! Release-bundle signing
//!
//! The release references each asset by id, so asset ids must be final
//! before the release is signed.
//!
//! - Sequential: sign assets, add references, sign release, sign app.
//! - Batch: precompute asset ids locally (the id depends only on fields we
//!   already know), add references, then submit every event in one call.
//!   The ids returned must equal the precomputed ones.

use attest_core::{add_asset_reference, Event, ReleaseBundle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, SignerError};
use crate::signer::{BatchSigner, Signer};

/// Which algorithm signed a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleSigningMode {
    Sequential,
    Batch,
}

/// Sign every event of a bundle, wiring asset references into the release
pub async fn sign_release_bundle(
    signer: &dyn Signer,
    bundle: &mut ReleaseBundle,
    relay_hint: Option<&str>,
    cancel: &CancellationToken,
) -> Result<BundleSigningMode> {
    if bundle.assets.is_empty() {
        return Err(SignerError::ProtocolViolation(
            "a release bundle needs at least one asset".to_string(),
        ));
    }

    match signer.as_batch() {
        Some(batch) => {
            sign_batch(batch, bundle, relay_hint, cancel).await?;
            Ok(BundleSigningMode::Batch)
        }
        None => {
            sign_sequential(signer, bundle, relay_hint, cancel).await?;
            Ok(BundleSigningMode::Sequential)
        }
    }
}

async fn sign_sequential(
    signer: &dyn Signer,
    bundle: &mut ReleaseBundle,
    relay_hint: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    info!("Signing release bundle sequentially with {} signer", signer.kind());

    for asset in bundle.assets.iter_mut() {
        signer.sign(asset, cancel).await?;
        if asset.id.is_empty() {
            return Err(SignerError::ProtocolViolation(
                "signer returned an asset without an id".to_string(),
            ));
        }
        debug!("Asset signed: {}", asset.id);
        add_asset_reference(&mut bundle.release, &asset.id, relay_hint);
    }

    signer.sign(&mut bundle.release, cancel).await?;
    debug!("Release signed: {}", bundle.release.id);

    signer.sign(&mut bundle.app, cancel).await?;
    debug!("App metadata signed: {}", bundle.app.id);
    Ok(())
}

async fn sign_batch(
    signer: &dyn BatchSigner,
    bundle: &mut ReleaseBundle,
    relay_hint: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    info!("Signing release bundle in one batch with {} signer", signer.kind());
    let pubkey = signer.public_key_hex(cancel).await?;

    for asset in bundle.assets.iter_mut() {
        stamp(asset, &pubkey);
        asset.finalize_id()?;
        debug!("Asset id precomputed: {}", asset.id);
        add_asset_reference(&mut bundle.release, &asset.id, relay_hint);
    }
    stamp(&mut bundle.release, &pubkey);
    stamp(&mut bundle.app, &pubkey);

    let mut events: Vec<Event> = bundle
        .assets
        .iter()
        .chain([&bundle.release, &bundle.app])
        .cloned()
        .collect();
    let expected: Vec<String> = events
        .iter()
        .map(Event::compute_id_hex)
        .collect::<attest_core::Result<_>>()?;

    signer.sign_batch(&mut events, cancel).await?;

    for (index, (event, expected)) in events.iter().zip(&expected).enumerate() {
        if &event.id != expected {
            return Err(SignerError::ProtocolViolation(format!(
                "event {} came back with id {} instead of {}",
                index, event.id, expected
            )));
        }
    }

    let app = events.pop();
    let release = events.pop();
    match (release, app) {
        (Some(release), Some(app)) => {
            bundle.release = release;
            bundle.app = app;
            bundle.assets = events;
            Ok(())
        }
        _ => Err(SignerError::CountMismatch {
            expected: expected.len(),
            actual: events.len(),
        }),
    }
}

fn stamp(event: &mut Event, pubkey: &str) {
    event.stamp_created_at();
    event.pubkey = pubkey.to_string();
}

/// Check that every asset is referenced and every event is intact
///
/// Unsigned (pass-through) events only need a correct id.
pub fn verify_bundle_wiring(bundle: &ReleaseBundle) -> Result<()> {
    let unreferenced = bundle.unreferenced_assets();
    if !unreferenced.is_empty() {
        return Err(SignerError::ProtocolViolation(format!(
            "release does not reference assets: {}",
            unreferenced.join(", ")
        )));
    }

    for event in bundle.events() {
        if event.is_signed() {
            event.verify()?;
        } else {
            event.verify_id()?;
        }
    }
    Ok(())
}
