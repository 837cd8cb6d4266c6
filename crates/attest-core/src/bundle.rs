//! Release bundle: application metadata, release, and asset events
//!
//! The release references each asset by id with an `e` tag, so assets
//! must have final ids before the release is signed.

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Tag name used for asset references inside a release
pub const ASSET_REFERENCE_TAG: &str = "e";

/// The three-part document set published for a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseBundle {
    pub app: Event,
    pub release: Event,
    pub assets: Vec<Event>,
}

impl ReleaseBundle {
    pub fn new(app: Event, release: Event, assets: Vec<Event>) -> Self {
        Self {
            app,
            release,
            assets,
        }
    }

    /// Asset ids referenced by the release, in tag order
    pub fn asset_references(&self) -> Vec<&str> {
        self.release
            .tags_named(ASSET_REFERENCE_TAG)
            .filter_map(|tag| tag.get(1))
            .map(String::as_str)
            .collect()
    }

    /// Asset ids that the release does not reference
    pub fn unreferenced_assets(&self) -> Vec<&str> {
        let references = self.asset_references();
        self.assets
            .iter()
            .map(|asset| asset.id.as_str())
            .filter(|id| id.is_empty() || !references.contains(id))
            .collect()
    }

    /// All events in publish order: assets, release, app
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.assets
            .iter()
            .chain(std::iter::once(&self.release))
            .chain(std::iter::once(&self.app))
    }
}

/// Append an asset reference to a release event
pub fn add_asset_reference(release: &mut Event, asset_id: &str, relay_hint: Option<&str>) {
    let mut tag = vec![ASSET_REFERENCE_TAG.to_string(), asset_id.to_string()];
    if let Some(hint) = relay_hint.filter(|h| !h.is_empty()) {
        tag.push(hint.to_string());
    }
    release.tags.push(tag);
}
