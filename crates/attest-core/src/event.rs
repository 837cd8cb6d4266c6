//! Signable event model
//!
//! An event's `id` is the SHA256 of the compact JSON array
//! `[0, pubkey, created_at, kind, tags, content]`. Because other events
//! reference ids by value, the id is only computed once `pubkey` and
//! `created_at` are final.

use serde::{Deserialize, Serialize};

use crate::crypto::{decode_hex_32, sha256, verify_schnorr};
use crate::error::{CoreError, Result};

/// Ordered tag list; each tag is a name followed by values
pub type Tags = Vec<Vec<String>>;

/// A signable event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Content hash (hex), empty until computed
    #[serde(default)]
    pub id: String,

    /// Author x-only public key (hex), empty until a signer stamps it
    #[serde(default)]
    pub pubkey: String,

    /// Unix seconds; zero means "not yet stamped"
    #[serde(default)]
    pub created_at: u64,

    pub kind: u16,

    #[serde(default)]
    pub tags: Tags,

    #[serde(default)]
    pub content: String,

    /// BIP-340 signature over the id (hex), empty when unsigned
    #[serde(default)]
    pub sig: String,
}

/// The fields an external signer needs; never carries id or signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    pub kind: u16,
    pub content: String,
    pub tags: Tags,
    pub created_at: u64,
}

impl Event {
    /// Create an unsigned, unstamped event
    pub fn new(kind: u16, content: impl Into<String>, tags: Tags) -> Self {
        Self {
            kind,
            content: content.into(),
            tags,
            ..Default::default()
        }
    }

    /// Current Unix time in seconds
    pub fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Set `created_at` to now unless a timestamp is already present
    pub fn stamp_created_at(&mut self) {
        if self.created_at == 0 {
            self.created_at = Self::now();
        }
    }

    /// Compute the id from the current fields
    pub fn compute_id(&self) -> Result<[u8; 32]> {
        if self.pubkey.is_empty() {
            return Err(CoreError::InvalidEvent(
                "pubkey must be set before computing the id".to_string(),
            ));
        }

        let canonical = serde_json::to_string(&(
            0u8,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))?;

        Ok(sha256(canonical.as_bytes()))
    }

    /// Compute the id as lowercase hex
    pub fn compute_id_hex(&self) -> Result<String> {
        Ok(hex::encode(self.compute_id()?))
    }

    /// Compute the id and store it in the event
    pub fn finalize_id(&mut self) -> Result<[u8; 32]> {
        let id = self.compute_id()?;
        self.id = hex::encode(id);
        Ok(id)
    }

    /// Whether a signature is present (pass-through events have none)
    pub fn is_signed(&self) -> bool {
        !self.sig.is_empty()
    }

    /// Check that the stored id matches the fields
    pub fn verify_id(&self) -> Result<()> {
        let expected = self.compute_id_hex()?;
        if expected != self.id {
            return Err(CoreError::IdMismatch {
                expected,
                actual: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Check the id and the signature
    pub fn verify(&self) -> Result<()> {
        self.verify_id()?;
        if !self.is_signed() {
            return Err(CoreError::InvalidSignature("Event is not signed".to_string()));
        }
        let id = decode_hex_32(&self.id)?;
        verify_schnorr(&self.pubkey, &id, &self.sig)
    }

    /// Strip everything a remote signer computes itself
    pub fn unsigned_payload(&self) -> UnsignedEvent {
        UnsignedEvent {
            kind: self.kind,
            content: self.content.clone(),
            tags: self.tags.clone(),
            created_at: self.created_at,
        }
    }

    /// First value of the first tag with the given name
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.first().map(String::as_str) == Some(name))
            .and_then(|tag| tag.get(1))
            .map(String::as_str)
    }

    /// All tags with the given name
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Vec<String>> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
    }

    /// Append a tag
    pub fn push_tag<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.push(values.into_iter().map(Into::into).collect());
    }

    /// Serialize to compact JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
