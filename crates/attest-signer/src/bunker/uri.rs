//! `bunker://` connection URLs

use std::fmt;

use attest_core::crypto::is_valid_public_key;
use url::Url;

use crate::error::{Result, SignerError};

/// Parsed `bunker://<remote-pubkey>?relay=<url>&secret=<token>`
#[derive(Clone, PartialEq, Eq)]
pub struct BunkerUri {
    pub remote_pubkey: String,
    pub relays: Vec<String>,
    pub secret: Option<String>,
}

impl fmt::Debug for BunkerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BunkerUri")
            .field("remote_pubkey", &self.remote_pubkey)
            .field("relays", &self.relays)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BunkerUri {
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input.trim())
            .map_err(|e| SignerError::InvalidBunkerUri(e.to_string()))?;
        if url.scheme() != "bunker" {
            return Err(SignerError::InvalidBunkerUri(format!(
                "expected bunker:// scheme, got {}://",
                url.scheme()
            )));
        }

        let remote_pubkey = url
            .host_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| SignerError::InvalidBunkerUri("missing remote public key".to_string()))?;
        if !is_valid_public_key(&remote_pubkey) {
            return Err(SignerError::InvalidBunkerUri(format!(
                "invalid remote public key: {}",
                remote_pubkey
            )));
        }

        let mut relays = Vec::new();
        let mut secret = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "relay" => {
                    let relay = Url::parse(&value)
                        .map_err(|e| SignerError::InvalidBunkerUri(format!("relay {}: {}", value, e)))?;
                    if relay.scheme() != "ws" && relay.scheme() != "wss" {
                        return Err(SignerError::InvalidBunkerUri(format!(
                            "relay must be ws:// or wss://: {}",
                            value
                        )));
                    }
                    relays.push(value.into_owned());
                }
                "secret" if !value.is_empty() => secret = Some(value.into_owned()),
                _ => {}
            }
        }

        if relays.is_empty() {
            return Err(SignerError::InvalidBunkerUri(
                "at least one relay parameter is required".to_string(),
            ));
        }

        Ok(Self {
            remote_pubkey,
            relays,
            secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY: &str = "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e";

    #[test]
    fn test_parse_full_uri() {
        let uri = BunkerUri::parse(&format!(
            "bunker://{}?relay=wss%3A%2F%2Frelay.one&relay=wss://relay.two&secret=s3cret",
            PUBKEY
        ))
        .unwrap();

        assert_eq!(uri.remote_pubkey, PUBKEY);
        assert_eq!(uri.relays, vec!["wss://relay.one", "wss://relay.two"]);
        assert_eq!(uri.secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_secret_is_optional() {
        let uri = BunkerUri::parse(&format!("bunker://{}?relay=ws://127.0.0.1:7000", PUBKEY)).unwrap();
        assert!(uri.secret.is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let uri = BunkerUri::parse(&format!("bunker://{}?relay=wss://r&secret=s3cret", PUBKEY)).unwrap();
        assert!(!format!("{:?}", uri).contains("s3cret"));
    }

    #[test]
    fn test_rejections() {
        for input in [
            format!("bunker://{}", PUBKEY),
            format!("bunker://{}?relay=https://relay", PUBKEY),
            "bunker://nothex?relay=wss://relay".to_string(),
            format!("nostrconnect://{}?relay=wss://relay", PUBKEY),
        ] {
            assert!(
                matches!(BunkerUri::parse(&input), Err(SignerError::InvalidBunkerUri(_))),
                "{}",
                input
            );
        }
    }
}
