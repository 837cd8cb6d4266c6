#![no_main]

use attest_signer::BunkerUri;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(uri) = BunkerUri::parse(text) {
        assert_eq!(uri.remote_pubkey.len(), 64);
        assert!(!uri.relays.is_empty());
        assert!(uri.secret.as_deref().map_or(true, |s| !s.is_empty()));
    }
});
