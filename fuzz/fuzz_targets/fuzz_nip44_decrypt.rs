#![no_main]

use arbitrary::Arbitrary;
use attest_core::{nip44, Keys};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    secret: [u8; 32],
    peer_secret: [u8; 32],
    payload: String,
}

fuzz_target!(|input: Input| {
    let (Ok(keys), Ok(peer)) = (
        Keys::from_secret_bytes(&input.secret),
        Keys::from_secret_bytes(&input.peer_secret),
    ) else {
        return;
    };
    let Ok(key) = nip44::conversation_key(&keys, &peer.public_key_hex()) else {
        return;
    };

    // Arbitrary payloads must be rejected without panicking
    let _ = nip44::decrypt(&key, &input.payload);

    if !input.payload.is_empty() && input.payload.len() <= nip44::MAX_PLAINTEXT_LEN {
        let sealed = nip44::encrypt(&key, &input.payload).unwrap();
        assert_eq!(nip44::decrypt(&key, &sealed).unwrap(), input.payload);
    }
});
