#![no_main]

use attest_signer::bunker::rpc::{RelayMessage, RpcResponse};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let _ = RelayMessage::from_json(text);

    // Decrypted bunker responses are just as untrusted
    if let Ok(response) = serde_json::from_str::<RpcResponse>(text) {
        let _ = response.auth_challenge();
        let _ = response.into_result();
    }
});
