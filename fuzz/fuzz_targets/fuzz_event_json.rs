#![no_main]

use attest_core::Event;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(event) = Event::from_json(text) {
        // Verification must fail cleanly on garbage ids and signatures
        let _ = event.verify();
        let _ = event.unsigned_payload();

        // Id depends only on the fields, so it survives a round trip
        if let Ok(id) = event.compute_id() {
            let json = event.to_json().unwrap();
            let event2 = Event::from_json(&json).unwrap();
            assert_eq!(event2.compute_id().unwrap(), id);
        }
    }
});
