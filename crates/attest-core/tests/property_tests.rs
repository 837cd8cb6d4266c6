//! Property-based tests for attest-core using proptest
//!
//! These tests verify invariants that should hold for all valid inputs.

use attest_core::{kinds, nip19, nip44, Event, Keys, Tags};
use proptest::prelude::*;

// ============================================
// Strategies
// ============================================

fn arb_keys() -> impl Strategy<Value = Keys> {
    any::<[u8; 32]>().prop_filter_map("valid secp256k1 scalar", |bytes| {
        Keys::from_secret_bytes(&bytes).ok()
    })
}

fn arb_tags() -> impl Strategy<Value = Tags> {
    prop::collection::vec(prop::collection::vec("[a-z0-9:/.]{1,16}", 1..4), 0..6)
}

fn arb_event() -> impl Strategy<Value = Event> {
    (
        prop_oneof![
            Just(kinds::ASSET),
            Just(kinds::RELEASE),
            Just(kinds::APP_METADATA),
            Just(kinds::IDENTITY_PROOF),
        ],
        ".{0,64}",
        arb_tags(),
        1u64..4_000_000_000,
        any::<[u8; 32]>(),
    )
        .prop_map(|(kind, content, tags, created_at, author)| {
            let mut event = Event::new(kind, content, tags);
            event.created_at = created_at;
            event.pubkey = hex::encode(author);
            event
        })
}

// ============================================
// Event id
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn id_is_idempotent(event in arb_event()) {
        prop_assert_eq!(event.compute_id().unwrap(), event.compute_id().unwrap());
    }

    #[test]
    fn content_change_changes_id(event in arb_event(), suffix in "[a-z]{1,8}") {
        let mut changed = event.clone();
        changed.content.push_str(&suffix);
        prop_assert_ne!(event.compute_id().unwrap(), changed.compute_id().unwrap());
    }

    #[test]
    fn timestamp_change_changes_id(event in arb_event(), delta in 1u64..1_000_000) {
        let mut changed = event.clone();
        changed.created_at += delta;
        prop_assert_ne!(event.compute_id().unwrap(), changed.compute_id().unwrap());
    }

    #[test]
    fn tag_change_changes_id(event in arb_event(), value in "[a-z]{1,8}") {
        let mut changed = event.clone();
        changed.tags.push(vec!["t".to_string(), value]);
        prop_assert_ne!(event.compute_id().unwrap(), changed.compute_id().unwrap());
    }

    #[test]
    fn author_change_changes_id(event in arb_event(), other in any::<[u8; 32]>()) {
        let mut changed = event.clone();
        changed.pubkey = hex::encode(other);
        prop_assume!(changed.pubkey != event.pubkey);
        prop_assert_ne!(event.compute_id().unwrap(), changed.compute_id().unwrap());
    }
}

// ============================================
// Signing and key encoding
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn signed_events_verify(keys in arb_keys(), event in arb_event()) {
        let mut event = event;
        keys.sign_event(&mut event).unwrap();
        prop_assert_eq!(&event.pubkey, &keys.public_key_hex());
        prop_assert!(event.verify().is_ok());
    }

    #[test]
    fn nsec_recovers_same_key(keys in arb_keys()) {
        let nsec = keys.to_nsec().unwrap();
        let recovered = Keys::parse_nsec(&nsec).unwrap();
        prop_assert_eq!(keys.public_key_hex(), recovered.public_key_hex());
        prop_assert_eq!(nip19::npub_to_hex(&keys.to_npub().unwrap()).unwrap(), keys.public_key_hex());
    }
}

// ============================================
// NIP-44
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn nip44_roundtrip(alice in arb_keys(), bob in arb_keys(), message in ".{1,300}") {
        let sender = nip44::conversation_key(&alice, &bob.public_key_hex()).unwrap();
        let receiver = nip44::conversation_key(&bob, &alice.public_key_hex()).unwrap();

        let payload = nip44::encrypt(&sender, &message).unwrap();
        prop_assert_eq!(nip44::decrypt(&receiver, &payload).unwrap(), message);
    }

    #[test]
    fn padded_len_covers_plaintext(len in 1usize..=65535) {
        let padded = nip44::calc_padded_len(len);
        prop_assert!(padded >= len);
        prop_assert!(padded >= 32);
    }
}
