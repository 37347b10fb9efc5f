//! Property-based tests across the protocol layers.

use proptest::prelude::*;

use offrec_crypto::{DhKeyPair, SeededRandom};
use offrec_wire::{Decoder, MessageHeader, MessageType, Version};

use crate::data::{self, FLAG_IGNORE_UNREADABLE};
use crate::keys::KeyManager;
use crate::tlv::{encode_tlvs, parse_tlvs, Tlv};

fn linked_managers(seed: u64) -> (KeyManager, KeyManager) {
    let mut rand = SeededRandom::new(seed);
    let a = DhKeyPair::generate(&mut rand).unwrap();
    let b = DhKeyPair::generate(&mut rand).unwrap();
    let alice = KeyManager::new(&mut rand, a.clone(), 1, b.public().clone()).unwrap();
    let bob = KeyManager::new(&mut rand, b, 1, a.public().clone()).unwrap();
    (alice, bob)
}

fn v3_header() -> MessageHeader {
    MessageHeader {
        version: Version::V3,
        message_type: MessageType::Data,
        sender_tag: 0x101,
        receiver_tag: 0x102,
    }
}

proptest! {
    /// TLV lists of arbitrary shape round-trip.
    #[test]
    fn tlv_roundtrip(records in prop::collection::vec(
        (any::<u16>(), prop::collection::vec(any::<u8>(), 0..64)),
        0..8,
    )) {
        let tlvs: Vec<Tlv> = records
            .into_iter()
            .map(|(typ, value)| Tlv::new(typ, value))
            .collect();
        prop_assert_eq!(parse_tlvs(&encode_tlvs(&tlvs)).unwrap(), tlvs);
    }

    /// Data-message bodies round-trip for NUL-free human text.
    #[test]
    fn body_roundtrip(
        human in prop::collection::vec(1u8..=255, 0..128),
        values in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..4),
    ) {
        let tlvs: Vec<Tlv> = values.into_iter().map(|v| Tlv::new(0, v)).collect();
        let body = data::encode_body(&human, &tlvs);
        let (human_out, tlvs_out) = data::decode_body(&body).unwrap();
        prop_assert_eq!(human_out, human);
        prop_assert_eq!(tlvs_out, tlvs);
    }

    /// Seal/parse/decrypt round-trips arbitrary payloads, and the MAC
    /// verifies under the peer's receiving keys.
    #[test]
    fn sealed_message_roundtrip(
        payload in prop::collection::vec(1u8..=255, 0..256),
        seed in 1u64..500,
    ) {
        let (mut alice, mut bob) = linked_managers(seed);
        let params = alice.prepare_send().unwrap();
        let body = data::encode_body(&payload, &[]);
        let full = data::seal(&v3_header(), FLAG_IGNORE_UNREADABLE, &params, &body, &[]);

        let mut dec = Decoder::new(&full);
        MessageHeader::decode(&mut dec).unwrap();
        let parsed = data::parse(&full, &mut dec).unwrap();
        let keys = bob
            .receiving_keys(parsed.sender_keyid, parsed.recipient_keyid)
            .unwrap();
        let expected_mac = parsed.expected_mac(&keys.recv_mac);
        prop_assert_eq!(expected_mac.as_slice(), parsed.mac);

        let (human, tlvs) = data::decode_body(&parsed.decrypt(&keys.recv_aes)).unwrap();
        prop_assert_eq!(human, payload);
        prop_assert!(tlvs.is_empty());
    }

    /// Outbound counters strictly increase no matter the send pattern.
    #[test]
    fn counters_strictly_increase(sends in 1usize..20, seed in 1u64..500) {
        let (mut alice, _) = linked_managers(seed);
        let mut last = 0u64;
        for _ in 0..sends {
            let params = alice.prepare_send().unwrap();
            let ctr = u64::from_be_bytes(params.top_ctr);
            prop_assert!(ctr > last);
            last = ctr;
        }
    }
}
