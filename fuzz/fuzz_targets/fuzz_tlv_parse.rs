//! Fuzz target for TLV framing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use offrec_protocol::tlv::{encode_tlvs, parse_tlvs};

fuzz_target!(|data: &[u8]| {
    if let Ok(tlvs) = parse_tlvs(data) {
        // A successful parse consumed exactly the input, so re-encoding
        // reproduces it.
        assert_eq!(encode_tlvs(&tlvs), data);
    }
});
