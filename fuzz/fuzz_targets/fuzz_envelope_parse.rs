//! Fuzz target for armored-envelope parsing.
//!
//! Arbitrary bytes must either unarmor and decode into a header or fail
//! cleanly - never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use offrec_wire::envelope::{armor, unarmor};
use offrec_wire::{Decoder, MessageHeader};

fuzz_target!(|data: &[u8]| {
    if let Ok(binary) = unarmor(data) {
        // Whatever unarmored must re-armor to the same input shape.
        let rearmored = armor(&binary);
        assert_eq!(unarmor(&rearmored).unwrap(), binary);

        let mut dec = Decoder::new(&binary);
        let _ = MessageHeader::decode(&mut dec);
    }

    // Raw bytes straight into the header parser.
    let mut dec = Decoder::new(data);
    let _ = MessageHeader::decode(&mut dec);
});
