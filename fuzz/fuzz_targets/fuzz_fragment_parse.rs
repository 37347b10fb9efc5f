//! Fuzz target for fragment parsing and reassembly.

#![no_main]

use libfuzzer_sys::fuzz_target;
use offrec_wire::{Assembler, Fragment};

fuzz_target!(|data: &[u8]| {
    if let Ok(frag) = Fragment::parse(data) {
        // Parsed counters always satisfy the invariants.
        assert!(frag.index >= 1);
        assert!(frag.index <= frag.total);
        assert!(!frag.payload.is_empty());
    }

    // The assembler must absorb anything without panicking.
    let mut asm = Assembler::new();
    let _ = asm.receive(data);
    let _ = asm.receive(data);
});
