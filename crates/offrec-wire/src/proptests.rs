//! Property-based tests for the codec and fragmentation layers.
//!
//! These verify round-trip and bounds properties for arbitrary inputs:
//! whatever the encoder emits, the decoder must read back, and the
//! fragmenter must never exceed its size limit.

use num_bigint_dig::BigUint;
use proptest::prelude::*;

use crate::codec::{encode_mpi, Decoder, Encoder};
use crate::envelope::{armor, unarmor};
use crate::fragment::{fragment, Assembler};
use crate::Version;

proptest! {
    /// MPI encoding round-trips through the decoder.
    #[test]
    fn mpi_roundtrip(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let n = BigUint::from_bytes_be(&bytes);
        let encoded = encode_mpi(&n);
        let mut dec = Decoder::new(&encoded);
        prop_assert_eq!(dec.read_mpi().unwrap(), n);
        prop_assert!(dec.is_empty());
    }

    /// MPI magnitudes never carry a leading zero byte.
    #[test]
    fn mpi_is_minimal(bytes in prop::collection::vec(any::<u8>(), 1..64)) {
        let n = BigUint::from_bytes_be(&bytes);
        let encoded = encode_mpi(&n);
        if encoded.len() > 4 {
            prop_assert_ne!(encoded[4], 0);
        }
    }

    /// DATA blocks round-trip.
    #[test]
    fn data_roundtrip(payload in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut enc = Encoder::new();
        enc.write_data(&payload);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        prop_assert_eq!(dec.read_data().unwrap(), payload.as_slice());
    }

    /// Armoring round-trips for arbitrary binary.
    #[test]
    fn armor_roundtrip(binary in prop::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(unarmor(&armor(&binary)).unwrap(), binary);
    }

    /// Every emitted fragment respects the size budget and the full set
    /// reassembles to the original message.
    #[test]
    fn fragment_bounds_and_reassembly(
        message in prop::collection::vec(any::<u8>(), 1..2000),
        size in 40usize..200,
    ) {
        let frags = fragment(Version::V3, 0x101, 0x102, size, &message).unwrap();
        if frags.len() > 1 {
            for frag in &frags {
                prop_assert!(frag.len() <= size);
            }
        }
        let mut asm = Assembler::new();
        let mut out = None;
        for frag in &frags {
            out = asm.receive(frag).unwrap_or(None);
        }
        if frags.len() > 1 {
            prop_assert_eq!(out.unwrap(), message);
        }
    }

    /// Feeding the decoder random garbage never panics.
    #[test]
    fn decoder_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
        let mut dec = Decoder::new(&bytes);
        let _ = dec.read_mpi();
        let _ = dec.read_data();
        let _ = dec.read_u32();
    }
}
