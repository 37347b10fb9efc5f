//! Fuzz target for DSA key parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use offrec_crypto::DsaKeyPair;

fuzz_target!(|data: &[u8]| {
    if let Ok((key, _rest)) = DsaKeyPair::parse(data) {
        // A parsed key re-serializes into something that parses back to
        // the same key. (The input itself may use non-minimal MPIs, so
        // byte equality with the input is not guaranteed.)
        let bytes = key.serialize();
        let (reparsed, rest) = DsaKeyPair::parse(&bytes).expect("reserialized key must parse");
        assert!(rest.is_empty());
        assert_eq!(reparsed.public().fingerprint(), key.public().fingerprint());
    }
});
