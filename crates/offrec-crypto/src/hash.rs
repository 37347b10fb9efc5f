//! SHA-1/SHA-256 digests and the HMAC variants the protocol uses.

use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// SHA-1 of `data`.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

/// SHA-1 of a one-byte prefix followed by `data`.
///
/// The session-key derivations of the ratchet are all of this shape.
pub fn sha1_prefixed(prefix: u8, data: &[u8]) -> [u8; 20] {
    let mut h = Sha1::new();
    h.update([prefix]);
    h.update(data);
    h.finalize().into()
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 of a one-byte prefix followed by `data`.
///
/// The AKE key derivations and the SMP secret are all of this shape.
pub fn sha256_prefixed(prefix: u8, data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update([prefix]);
    h.update(data);
    h.finalize().into()
}

/// HMAC-SHA-256 of `data` under `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA-256 truncated to 160 bits, as used for AKE signature MACs.
pub fn hmac_sha256_160(key: &[u8], data: &[u8]) -> [u8; 20] {
    let full = hmac_sha256(key, data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&full[..20]);
    out
}

/// HMAC-SHA-1 of `data` under `key`, as used for data-message authenticators.
pub fn hmac_sha1(key: &[u8], data: &[u8]) -> [u8; 20] {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Constant-time equality for MACs and digests.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_known_vector() {
        // SHA-1("abc")
        assert_eq!(
            hex::encode(sha1(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_prefixed_differs_from_plain() {
        assert_ne!(sha256_prefixed(0x00, b"data"), sha256(b"data"));
        assert_ne!(sha256_prefixed(0x01, b"data"), sha256_prefixed(0x02, b"data"));
        assert_ne!(sha1_prefixed(0x01, b"data"), sha1_prefixed(0x02, b"data"));
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case_2() {
        let tag = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_truncation_is_prefix() {
        let full = hmac_sha256(b"key", b"message");
        let short = hmac_sha256_160(b"key", b"message");
        assert_eq!(&full[..20], short);
    }

    #[test]
    fn test_ct_eq() {
        assert!(ct_eq(b"same", b"same"));
        assert!(!ct_eq(b"same", b"sama"));
        assert!(!ct_eq(b"short", b"longer"));
    }
}
