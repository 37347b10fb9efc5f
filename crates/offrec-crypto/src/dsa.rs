//! Long-term DSA identity keys: wire format, fingerprints, sign/verify.
//!
//! The wire serialization is a 2-byte key-type tag `0x0000` followed by the
//! MPIs (p, q, g, y) for a public key, plus x for a private key. The
//! fingerprint is SHA-1 over the public serialization with the type tag
//! omitted. Signatures are a fixed 40 bytes: r and s, each left-padded to
//! 20 bytes.
//!
//! A secondary textual import accepts the libotr S-expression format with
//! the parameters as `#hex#` blobs.

use num_bigint_dig::BigUint;
use num_traits::Zero;
use once_cell::sync::Lazy;
use regex::Regex;
use zeroize::Zeroize;

use offrec_wire::{Decoder, Encoder};

use crate::error::{CryptoError, Result};
use crate::hash::sha1;
use crate::rand::{random_biguint, RandomSource};

/// Wire value of the DSA key type tag.
pub const KEY_TYPE_DSA: u16 = 0x0000;

/// Byte length of a DSA signature (r and s, 20 bytes each).
pub const SIGNATURE_BYTES: usize = 40;

/// Byte length of a key fingerprint.
pub const FINGERPRINT_BYTES: usize = 20;

const SUBGROUP_BYTES: usize = 20;

static SEXP_PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((p|q|g|y|x)\s+#([0-9A-Fa-f]+)#\)").expect("static regex"));

/// The public half of a DSA identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsaPublicKey {
    p: BigUint,
    q: BigUint,
    g: BigUint,
    y: BigUint,
}

impl DsaPublicKey {
    /// Read the type tag and public parameters from `dec`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] for a wrong type tag or a zero
    /// parameter, and propagates truncation as a wire error.
    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let tag = dec.read_u16()?;
        if tag != KEY_TYPE_DSA {
            return Err(CryptoError::InvalidKey("unsupported key type tag"));
        }
        let p = dec.read_mpi()?;
        let q = dec.read_mpi()?;
        let g = dec.read_mpi()?;
        let y = dec.read_mpi()?;
        if p.is_zero() || q.is_zero() || g.is_zero() || y.is_zero() {
            return Err(CryptoError::InvalidKey("zero DSA parameter"));
        }
        Ok(Self { p, q, g, y })
    }

    /// Serialize with the leading type tag.
    pub fn serialize(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_u16(KEY_TYPE_DSA);
        self.append_params(&mut enc);
        enc.into_bytes()
    }

    fn append_params(&self, enc: &mut Encoder) {
        enc.write_mpi(&self.p)
            .write_mpi(&self.q)
            .write_mpi(&self.g)
            .write_mpi(&self.y);
    }

    /// The 20-byte SHA-1 fingerprint of this key.
    ///
    /// Computed over the public serialization without the type tag.
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_BYTES] {
        let mut enc = Encoder::new();
        self.append_params(&mut enc);
        sha1(enc.as_bytes())
    }

    /// Verify a 40-byte signature over `message`.
    ///
    /// Returns any bytes trailing the signature.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureVerification`] on a malformed or
    /// non-verifying signature.
    pub fn verify<'a>(&self, message: &[u8], signature: &'a [u8]) -> Result<&'a [u8]> {
        if signature.len() < SIGNATURE_BYTES {
            return Err(CryptoError::SignatureVerification);
        }
        let r = BigUint::from_bytes_be(&signature[..SUBGROUP_BYTES]);
        let s = BigUint::from_bytes_be(&signature[SUBGROUP_BYTES..SIGNATURE_BYTES]);
        if r.is_zero() || s.is_zero() || r >= self.q || s >= self.q {
            return Err(CryptoError::SignatureVerification);
        }

        let z = truncated_digest(message, &self.q);
        let q_minus_two = &self.q - 2u32;
        let w = s.modpow(&q_minus_two, &self.q);
        let u1 = (&z * &w) % &self.q;
        let u2 = (&r * &w) % &self.q;
        let v = (self.g.modpow(&u1, &self.p) * self.y.modpow(&u2, &self.p)) % &self.p % &self.q;

        if v == r {
            Ok(&signature[SIGNATURE_BYTES..])
        } else {
            Err(CryptoError::SignatureVerification)
        }
    }
}

/// A complete DSA identity keypair.
///
/// The private exponent is zeroized on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct DsaKeyPair {
    public: DsaPublicKey,
    x: BigUint,
}

impl Drop for DsaKeyPair {
    fn drop(&mut self) {
        self.x.zeroize();
    }
}

impl std::fmt::Debug for DsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsaKeyPair")
            .field("fingerprint", &hex_fingerprint(&self.public))
            .finish_non_exhaustive()
    }
}

fn hex_fingerprint(key: &DsaPublicKey) -> String {
    hex::encode(key.fingerprint())
}

impl DsaKeyPair {
    /// Parse a serialized private key, returning any trailing bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] or a wire error for malformed
    /// input.
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let mut dec = Decoder::new(bytes);
        let public = DsaPublicKey::decode(&mut dec)?;
        let x = dec.read_mpi()?;
        if x.is_zero() {
            return Err(CryptoError::InvalidKey("zero private exponent"));
        }
        let rest = dec.read_rest();
        Ok((Self { public, x }, rest))
    }

    /// Serialize with the leading type tag, private exponent last.
    pub fn serialize(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_u16(KEY_TYPE_DSA);
        self.public.append_params(&mut enc);
        enc.write_mpi(&self.x);
        enc.into_bytes()
    }

    /// Import a key from the libotr S-expression text format.
    ///
    /// Scans for the `(p #...#)` through `(x #...#)` parameter blobs; the
    /// surrounding account structure is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] when any parameter is missing.
    pub fn import_sexp(text: &str) -> Result<Self> {
        let mut p = None;
        let mut q = None;
        let mut g = None;
        let mut y = None;
        let mut x = None;
        for caps in SEXP_PARAM_RE.captures_iter(text) {
            let value = BigUint::parse_bytes(caps[2].as_bytes(), 16)
                .ok_or(CryptoError::InvalidKey("bad hex blob"))?;
            match &caps[1] {
                "p" => p = Some(value),
                "q" => q = Some(value),
                "g" => g = Some(value),
                "y" => y = Some(value),
                "x" => x = Some(value),
                _ => unreachable!(),
            }
        }
        match (p, q, g, y, x) {
            (Some(p), Some(q), Some(g), Some(y), Some(x)) => Ok(Self {
                public: DsaPublicKey { p, q, g, y },
                x,
            }),
            _ => Err(CryptoError::InvalidKey("missing S-expression parameter")),
        }
    }

    /// The public half.
    pub fn public(&self) -> &DsaPublicKey {
        &self.public
    }

    /// Sign `message`, producing the fixed 40-byte (r, s) encoding.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::ShortRandomRead`] when the nonce source runs
    /// dry.
    pub fn sign(&self, rand: &mut dyn RandomSource, message: &[u8]) -> Result<[u8; SIGNATURE_BYTES]> {
        let q = &self.public.q;
        let z = truncated_digest(message, q);
        let q_minus_two = q - 2u32;

        loop {
            let k = random_biguint(rand, SUBGROUP_BYTES)? % q;
            if k.is_zero() {
                continue;
            }
            let r = self.public.g.modpow(&k, &self.public.p) % q;
            if r.is_zero() {
                continue;
            }
            let k_inv = k.modpow(&q_minus_two, q);
            let s = (&k_inv * (&z + &self.x * &r)) % q;
            if s.is_zero() {
                continue;
            }

            let mut signature = [0u8; SIGNATURE_BYTES];
            write_padded(&mut signature[..SUBGROUP_BYTES], &r);
            write_padded(&mut signature[SUBGROUP_BYTES..], &s);
            return Ok(signature);
        }
    }
}

/// The message digest interpreted as an integer, truncated to the byte
/// length of `q` as FIPS 186 prescribes for oversized hashes.
fn truncated_digest(message: &[u8], q: &BigUint) -> BigUint {
    let q_len = (q.bits() + 7) / 8;
    let take = message.len().min(q_len);
    BigUint::from_bytes_be(&message[..take])
}

/// Left-pad `value` into `out` big-endian.
fn write_padded(out: &mut [u8], value: &BigUint) {
    let bytes = value.to_bytes_be();
    let offset = out.len() - bytes.len();
    out[offset..].copy_from_slice(&bytes);
}
