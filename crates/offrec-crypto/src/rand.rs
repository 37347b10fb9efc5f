//! The injected randomness capability.
//!
//! Every operation that needs entropy takes a [`RandomSource`] so that
//! production uses the operating system RNG while tests run on
//! deterministic fixtures. A source that cannot fill the buffer reports
//! failure and the calling operation aborts without touching state.

use num_bigint_dig::BigUint;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};

/// A source of cryptographically relevant random bytes.
pub trait RandomSource {
    /// Fill `buf` completely, returning `false` on a short read.
    fn fill(&mut self, buf: &mut [u8]) -> bool;
}

/// The operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&mut self, buf: &mut [u8]) -> bool {
        OsRng.try_fill_bytes(buf).is_ok()
    }
}

/// A deterministic source seeded from a 64-bit value.
///
/// Never runs dry; intended for tests and reproducible simulations.
#[derive(Debug)]
pub struct SeededRandom(StdRng);

impl SeededRandom {
    /// Create a source whose output is fully determined by `seed`.
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl RandomSource for SeededRandom {
    fn fill(&mut self, buf: &mut [u8]) -> bool {
        self.0.try_fill_bytes(buf).is_ok()
    }
}

/// A source that replays a fixed byte script and then runs dry.
///
/// Useful for exercising the short-read failure paths.
#[derive(Debug)]
pub struct ScriptedRandom {
    bytes: Vec<u8>,
    pos: usize,
}

impl ScriptedRandom {
    /// Create a source that will hand out exactly `bytes` and then fail.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl RandomSource for ScriptedRandom {
    fn fill(&mut self, buf: &mut [u8]) -> bool {
        if self.bytes.len() - self.pos < buf.len() {
            return false;
        }
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        true
    }
}

/// Draw a fixed-size array of random bytes.
///
/// # Errors
///
/// Returns [`CryptoError::ShortRandomRead`] when the source runs dry.
pub fn random_bytes<const N: usize>(rand: &mut dyn RandomSource) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    if !rand.fill(&mut buf) {
        return Err(CryptoError::ShortRandomRead);
    }
    Ok(buf)
}

/// Draw a random big integer of `bytes` length.
///
/// # Errors
///
/// Returns [`CryptoError::ShortRandomRead`] when the source runs dry.
pub fn random_biguint(rand: &mut dyn RandomSource, bytes: usize) -> Result<BigUint> {
    let mut buf = vec![0u8; bytes];
    if !rand.fill(&mut buf) {
        return Err(CryptoError::ShortRandomRead);
    }
    let n = BigUint::from_bytes_be(&buf);
    buf.zeroize();
    Ok(n)
}
