//! # offrec-crypto
//!
//! Cryptographic primitives for the OTR messaging core.
//!
//! This crate provides:
//!
//! - **Group arithmetic**: the 1536-bit MODP group (RFC 3526 group 5),
//!   element validation and modular exponentiation ([`group`])
//! - **Diffie-Hellman**: ephemeral keypairs over that group ([`dh`])
//! - **DSA identity keys**: parse/serialize, sign/verify, fingerprints and
//!   libotr S-expression import ([`dsa`])
//! - **Symmetric primitives**: AES-128-CTR, SHA-1/SHA-256, HMAC variants
//!   ([`cipher`], [`hash`])
//! - **Randomness**: the injected [`RandomSource`] capability
//!
//! ## Security
//!
//! Private key material is zeroized when replaced or dropped. MAC and
//! digest comparisons go through `subtle` constant-time equality.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cipher;
pub mod dh;
pub mod dsa;
pub mod error;
pub mod group;
pub mod hash;
pub mod rand;

pub use dh::DhKeyPair;
pub use dsa::{DsaKeyPair, DsaPublicKey, SIGNATURE_BYTES};
pub use error::{CryptoError, Result};
pub use rand::{OsRandom, RandomSource, ScriptedRandom, SeededRandom};
