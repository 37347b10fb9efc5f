//! Ephemeral Diffie-Hellman keypairs over the MODP group.

use num_bigint_dig::BigUint;
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::group;
use crate::rand::RandomSource;

/// Byte length of a DH private exponent (320 bits).
pub const DH_PRIVATE_BYTES: usize = 40;

/// An ephemeral DH keypair.
///
/// The private exponent is zeroized on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct DhKeyPair {
    private: BigUint,
    public: BigUint,
}

impl Drop for DhKeyPair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl DhKeyPair {
    /// Generate a fresh keypair from `rand`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::ShortRandomRead`] when the source cannot
    /// supply enough bytes; no partial state escapes.
    pub fn generate(rand: &mut dyn RandomSource) -> Result<Self> {
        let mut buf = [0u8; DH_PRIVATE_BYTES];
        if !rand.fill(&mut buf) {
            return Err(CryptoError::ShortRandomRead);
        }
        let private = BigUint::from_bytes_be(&buf);
        buf.zeroize();
        let public = group::generator_exp(&private);
        Ok(Self { private, public })
    }

    /// Reconstruct a keypair from a known private exponent.
    pub fn from_private(private: BigUint) -> Self {
        let public = group::generator_exp(&private);
        Self { private, public }
    }

    /// The public half, `g^x mod p`.
    pub fn public(&self) -> &BigUint {
        &self.public
    }

    /// The shared secret with a peer public value: `their_pub ^ x mod p`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidGroupElement`] when `their_public` is
    /// outside the group.
    pub fn shared_secret(&self, their_public: &BigUint) -> Result<BigUint> {
        if !group::is_group_element(their_public) {
            return Err(CryptoError::InvalidGroupElement);
        }
        Ok(group::mod_exp(their_public, &self.private))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rand::SeededRandom;

    #[test]
    fn test_shared_secret_agrees() {
        let mut rand = SeededRandom::new(7);
        let a = DhKeyPair::generate(&mut rand).unwrap();
        let b = DhKeyPair::generate(&mut rand).unwrap();

        let s1 = a.shared_secret(b.public()).unwrap();
        let s2 = b.shared_secret(a.public()).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_rejects_degenerate_peer_values() {
        let mut rand = SeededRandom::new(7);
        let kp = DhKeyPair::generate(&mut rand).unwrap();

        for bad in [
            BigUint::from(0u32),
            BigUint::from(1u32),
            &*group::P - 1u32,
            group::P.clone(),
        ] {
            assert_eq!(
                kp.shared_secret(&bad),
                Err(CryptoError::InvalidGroupElement)
            );
        }
    }

    #[test]
    fn test_short_random_read_fails_cleanly() {
        let mut rand = crate::rand::ScriptedRandom::new(vec![0xAA; 10]);
        assert_eq!(
            DhKeyPair::generate(&mut rand).unwrap_err(),
            CryptoError::ShortRandomRead
        );
    }

    #[test]
    fn test_public_matches_private() {
        let kp = DhKeyPair::from_private(BigUint::from(12345u32));
        assert_eq!(*kp.public(), group::generator_exp(&BigUint::from(12345u32)));
    }
}
