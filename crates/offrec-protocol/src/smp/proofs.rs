//! Non-interactive Schnorr proofs over the DH group.
//!
//! Every proof hashes a one-byte index (1 through 8, fixed per protocol
//! position) followed by the MPI encodings of the commitment values, so a
//! proof cannot be transplanted to a different message slot.

use num_bigint_dig::BigUint;

use offrec_crypto::hash::sha256;
use offrec_crypto::rand::random_biguint;
use offrec_crypto::{group, RandomSource};
use offrec_wire::codec::encode_mpi;

use crate::error::Result;

/// Byte width of the random exponents (1536 bits, the group width).
const EXPONENT_BYTES: usize = 192;

/// Draw a random exponent for commitments and proof nonces.
pub(super) fn random_exponent(rand: &mut dyn RandomSource) -> Result<BigUint> {
    Ok(random_biguint(rand, EXPONENT_BYTES)?)
}

/// `SHA256(index || MPI(parts[0]) || ...)` as an integer.
fn challenge(index: u8, parts: &[&BigUint]) -> BigUint {
    let mut buf = vec![index];
    for part in parts {
        buf.extend_from_slice(&encode_mpi(part));
    }
    BigUint::from_bytes_be(&sha256(&buf))
}

/// Prove knowledge of `w` in `G = g^w`. Returns `(c, d)`.
pub(super) fn prove_log(
    rand: &mut dyn RandomSource,
    index: u8,
    w: &BigUint,
) -> Result<(BigUint, BigUint)> {
    let r = random_exponent(rand)?;
    let c = challenge(index, &[&group::generator_exp(&r)]);
    let d = group::sub_mod_q(&r, &group::mul_mod_q(&c, w));
    Ok((c, d))
}

/// Verify a [`prove_log`] proof for the public value `big_g`.
pub(super) fn verify_log(index: u8, big_g: &BigUint, c: &BigUint, d: &BigUint) -> bool {
    let lhs = group::mul_mod_p(&group::generator_exp(d), &group::mod_exp(big_g, c));
    challenge(index, &[&lhs]) == *c
}

/// Prove that `(P, Q) = (g3^r4, g^r4 * g2^secret)` for known `r4` and
/// `secret`. Returns `(c, d5, d6)`.
pub(super) fn prove_coords(
    rand: &mut dyn RandomSource,
    index: u8,
    g2: &BigUint,
    g3: &BigUint,
    r4: &BigUint,
    secret: &BigUint,
) -> Result<(BigUint, BigUint, BigUint)> {
    let r5 = random_exponent(rand)?;
    let r6 = random_exponent(rand)?;
    let c = challenge(
        index,
        &[
            &group::mod_exp(g3, &r5),
            &group::mul_mod_p(&group::generator_exp(&r5), &group::mod_exp(g2, &r6)),
        ],
    );
    let d5 = group::sub_mod_q(&r5, &group::mul_mod_q(&c, r4));
    let d6 = group::sub_mod_q(&r6, &group::mul_mod_q(&c, secret));
    Ok((c, d5, d6))
}

/// Verify a [`prove_coords`] proof for public `(P, Q)`.
pub(super) fn verify_coords(
    index: u8,
    g2: &BigUint,
    g3: &BigUint,
    p: &BigUint,
    q: &BigUint,
    c: &BigUint,
    d5: &BigUint,
    d6: &BigUint,
) -> bool {
    let first = group::mul_mod_p(&group::mod_exp(g3, d5), &group::mod_exp(p, c));
    let second = group::mul_mod_p(
        &group::mul_mod_p(&group::generator_exp(d5), &group::mod_exp(g2, d6)),
        &group::mod_exp(q, c),
    );
    challenge(index, &[&first, &second]) == *c
}

/// Prove that `R = base^w` for the same `w` behind `g^w`. Returns
/// `(c, d7)`.
pub(super) fn prove_log_eq(
    rand: &mut dyn RandomSource,
    index: u8,
    w: &BigUint,
    base: &BigUint,
) -> Result<(BigUint, BigUint)> {
    let r7 = random_exponent(rand)?;
    let c = challenge(
        index,
        &[&group::generator_exp(&r7), &group::mod_exp(base, &r7)],
    );
    let d7 = group::sub_mod_q(&r7, &group::mul_mod_q(&c, w));
    Ok((c, d7))
}

/// Verify a [`prove_log_eq`] proof, where `big_g = g^w` and `r = base^w`.
pub(super) fn verify_log_eq(
    index: u8,
    big_g: &BigUint,
    r: &BigUint,
    base: &BigUint,
    c: &BigUint,
    d7: &BigUint,
) -> bool {
    let first = group::mul_mod_p(&group::generator_exp(d7), &group::mod_exp(big_g, c));
    let second = group::mul_mod_p(&group::mod_exp(base, d7), &group::mod_exp(r, c));
    challenge(index, &[&first, &second]) == *c
}
