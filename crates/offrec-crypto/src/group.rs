//! The 1536-bit MODP group (RFC 3526 group 5) and its arithmetic.
//!
//! All OTR exponentiations happen modulo the prime `p` below, with
//! generator `g = 2` and subgroup order `q = (p - 1) / 2`. A value is a
//! valid group element when `g <= n <= p - 2`; everything else causes the
//! containing message to be rejected.

use num_bigint_dig::BigUint;
use once_cell::sync::Lazy;

/// The 1536-bit prime field modulus.
pub static P: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(
        b"FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
          29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
          EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
          E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
          EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D\
          C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F\
          83655D23DCA3AD961C62F356208552BB9ED529077096966D\
          670C354E4ABC9804F1746C08CA237327FFFFFFFFFFFFFFFF",
        16,
    )
    .expect("static modulus literal")
});

/// The subgroup order `q = (p - 1) / 2`.
pub static Q: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(
        b"7FFFFFFFFFFFFFFFE487ED5110B4611A62633145C06E0E68\
          948127044533E63A0105DF531D89CD9128A5043CC71A026E\
          F7CA8CD9E69D218D98158536F92F8A1BA7F09AB6B6A8E122\
          F242DABB312F3F637A262174D31BF6B585FFAE5B7A035BF6\
          F71C35FDAD44CFD2D74F9208BE258FF324943328F6722D9E\
          E1003E5C50B1DF82CC6D241B0E2AE9CD348B1FD47E9267AF\
          C1B2AE91EE51D6CB0E3179AB1042A95DCF6A9483B84B4B36\
          B3861AA7255E4C0278BA36046511B993FFFFFFFFFFFFFFFF",
        16,
    )
    .expect("static order literal")
});

/// The group generator, `g = 2`.
pub static G: Lazy<BigUint> = Lazy::new(|| BigUint::from(2u32));

static P_MINUS_TWO: Lazy<BigUint> = Lazy::new(|| &*P - 2u32);

/// Whether `n` is a valid group element: `g <= n <= p - 2`.
pub fn is_group_element(n: &BigUint) -> bool {
    *G <= *n && *n <= *P_MINUS_TWO
}

/// `base ^ exp mod p`, via constant-time Montgomery exponentiation.
pub fn mod_exp(base: &BigUint, exp: &BigUint) -> BigUint {
    base.modpow(exp, &P)
}

/// `g ^ exp mod p`.
pub fn generator_exp(exp: &BigUint) -> BigUint {
    mod_exp(&G, exp)
}

/// `a * b mod p`.
pub fn mul_mod_p(a: &BigUint, b: &BigUint) -> BigUint {
    (a * b) % &*P
}

/// `a / b mod p`, i.e. `a * b^-1 mod p` (p is prime, so `b^-1 = b^(p-2)`).
pub fn div_mod_p(a: &BigUint, b: &BigUint) -> BigUint {
    let inv = b.modpow(&P_MINUS_TWO, &P);
    (a * inv) % &*P
}

/// `a - b mod q`, for exponent arithmetic in Schnorr proofs.
pub fn sub_mod_q(a: &BigUint, b: &BigUint) -> BigUint {
    let a = a % &*Q;
    let b = b % &*Q;
    (a + &*Q - b) % &*Q
}

/// `a * b mod q`.
pub fn mul_mod_q(a: &BigUint, b: &BigUint) -> BigUint {
    (a * b) % &*Q
}
