//! AES-128 in counter mode, the protocol's only cipher.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Byte length of an AES-128 key.
pub const AES_KEY_BYTES: usize = 16;

/// Byte length of the CTR counter block.
pub const CTR_BLOCK_BYTES: usize = 16;

/// Encrypt or decrypt `data` with AES-128-CTR (the operation is its own
/// inverse). The full 16-byte initial counter block is caller-supplied.
pub fn aes128_ctr(key: &[u8; AES_KEY_BYTES], counter: &[u8; CTR_BLOCK_BYTES], data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    let mut cipher = Aes128Ctr::new(key.into(), counter.into());
    cipher.apply_keystream(&mut out);
    out
}

/// Encrypt or decrypt with only the high half of the counter block set.
///
/// Data messages transmit the top 8 counter bytes; the low 8 start at zero.
pub fn aes128_ctr_top_half(key: &[u8; AES_KEY_BYTES], top: &[u8; 8], data: &[u8]) -> Vec<u8> {
    let mut counter = [0u8; CTR_BLOCK_BYTES];
    counter[..8].copy_from_slice(top);
    aes128_ctr(key, &counter, data)
}

/// Encrypt or decrypt with an all-zero counter block, as the AKE does.
pub fn aes128_ctr_zero(key: &[u8; AES_KEY_BYTES], data: &[u8]) -> Vec<u8> {
    aes128_ctr(key, &[0u8; CTR_BLOCK_BYTES], data)
}
