//! Size limits applied before any allocation driven by attacker input.

/// Maximum byte length of a single MPI magnitude.
///
/// The largest integers on the wire are 1536-bit group elements (192 bytes);
/// DSA parameters stay well under this too. Anything bigger is rejected
/// before allocation.
pub const MAX_MPI_BYTES: usize = 8 * 1024;

/// Maximum byte length of a single DATA block.
///
/// Bounds the allocation for encrypted payloads and revealed-MAC-key lists.
pub const MAX_DATA_BYTES: usize = 1024 * 1024;

/// Highest fragment index/count the `k,N` counters can express.
pub const MAX_FRAGMENTS: u16 = u16::MAX;
