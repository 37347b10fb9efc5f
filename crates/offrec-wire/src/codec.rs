//! Primitive byte codecs: big-endian integers, MPIs, DATA blocks, counters.
//!
//! All multi-byte integers on the OTR wire are big-endian. An MPI is a
//! 4-byte length followed by the minimal-length big-endian magnitude (no
//! leading zero bytes; zero encodes with length 0). A DATA block is a
//! 4-byte length followed by that many raw bytes.

use num_bigint_dig::BigUint;

use crate::error::{Result, WireError};
use crate::limits::{MAX_DATA_BYTES, MAX_MPI_BYTES};

/// Appends wire primitives to a growing byte buffer.
#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Create an empty encoder.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append a single byte.
    pub fn write_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    /// Append a big-endian 16-bit integer.
    pub fn write_u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Append a big-endian 32-bit integer.
    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Append raw bytes with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Append an 8-byte counter value.
    pub fn write_ctr(&mut self, ctr: &[u8; 8]) -> &mut Self {
        self.buf.extend_from_slice(ctr);
        self
    }

    /// Append a DATA block: 4-byte length then the bytes.
    pub fn write_data(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Append an MPI: 4-byte length then the minimal big-endian magnitude.
    pub fn write_mpi(&mut self, n: &BigUint) -> &mut Self {
        let bytes = mpi_magnitude(n);
        self.write_u32(bytes.len() as u32);
        self.buf.extend_from_slice(&bytes);
        self
    }

    /// Consume the encoder and return the assembled bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Borrow the bytes assembled so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// The minimal-length big-endian magnitude of `n` (empty for zero).
pub fn mpi_magnitude(n: &BigUint) -> Vec<u8> {
    let bytes = n.to_bytes_be();
    // BigUint encodes zero as [0]; the wire form of zero is length 0.
    if bytes == [0] {
        Vec::new()
    } else {
        bytes
    }
}

/// The full wire encoding of a single MPI.
pub fn encode_mpi(n: &BigUint) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.write_mpi(n);
    enc.into_bytes()
}

/// Reads wire primitives from a byte slice, tracking position.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Create a decoder over `buf`, positioned at its start.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current read offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(WireError::InvalidMessage("unexpected end of message"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian 16-bit integer.
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian 32-bit integer.
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read an 8-byte counter value.
    pub fn read_ctr(&mut self) -> Result<[u8; 8]> {
        let b = self.take(8)?;
        let mut ctr = [0u8; 8];
        ctr.copy_from_slice(b);
        Ok(ctr)
    }

    /// Read exactly `n` raw bytes.
    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Read a DATA block and return its payload.
    pub fn read_data(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        if len > MAX_DATA_BYTES {
            return Err(WireError::InvalidMessage("DATA block too large"));
        }
        self.take(len)
    }

    /// Read an MPI and return its value.
    pub fn read_mpi(&mut self) -> Result<BigUint> {
        let len = self.read_u32()? as usize;
        if len > MAX_MPI_BYTES {
            return Err(WireError::InvalidMessage("MPI too large"));
        }
        let magnitude = self.take(len)?;
        Ok(BigUint::from_bytes_be(magnitude))
    }

    /// Consume and return all unread bytes.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_u32_roundtrip() {
        let mut enc = Encoder::new();
        enc.write_u16(0xBEEF).write_u32(0xDEADBEEF);
        let bytes = enc.into_bytes();
        assert_eq!(bytes, [0xBE, 0xEF, 0xDE, 0xAD, 0xBE, 0xEF]);

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_u16().unwrap(), 0xBEEF);
        assert_eq!(dec.read_u32().unwrap(), 0xDEADBEEF);
        assert!(dec.is_empty());
    }

    #[test]
    fn test_data_roundtrip() {
        let mut enc = Encoder::new();
        enc.write_data(b"payload");
        let bytes = enc.into_bytes();
        assert_eq!(&bytes[..4], [0, 0, 0, 7]);

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_data().unwrap(), b"payload");
    }

    #[test]
    fn test_mpi_minimal_length() {
        let n = BigUint::from(0x0102u32);
        let bytes = encode_mpi(&n);
        assert_eq!(bytes, [0, 0, 0, 2, 0x01, 0x02]);
    }

    #[test]
    fn test_mpi_zero_encodes_empty() {
        let bytes = encode_mpi(&BigUint::from(0u32));
        assert_eq!(bytes, [0, 0, 0, 0]);

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_mpi().unwrap(), BigUint::from(0u32));
    }

    #[test]
    fn test_mpi_roundtrip_large() {
        let n = BigUint::from_bytes_be(&[0xFF; 192]);
        let bytes = encode_mpi(&n);
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_mpi().unwrap(), n);
    }

    #[test]
    fn test_truncated_data_rejected() {
        let bytes = [0, 0, 0, 10, 1, 2, 3];
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            dec.read_data(),
            Err(WireError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_oversized_mpi_rejected() {
        // Claims a 16 MiB magnitude without carrying it.
        let bytes = [0x01, 0x00, 0x00, 0x00];
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.read_mpi(), Err(WireError::InvalidMessage(_))));
    }

    #[test]
    fn test_position_tracks_reads() {
        let bytes = [0, 1, 0, 0, 0, 2, 9, 9];
        let mut dec = Decoder::new(&bytes);
        dec.read_u16().unwrap();
        assert_eq!(dec.position(), 2);
        dec.read_data().unwrap();
        assert_eq!(dec.position(), 8);
    }
}
