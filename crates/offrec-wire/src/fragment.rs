//! Splitting armored messages into bounded fragments and reassembling them.
//!
//! Version 3 fragments look like `?OTR|sender|receiver,k,N,payload,` with
//! the instance tags in lowercase hex; version 2 drops the tags:
//! `?OTR,k,N,payload,`. Fragments must arrive strictly in order; any gap,
//! repeat or out-of-order fragment discards the in-flight assembly.

use crate::envelope::Version;
use crate::error::{Result, WireError};
use crate::limits::MAX_FRAGMENTS;

/// Prefix of a version 3 fragment.
pub const FRAGMENT_PREFIX_V3: &[u8] = b"?OTR|";

/// Prefix of a version 2 fragment.
pub const FRAGMENT_PREFIX_V2: &[u8] = b"?OTR,";

/// Worst-case formatting overhead of one v2 fragment:
/// `?OTR,` + two 5-digit counters + three commas.
const OVERHEAD_V2: usize = 5 + 5 + 1 + 5 + 1 + 1;

/// Worst-case formatting overhead of one v3 fragment: v2 overhead plus
/// two 8-hex-digit instance tags with their separators.
const OVERHEAD_V3: usize = OVERHEAD_V2 + 8 + 1 + 8 + 1;

/// Whether `message` is formatted as a fragment of either version.
pub fn is_fragment(message: &[u8]) -> bool {
    message.starts_with(FRAGMENT_PREFIX_V3) || message.starts_with(FRAGMENT_PREFIX_V2)
}

/// A parsed inbound fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment<'a> {
    /// Sender instance tag (zero for v2 fragments).
    pub sender_tag: u32,
    /// Receiver instance tag (zero for v2 fragments).
    pub receiver_tag: u32,
    /// 1-based index of this piece.
    pub index: u16,
    /// Total number of pieces.
    pub total: u16,
    /// The carried piece of the original message.
    pub payload: &'a [u8],
}

impl<'a> Fragment<'a> {
    /// Parse a fragment of either version.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` for anything that is not a well-formed
    /// fragment: bad counters, empty payload, missing trailing comma.
    pub fn parse(message: &'a [u8]) -> Result<Self> {
        let (sender_tag, receiver_tag, rest) =
            if let Some(rest) = message.strip_prefix(FRAGMENT_PREFIX_V3) {
                let (sender, rest) = take_until(rest, b'|')?;
                let (receiver, rest) = take_until(rest, b',')?;
                (parse_tag(sender)?, parse_tag(receiver)?, rest)
            } else if let Some(rest) = message.strip_prefix(FRAGMENT_PREFIX_V2) {
                (0, 0, rest)
            } else {
                return Err(WireError::InvalidMessage("not a fragment"));
            };

        let (index, rest) = take_until(rest, b',')?;
        let (total, rest) = take_until(rest, b',')?;
        let index = parse_counter(index)?;
        let total = parse_counter(total)?;
        let payload = rest
            .strip_suffix(b",")
            .ok_or(WireError::InvalidMessage("fragment missing trailing comma"))?;

        if index == 0 || total == 0 || index > total {
            return Err(WireError::InvalidMessage("fragment counters out of range"));
        }
        if payload.is_empty() {
            return Err(WireError::InvalidMessage("empty fragment payload"));
        }
        Ok(Self {
            sender_tag,
            receiver_tag,
            index,
            total,
            payload,
        })
    }
}

fn take_until(buf: &[u8], sep: u8) -> Result<(&[u8], &[u8])> {
    let pos = buf
        .iter()
        .position(|&b| b == sep)
        .ok_or(WireError::InvalidMessage("fragment separator missing"))?;
    Ok((&buf[..pos], &buf[pos + 1..]))
}

fn parse_tag(digits: &[u8]) -> Result<u32> {
    if digits.is_empty() || digits.len() > 8 {
        return Err(WireError::InvalidMessage("bad instance tag in fragment"));
    }
    let text = std::str::from_utf8(digits)
        .map_err(|_| WireError::InvalidMessage("bad instance tag in fragment"))?;
    u32::from_str_radix(text, 16).map_err(|_| WireError::InvalidMessage("bad instance tag in fragment"))
}

fn parse_counter(digits: &[u8]) -> Result<u16> {
    if digits.is_empty() || digits.len() > 5 {
        return Err(WireError::InvalidMessage("bad fragment counter"));
    }
    let text = std::str::from_utf8(digits)
        .map_err(|_| WireError::InvalidMessage("bad fragment counter"))?;
    text.parse()
        .map_err(|_| WireError::InvalidMessage("bad fragment counter"))
}

/// Split an armored message into fragments no longer than `fragment_size`.
///
/// Messages that already fit, and conversations with fragmentation disabled
/// (`fragment_size == 0`), are returned as a single unfragmented piece. A
/// `fragment_size` too small to carry any payload also falls back to a
/// single piece rather than emitting an unbounded fragment train.
///
/// # Errors
///
/// Returns [`WireError::TooManyFragments`] when the message would need more
/// pieces than the counters can express.
pub fn fragment(
    version: Version,
    sender_tag: u32,
    receiver_tag: u32,
    fragment_size: usize,
    message: &[u8],
) -> Result<Vec<Vec<u8>>> {
    if fragment_size == 0 || message.len() <= fragment_size {
        return Ok(vec![message.to_vec()]);
    }
    let overhead = match version {
        Version::V2 => OVERHEAD_V2,
        Version::V3 => OVERHEAD_V3,
    };
    if fragment_size <= overhead {
        return Ok(vec![message.to_vec()]);
    }
    let piece_len = fragment_size - overhead;
    let total = message.len().div_ceil(piece_len);
    if total > MAX_FRAGMENTS as usize {
        return Err(WireError::TooManyFragments { max: MAX_FRAGMENTS });
    }

    let mut out = Vec::with_capacity(total);
    for (i, piece) in message.chunks(piece_len).enumerate() {
        let mut frag = match version {
            Version::V2 => format!("?OTR,{},{},", i + 1, total).into_bytes(),
            Version::V3 => {
                format!("?OTR|{sender_tag:08x}|{receiver_tag:08x},{},{},", i + 1, total)
                    .into_bytes()
            }
        };
        frag.extend_from_slice(piece);
        frag.push(b',');
        debug_assert!(frag.len() <= fragment_size);
        out.push(frag);
    }
    Ok(out)
}

/// Reassembles fragments delivered strictly in order.
///
/// One assembler serves one conversation. Feeding it the next expected
/// fragment extends the assembly; feeding it anything else (a gap, a
/// repeat, a mismatched total) discards the in-flight assembly, and an
/// index of 1 always starts a fresh one.
#[derive(Debug, Default)]
pub struct Assembler {
    next_index: u16,
    total: u16,
    buf: Vec<u8>,
}

impl Assembler {
    /// Create an assembler with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a partial message is currently buffered.
    pub fn in_flight(&self) -> bool {
        self.total != 0
    }

    /// Discard any in-flight assembly.
    pub fn reset(&mut self) {
        self.next_index = 0;
        self.total = 0;
        self.buf.clear();
    }

    /// Feed one inbound fragment.
    ///
    /// Returns the fully reassembled message once the final fragment
    /// arrives, `None` while more are needed. Out-of-order input discards
    /// the in-flight assembly and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` when `message` is not a parseable fragment;
    /// the in-flight assembly is discarded in that case too.
    pub fn receive(&mut self, message: &[u8]) -> Result<Option<Vec<u8>>> {
        let frag = match Fragment::parse(message) {
            Ok(frag) => frag,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        if frag.index == 1 {
            self.reset();
            self.buf.extend_from_slice(frag.payload);
            self.next_index = 2;
            self.total = frag.total;
        } else if self.in_flight() && frag.index == self.next_index && frag.total == self.total {
            self.buf.extend_from_slice(frag.payload);
            self.next_index += 1;
        } else {
            self.reset();
            return Ok(None);
        }

        if frag.index == self.total {
            let assembled = std::mem::take(&mut self.buf);
            self.reset();
            return Ok(Some(assembled));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(frags: &[Vec<u8>]) -> Option<Vec<u8>> {
        let mut asm = Assembler::new();
        let mut result = None;
        for (i, frag) in frags.iter().enumerate() {
            let out = asm.receive(frag).unwrap();
            if i + 1 < frags.len() {
                assert!(out.is_none(), "early output at fragment {}", i + 1);
            } else {
                result = out;
            }
        }
        result
    }

    #[test]
    fn test_short_message_unfragmented() {
        let frags = fragment(Version::V2, 0, 0, 100, b"short").unwrap();
        assert_eq!(frags, vec![b"short".to_vec()]);
    }

    #[test]
    fn test_fragment_size_bound_v2() {
        let msg = vec![b'a'; 500];
        let frags = fragment(Version::V2, 0, 0, 100, &msg).unwrap();
        assert!(frags.len() > 1);
        for frag in &frags {
            assert!(frag.len() <= 100, "fragment length {}", frag.len());
            assert!(frag.starts_with(b"?OTR,"));
            assert!(frag.ends_with(b","));
        }
        assert_eq!(reassemble(&frags).unwrap(), msg);
    }

    #[test]
    fn test_fragment_size_bound_v3() {
        let msg = vec![b'b'; 500];
        let frags = fragment(Version::V3, 0x101, 0x102, 100, &msg).unwrap();
        for frag in &frags {
            assert!(frag.len() <= 100);
            assert!(frag.starts_with(b"?OTR|00000101|00000102,"));
        }
        assert_eq!(reassemble(&frags).unwrap(), msg);
    }

    #[test]
    fn test_parse_v3_fields() {
        let frag = Fragment::parse(b"?OTR|00000101|00000102,2,5,QUJD,").unwrap();
        assert_eq!(frag.sender_tag, 0x101);
        assert_eq!(frag.receiver_tag, 0x102);
        assert_eq!(frag.index, 2);
        assert_eq!(frag.total, 5);
        assert_eq!(frag.payload, b"QUJD");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Fragment::parse(b"?OTR,1,2,,").is_err()); // empty payload
        assert!(Fragment::parse(b"?OTR,0,2,x,").is_err()); // zero index
        assert!(Fragment::parse(b"?OTR,3,2,x,").is_err()); // index > total
        assert!(Fragment::parse(b"?OTR,1,2,x").is_err()); // no trailing comma
        assert!(Fragment::parse(b"?OTR|zz|00000001,1,1,x,").is_err()); // bad hex
        assert!(Fragment::parse(b"plaintext").is_err());
    }

    #[test]
    fn test_out_of_order_discards() {
        let msg = vec![b'c'; 300];
        let frags = fragment(Version::V2, 0, 0, 100, &msg).unwrap();
        assert!(frags.len() >= 3);

        let mut asm = Assembler::new();
        assert!(asm.receive(&frags[0]).unwrap().is_none());
        // Skipping fragment 2 discards the assembly.
        assert!(asm.receive(&frags[2]).unwrap().is_none());
        assert!(!asm.in_flight());
        // The final fragment alone no longer completes anything.
        assert!(asm.receive(&frags[1]).unwrap().is_none());
    }

    #[test]
    fn test_restart_with_index_one() {
        let msg = vec![b'd'; 200];
        let frags = fragment(Version::V2, 0, 0, 100, &msg).unwrap();

        let mut asm = Assembler::new();
        assert!(asm.receive(&frags[0]).unwrap().is_none());
        // A fresh first fragment replaces the in-flight assembly.
        assert!(asm.receive(&frags[0]).unwrap().is_none());
        assert_eq!(asm.receive(&frags[1]).unwrap().unwrap(), msg);
    }

    #[test]
    fn test_single_fragment_message() {
        let mut asm = Assembler::new();
        let out = asm.receive(b"?OTR,1,1,payload,").unwrap();
        assert_eq!(out.unwrap(), b"payload");
    }

    #[test]
    fn test_undersized_limit_falls_back_to_single_piece() {
        let msg = vec![b'e'; 64];
        let frags = fragment(Version::V3, 1, 2, 10, &msg).unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0], msg);
    }
}
