//! Type-length-value records carried inside decrypted data messages.
//!
//! Each record is type (u16), length (u16), then `length` value bytes.
//! Unknown types are skipped by consumers; the framing itself is strict.

use offrec_wire::{Decoder, Encoder, WireError};

use crate::error::Result;

/// Padding; receivers ignore the value.
pub const TLV_PADDING: u16 = 0;
/// The peer has disconnected; no reply is sent.
pub const TLV_DISCONNECT: u16 = 1;
/// First SMP message.
pub const TLV_SMP1: u16 = 2;
/// Second SMP message.
pub const TLV_SMP2: u16 = 3;
/// Third SMP message.
pub const TLV_SMP3: u16 = 4;
/// Fourth SMP message.
pub const TLV_SMP4: u16 = 5;
/// SMP abort.
pub const TLV_SMP_ABORT: u16 = 6;
/// First SMP message preceded by a NUL-terminated question.
pub const TLV_SMP1_WITH_QUESTION: u16 = 7;
/// Use of the extra symmetric key.
pub const TLV_EXTRA_SYMMETRIC_KEY: u16 = 8;

/// One type-length-value record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    /// The record type.
    pub typ: u16,
    /// The record payload.
    pub value: Vec<u8>,
}

impl Tlv {
    /// Build a record, asserting the value fits the 16-bit length field.
    pub fn new(typ: u16, value: Vec<u8>) -> Self {
        debug_assert!(value.len() <= u16::MAX as usize);
        Self { typ, value }
    }

    /// Whether this record belongs to the SMP subprotocol.
    pub fn is_smp(&self) -> bool {
        matches!(
            self.typ,
            TLV_SMP1 | TLV_SMP2 | TLV_SMP3 | TLV_SMP4 | TLV_SMP_ABORT | TLV_SMP1_WITH_QUESTION
        )
    }
}

/// Serialize records back-to-back.
pub fn encode_tlvs(tlvs: &[Tlv]) -> Vec<u8> {
    let mut enc = Encoder::new();
    for tlv in tlvs {
        enc.write_u16(tlv.typ);
        enc.write_u16(tlv.value.len() as u16);
        enc.write_raw(&tlv.value);
    }
    enc.into_bytes()
}

/// Parse back-to-back records until the input is exhausted.
///
/// # Errors
///
/// Returns a wire error when a record's declared length overruns the input.
pub fn parse_tlvs(bytes: &[u8]) -> Result<Vec<Tlv>> {
    let mut dec = Decoder::new(bytes);
    let mut tlvs = Vec::new();
    while !dec.is_empty() {
        let typ = dec.read_u16()?;
        let len = dec.read_u16()? as usize;
        let value = dec
            .read_exact(len)
            .map_err(|_| WireError::InvalidMessage("TLV value overruns message"))?;
        tlvs.push(Tlv {
            typ,
            value: value.to_vec(),
        });
    }
    Ok(tlvs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_tlv() {
        let bytes = [0x00, 0x01, 0x00, 0x02, 0x01, 0x01];
        let tlvs = parse_tlvs(&bytes).unwrap();
        assert_eq!(tlvs.len(), 1);
        assert_eq!(tlvs[0].typ, TLV_DISCONNECT);
        assert_eq!(tlvs[0].value, [0x01, 0x01]);
    }

    #[test]
    fn test_parse_multiple_tlvs() {
        let bytes = [
            0x00, 0x01, 0x00, 0x02, 0x01, 0x01, // disconnect, 2 bytes
            0x00, 0x02, 0x00, 0x05, 0x01, 0x01, 0x01, 0x01, 0x01, // smp1, 5 bytes
        ];
        let tlvs = parse_tlvs(&bytes).unwrap();
        assert_eq!(tlvs.len(), 2);
        assert_eq!(tlvs[0].typ, TLV_DISCONNECT);
        assert_eq!(tlvs[1].typ, TLV_SMP1);
        assert_eq!(tlvs[1].value.len(), 5);
    }

    #[test]
    fn test_roundtrip() {
        let tlvs = vec![
            Tlv::new(TLV_PADDING, vec![0; 4]),
            Tlv::new(TLV_SMP_ABORT, vec![]),
            Tlv::new(TLV_EXTRA_SYMMETRIC_KEY, vec![1, 2, 3, 4]),
        ];
        assert_eq!(parse_tlvs(&encode_tlvs(&tlvs)).unwrap(), tlvs);
    }

    #[test]
    fn test_overrun_rejected() {
        let bytes = [0x00, 0x01, 0x00, 0x05, 0x01];
        assert!(parse_tlvs(&bytes).is_err());
    }

    #[test]
    fn test_truncated_header_rejected() {
        assert!(parse_tlvs(&[0x00]).is_err());
        assert!(parse_tlvs(&[0x00, 0x01, 0x00]).is_err());
    }

    #[test]
    fn test_empty_input_is_no_tlvs() {
        assert!(parse_tlvs(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_is_smp() {
        assert!(Tlv::new(TLV_SMP1, vec![]).is_smp());
        assert!(Tlv::new(TLV_SMP1_WITH_QUESTION, vec![]).is_smp());
        assert!(!Tlv::new(TLV_PADDING, vec![]).is_smp());
        assert!(!Tlv::new(TLV_DISCONNECT, vec![]).is_smp());
    }
}
