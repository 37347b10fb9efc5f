//! Message envelopes: version/type headers, instance tags and base64 armor.
//!
//! Every binary OTR message starts with a 2-byte protocol version and a
//! 1-byte message type. Version 3 adds two 32-bit instance tags (sender,
//! then receiver) that distinguish concurrent sessions with the same peer.
//! On the text channel the binary envelope travels as `?OTR:` + base64 + `.`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::codec::{Decoder, Encoder};
use crate::error::{Result, WireError};

/// Literal prefix of an armored binary message.
pub const ARMOR_PREFIX: &[u8] = b"?OTR:";

/// Lowest instance tag value a client may use for itself.
pub const MIN_INSTANCE_TAG: u32 = 0x100;

/// A supported OTR protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// OTR version 2: no instance tags.
    V2,
    /// OTR version 3: instance tags on every binary message.
    V3,
}

impl Version {
    /// The wire value of this version.
    pub fn as_u16(self) -> u16 {
        match self {
            Version::V2 => 0x0002,
            Version::V3 => 0x0003,
        }
    }

    /// Map a wire value back to a version, if supported.
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0002 => Some(Version::V2),
            0x0003 => Some(Version::V3),
            _ => None,
        }
    }

    /// Whether envelopes of this version carry instance tags.
    pub fn has_instance_tags(self) -> bool {
        matches!(self, Version::V3)
    }
}

/// The type byte of a binary OTR message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// First AKE message: committed, encrypted `g^x`.
    DhCommit,
    /// Encrypted application payload.
    Data,
    /// Second AKE message: bare `g^y`.
    DhKey,
    /// Third AKE message: reveals the commitment key and signs.
    RevealSignature,
    /// Fourth AKE message: the mirrored signature.
    Signature,
}

impl MessageType {
    /// The wire value of this message type.
    pub fn as_u8(self) -> u8 {
        match self {
            MessageType::DhCommit => 0x02,
            MessageType::Data => 0x03,
            MessageType::DhKey => 0x0a,
            MessageType::RevealSignature => 0x11,
            MessageType::Signature => 0x12,
        }
    }

    /// Map a type byte back to a message type.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownMessageType`] for unrecognized bytes.
    pub fn from_u8(t: u8) -> Result<Self> {
        match t {
            0x02 => Ok(MessageType::DhCommit),
            0x03 => Ok(MessageType::Data),
            0x0a => Ok(MessageType::DhKey),
            0x11 => Ok(MessageType::RevealSignature),
            0x12 => Ok(MessageType::Signature),
            other => Err(WireError::UnknownMessageType(other)),
        }
    }
}

/// The parsed leading fields of a binary OTR message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Protocol version of the envelope.
    pub version: Version,
    /// Message type byte.
    pub message_type: MessageType,
    /// Sender instance tag (zero under v2).
    pub sender_tag: u32,
    /// Receiver instance tag (zero under v2, or when not yet known).
    pub receiver_tag: u32,
}

impl MessageHeader {
    /// Encode this header followed by `payload` into a full binary message.
    pub fn encode_with_payload(&self, payload: &[u8]) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_u16(self.version.as_u16());
        enc.write_u8(self.message_type.as_u8());
        if self.version.has_instance_tags() {
            enc.write_u32(self.sender_tag);
            enc.write_u32(self.receiver_tag);
        }
        enc.write_raw(payload);
        enc.into_bytes()
    }

    /// Parse the header fields from the front of `dec`.
    ///
    /// The decoder is left positioned at the first payload byte.
    ///
    /// # Errors
    ///
    /// `InvalidMessage` on truncation, `WrongProtocolVersion` for versions
    /// other than 2 and 3, `UnknownMessageType` for unrecognized type bytes.
    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let raw_version = dec.read_u16()?;
        let version =
            Version::from_u16(raw_version).ok_or(WireError::WrongProtocolVersion(raw_version))?;
        let message_type = MessageType::from_u8(dec.read_u8()?)?;
        let (sender_tag, receiver_tag) = if version.has_instance_tags() {
            (dec.read_u32()?, dec.read_u32()?)
        } else {
            (0, 0)
        };
        Ok(Self {
            version,
            message_type,
            sender_tag,
            receiver_tag,
        })
    }
}

/// Wrap binary message bytes in the `?OTR:` base64 armor.
pub fn armor(binary: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ARMOR_PREFIX.len() + binary.len() * 4 / 3 + 4);
    out.extend_from_slice(ARMOR_PREFIX);
    out.extend_from_slice(BASE64.encode(binary).as_bytes());
    out.push(b'.');
    out
}

/// Strip the `?OTR:` armor and decode the base64 body.
///
/// # Errors
///
/// Returns `InvalidMessage` when the prefix, the trailing `.` or the base64
/// body is malformed.
pub fn unarmor(message: &[u8]) -> Result<Vec<u8>> {
    let body = message
        .strip_prefix(ARMOR_PREFIX)
        .ok_or(WireError::InvalidMessage("missing ?OTR: prefix"))?;
    let body = body
        .strip_suffix(b".")
        .ok_or(WireError::InvalidMessage("missing trailing dot"))?;
    BASE64
        .decode(body)
        .map_err(|_| WireError::InvalidMessage("bad base64 body"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip_v2() {
        let header = MessageHeader {
            version: Version::V2,
            message_type: MessageType::DhCommit,
            sender_tag: 0,
            receiver_tag: 0,
        };
        let msg = header.encode_with_payload(b"xyz");
        assert_eq!(&msg[..3], [0x00, 0x02, 0x02]);

        let mut dec = Decoder::new(&msg);
        let parsed = MessageHeader::decode(&mut dec).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(dec.read_rest(), b"xyz");
    }

    #[test]
    fn test_header_roundtrip_v3_tags() {
        let header = MessageHeader {
            version: Version::V3,
            message_type: MessageType::Data,
            sender_tag: 0x101,
            receiver_tag: 0x102,
        };
        let msg = header.encode_with_payload(&[]);
        assert_eq!(msg.len(), 11);

        let mut dec = Decoder::new(&msg);
        let parsed = MessageHeader::decode(&mut dec).unwrap();
        assert_eq!(parsed.sender_tag, 0x101);
        assert_eq!(parsed.receiver_tag, 0x102);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut dec = Decoder::new(&[0x00, 0x01, 0x02]);
        assert_eq!(
            MessageHeader::decode(&mut dec),
            Err(WireError::WrongProtocolVersion(1))
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let msg = [0x00, 0x03, 0x56, 0x00, 0x00, 0x01, 0x02, 0x00, 0x00, 0x01, 0x01];
        let mut dec = Decoder::new(&msg);
        assert_eq!(
            MessageHeader::decode(&mut dec),
            Err(WireError::UnknownMessageType(0x56))
        );
    }

    #[test]
    fn test_truncated_header_rejected() {
        let mut dec = Decoder::new(&[]);
        assert!(matches!(
            MessageHeader::decode(&mut dec),
            Err(WireError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_armor_roundtrip() {
        let binary = [0x00, 0x02, 0x02, 0xFF, 0x10];
        let armored = armor(&binary);
        assert!(armored.starts_with(b"?OTR:"));
        assert!(armored.ends_with(b"."));
        assert_eq!(unarmor(&armored).unwrap(), binary);
    }

    #[test]
    fn test_unarmor_rejects_garbage() {
        assert!(unarmor(b"?OTR:not-base64!.").is_err());
        assert!(unarmor(b"?OTR:QUJD").is_err());
        assert!(unarmor(b"QUJD.").is_err());
    }
}
