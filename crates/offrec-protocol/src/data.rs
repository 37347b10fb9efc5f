//! Serialization, encryption and authentication of data messages.
//!
//! A data message is: envelope header, flag byte, sender and recipient
//! keyids, the advertised next DH public (MPI), the 8-byte top-half
//! counter, the AES-CTR ciphertext as DATA, a 20-byte HMAC-SHA-1
//! authenticator over everything so far, and a DATA block of MAC keys
//! being revealed. The decrypted body is the human message, a NUL, then
//! zero or more TLV records.

use num_bigint_dig::BigUint;

use offrec_crypto::cipher::aes128_ctr_top_half;
use offrec_crypto::hash::hmac_sha1;
use offrec_wire::{Decoder, Encoder, MessageHeader};

use crate::error::{ProtoError, Result};
use crate::keys::SendParameters;
use crate::tlv::{encode_tlvs, parse_tlvs, Tlv};

/// Flag bit: drop this message silently if it cannot be read.
pub const FLAG_IGNORE_UNREADABLE: u8 = 0x01;

/// Byte length of the data-message authenticator.
pub const MAC_BYTES: usize = 20;

/// A parsed inbound data message, still encrypted.
#[derive(Debug)]
pub struct ParsedData<'a> {
    /// The flag byte.
    pub flags: u8,
    /// Keyid the peer encrypted under.
    pub sender_keyid: u32,
    /// Our keyid the message is addressed to.
    pub recipient_keyid: u32,
    /// The peer's advertised next DH public.
    pub next_dh: BigUint,
    /// Transmitted top half of the counter.
    pub top_ctr: [u8; 8],
    /// The AES-CTR ciphertext.
    pub ciphertext: &'a [u8],
    /// The received authenticator.
    pub mac: &'a [u8],
    /// MAC keys the peer revealed (opaque here).
    pub revealed_macs: &'a [u8],
    /// The authenticated region: everything from the envelope version
    /// through the ciphertext DATA block.
    pub authenticated: &'a [u8],
}

impl<'a> ParsedData<'a> {
    /// Whether the ignore-unreadable flag is set.
    pub fn ignore_unreadable(&self) -> bool {
        self.flags & FLAG_IGNORE_UNREADABLE != 0
    }

    /// Recompute the authenticator under `mac_key`.
    pub fn expected_mac(&self, mac_key: &[u8; 20]) -> [u8; MAC_BYTES] {
        hmac_sha1(mac_key, self.authenticated)
    }

    /// Decrypt the ciphertext under `aes_key`.
    pub fn decrypt(&self, aes_key: &[u8; 16]) -> Vec<u8> {
        aes128_ctr_top_half(aes_key, &self.top_ctr, self.ciphertext)
    }
}

/// Parse the data-message fields following an already-decoded header.
///
/// `full` is the complete binary message and `dec` is positioned just
/// past the envelope header, so the authenticated region can be sliced
/// out of `full` directly.
///
/// # Errors
///
/// Structural failures surface as `InvalidMessage`.
pub fn parse<'a>(full: &'a [u8], dec: &mut Decoder<'a>) -> Result<ParsedData<'a>> {
    let flags = dec.read_u8()?;
    let sender_keyid = dec.read_u32()?;
    let recipient_keyid = dec.read_u32()?;
    let next_dh = dec.read_mpi()?;
    let top_ctr = dec.read_ctr()?;
    let ciphertext = dec.read_data()?;
    let authenticated = &full[..dec.position()];
    let mac = dec.read_exact(MAC_BYTES)?;
    let revealed_macs = dec.read_data()?;
    if !dec.is_empty() {
        return Err(ProtoError::InvalidMessage("trailing bytes after data message"));
    }
    if sender_keyid == 0 || recipient_keyid == 0 {
        return Err(ProtoError::InvalidMessage("zero keyid in data message"));
    }
    Ok(ParsedData {
        flags,
        sender_keyid,
        recipient_keyid,
        next_dh,
        top_ctr,
        ciphertext,
        mac,
        revealed_macs,
        authenticated,
    })
}

/// Encrypt, authenticate and serialize one outbound data message.
pub fn seal(
    header: &MessageHeader,
    flags: u8,
    params: &SendParameters,
    body: &[u8],
    revealed_macs: &[u8],
) -> Vec<u8> {
    let ciphertext = aes128_ctr_top_half(&params.keys.send_aes, &params.top_ctr, body);

    let mut fields = Encoder::new();
    fields
        .write_u8(flags)
        .write_u32(params.sender_keyid)
        .write_u32(params.recipient_keyid)
        .write_mpi(&params.next_dh)
        .write_ctr(&params.top_ctr)
        .write_data(&ciphertext);

    let mut full = header.encode_with_payload(fields.as_bytes());
    let mac = hmac_sha1(&params.keys.send_mac, &full);
    full.extend_from_slice(&mac);

    let mut tail = Encoder::new();
    tail.write_data(revealed_macs);
    full.extend_from_slice(tail.as_bytes());
    full
}

/// Assemble the plaintext body: human message, NUL, TLV records.
pub fn encode_body(human: &[u8], tlvs: &[Tlv]) -> Vec<u8> {
    let mut body = Vec::with_capacity(human.len() + 1);
    body.extend_from_slice(human);
    body.push(0x00);
    body.extend_from_slice(&encode_tlvs(tlvs));
    body
}

/// Split a decrypted body into the human message and its TLV records.
///
/// # Errors
///
/// Malformed TLV framing after a successful decrypt surfaces as
/// [`ProtoError::CorruptEncryptedMessage`].
pub fn decode_body(body: &[u8]) -> Result<(Vec<u8>, Vec<Tlv>)> {
    match body.iter().position(|&b| b == 0x00) {
        Some(nul) => {
            let tlvs = parse_tlvs(&body[nul + 1..])
                .map_err(|_| ProtoError::CorruptEncryptedMessage)?;
            Ok((body[..nul].to_vec(), tlvs))
        }
        None => Ok((body.to_vec(), Vec::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyManager;
    use crate::tlv::{TLV_PADDING, TLV_SMP_ABORT};
    use offrec_crypto::hash::ct_eq;
    use offrec_crypto::{DhKeyPair, SeededRandom};
    use offrec_wire::{MessageType, Version};

    fn header() -> MessageHeader {
        MessageHeader {
            version: Version::V3,
            message_type: MessageType::Data,
            sender_tag: 0x201,
            receiver_tag: 0x202,
        }
    }

    fn linked_managers() -> (KeyManager, KeyManager) {
        let mut rand = SeededRandom::new(41);
        let a = DhKeyPair::generate(&mut rand).unwrap();
        let b = DhKeyPair::generate(&mut rand).unwrap();
        let alice = KeyManager::new(&mut rand, a.clone(), 1, b.public().clone()).unwrap();
        let bob = KeyManager::new(&mut rand, b, 1, a.public().clone()).unwrap();
        (alice, bob)
    }

    #[test]
    fn test_seal_parse_decrypt_roundtrip() {
        let (mut alice, mut bob) = linked_managers();
        let params = alice.prepare_send().unwrap();
        let body = encode_body(b"hello Bob", &[]);
        let full = seal(&header(), 0, &params, &body, &[]);

        let mut dec = Decoder::new(&full);
        MessageHeader::decode(&mut dec).unwrap();
        let parsed = parse(&full, &mut dec).unwrap();

        assert_eq!(parsed.sender_keyid, 1);
        assert_eq!(parsed.recipient_keyid, 1);

        let keys = bob
            .receiving_keys(parsed.sender_keyid, parsed.recipient_keyid)
            .unwrap();
        assert!(ct_eq(&parsed.expected_mac(&keys.recv_mac), parsed.mac));

        let plaintext = parsed.decrypt(&keys.recv_aes);
        let (human, tlvs) = decode_body(&plaintext).unwrap();
        assert_eq!(human, b"hello Bob");
        assert!(tlvs.is_empty());
    }

    #[test]
    fn test_mac_covers_whole_prefix() {
        let (mut alice, mut bob) = linked_managers();
        let params = alice.prepare_send().unwrap();
        let body = encode_body(b"x", &[]);
        let full = seal(&header(), 0, &params, &body, &[]);

        let keys = bob.receiving_keys(1, 1).unwrap();
        // Flipping any authenticated byte breaks the MAC.
        for i in [0usize, 2, 11, 12, 16, full.len() / 2] {
            let mut tampered = full.clone();
            tampered[i] ^= 0x40;
            let mut dec = Decoder::new(&tampered);
            if MessageHeader::decode(&mut dec).is_err() {
                continue;
            }
            let Ok(parsed) = parse(&tampered, &mut dec) else {
                continue;
            };
            assert!(
                !ct_eq(&parsed.expected_mac(&keys.recv_mac), parsed.mac),
                "tampered byte {i} still authenticated"
            );
        }
    }

    #[test]
    fn test_body_roundtrip_with_tlvs() {
        let tlvs = vec![
            Tlv::new(TLV_SMP_ABORT, vec![]),
            Tlv::new(TLV_PADDING, vec![0, 0]),
        ];
        let body = encode_body(b"msg", &tlvs);
        let (human, parsed) = decode_body(&body).unwrap();
        assert_eq!(human, b"msg");
        assert_eq!(parsed, tlvs);
    }

    #[test]
    fn test_body_without_nul_is_all_human() {
        let (human, tlvs) = decode_body(b"no separator here").unwrap();
        assert_eq!(human, b"no separator here");
        assert!(tlvs.is_empty());
    }

    #[test]
    fn test_corrupt_tlvs_rejected() {
        let mut body = b"hi".to_vec();
        body.push(0);
        body.extend_from_slice(&[0x00, 0x02, 0xFF, 0xFF]); // absurd length
        assert_eq!(
            decode_body(&body).unwrap_err(),
            ProtoError::CorruptEncryptedMessage
        );
    }

    #[test]
    fn test_zero_keyids_rejected() {
        let (mut alice, _) = linked_managers();
        let params = alice.prepare_send().unwrap();
        let body = encode_body(b"x", &[]);
        let mut full = seal(&header(), 0, &params, &body, &[]);
        // Zero out the sender keyid field (offset 12 after the v3 header
        // and flag byte).
        full[12..16].fill(0);
        let mut dec = Decoder::new(&full);
        MessageHeader::decode(&mut dec).unwrap();
        assert!(parse(&full, &mut dec).is_err());
    }

    #[test]
    fn test_revealed_macs_travel() {
        let (mut alice, _) = linked_managers();
        let params = alice.prepare_send().unwrap();
        let revealed = [0xAB; 40];
        let full = seal(&header(), 0, &params, &encode_body(b"", &[]), &revealed);

        let mut dec = Decoder::new(&full);
        MessageHeader::decode(&mut dec).unwrap();
        let parsed = parse(&full, &mut dec).unwrap();
        assert_eq!(parsed.revealed_macs, revealed);
    }
}
