//! The four-message authenticated key exchange.
//!
//! Commit/reveal protects the first mover's DH public; long-term DSA
//! signatures over an HMAC of both DH publics authenticate the exchange.
//! The handshake walks NONE -> AWAITING_DHKEY -> AWAITING_SIG on the
//! committing side and NONE -> AWAITING_REVEALSIG on the responding side;
//! either side finishing hands a completed key set to the ratchet.

use num_bigint_dig::BigUint;
use zeroize::Zeroize;

use offrec_crypto::cipher::aes128_ctr_zero;
use offrec_crypto::hash::{ct_eq, hmac_sha256, hmac_sha256_160, sha256, sha256_prefixed};
use offrec_crypto::rand::random_bytes;
use offrec_crypto::{group, DhKeyPair, DsaKeyPair, DsaPublicKey, RandomSource};
use offrec_wire::codec::encode_mpi;
use offrec_wire::{Decoder, Encoder, MessageType};

use crate::error::{ProtoError, Result};

/// The keyid a fresh handshake assigns to its DH key.
const AKE_KEYID: u32 = 1;

/// An outbound handshake message: type byte plus payload, pre-envelope.
pub type AkeReply = (MessageType, Vec<u8>);

/// Everything the ratchet needs when a handshake completes.
#[derive(Debug)]
pub struct AkeCompletion {
    /// Our ephemeral DH keypair, becoming keyid 1.
    pub our_dh: DhKeyPair,
    /// The keyid the peer signed.
    pub their_keyid: u32,
    /// The peer's ephemeral DH public, becoming their ring seed.
    pub their_dh: BigUint,
    /// The peer's long-term identity key, learned during the handshake.
    pub their_dsa: DsaPublicKey,
    /// The 8-byte session identifier.
    pub ssid: [u8; 8],
}

/// Key material derived from the handshake shared secret.
struct AkeKeys {
    ssid: [u8; 8],
    c: [u8; 16],
    c_prime: [u8; 16],
    m1: [u8; 32],
    m2: [u8; 32],
    m1_prime: [u8; 32],
    m2_prime: [u8; 32],
}

impl Drop for AkeKeys {
    fn drop(&mut self) {
        self.c.zeroize();
        self.c_prime.zeroize();
        self.m1.zeroize();
        self.m2.zeroize();
        self.m1_prime.zeroize();
        self.m2_prime.zeroize();
    }
}

impl std::fmt::Debug for AkeKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AkeKeys")
            .field("ssid", &self.ssid)
            .finish_non_exhaustive()
    }
}

impl AkeKeys {
    /// Derive the full key set from the DH shared secret.
    fn derive(s: &BigUint) -> Self {
        let secbytes = encode_mpi(s);
        let h = |b: u8| sha256_prefixed(b, &secbytes);

        let mut ssid = [0u8; 8];
        ssid.copy_from_slice(&h(0x00)[..8]);
        let cc = h(0x01);
        let mut c = [0u8; 16];
        let mut c_prime = [0u8; 16];
        c.copy_from_slice(&cc[..16]);
        c_prime.copy_from_slice(&cc[16..]);

        Self {
            ssid,
            c,
            c_prime,
            m1: h(0x02),
            m2: h(0x03),
            m1_prime: h(0x04),
            m2_prime: h(0x05),
        }
    }
}

#[derive(Debug, Default)]
enum AkeState {
    #[default]
    None,
    AwaitingDhKey {
        our_dh: DhKeyPair,
        r: [u8; 16],
        encrypted_gx: Vec<u8>,
        hashed_gx: [u8; 32],
    },
    AwaitingRevealSig {
        our_dh: DhKeyPair,
        their_encrypted_gx: Vec<u8>,
        their_hashed_gx: [u8; 32],
    },
    AwaitingSig {
        our_dh: DhKeyPair,
        their_dh: BigUint,
        keys: AkeKeys,
    },
}

/// The handshake substate of one conversation.
#[derive(Debug, Default)]
pub struct Ake {
    state: AkeState,
}

impl Ake {
    /// Whether a handshake is in flight.
    pub fn in_progress(&self) -> bool {
        !matches!(self.state, AkeState::None)
    }

    /// Abandon any handshake in flight.
    pub fn reset(&mut self) {
        self.state = AkeState::None;
    }

    /// Begin a handshake: emit DH-Commit and await the peer's DH-Key.
    pub fn start(&mut self, rand: &mut dyn RandomSource) -> Result<AkeReply> {
        let our_dh = DhKeyPair::generate(rand)?;
        let r: [u8; 16] = random_bytes(rand)?;
        let gx_mpi = encode_mpi(our_dh.public());
        let encrypted_gx = aes128_ctr_zero(&r, &gx_mpi);
        let hashed_gx = sha256(&encrypted_gx);

        let payload = commit_payload(&encrypted_gx, &hashed_gx);
        self.state = AkeState::AwaitingDhKey {
            our_dh,
            r,
            encrypted_gx,
            hashed_gx,
        };
        Ok((MessageType::DhCommit, payload))
    }

    /// Handle an inbound DH-Commit.
    ///
    /// From a clean state this answers with DH-Key. While our own commit is
    /// outstanding, the lexicographically higher commitment hash wins: we
    /// either re-send our DH-Commit or abandon ours and answer theirs.
    pub fn receive_commit(
        &mut self,
        rand: &mut dyn RandomSource,
        payload: &[u8],
    ) -> Result<AkeReply> {
        let (their_encrypted_gx, their_hashed_gx) = parse_commit(payload)?;

        if let AkeState::AwaitingDhKey {
            encrypted_gx,
            hashed_gx,
            ..
        } = &self.state
        {
            if hashed_gx.as_slice() > their_hashed_gx.as_slice() {
                // Our commitment outranks theirs: ignore the incoming one
                // and repeat ours.
                tracing::debug!("commit collision resolved in our favor");
                return Ok((
                    MessageType::DhCommit,
                    commit_payload(encrypted_gx, hashed_gx),
                ));
            }
            tracing::debug!("commit collision resolved against us");
        }

        let our_dh = DhKeyPair::generate(rand)?;
        let mut enc = Encoder::new();
        enc.write_mpi(our_dh.public());
        let payload = enc.into_bytes();

        self.state = AkeState::AwaitingRevealSig {
            our_dh,
            their_encrypted_gx,
            their_hashed_gx,
        };
        Ok((MessageType::DhKey, payload))
    }

    /// Handle an inbound DH-Key while our commit is outstanding; answers
    /// with Reveal-Signature. In any other state the message is ignored.
    pub fn receive_dh_key(
        &mut self,
        rand: &mut dyn RandomSource,
        our_identity: &DsaKeyPair,
        payload: &[u8],
    ) -> Result<Option<AkeReply>> {
        if !matches!(self.state, AkeState::AwaitingDhKey { .. }) {
            tracing::debug!("ignoring DH-Key outside AWAITING_DHKEY");
            return Ok(None);
        }

        let mut dec = Decoder::new(payload);
        let their_dh = dec.read_mpi()?;
        if !dec.is_empty() {
            return Err(ProtoError::InvalidMessage("trailing bytes after DH-Key"));
        }
        if !group::is_group_element(&their_dh) {
            return Err(ProtoError::InvalidMessage("DH-Key outside group"));
        }

        let AkeState::AwaitingDhKey { our_dh, r, .. } =
            std::mem::take(&mut self.state)
        else {
            unreachable!("state checked above");
        };

        let s = our_dh.shared_secret(&their_dh)?;
        let keys = AkeKeys::derive(&s);
        let signed = encrypt_signature_block(
            rand,
            our_identity,
            our_dh.public(),
            &their_dh,
            &keys.c,
            &keys.m1,
            &keys.m2,
        )?;

        let mut enc = Encoder::new();
        enc.write_data(&r);
        enc.write_data(&signed.encrypted);
        enc.write_raw(&signed.mac);
        let payload = enc.into_bytes();

        self.state = AkeState::AwaitingSig {
            our_dh,
            their_dh,
            keys,
        };
        Ok(Some((MessageType::RevealSignature, payload)))
    }

    /// Handle an inbound Reveal-Signature while awaiting it; verifies the
    /// revealed commitment, authenticates the peer and answers with
    /// Signature. Completes the handshake on success.
    pub fn receive_reveal_sig(
        &mut self,
        rand: &mut dyn RandomSource,
        our_identity: &DsaKeyPair,
        payload: &[u8],
    ) -> Result<Option<(AkeReply, AkeCompletion)>> {
        if !matches!(self.state, AkeState::AwaitingRevealSig { .. }) {
            tracing::debug!("ignoring Reveal-Signature outside AWAITING_REVEALSIG");
            return Ok(None);
        }

        let mut dec = Decoder::new(payload);
        let revealed = dec.read_data()?;
        let encrypted_sig = dec.read_data()?;
        let their_mac = dec.read_exact(20)?;
        if !dec.is_empty() {
            return Err(ProtoError::InvalidMessage(
                "trailing bytes after Reveal-Signature",
            ));
        }
        let r: [u8; 16] = revealed
            .try_into()
            .map_err(|_| ProtoError::InvalidMessage("revealed key must be 16 bytes"))?;

        let AkeState::AwaitingRevealSig {
            our_dh,
            their_encrypted_gx,
            their_hashed_gx,
        } = std::mem::take(&mut self.state)
        else {
            unreachable!("state checked above");
        };

        // The commitment binds the encrypted bytes; check before using r.
        if !ct_eq(&sha256(&their_encrypted_gx), &their_hashed_gx) {
            return Err(ProtoError::InvalidMessage("commitment hash mismatch"));
        }
        let gx_mpi = aes128_ctr_zero(&r, &their_encrypted_gx);
        let mut gx_dec = Decoder::new(&gx_mpi);
        let their_dh = gx_dec.read_mpi()?;
        if !gx_dec.is_empty() {
            return Err(ProtoError::InvalidMessage("trailing bytes after g^x"));
        }
        if !group::is_group_element(&their_dh) {
            return Err(ProtoError::InvalidMessage("revealed g^x outside group"));
        }

        let s = our_dh.shared_secret(&their_dh)?;
        let keys = AkeKeys::derive(&s);

        let (their_dsa, their_keyid) = verify_signature_block(
            encrypted_sig,
            their_mac,
            &their_dh,
            our_dh.public(),
            &keys.c,
            &keys.m1,
            &keys.m2,
        )?;

        // Our answering Signature uses the primed key set.
        let signed = encrypt_signature_block(
            rand,
            our_identity,
            our_dh.public(),
            &their_dh,
            &keys.c_prime,
            &keys.m1_prime,
            &keys.m2_prime,
        )?;
        let mut enc = Encoder::new();
        enc.write_data(&signed.encrypted);
        enc.write_raw(&signed.mac);
        let reply = (MessageType::Signature, enc.into_bytes());

        let completion = AkeCompletion {
            our_dh,
            their_keyid,
            their_dh,
            their_dsa,
            ssid: keys.ssid,
        };
        Ok(Some((reply, completion)))
    }

    /// Handle an inbound Signature while awaiting it; authenticates the
    /// peer and completes the handshake.
    pub fn receive_sig(&mut self, payload: &[u8]) -> Result<Option<AkeCompletion>> {
        if !matches!(self.state, AkeState::AwaitingSig { .. }) {
            tracing::debug!("ignoring Signature outside AWAITING_SIG");
            return Ok(None);
        }

        let mut dec = Decoder::new(payload);
        let encrypted_sig = dec.read_data()?;
        let their_mac = dec.read_exact(20)?;
        if !dec.is_empty() {
            return Err(ProtoError::InvalidMessage("trailing bytes after Signature"));
        }

        let AkeState::AwaitingSig {
            our_dh,
            their_dh,
            keys,
        } = std::mem::take(&mut self.state)
        else {
            unreachable!("state checked above");
        };

        let (their_dsa, their_keyid) = verify_signature_block(
            encrypted_sig,
            their_mac,
            &their_dh,
            our_dh.public(),
            &keys.c_prime,
            &keys.m1_prime,
            &keys.m2_prime,
        )?;

        Ok(Some(AkeCompletion {
            our_dh,
            their_keyid,
            their_dh,
            their_dsa,
            ssid: keys.ssid,
        }))
    }
}

fn commit_payload(encrypted_gx: &[u8], hashed_gx: &[u8; 32]) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.write_data(encrypted_gx);
    enc.write_data(hashed_gx);
    enc.into_bytes()
}

fn parse_commit(payload: &[u8]) -> Result<(Vec<u8>, [u8; 32])> {
    let mut dec = Decoder::new(payload);
    let encrypted_gx = dec.read_data()?.to_vec();
    let hashed_gx: [u8; 32] = dec
        .read_data()?
        .try_into()
        .map_err(|_| ProtoError::InvalidMessage("commitment hash must be 32 bytes"))?;
    if !dec.is_empty() {
        return Err(ProtoError::InvalidMessage("trailing bytes after DH-Commit"));
    }
    if encrypted_gx.is_empty() {
        return Err(ProtoError::InvalidMessage("empty encrypted g^x"));
    }
    Ok((encrypted_gx, hashed_gx))
}

/// The HMAC all signatures cover: both DH publics (signer's first), the
/// signer's identity key and the keyid it vouches for.
fn signature_base(
    m1: &[u8; 32],
    signer_dh: &BigUint,
    peer_dh: &BigUint,
    signer_identity: &DsaPublicKey,
    keyid: u32,
) -> [u8; 32] {
    let mut enc = Encoder::new();
    enc.write_mpi(signer_dh);
    enc.write_mpi(peer_dh);
    enc.write_raw(&signer_identity.serialize());
    enc.write_u32(keyid);
    hmac_sha256(m1, enc.as_bytes())
}

struct EncryptedSignature {
    encrypted: Vec<u8>,
    mac: [u8; 20],
}

/// Build `AES-CTR(c, pub || keyid || sig)` plus its MAC under `m2`.
fn encrypt_signature_block(
    rand: &mut dyn RandomSource,
    our_identity: &DsaKeyPair,
    our_dh: &BigUint,
    their_dh: &BigUint,
    c: &[u8; 16],
    m1: &[u8; 32],
    m2: &[u8; 32],
) -> Result<EncryptedSignature> {
    let base = signature_base(m1, our_dh, their_dh, our_identity.public(), AKE_KEYID);
    let sig = our_identity.sign(rand, &base)?;

    let mut block = Encoder::new();
    block.write_raw(&our_identity.public().serialize());
    block.write_u32(AKE_KEYID);
    block.write_raw(&sig);
    let encrypted = aes128_ctr_zero(c, block.as_bytes());

    let mut maced = Encoder::new();
    maced.write_data(&encrypted);
    let mac = hmac_sha256_160(m2, maced.as_bytes());

    Ok(EncryptedSignature { encrypted, mac })
}

/// Verify and open the peer's encrypted signature block.
fn verify_signature_block(
    encrypted_sig: &[u8],
    their_mac: &[u8],
    their_dh: &BigUint,
    our_dh: &BigUint,
    c: &[u8; 16],
    m1: &[u8; 32],
    m2: &[u8; 32],
) -> Result<(DsaPublicKey, u32)> {
    let mut maced = Encoder::new();
    maced.write_data(encrypted_sig);
    if !ct_eq(&hmac_sha256_160(m2, maced.as_bytes()), their_mac) {
        return Err(ProtoError::InvalidMessage("signature MAC mismatch"));
    }

    let block = aes128_ctr_zero(c, encrypted_sig);
    let mut dec = Decoder::new(&block);
    let their_dsa = DsaPublicKey::decode(&mut dec)?;
    let their_keyid = dec.read_u32()?;
    if their_keyid == 0 {
        return Err(ProtoError::InvalidMessage("zero keyid in signature"));
    }
    let sig = dec.read_rest();

    let base = signature_base(m1, their_dh, our_dh, &their_dsa, their_keyid);
    let rest = their_dsa
        .verify(&base, sig)
        .map_err(|_| ProtoError::InvalidMessage("handshake signature rejected"))?;
    if !rest.is_empty() {
        return Err(ProtoError::InvalidMessage("trailing bytes after signature"));
    }
    Ok((their_dsa, their_keyid))
}
