//! The conversation façade: one entry point tying the AKE, the key
//! ratchet, the data-message engine and SMP together.
//!
//! A `Conversation` is fed raw transport bytes through [`receive`] and
//! application text through [`send`]; both return the fragments to hand
//! to the transport plus any decrypted output, security change and
//! events. All state mutation is sequential; feed one call at a time.
//!
//! [`receive`]: Conversation::receive
//! [`send`]: Conversation::send

use num_bigint_dig::BigUint;
use tracing::{debug, warn};

use offrec_crypto::hash::ct_eq;
use offrec_crypto::rand::random_bytes;
use offrec_crypto::{DsaKeyPair, DsaPublicKey, RandomSource};
use offrec_wire::envelope::{self, MIN_INSTANCE_TAG};
use offrec_wire::query::{self, ERROR_PREFIX};
use offrec_wire::{fragment, Assembler, Decoder, MessageHeader, MessageType, Version};

use crate::ake::{Ake, AkeCompletion, AkeReply};
use crate::data::{self, FLAG_IGNORE_UNREADABLE};
use crate::error::{ProtoError, Result};
use crate::events::{MessageEvent, SecurityChange};
use crate::keys::KeyManager;
use crate::policy::Policies;
use crate::smp::{derive_secret, Smp, SmpOutcome};
use crate::tlv::{Tlv, TLV_DISCONNECT, TLV_EXTRA_SYMMETRIC_KEY, TLV_PADDING};

/// The message state of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MsgState {
    /// Messages pass through unprotected.
    #[default]
    Plaintext,
    /// A session is established; messages are encrypted and authenticated.
    Encrypted,
    /// The peer or the host ended the session; nothing can be sent.
    Finished,
}

/// The outcome of one [`Conversation::receive`] call.
#[derive(Debug, Default)]
pub struct Received {
    /// Decrypted or passed-through application text, when any.
    pub plaintext: Option<Vec<u8>>,
    /// Whether `plaintext` arrived encrypted.
    pub encrypted: bool,
    /// The security change this call produced.
    pub change: SecurityChange,
    /// Fragments to hand to the transport, in order.
    pub to_send: Vec<Vec<u8>>,
    /// Out-of-band events for the host.
    pub events: Vec<MessageEvent>,
}

/// The outcome of one [`Conversation::send`] call.
#[derive(Debug, Default)]
pub struct Sent {
    /// Fragments to hand to the transport, in order.
    pub fragments: Vec<Vec<u8>>,
}

/// One end of an OTR conversation.
pub struct Conversation {
    our_identity: DsaKeyPair,
    their_identity: Option<DsaPublicKey>,
    policies: Policies,
    rand: Box<dyn RandomSource>,
    version: Option<Version>,
    our_tag: u32,
    their_tag: u32,
    msg_state: MsgState,
    ssid: [u8; 8],
    fragment_size: usize,
    ake: Ake,
    keys: Option<KeyManager>,
    smp: Smp,
    assembler: Assembler,
    whitespace_tag_sent: bool,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("msg_state", &self.msg_state)
            .field("version", &self.version)
            .field("ake_in_progress", &self.ake.in_progress())
            .field("smp_in_progress", &self.smp.in_progress())
            .finish()
    }
}

impl Conversation {
    /// Create a conversation in PLAINTEXT with the host-loaded identity
    /// key, a policy set and a random source.
    ///
    /// # Errors
    ///
    /// Fails with [`ProtoError::ShortRandomRead`] when the instance tag
    /// cannot be drawn.
    pub fn new(
        our_identity: DsaKeyPair,
        policies: Policies,
        mut rand: Box<dyn RandomSource>,
    ) -> Result<Self> {
        let mut our_tag = 0u32;
        while our_tag < MIN_INSTANCE_TAG {
            our_tag = u32::from_be_bytes(random_bytes::<4>(rand.as_mut())?);
        }
        Ok(Self {
            our_identity,
            their_identity: None,
            policies,
            rand,
            version: None,
            our_tag,
            their_tag: 0,
            msg_state: MsgState::Plaintext,
            ssid: [0u8; 8],
            fragment_size: 0,
            ake: Ake::default(),
            keys: None,
            smp: Smp::default(),
            assembler: Assembler::new(),
            whitespace_tag_sent: false,
        })
    }

    /// Cap outbound fragment length; zero disables fragmentation.
    pub fn set_fragment_size(&mut self, size: usize) {
        self.fragment_size = size;
    }

    /// Whether the conversation is currently encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.msg_state == MsgState::Encrypted
    }

    /// The current message state.
    pub fn msg_state(&self) -> MsgState {
        self.msg_state
    }

    /// The 8-byte session id, all zero before the first handshake.
    pub fn ssid(&self) -> &[u8; 8] {
        &self.ssid
    }

    /// The peer's identity fingerprint, once learned.
    pub fn their_fingerprint(&self) -> Option<[u8; 20]> {
        self.their_identity.as_ref().map(|k| k.fingerprint())
    }

    /// The pending SMP question from the peer, if any.
    pub fn smp_question(&self) -> Option<&[u8]> {
        self.smp.question()
    }

    /// Build the query message this conversation would send to offer OTR.
    pub fn query_message(&self) -> Vec<u8> {
        query::query_message(self.policies.versions())
    }

    /// Send application text.
    ///
    /// In PLAINTEXT the text passes through, tagged with a whitespace
    /// offer when policy asks. In ENCRYPTED it is wrapped in a data
    /// message and fragmented.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::ConversationFinished`] after the session has
    /// ended; start a new handshake or a new conversation instead.
    pub fn send(&mut self, message: &[u8]) -> Result<Sent> {
        match self.msg_state {
            MsgState::Finished => Err(ProtoError::ConversationFinished),
            MsgState::Plaintext => {
                let mut out = message.to_vec();
                if self.policies.send_whitespace_tag && !self.whitespace_tag_sent {
                    out.extend_from_slice(&query::whitespace_tag(self.policies.versions()));
                    self.whitespace_tag_sent = true;
                }
                Ok(Sent {
                    fragments: vec![out],
                })
            }
            MsgState::Encrypted => Ok(Sent {
                fragments: self.send_data_message(message, &[], 0)?,
            }),
        }
    }

    /// Feed one inbound transport message.
    ///
    /// # Errors
    ///
    /// Structural failures are returned; integrity failures drop silently
    /// and surface only in [`Received::events`].
    pub fn receive(&mut self, message: &[u8]) -> Result<Received> {
        if fragment::is_fragment(message) {
            let assembled = self.assembler.receive(message)?;
            return match assembled {
                Some(full) => self.receive_complete(&full),
                None => Ok(Received::default()),
            };
        }
        // Anything that is not a fragment discards an in-flight assembly.
        self.assembler.reset();
        self.receive_complete(message)
    }

    fn receive_complete(&mut self, message: &[u8]) -> Result<Received> {
        if message.starts_with(envelope::ARMOR_PREFIX) {
            return self.receive_armored(message);
        }
        if let Some(text) = message.strip_prefix(ERROR_PREFIX) {
            return self.receive_error_message(text);
        }
        if let Some(offered) = query::parse_query(message) {
            return self.receive_query(offered);
        }
        self.receive_plaintext(message)
    }

    fn receive_query(&mut self, offered: query::VersionSet) -> Result<Received> {
        let allowed = self.policies.versions();
        let negotiated = query::VersionSet {
            v2: offered.v2 && allowed.v2,
            v3: offered.v3 && allowed.v3,
        }
        .best();
        let Some(version) = negotiated else {
            debug!("query offered no acceptable version");
            return Ok(Received::default());
        };

        let commit = self.ake.start(self.rand.as_mut())?;
        self.version = Some(version);
        debug!(?version, "query accepted, handshake started");
        Ok(Received {
            to_send: self.wrap_handshake(commit)?,
            ..Received::default()
        })
    }

    fn receive_error_message(&mut self, text: &[u8]) -> Result<Received> {
        let mut received = Received::default();
        received
            .events
            .push(MessageEvent::ReceivedErrorMessage(text.to_vec()));
        if self.policies.error_start_ake {
            received.to_send.push(self.query_message());
        }
        Ok(received)
    }

    fn receive_plaintext(&mut self, message: &[u8]) -> Result<Received> {
        let mut received = Received::default();

        let text = match query::strip_whitespace_tag(message) {
            Some((stripped, offered)) => {
                if self.policies.whitespace_start_ake {
                    let allowed = self.policies.versions();
                    let negotiated = query::VersionSet {
                        v2: offered.v2 && allowed.v2,
                        v3: offered.v3 && allowed.v3,
                    }
                    .best();
                    if let Some(version) = negotiated {
                        let commit = self.ake.start(self.rand.as_mut())?;
                        self.version = Some(version);
                        received.to_send = self.wrap_handshake(commit)?;
                        debug!(?version, "whitespace tag accepted, handshake started");
                    }
                }
                stripped
            }
            None => message.to_vec(),
        };

        if self.msg_state != MsgState::Plaintext || self.policies.require_encryption {
            received
                .events
                .push(MessageEvent::ReceivedMessageUnencrypted);
        }
        received.plaintext = Some(text);
        Ok(received)
    }

    fn receive_armored(&mut self, message: &[u8]) -> Result<Received> {
        let binary = envelope::unarmor(message)?;
        let mut dec = Decoder::new(&binary);
        let header = MessageHeader::decode(&mut dec)?;

        match self.version {
            Some(version) if version != header.version => {
                return Err(ProtoError::WrongProtocolVersion)
            }
            Some(_) => {}
            None => {
                let allowed = self.policies.versions();
                let admitted = match header.version {
                    Version::V2 => allowed.v2,
                    Version::V3 => allowed.v3,
                };
                if !admitted {
                    return Err(ProtoError::WrongProtocolVersion);
                }
                self.version = Some(header.version);
            }
        }

        if header.version == Version::V3 {
            if header.sender_tag < MIN_INSTANCE_TAG {
                return Err(ProtoError::InvalidMessage("sender instance tag too small"));
            }
            if header.receiver_tag != 0 && header.receiver_tag != self.our_tag {
                let mut received = Received::default();
                received
                    .events
                    .push(MessageEvent::ReceivedMessageForOtherInstance);
                return Ok(received);
            }
            if self.their_tag == 0 {
                self.their_tag = header.sender_tag;
            } else if self.their_tag != header.sender_tag {
                let mut received = Received::default();
                received
                    .events
                    .push(MessageEvent::ReceivedMessageForOtherInstance);
                return Ok(received);
            }
        }

        match header.message_type {
            MessageType::DhCommit => {
                let payload = dec.read_rest();
                let reply = self.ake.receive_commit(self.rand.as_mut(), payload)?;
                Ok(Received {
                    to_send: self.wrap_handshake(reply)?,
                    ..Received::default()
                })
            }
            MessageType::DhKey => {
                let payload = dec.read_rest();
                let reply =
                    self.ake
                        .receive_dh_key(self.rand.as_mut(), &self.our_identity, payload)?;
                match reply {
                    Some(reply) => Ok(Received {
                        to_send: self.wrap_handshake(reply)?,
                        ..Received::default()
                    }),
                    None => Ok(Received::default()),
                }
            }
            MessageType::RevealSignature => {
                let payload = dec.read_rest();
                let outcome =
                    self.ake
                        .receive_reveal_sig(self.rand.as_mut(), &self.our_identity, payload)?;
                match outcome {
                    Some((reply, completion)) => {
                        let to_send = self.wrap_handshake(reply)?;
                        let change = self.finish_handshake(completion)?;
                        Ok(Received {
                            change,
                            to_send,
                            ..Received::default()
                        })
                    }
                    None => Ok(Received::default()),
                }
            }
            MessageType::Signature => {
                let payload = dec.read_rest();
                let outcome = self.ake.receive_sig(payload)?;
                match outcome {
                    Some(completion) => {
                        let change = self.finish_handshake(completion)?;
                        Ok(Received {
                            change,
                            ..Received::default()
                        })
                    }
                    None => Ok(Received::default()),
                }
            }
            MessageType::Data => self.receive_data(&binary, &mut dec),
        }
    }

    fn finish_handshake(&mut self, completion: AkeCompletion) -> Result<SecurityChange> {
        let keys = KeyManager::new(
            self.rand.as_mut(),
            completion.our_dh,
            completion.their_keyid,
            completion.their_dh,
        )?;
        self.keys = Some(keys);
        self.their_identity = Some(completion.their_dsa);
        self.ssid = completion.ssid;
        self.msg_state = MsgState::Encrypted;
        self.smp = Smp::default();
        debug!("handshake complete, conversation encrypted");
        Ok(SecurityChange::NewKeys)
    }

    fn receive_data<'a>(&mut self, full: &'a [u8], dec: &mut Decoder<'a>) -> Result<Received> {
        let parsed = data::parse(full, dec)?;
        let mut received = Received::default();

        let Some(keys) = self.keys.as_mut() else {
            warn!("data message without an established session");
            if !parsed.ignore_unreadable() {
                received.events.push(MessageEvent::ReceivedMessageUnreadable);
            }
            return Ok(received);
        };

        let session = keys.receiving_keys(parsed.sender_keyid, parsed.recipient_keyid)?;
        if !ct_eq(&parsed.expected_mac(&session.recv_mac), parsed.mac) {
            warn!("data message failed authentication");
            if !parsed.ignore_unreadable() {
                received.events.push(MessageEvent::ReceivedMessageUnreadable);
            }
            return Ok(received);
        }
        if !keys.counter_is_fresh(parsed.sender_keyid, parsed.recipient_keyid, &parsed.top_ctr) {
            warn!("replayed counter, dropping message");
            return Ok(received);
        }

        let body = parsed.decrypt(&session.recv_aes);
        let (human, tlvs) = data::decode_body(&body)?;
        keys.commit_receive(
            self.rand.as_mut(),
            parsed.sender_keyid,
            parsed.recipient_keyid,
            &parsed.top_ctr,
            &parsed.next_dh,
        )?;

        let mut reply_tlvs: Vec<Tlv> = Vec::new();
        for tlv in &tlvs {
            if tlv.typ == TLV_PADDING {
                continue;
            }
            if tlv.typ == TLV_DISCONNECT {
                debug!("peer disconnected");
                self.finish_session();
                received.change = SecurityChange::ConversationEnded;
                break;
            }
            if tlv.is_smp() {
                match self.smp.receive(self.rand.as_mut(), tlv)? {
                    SmpOutcome::None => {}
                    SmpOutcome::Reply(reply) => reply_tlvs.push(reply),
                    SmpOutcome::SecretNeeded { .. } => {
                        received.change = SecurityChange::SmpSecretNeeded;
                    }
                    SmpOutcome::Completed { success, reply } => {
                        received.change = if success {
                            SecurityChange::SmpComplete
                        } else {
                            SecurityChange::SmpFailed
                        };
                        reply_tlvs.extend(reply);
                    }
                    SmpOutcome::Aborted { reply } => {
                        received.change = SecurityChange::SmpFailed;
                        reply_tlvs.extend(reply);
                    }
                }
                continue;
            }
            if tlv.typ == TLV_EXTRA_SYMMETRIC_KEY {
                if let Some(keys) = self.keys.as_ref() {
                    let key = keys.extra_symmetric_key()?;
                    received.events.push(MessageEvent::ExtraSymmetricKeyReceived {
                        key,
                        use_data: tlv.value.clone(),
                    });
                }
                continue;
            }
            debug!(typ = tlv.typ, "skipping unknown TLV");
        }

        if !reply_tlvs.is_empty() && self.msg_state == MsgState::Encrypted {
            received.to_send =
                self.send_data_message(b"", &reply_tlvs, FLAG_IGNORE_UNREADABLE)?;
        }

        // TLV-only packets are control traffic, not application output.
        if !human.is_empty() {
            received.plaintext = Some(human);
            received.encrypted = true;
        }
        Ok(received)
    }

    /// End the conversation, telling the peer when a session is active.
    ///
    /// Transitions to FINISHED and wipes all session key material.
    pub fn end(&mut self) -> Result<Vec<Vec<u8>>> {
        let fragments = match self.msg_state {
            MsgState::Encrypted => self.send_data_message(
                b"",
                &[Tlv::new(TLV_DISCONNECT, Vec::new())],
                FLAG_IGNORE_UNREADABLE,
            )?,
            _ => Vec::new(),
        };
        self.finish_session();
        Ok(fragments)
    }

    /// Begin SMP authentication with an optional question.
    ///
    /// Returns the fragments carrying the first SMP message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::CantAuthenticateWithoutEncryption`] outside
    /// an encrypted session.
    pub fn start_authenticate(
        &mut self,
        question: Option<&[u8]>,
        secret: &[u8],
    ) -> Result<Vec<Vec<u8>>> {
        let x = self.smp_secret(true, secret)?;
        let tlvs = self
            .smp
            .start(self.rand.as_mut(), x, question.map(|q| q.to_vec()))?;
        self.send_data_message(b"", &tlvs, FLAG_IGNORE_UNREADABLE)
    }

    /// Answer a peer-initiated SMP exchange with our secret.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::SmpUnexpectedMessage`] when no exchange is
    /// waiting for a secret.
    pub fn provide_authentication_secret(&mut self, secret: &[u8]) -> Result<Vec<Vec<u8>>> {
        let x = self.smp_secret(false, secret)?;
        let tlv = self.smp.provide_secret(self.rand.as_mut(), x)?;
        self.send_data_message(b"", &[tlv], FLAG_IGNORE_UNREADABLE)
    }

    /// Abort any SMP exchange in flight, notifying the peer.
    pub fn abort_authenticate(&mut self) -> Result<Vec<Vec<u8>>> {
        if self.msg_state != MsgState::Encrypted {
            return Err(ProtoError::CantAuthenticateWithoutEncryption);
        }
        let tlv = self.smp.abort();
        self.send_data_message(b"", &[tlv], FLAG_IGNORE_UNREADABLE)
    }

    /// Derive the SMP secret with fingerprints in initiator-first order.
    fn smp_secret(&self, we_initiate: bool, secret: &[u8]) -> Result<BigUint> {
        if self.msg_state != MsgState::Encrypted {
            return Err(ProtoError::CantAuthenticateWithoutEncryption);
        }
        let their_fp = self
            .their_identity
            .as_ref()
            .ok_or(ProtoError::CantAuthenticateWithoutEncryption)?
            .fingerprint();
        let our_fp = self.our_identity.public().fingerprint();
        Ok(if we_initiate {
            derive_secret(&our_fp, &their_fp, &self.ssid, secret)
        } else {
            derive_secret(&their_fp, &our_fp, &self.ssid, secret)
        })
    }

    fn finish_session(&mut self) {
        self.msg_state = MsgState::Finished;
        self.keys = None;
        self.smp = Smp::default();
        self.ake.reset();
    }

    fn header(&self, message_type: MessageType) -> Result<MessageHeader> {
        let version = self.version.ok_or(ProtoError::WrongProtocolVersion)?;
        Ok(MessageHeader {
            version,
            message_type,
            sender_tag: self.our_tag,
            receiver_tag: self.their_tag,
        })
    }

    /// Armor and fragment an outbound handshake message.
    fn wrap_handshake(&self, (message_type, payload): AkeReply) -> Result<Vec<Vec<u8>>> {
        let header = self.header(message_type)?;
        let armored = envelope::armor(&header.encode_with_payload(&payload));
        self.fragment_out(&armored)
    }

    /// Build, armor and fragment one outbound data message.
    fn send_data_message(
        &mut self,
        human: &[u8],
        tlvs: &[Tlv],
        flags: u8,
    ) -> Result<Vec<Vec<u8>>> {
        let header = self.header(MessageType::Data)?;
        let keys = self
            .keys
            .as_mut()
            .ok_or(ProtoError::InvalidMessage("no session keys"))?;
        let params = keys.prepare_send()?;
        let revealed = keys.take_revealed_macs();
        let body = data::encode_body(human, tlvs);
        let full = data::seal(&header, flags, &params, &body, &revealed);
        let armored = envelope::armor(&full);
        self.fragment_out(&armored)
    }

    fn fragment_out(&self, armored: &[u8]) -> Result<Vec<Vec<u8>>> {
        let version = self.version.ok_or(ProtoError::WrongProtocolVersion)?;
        Ok(fragment::fragment(
            version,
            self.our_tag,
            self.their_tag,
            self.fragment_size,
            armored,
        )?)
    }
}
