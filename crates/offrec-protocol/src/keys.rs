//! The DH key ratchet: keyid rings, per-direction session keys, counter
//! discipline and MAC-key revelation.
//!
//! Each side keeps the keypair it currently sends with (`our_keyid`), a
//! fresh one advertised one step ahead, and the peer's current and
//! previous public values. A data message addressed to our advertised key
//! rotates our ring; a message sent under the peer's newest key promotes
//! the `next_dh` it carries. Keys that leave the ring have their receiving
//! MAC keys queued for revelation in the next outbound message.

use num_bigint_dig::BigUint;
use zeroize::Zeroize;

use offrec_crypto::hash::{sha1, sha1_prefixed, sha256_prefixed};
use offrec_crypto::{group, DhKeyPair, RandomSource};
use offrec_wire::codec::encode_mpi;

use crate::error::{ProtoError, Result};

/// Per-direction AES and MAC keys for one (our keyid, their keyid) pair.
#[derive(Clone)]
pub struct SessionKeys {
    /// AES-128 key for messages we send under this pair.
    pub send_aes: [u8; 16],
    /// MAC key authenticating messages we send.
    pub send_mac: [u8; 20],
    /// AES-128 key for messages we receive under this pair.
    pub recv_aes: [u8; 16],
    /// MAC key verifying messages we receive.
    pub recv_mac: [u8; 20],
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.send_aes.zeroize();
        self.send_mac.zeroize();
        self.recv_aes.zeroize();
        self.recv_mac.zeroize();
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

/// Everything needed to serialize one outbound data message.
#[derive(Debug)]
pub struct SendParameters {
    /// Our keyid the message is encrypted under.
    pub sender_keyid: u32,
    /// The peer keyid the message is addressed to.
    pub recipient_keyid: u32,
    /// Our advertised next DH public value.
    pub next_dh: BigUint,
    /// The transmitted top half of the CTR counter.
    pub top_ctr: [u8; 8],
    /// Session keys for this pair.
    pub keys: SessionKeys,
}

#[derive(Debug)]
struct KeySlot {
    our_keyid: u32,
    their_keyid: u32,
    keys: SessionKeys,
    their_last_ctr: u64,
    used: bool,
}

/// The ratchet state for one encrypted conversation.
#[derive(Debug)]
pub struct KeyManager {
    our_keyid: u32,
    our_current: DhKeyPair,
    our_next: DhKeyPair,
    their_keyid: u32,
    their_current: BigUint,
    their_previous: Option<BigUint>,
    send_ctr: u64,
    slots: Vec<KeySlot>,
    pending_reveals: Vec<u8>,
}

impl KeyManager {
    /// Seed the ratchet from a completed handshake.
    ///
    /// Our AKE keypair becomes `our_keyid = 1`; the peer's DH public and
    /// the keyid from their signature seed the other side of the ring.
    ///
    /// # Errors
    ///
    /// Fails with a short random read if the advertised next key cannot be
    /// generated.
    pub fn new(
        rand: &mut dyn RandomSource,
        our_ake_key: DhKeyPair,
        their_keyid: u32,
        their_public: BigUint,
    ) -> Result<Self> {
        let our_next = DhKeyPair::generate(rand)?;
        Ok(Self {
            our_keyid: 1,
            our_current: our_ake_key,
            our_next,
            their_keyid,
            their_current: their_public,
            their_previous: None,
            send_ctr: 0,
            slots: Vec::new(),
            pending_reveals: Vec::new(),
        })
    }

    /// The keyid we currently encrypt with.
    pub fn our_keyid(&self) -> u32 {
        self.our_keyid
    }

    /// The peer keyid we currently address.
    pub fn their_keyid(&self) -> u32 {
        self.their_keyid
    }

    /// Parameters for the next outbound data message.
    ///
    /// Advances the outbound counter; each call yields a strictly larger
    /// top half for the same keyid pair.
    pub fn prepare_send(&mut self) -> Result<SendParameters> {
        self.send_ctr += 1;
        let top_ctr = self.send_ctr.to_be_bytes();
        let keys = {
            let slot = self.slot(self.our_keyid, self.their_keyid)?;
            slot.used = true;
            slot.keys.clone()
        };
        Ok(SendParameters {
            sender_keyid: self.our_keyid,
            recipient_keyid: self.their_keyid,
            next_dh: self.our_next.public().clone(),
            top_ctr,
            keys,
        })
    }

    /// Session keys for an inbound message's keyid pair.
    ///
    /// `sender_keyid` names one of the peer's ring entries and
    /// `recipient_keyid` one of ours; anything outside the two-deep window
    /// is rejected.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` for keyids outside the window.
    pub fn receiving_keys(
        &mut self,
        sender_keyid: u32,
        recipient_keyid: u32,
    ) -> Result<SessionKeys> {
        Ok(self.slot(recipient_keyid, sender_keyid)?.keys.clone())
    }

    /// Whether `top_ctr` is strictly newer than anything seen for the pair.
    pub fn counter_is_fresh(&mut self, sender_keyid: u32, recipient_keyid: u32, top_ctr: &[u8; 8]) -> bool {
        let ctr = u64::from_be_bytes(*top_ctr);
        match self.slot(recipient_keyid, sender_keyid) {
            Ok(slot) => ctr > slot.their_last_ctr,
            Err(_) => false,
        }
    }

    /// Commit an authenticated, decrypted inbound message: advance the
    /// replay counter and rotate both sides of the ring as acknowledged.
    ///
    /// # Errors
    ///
    /// Rejects a `next_dh` outside the group, and fails with a short
    /// random read if our replacement key cannot be generated.
    pub fn commit_receive(
        &mut self,
        rand: &mut dyn RandomSource,
        sender_keyid: u32,
        recipient_keyid: u32,
        top_ctr: &[u8; 8],
        next_dh: &BigUint,
    ) -> Result<()> {
        if !group::is_group_element(next_dh) {
            return Err(ProtoError::InvalidMessage("next DH key outside group"));
        }
        // Draw the replacement key up front so a short random read cannot
        // leave the ring half-rotated.
        let replacement = if recipient_keyid == self.our_keyid + 1 {
            Some(DhKeyPair::generate(rand)?)
        } else {
            None
        };
        {
            let slot = self.slot(recipient_keyid, sender_keyid)?;
            slot.their_last_ctr = u64::from_be_bytes(*top_ctr);
            slot.used = true;
        }

        if sender_keyid == self.their_keyid {
            self.rotate_their_keys(next_dh.clone());
        }
        if let Some(fresh) = replacement {
            self.rotate_our_keys(fresh);
        }
        Ok(())
    }

    /// Drain the MAC keys queued for revelation.
    pub fn take_revealed_macs(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending_reveals)
    }

    /// The extra symmetric key for the current keyid pair.
    pub fn extra_symmetric_key(&self) -> Result<[u8; 32]> {
        let s = self.our_current.shared_secret(&self.their_current)?;
        Ok(sha256_prefixed(0xFF, &encode_mpi(&s)))
    }

    fn rotate_their_keys(&mut self, next_dh: BigUint) {
        if let Some(retired) = self.their_previous.take() {
            let retired_id = self.their_keyid - 1;
            self.retire_slots(|slot| slot.their_keyid == retired_id);
            drop(retired);
        }
        self.their_previous = Some(std::mem::replace(&mut self.their_current, next_dh));
        self.their_keyid += 1;
        tracing::debug!(their_keyid = self.their_keyid, "peer DH key rotated");
    }

    fn rotate_our_keys(&mut self, fresh: DhKeyPair) {
        let retired_id = self.our_keyid;
        let retired = std::mem::replace(
            &mut self.our_current,
            std::mem::replace(&mut self.our_next, fresh),
        );
        drop(retired);
        self.our_keyid += 1;
        self.retire_slots(|slot| slot.our_keyid == retired_id);
        tracing::debug!(our_keyid = self.our_keyid, "local DH key rotated");
    }

    /// Drop slots matching `retired`, revealing the MAC keys of those that
    /// verified at least one message.
    fn retire_slots(&mut self, retired: impl Fn(&KeySlot) -> bool) {
        let mut kept = Vec::with_capacity(self.slots.len());
        for slot in self.slots.drain(..) {
            if retired(&slot) {
                if slot.used {
                    self.pending_reveals.extend_from_slice(&slot.keys.recv_mac);
                }
            } else {
                kept.push(slot);
            }
        }
        self.slots = kept;
    }

    fn slot(&mut self, our_keyid: u32, their_keyid: u32) -> Result<&mut KeySlot> {
        let ours_valid = our_keyid == self.our_keyid || our_keyid == self.our_keyid + 1;
        let theirs_valid = their_keyid == self.their_keyid
            || (their_keyid + 1 == self.their_keyid && self.their_previous.is_some());
        if !ours_valid || !theirs_valid {
            return Err(ProtoError::InvalidMessage("keyid outside ratchet window"));
        }

        if let Some(idx) = self
            .slots
            .iter()
            .position(|s| s.our_keyid == our_keyid && s.their_keyid == their_keyid)
        {
            return Ok(&mut self.slots[idx]);
        }

        let our_pair = if our_keyid == self.our_keyid {
            &self.our_current
        } else {
            &self.our_next
        };
        let their_public = if their_keyid == self.their_keyid {
            &self.their_current
        } else {
            self.their_previous.as_ref().expect("validated above")
        };
        let keys = derive_session_keys(our_pair, their_public)?;
        self.slots.push(KeySlot {
            our_keyid,
            their_keyid,
            keys,
            their_last_ctr: 0,
            used: false,
        });
        Ok(self.slots.last_mut().expect("just pushed"))
    }
}

/// Derive the per-direction AES and MAC keys for one keyid pair.
///
/// The shared secret feeds SHA-1 under a direction byte: 0x01 for the
/// side with the smaller public value, 0x02 for the other. MAC keys are
/// the SHA-1 of the corresponding AES key.
fn derive_session_keys(our_pair: &DhKeyPair, their_public: &BigUint) -> Result<SessionKeys> {
    let s = our_pair.shared_secret(their_public)?;
    let secbytes = encode_mpi(&s);

    let (send_byte, recv_byte) = if our_pair.public() < their_public {
        (0x01, 0x02)
    } else {
        (0x02, 0x01)
    };

    let mut send_aes = [0u8; 16];
    send_aes.copy_from_slice(&sha1_prefixed(send_byte, &secbytes)[..16]);
    let mut recv_aes = [0u8; 16];
    recv_aes.copy_from_slice(&sha1_prefixed(recv_byte, &secbytes)[..16]);

    Ok(SessionKeys {
        send_aes,
        send_mac: sha1(&send_aes),
        recv_aes,
        recv_mac: sha1(&recv_aes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use offrec_crypto::SeededRandom;

    fn linked_managers() -> (KeyManager, KeyManager) {
        let mut rand = SeededRandom::new(11);
        let alice_key = DhKeyPair::generate(&mut rand).unwrap();
        let bob_key = DhKeyPair::generate(&mut rand).unwrap();
        let alice = KeyManager::new(
            &mut rand,
            alice_key.clone(),
            1,
            bob_key.public().clone(),
        )
        .unwrap();
        let bob = KeyManager::new(&mut rand, bob_key, 1, alice_key.public().clone()).unwrap();
        (alice, bob)
    }

    #[test]
    fn test_directional_keys_pair_up() {
        let (mut alice, mut bob) = linked_managers();
        let send = alice.prepare_send().unwrap();
        let recv = bob
            .receiving_keys(send.sender_keyid, send.recipient_keyid)
            .unwrap();
        assert_eq!(send.keys.send_aes, recv.recv_aes);
        assert_eq!(send.keys.send_mac, recv.recv_mac);
        assert_ne!(send.keys.send_aes, recv.send_aes);
    }

    #[test]
    fn test_send_counter_strictly_increases() {
        let (mut alice, _) = linked_managers();
        let mut last = 0u64;
        for _ in 0..5 {
            let send = alice.prepare_send().unwrap();
            let ctr = u64::from_be_bytes(send.top_ctr);
            assert!(ctr > last);
            last = ctr;
        }
    }

    #[test]
    fn test_counter_freshness() {
        let (mut alice, mut bob) = linked_managers();
        let mut rand = SeededRandom::new(12);
        let send = alice.prepare_send().unwrap();

        assert!(bob.counter_is_fresh(1, 1, &send.top_ctr));
        bob.commit_receive(&mut rand, 1, 1, &send.top_ctr, &send.next_dh)
            .unwrap();
        assert!(!bob.counter_is_fresh(1, 1, &send.top_ctr));
        assert!(bob.counter_is_fresh(1, 1, &2u64.to_be_bytes()));
    }

    #[test]
    fn test_their_rotation_on_newest_keyid() {
        let (mut alice, mut bob) = linked_managers();
        let mut rand = SeededRandom::new(13);
        let send = alice.prepare_send().unwrap();

        assert_eq!(bob.their_keyid(), 1);
        bob.commit_receive(&mut rand, 1, 1, &send.top_ctr, &send.next_dh)
            .unwrap();
        // Bob learned Alice's advertised next key.
        assert_eq!(bob.their_keyid(), 2);
        // Alice hasn't rotated her own side: message addressed keyid 1.
        assert_eq!(alice.our_keyid(), 1);
    }

    #[test]
    fn test_our_rotation_when_next_is_used() {
        let (mut alice, mut bob) = linked_managers();
        let mut rand = SeededRandom::new(14);

        // Alice -> Bob so that Bob addresses Alice's keyid 2 next.
        let a_send = alice.prepare_send().unwrap();
        bob.commit_receive(&mut rand, 1, 1, &a_send.top_ctr, &a_send.next_dh)
            .unwrap();

        let b_send = bob.prepare_send().unwrap();
        assert_eq!(b_send.recipient_keyid, 2);

        alice
            .receiving_keys(b_send.sender_keyid, b_send.recipient_keyid)
            .unwrap();
        alice
            .commit_receive(
                &mut rand,
                b_send.sender_keyid,
                b_send.recipient_keyid,
                &b_send.top_ctr,
                &b_send.next_dh,
            )
            .unwrap();
        assert_eq!(alice.our_keyid(), 2);
    }

    #[test]
    fn test_keyid_window_enforced() {
        let (mut alice, _) = linked_managers();
        assert!(alice.receiving_keys(5, 1).is_err());
        assert!(alice.receiving_keys(1, 5).is_err());
        // keyid 0 never exists
        assert!(alice.receiving_keys(0, 1).is_err());
    }

    #[test]
    fn test_mac_revelation_after_rotation() {
        let (mut alice, mut bob) = linked_managers();
        let mut rand = SeededRandom::new(15);

        // Two full rotations of Bob's view of Alice's keys.
        for _ in 0..3 {
            let send = alice.prepare_send().unwrap();
            let recip = send.recipient_keyid;
            bob.receiving_keys(send.sender_keyid, recip).unwrap();
            bob.commit_receive(&mut rand, send.sender_keyid, recip, &send.top_ctr, &send.next_dh)
                .unwrap();

            let reply = bob.prepare_send().unwrap();
            alice
                .receiving_keys(reply.sender_keyid, reply.recipient_keyid)
                .unwrap();
            alice
                .commit_receive(
                    &mut rand,
                    reply.sender_keyid,
                    reply.recipient_keyid,
                    &reply.top_ctr,
                    &reply.next_dh,
                )
                .unwrap();
        }

        // Some slot retired with use on each side by now.
        let revealed = bob.take_revealed_macs();
        assert!(!revealed.is_empty());
        assert_eq!(revealed.len() % 20, 0);
        // Draining clears the queue.
        assert!(bob.take_revealed_macs().is_empty());
    }

    #[test]
    fn test_rejects_non_group_next_dh() {
        let (mut alice, mut bob) = linked_managers();
        let mut rand = SeededRandom::new(16);
        let send = alice.prepare_send().unwrap();
        let result = bob.commit_receive(&mut rand, 1, 1, &send.top_ctr, &BigUint::from(1u32));
        assert!(result.is_err());
    }

    #[test]
    fn test_extra_symmetric_key_agrees() {
        let (alice, bob) = linked_managers();
        assert_eq!(
            alice.extra_symmetric_key().unwrap(),
            bob.extra_symmetric_key().unwrap()
        );
    }
}
