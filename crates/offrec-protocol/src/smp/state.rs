//! The SMP state machine.
//!
//! Exactly one message is legal in each state; anything else aborts to
//! the peer and resets to EXPECT1. Receiving the first message parks the
//! machine waiting for the local secret, which the host supplies through
//! the conversation.

use num_bigint_dig::BigUint;
use num_traits::One;

use offrec_crypto::{group, RandomSource};

use crate::error::{ProtoError, Result};
use crate::tlv::{Tlv, TLV_SMP1, TLV_SMP1_WITH_QUESTION, TLV_SMP2, TLV_SMP3, TLV_SMP4, TLV_SMP_ABORT};

use super::messages::{Smp1, Smp2, Smp3, Smp4};
use super::proofs;

/// What processing one SMP TLV produced.
#[derive(Debug)]
pub enum SmpOutcome {
    /// Nothing to do (abort received while already idle).
    None,
    /// Send this TLV back in the next data message.
    Reply(Tlv),
    /// The peer started SMP; the host must supply the secret.
    SecretNeeded {
        /// The peer's question, when it sent one.
        question: Option<Vec<u8>>,
    },
    /// The protocol ran to completion on this side.
    Completed {
        /// Whether the secrets matched.
        success: bool,
        /// The final message to send, when we are the concluding side.
        reply: Option<Tlv>,
    },
    /// The exchange was aborted; reply with the TLV when present.
    Aborted {
        /// Abort TLV to send to the peer, absent when the peer aborted.
        reply: Option<Tlv>,
    },
}

#[derive(Debug, Default)]
enum SmpState {
    #[default]
    Expect1,
    WaitingForSecret {
        msg: Smp1,
    },
    Expect2 {
        x: BigUint,
        a2: BigUint,
        a3: BigUint,
    },
    Expect3 {
        g3a: BigUint,
        g2: BigUint,
        g3: BigUint,
        b3: BigUint,
        pb: BigUint,
        qb: BigUint,
    },
    Expect4 {
        g3b: BigUint,
        pa_pb: BigUint,
        qa_qb: BigUint,
        a3: BigUint,
    },
}

/// The SMP substate of one conversation.
#[derive(Debug, Default)]
pub struct Smp {
    state: SmpState,
}

impl Smp {
    /// Whether an exchange is somewhere mid-flight.
    pub fn in_progress(&self) -> bool {
        !matches!(self.state, SmpState::Expect1)
    }

    /// Whether the machine is parked waiting for the local secret.
    pub fn waiting_for_secret(&self) -> bool {
        matches!(self.state, SmpState::WaitingForSecret { .. })
    }

    /// The peer's question, when one is pending.
    pub fn question(&self) -> Option<&[u8]> {
        match &self.state {
            SmpState::WaitingForSecret { msg } => msg.question.as_deref(),
            _ => None,
        }
    }

    /// Reset and produce the abort TLV to send.
    pub fn abort(&mut self) -> Tlv {
        self.state = SmpState::Expect1;
        Tlv::new(TLV_SMP_ABORT, Vec::new())
    }

    /// Start an exchange as initiator with the derived secret `x`.
    ///
    /// Returns the TLVs to send: an abort first when a previous exchange
    /// was still in flight, then the first SMP message.
    pub fn start(
        &mut self,
        rand: &mut dyn RandomSource,
        x: BigUint,
        question: Option<Vec<u8>>,
    ) -> Result<Vec<Tlv>> {
        let mut tlvs = Vec::with_capacity(2);
        if self.in_progress() {
            tlvs.push(self.abort());
        }

        let a2 = proofs::random_exponent(rand)?;
        let a3 = proofs::random_exponent(rand)?;
        let (c2, d2) = proofs::prove_log(rand, 1, &a2)?;
        let (c3, d3) = proofs::prove_log(rand, 2, &a3)?;
        let msg = Smp1 {
            g2a: group::generator_exp(&a2),
            c2,
            d2,
            g3a: group::generator_exp(&a3),
            c3,
            d3,
            question,
        };
        tlvs.push(msg.to_tlv());
        self.state = SmpState::Expect2 { x, a2, a3 };
        Ok(tlvs)
    }

    /// Supply the secret for a pending peer-initiated exchange.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::SmpUnexpectedMessage`] when nothing is
    /// pending.
    pub fn provide_secret(&mut self, rand: &mut dyn RandomSource, x: BigUint) -> Result<Tlv> {
        let SmpState::WaitingForSecret { msg } = std::mem::take(&mut self.state) else {
            return Err(ProtoError::SmpUnexpectedMessage);
        };
        match self.respond_to_smp1(rand, x, &msg) {
            Ok(tlv) => Ok(tlv),
            Err(e) => {
                self.state = SmpState::Expect1;
                Err(e)
            }
        }
    }

    /// Process one inbound SMP TLV.
    pub fn receive(&mut self, rand: &mut dyn RandomSource, tlv: &Tlv) -> Result<SmpOutcome> {
        if tlv.typ == TLV_SMP_ABORT {
            let was_active = self.in_progress();
            self.state = SmpState::Expect1;
            return Ok(if was_active {
                SmpOutcome::Aborted { reply: None }
            } else {
                SmpOutcome::None
            });
        }

        let state = std::mem::take(&mut self.state);
        match (state, tlv.typ) {
            (SmpState::Expect1, TLV_SMP1 | TLV_SMP1_WITH_QUESTION) => {
                let msg = match Smp1::from_tlv(tlv) {
                    Ok(msg) => msg,
                    Err(_) => return Ok(self.abort_outcome("malformed SMP1")),
                };
                if !self.verify_smp1(&msg) {
                    return Ok(self.abort_outcome("SMP1 proofs rejected"));
                }
                let question = msg.question.clone();
                self.state = SmpState::WaitingForSecret { msg };
                Ok(SmpOutcome::SecretNeeded { question })
            }
            (SmpState::Expect2 { x, a2, a3 }, TLV_SMP2) => {
                let msg = match Smp2::from_tlv(tlv) {
                    Ok(msg) => msg,
                    Err(_) => return Ok(self.abort_outcome("malformed SMP2")),
                };
                match self.process_smp2(rand, &x, &a2, &a3, &msg) {
                    Ok(reply) => Ok(SmpOutcome::Reply(reply)),
                    Err(_) => Ok(self.abort_outcome("SMP2 rejected")),
                }
            }
            (
                SmpState::Expect3 {
                    g3a,
                    g2,
                    g3,
                    b3,
                    pb,
                    qb,
                },
                TLV_SMP3,
            ) => {
                let msg = match Smp3::from_tlv(tlv) {
                    Ok(msg) => msg,
                    Err(_) => return Ok(self.abort_outcome("malformed SMP3")),
                };
                match self.process_smp3(rand, &g3a, &g2, &g3, &b3, &pb, &qb, &msg) {
                    Ok((success, reply)) => Ok(SmpOutcome::Completed {
                        success,
                        reply: Some(reply),
                    }),
                    Err(_) => Ok(self.abort_outcome("SMP3 rejected")),
                }
            }
            (
                SmpState::Expect4 {
                    g3b,
                    pa_pb,
                    qa_qb,
                    a3,
                },
                TLV_SMP4,
            ) => {
                let msg = match Smp4::from_tlv(tlv) {
                    Ok(msg) => msg,
                    Err(_) => return Ok(self.abort_outcome("malformed SMP4")),
                };
                match self.process_smp4(&g3b, &pa_pb, &qa_qb, &a3, &msg) {
                    Ok(success) => Ok(SmpOutcome::Completed {
                        success,
                        reply: None,
                    }),
                    Err(_) => Ok(self.abort_outcome("SMP4 rejected")),
                }
            }
            (_, _) => Ok(self.abort_outcome("SMP message out of sequence")),
        }
    }

    fn abort_outcome(&mut self, reason: &'static str) -> SmpOutcome {
        tracing::warn!(reason, "aborting SMP exchange");
        SmpOutcome::Aborted {
            reply: Some(self.abort()),
        }
    }

    fn verify_smp1(&self, msg: &Smp1) -> bool {
        group::is_group_element(&msg.g2a)
            && group::is_group_element(&msg.g3a)
            && proofs::verify_log(1, &msg.g2a, &msg.c2, &msg.d2)
            && proofs::verify_log(2, &msg.g3a, &msg.c3, &msg.d3)
    }

    /// Build the second message from a verified first message.
    fn respond_to_smp1(
        &mut self,
        rand: &mut dyn RandomSource,
        x: BigUint,
        msg: &Smp1,
    ) -> Result<Tlv> {
        let b2 = proofs::random_exponent(rand)?;
        let b3 = proofs::random_exponent(rand)?;
        let (c2, d2) = proofs::prove_log(rand, 3, &b2)?;
        let (c3, d3) = proofs::prove_log(rand, 4, &b3)?;

        let g2 = group::mod_exp(&msg.g2a, &b2);
        let g3 = group::mod_exp(&msg.g3a, &b3);

        let r4 = proofs::random_exponent(rand)?;
        let pb = group::mod_exp(&g3, &r4);
        let qb = group::mul_mod_p(&group::generator_exp(&r4), &group::mod_exp(&g2, &x));
        let (cp, d5, d6) = proofs::prove_coords(rand, 5, &g2, &g3, &r4, &x)?;

        let reply = Smp2 {
            g2b: group::generator_exp(&b2),
            c2,
            d2,
            g3b: group::generator_exp(&b3),
            c3,
            d3,
            pb: pb.clone(),
            qb: qb.clone(),
            cp,
            d5,
            d6,
        };
        let tlv = reply.to_tlv();
        self.state = SmpState::Expect3 {
            g3a: msg.g3a.clone(),
            g2,
            g3,
            b3,
            pb,
            qb,
        };
        Ok(tlv)
    }

    /// Initiator side: verify the second message, emit the third.
    #[allow(clippy::too_many_arguments)]
    fn process_smp2(
        &mut self,
        rand: &mut dyn RandomSource,
        x: &BigUint,
        a2: &BigUint,
        a3: &BigUint,
        msg: &Smp2,
    ) -> Result<Tlv> {
        for element in [&msg.g2b, &msg.g3b, &msg.pb, &msg.qb] {
            if !group::is_group_element(element) {
                return Err(ProtoError::SmpProofFailure);
            }
        }
        if !proofs::verify_log(3, &msg.g2b, &msg.c2, &msg.d2)
            || !proofs::verify_log(4, &msg.g3b, &msg.c3, &msg.d3)
        {
            return Err(ProtoError::SmpProofFailure);
        }

        let g2 = group::mod_exp(&msg.g2b, a2);
        let g3 = group::mod_exp(&msg.g3b, a3);
        if !proofs::verify_coords(5, &g2, &g3, &msg.pb, &msg.qb, &msg.cp, &msg.d5, &msg.d6) {
            return Err(ProtoError::SmpProofFailure);
        }

        let r4 = proofs::random_exponent(rand)?;
        let pa = group::mod_exp(&g3, &r4);
        let qa = group::mul_mod_p(&group::generator_exp(&r4), &group::mod_exp(&g2, x));
        let (cp, d5, d6) = proofs::prove_coords(rand, 6, &g2, &g3, &r4, x)?;

        let qa_qb = group::div_mod_p(&qa, &msg.qb);
        let pa_pb = group::div_mod_p(&pa, &msg.pb);
        let ra = group::mod_exp(&qa_qb, a3);
        let (cr, d7) = proofs::prove_log_eq(rand, 7, a3, &qa_qb)?;

        let reply = Smp3 {
            pa,
            qa,
            cp,
            d5,
            d6,
            ra,
            cr,
            d7,
        };
        let tlv = reply.to_tlv();
        self.state = SmpState::Expect4 {
            g3b: msg.g3b.clone(),
            pa_pb,
            qa_qb,
            a3: a3.clone(),
        };
        Ok(tlv)
    }

    /// Responder side: verify the third message, emit the fourth, decide.
    #[allow(clippy::too_many_arguments)]
    fn process_smp3(
        &mut self,
        rand: &mut dyn RandomSource,
        g3a: &BigUint,
        g2: &BigUint,
        g3: &BigUint,
        b3: &BigUint,
        pb: &BigUint,
        qb: &BigUint,
        msg: &Smp3,
    ) -> Result<(bool, Tlv)> {
        for element in [&msg.pa, &msg.qa, &msg.ra] {
            if !group::is_group_element(element) {
                return Err(ProtoError::SmpProofFailure);
            }
        }
        if !proofs::verify_coords(6, g2, g3, &msg.pa, &msg.qa, &msg.cp, &msg.d5, &msg.d6) {
            return Err(ProtoError::SmpProofFailure);
        }

        let qa_qb = group::div_mod_p(&msg.qa, qb);
        let pa_pb = group::div_mod_p(&msg.pa, pb);
        if qa_qb.is_one() || pa_pb.is_one() {
            return Err(ProtoError::SmpProofFailure);
        }
        if !proofs::verify_log_eq(7, g3a, &msg.ra, &qa_qb, &msg.cr, &msg.d7) {
            return Err(ProtoError::SmpProofFailure);
        }

        let rb = group::mod_exp(&qa_qb, b3);
        let (cr, d7) = proofs::prove_log_eq(rand, 8, b3, &qa_qb)?;
        let reply = Smp4 { rb, cr, d7 };

        let rab = group::mod_exp(&msg.ra, b3);
        let success = rab == pa_pb;

        self.state = SmpState::Expect1;
        Ok((success, reply.to_tlv()))
    }

    /// Initiator side: verify the fourth message and decide.
    fn process_smp4(
        &mut self,
        g3b: &BigUint,
        pa_pb: &BigUint,
        qa_qb: &BigUint,
        a3: &BigUint,
        msg: &Smp4,
    ) -> Result<bool> {
        if !group::is_group_element(&msg.rb) {
            return Err(ProtoError::SmpProofFailure);
        }
        if !proofs::verify_log_eq(8, g3b, &msg.rb, qa_qb, &msg.cr, &msg.d7) {
            return Err(ProtoError::SmpProofFailure);
        }

        let rab = group::mod_exp(&msg.rb, a3);
        self.state = SmpState::Expect1;
        Ok(rab == *pa_pb)
    }
}
