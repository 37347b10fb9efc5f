//! Wire forms of the four SMP messages.
//!
//! Each TLV value is a 4-byte MPI count followed by that many MPIs. The
//! question-bearing variant of the first message prefixes a
//! NUL-terminated question before the MPI block.

use num_bigint_dig::BigUint;

use offrec_wire::{Decoder, Encoder};

use crate::error::{ProtoError, Result};
use crate::tlv::{Tlv, TLV_SMP1, TLV_SMP1_WITH_QUESTION, TLV_SMP2, TLV_SMP3, TLV_SMP4};

/// First SMP message: the initiator's exponent commitments.
#[derive(Debug, Clone)]
pub(super) struct Smp1 {
    pub g2a: BigUint,
    pub c2: BigUint,
    pub d2: BigUint,
    pub g3a: BigUint,
    pub c3: BigUint,
    pub d3: BigUint,
    pub question: Option<Vec<u8>>,
}

/// Second SMP message: the responder's commitments plus its (P, Q) pair.
#[derive(Debug, Clone)]
pub(super) struct Smp2 {
    pub g2b: BigUint,
    pub c2: BigUint,
    pub d2: BigUint,
    pub g3b: BigUint,
    pub c3: BigUint,
    pub d3: BigUint,
    pub pb: BigUint,
    pub qb: BigUint,
    pub cp: BigUint,
    pub d5: BigUint,
    pub d6: BigUint,
}

/// Third SMP message: the initiator's (P, Q) pair and its ratio share.
#[derive(Debug, Clone)]
pub(super) struct Smp3 {
    pub pa: BigUint,
    pub qa: BigUint,
    pub cp: BigUint,
    pub d5: BigUint,
    pub d6: BigUint,
    pub ra: BigUint,
    pub cr: BigUint,
    pub d7: BigUint,
}

/// Fourth SMP message: the responder's ratio share.
#[derive(Debug, Clone)]
pub(super) struct Smp4 {
    pub rb: BigUint,
    pub cr: BigUint,
    pub d7: BigUint,
}

fn encode_mpi_block(mpis: &[&BigUint]) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.write_u32(mpis.len() as u32);
    for mpi in mpis {
        enc.write_mpi(mpi);
    }
    enc.into_bytes()
}

fn decode_mpi_block(bytes: &[u8], expected: usize) -> Result<Vec<BigUint>> {
    let mut dec = Decoder::new(bytes);
    let count = dec.read_u32()? as usize;
    if count != expected {
        return Err(ProtoError::InvalidMessage("wrong SMP MPI count"));
    }
    let mut mpis = Vec::with_capacity(count);
    for _ in 0..count {
        mpis.push(dec.read_mpi()?);
    }
    if !dec.is_empty() {
        return Err(ProtoError::InvalidMessage("trailing bytes in SMP TLV"));
    }
    Ok(mpis)
}

impl Smp1 {
    pub fn to_tlv(&self) -> Tlv {
        let block = encode_mpi_block(&[
            &self.g2a, &self.c2, &self.d2, &self.g3a, &self.c3, &self.d3,
        ]);
        match &self.question {
            Some(question) => {
                let mut value = question.clone();
                value.push(0x00);
                value.extend_from_slice(&block);
                Tlv::new(TLV_SMP1_WITH_QUESTION, value)
            }
            None => Tlv::new(TLV_SMP1, block),
        }
    }

    pub fn from_tlv(tlv: &Tlv) -> Result<Self> {
        let (question, block) = match tlv.typ {
            TLV_SMP1 => (None, tlv.value.as_slice()),
            TLV_SMP1_WITH_QUESTION => {
                let nul = tlv
                    .value
                    .iter()
                    .position(|&b| b == 0x00)
                    .ok_or(ProtoError::InvalidMessage("unterminated SMP question"))?;
                (Some(tlv.value[..nul].to_vec()), &tlv.value[nul + 1..])
            }
            _ => return Err(ProtoError::SmpUnexpectedMessage),
        };
        let mut mpis = decode_mpi_block(block, 6)?.into_iter();
        Ok(Self {
            g2a: mpis.next().expect("count checked"),
            c2: mpis.next().expect("count checked"),
            d2: mpis.next().expect("count checked"),
            g3a: mpis.next().expect("count checked"),
            c3: mpis.next().expect("count checked"),
            d3: mpis.next().expect("count checked"),
            question,
        })
    }
}

impl Smp2 {
    pub fn to_tlv(&self) -> Tlv {
        Tlv::new(
            TLV_SMP2,
            encode_mpi_block(&[
                &self.g2b, &self.c2, &self.d2, &self.g3b, &self.c3, &self.d3, &self.pb,
                &self.qb, &self.cp, &self.d5, &self.d6,
            ]),
        )
    }

    pub fn from_tlv(tlv: &Tlv) -> Result<Self> {
        let mut mpis = decode_mpi_block(&tlv.value, 11)?.into_iter();
        Ok(Self {
            g2b: mpis.next().expect("count checked"),
            c2: mpis.next().expect("count checked"),
            d2: mpis.next().expect("count checked"),
            g3b: mpis.next().expect("count checked"),
            c3: mpis.next().expect("count checked"),
            d3: mpis.next().expect("count checked"),
            pb: mpis.next().expect("count checked"),
            qb: mpis.next().expect("count checked"),
            cp: mpis.next().expect("count checked"),
            d5: mpis.next().expect("count checked"),
            d6: mpis.next().expect("count checked"),
        })
    }
}

impl Smp3 {
    pub fn to_tlv(&self) -> Tlv {
        Tlv::new(
            TLV_SMP3,
            encode_mpi_block(&[
                &self.pa, &self.qa, &self.cp, &self.d5, &self.d6, &self.ra, &self.cr,
                &self.d7,
            ]),
        )
    }

    pub fn from_tlv(tlv: &Tlv) -> Result<Self> {
        let mut mpis = decode_mpi_block(&tlv.value, 8)?.into_iter();
        Ok(Self {
            pa: mpis.next().expect("count checked"),
            qa: mpis.next().expect("count checked"),
            cp: mpis.next().expect("count checked"),
            d5: mpis.next().expect("count checked"),
            d6: mpis.next().expect("count checked"),
            ra: mpis.next().expect("count checked"),
            cr: mpis.next().expect("count checked"),
            d7: mpis.next().expect("count checked"),
        })
    }
}

impl Smp4 {
    pub fn to_tlv(&self) -> Tlv {
        Tlv::new(
            TLV_SMP4,
            encode_mpi_block(&[&self.rb, &self.cr, &self.d7]),
        )
    }

    pub fn from_tlv(tlv: &Tlv) -> Result<Self> {
        let mut mpis = decode_mpi_block(&tlv.value, 3)?.into_iter();
        Ok(Self {
            rb: mpis.next().expect("count checked"),
            cr: mpis.next().expect("count checked"),
            d7: mpis.next().expect("count checked"),
        })
    }
}
