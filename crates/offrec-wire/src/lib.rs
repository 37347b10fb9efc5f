//! # offrec-wire
//!
//! Byte-level wire codec for the OTR messaging protocol (versions 2 and 3).
//!
//! This crate provides:
//!
//! - **Primitive codecs**: big-endian fixed integers, MPIs, DATA blocks and
//!   8-byte counters ([`Encoder`]/[`Decoder`])
//! - **Message envelopes**: version/type headers with v3 instance tags,
//!   plus the `?OTR:` base64 armor ([`envelope`])
//! - **Query and whitespace tags**: offer detection and version
//!   negotiation ([`query`])
//! - **Fragmentation**: bounded fragment emission and strictly in-order
//!   reassembly ([`fragment`])
//!
//! Everything here is pure byte plumbing; no cryptography and no I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod envelope;
pub mod error;
pub mod fragment;
pub mod limits;
pub mod query;

#[cfg(test)]
mod proptests;

pub use codec::{Decoder, Encoder};
pub use envelope::{MessageHeader, MessageType, Version};
pub use error::{Result, WireError};
pub use fragment::{Assembler, Fragment};
