//! # offrec-protocol
//!
//! The OTR protocol engine: everything between raw transport bytes and
//! decrypted application text.
//!
//! This crate provides:
//!
//! - **[`Conversation`]**: the single entry point hosts drive — feed
//!   inbound bytes in, drain outbound fragments and decrypted text out
//! - **AKE**: the four-message authenticated key exchange ([`ake`])
//! - **Key management**: the DH ratchet with per-direction session keys,
//!   counter discipline and MAC-key revelation ([`keys`])
//! - **Data messages**: encrypt/MAC/serialize and the reverse ([`data`])
//! - **SMP**: the Socialist Millionaires' zero-knowledge secret-equality
//!   test ([`smp`])
//!
//! A [`Conversation`] is a sequential state machine: each call commits
//! fully before the next is accepted, and nothing here blocks on I/O or
//! shares mutable state between conversations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ake;
pub mod conversation;
pub mod data;
pub mod error;
pub mod events;
pub mod keys;
pub mod policy;
pub mod smp;
pub mod tlv;

#[cfg(test)]
mod proptests;

pub use conversation::{Conversation, MsgState, Received, Sent};
pub use error::{ProtoError, Result};
pub use events::{MessageEvent, SecurityChange};
pub use policy::Policies;
