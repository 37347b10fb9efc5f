//! Error types for the protocol engine.

use offrec_crypto::CryptoError;
use offrec_wire::WireError;
use thiserror::Error;

/// Errors that can occur while driving a conversation.
///
/// Cryptographic-integrity failures (bad MACs, replays) are deliberately
/// absent: those drop silently and surface only as message events.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtoError {
    /// Structural parse failure in an inbound message.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    /// The envelope version is not admitted by policy or conversation state.
    #[error("wrong protocol version")]
    WrongProtocolVersion,

    /// A structurally valid envelope with an unrecognized type byte.
    #[error("unknown message type 0x{0:02x}")]
    UnknownMessageType(u8),

    /// The random source returned fewer bytes than requested.
    #[error("random source returned fewer bytes than requested")]
    ShortRandomRead,

    /// Decryption succeeded structurally but the body is ill-formed.
    #[error("corrupt encrypted message")]
    CorruptEncryptedMessage,

    /// SMP was attempted while the conversation is not encrypted.
    #[error("cannot authenticate without an encrypted channel")]
    CantAuthenticateWithoutEncryption,

    /// A zero-knowledge proof failed to verify.
    #[error("SMP proof rejected")]
    SmpProofFailure,

    /// An SMP message arrived that is not legal in the current SMP state.
    #[error("unexpected SMP message")]
    SmpUnexpectedMessage,

    /// The conversation has been finished and cannot carry messages.
    #[error("conversation is finished")]
    ConversationFinished,

    /// Other wire-level failure.
    #[error(transparent)]
    Wire(WireError),

    /// Other crypto-level failure.
    #[error(transparent)]
    Crypto(CryptoError),
}

impl From<WireError> for ProtoError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::WrongProtocolVersion(_) => ProtoError::WrongProtocolVersion,
            WireError::UnknownMessageType(t) => ProtoError::UnknownMessageType(t),
            other => ProtoError::Wire(other),
        }
    }
}

impl From<CryptoError> for ProtoError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::ShortRandomRead => ProtoError::ShortRandomRead,
            CryptoError::Wire(w) => ProtoError::from(w),
            other => ProtoError::Crypto(other),
        }
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
