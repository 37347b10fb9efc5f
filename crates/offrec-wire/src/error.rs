//! Error types for wire encoding and decoding.

use thiserror::Error;

/// Errors that can occur while encoding or decoding OTR wire data.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    /// Structural parse failure: truncated, overlong or malformed bytes.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    /// The envelope carried a protocol version we do not speak.
    #[error("wrong protocol version: 0x{0:04x}")]
    WrongProtocolVersion(u16),

    /// A structurally valid envelope with an unrecognized type byte.
    #[error("unknown message type 0x{0:02x}")]
    UnknownMessageType(u8),

    /// A message too large to be carried by the fragment counters.
    #[error("message needs more than {max} fragments")]
    TooManyFragments {
        /// Highest fragment count the wire format can express.
        max: u16,
    },
}

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;
