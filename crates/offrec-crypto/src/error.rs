//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    /// The injected random source returned fewer bytes than requested.
    #[error("random source returned fewer bytes than requested")]
    ShortRandomRead,

    /// A received value is not a valid element of the DH group.
    #[error("value outside the DH group")]
    InvalidGroupElement,

    /// A DSA key blob failed to parse.
    #[error("invalid DSA key: {0}")]
    InvalidKey(&'static str),

    /// A signature failed to verify or was structurally malformed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Wire-level decode failure while parsing key material.
    #[error(transparent)]
    Wire(#[from] offrec_wire::WireError),
}

/// Result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
