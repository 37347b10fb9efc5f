//! Notifications surfaced to the host alongside call results.

/// A change in the security posture of the conversation.
///
/// At most one change is reported per call; `NewKeys` is raised exactly
/// once per completed handshake, by the call that completed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityChange {
    /// Nothing changed.
    #[default]
    NoChange,
    /// A handshake completed and fresh session keys are in place.
    NewKeys,
    /// The peer asked for SMP and a secret must be supplied via
    /// [`crate::Conversation::provide_authentication_secret`].
    SmpSecretNeeded,
    /// SMP finished and the peer knows the shared secret.
    SmpComplete,
    /// SMP finished and the peer does not know the shared secret.
    SmpFailed,
    /// The conversation ended (disconnect TLV or local end).
    ConversationEnded,
}

/// An out-of-band event about a processed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    /// A data message failed authentication or decryption and was dropped.
    ReceivedMessageUnreadable,
    /// Plain text arrived while the conversation was encrypted, finished,
    /// or encryption is required by policy. The text is still delivered.
    ReceivedMessageUnencrypted,
    /// A v3 message addressed to a different instance tag was dropped.
    ReceivedMessageForOtherInstance,
    /// The peer sent an OTR error message; the payload is its text.
    ReceivedErrorMessage(Vec<u8>),
    /// The peer used the extra symmetric key; carries the derived key and
    /// the use data from the TLV.
    ExtraSymmetricKeyReceived {
        /// The 256-bit extra symmetric key for this session.
        key: [u8; 32],
        /// Opaque use descriptor supplied by the peer.
        use_data: Vec<u8>,
    },
}
