//! The policy set controlling what a conversation will negotiate and offer.

use offrec_wire::query::VersionSet;

/// Host-configured protocol policies.
///
/// The default allows both protocol versions and nothing else: no
/// unsolicited offers, no encryption requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policies {
    /// Accept and offer OTR version 2.
    pub allow_v2: bool,
    /// Accept and offer OTR version 3.
    pub allow_v3: bool,
    /// Treat unencrypted traffic as an error condition worth flagging.
    pub require_encryption: bool,
    /// Embed a whitespace tag in outbound plaintext to advertise OTR.
    pub send_whitespace_tag: bool,
    /// Start an AKE when a peer's whitespace tag is seen.
    pub whitespace_start_ake: bool,
    /// Reply to OTR error messages with a fresh query.
    pub error_start_ake: bool,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            allow_v2: true,
            allow_v3: true,
            require_encryption: false,
            send_whitespace_tag: false,
            whitespace_start_ake: false,
            error_start_ake: false,
        }
    }
}

impl Policies {
    /// The protocol versions this policy admits.
    pub fn versions(&self) -> VersionSet {
        VersionSet {
            v2: self.allow_v2,
            v3: self.allow_v3,
        }
    }
}
