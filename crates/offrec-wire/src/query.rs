//! Query messages and whitespace tags: OTR offers inside plain text.
//!
//! A query message is the ASCII prefix `?OTR` followed by one of `?`,
//! `v<digits>?` or `?v<digits>?`; the digits enumerate offered versions.
//! The bare `?OTR?` form offers only the obsolete version 1 and therefore
//! never negotiates. A whitespace tag is an invisible run of spaces and
//! tabs embedded in otherwise plain text: a 16-byte base tag followed by
//! one 8-byte tag per offered version.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::envelope::Version;

/// The 16-byte base whitespace tag marking an OTR offer.
pub const WHITESPACE_TAG_BASE: &[u8] = b" \t  \t\t\t\t \t \t \t  ";

/// The 8-byte whitespace tag offering version 2.
pub const WHITESPACE_TAG_V2: &[u8] = b"  \t\t  \t ";

/// The 8-byte whitespace tag offering version 3.
pub const WHITESPACE_TAG_V3: &[u8] = b"  \t\t  \t\t";

/// Literal prefix of an OTR error message.
pub const ERROR_PREFIX: &[u8] = b"?OTR Error:";

static QUERY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\?OTR(?:\?v([0-9]*)\?|v([0-9]*)\?|\?)").expect("static regex"));

/// Which protocol versions the local side is willing to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionSet {
    /// Version 2 acceptable.
    pub v2: bool,
    /// Version 3 acceptable.
    pub v3: bool,
}

impl VersionSet {
    /// The best version in this set, preferring 3 over 2.
    pub fn best(self) -> Option<Version> {
        if self.v3 {
            Some(Version::V3)
        } else if self.v2 {
            Some(Version::V2)
        } else {
            None
        }
    }
}

/// Detect a query message at the start of `message`.
///
/// Returns the set of versions the sender offered, or `None` when the text
/// is not a query. The offered set may be empty (`?OTR?`, `?OTRv?`).
pub fn parse_query(message: &[u8]) -> Option<VersionSet> {
    let caps = QUERY_RE.captures(message)?;
    let digits = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_bytes())
        .unwrap_or(b"");
    Some(VersionSet {
        v2: digits.contains(&b'2'),
        v3: digits.contains(&b'3'),
    })
}

/// The highest version offered by `message` that `allowed` also accepts.
pub fn negotiate_query(message: &[u8], allowed: VersionSet) -> Option<Version> {
    let offered = parse_query(message)?;
    VersionSet {
        v2: offered.v2 && allowed.v2,
        v3: offered.v3 && allowed.v3,
    }
    .best()
}

/// Build the query message advertising `versions`.
///
/// Digits appear in ascending order, e.g. `?OTRv23?` for both versions.
pub fn query_message(versions: VersionSet) -> Vec<u8> {
    let mut out = b"?OTRv".to_vec();
    if versions.v2 {
        out.push(b'2');
    }
    if versions.v3 {
        out.push(b'3');
    }
    out.push(b'?');
    out
}

/// Build the whitespace tag advertising `versions`.
pub fn whitespace_tag(versions: VersionSet) -> Vec<u8> {
    let mut tag = WHITESPACE_TAG_BASE.to_vec();
    if versions.v2 {
        tag.extend_from_slice(WHITESPACE_TAG_V2);
    }
    if versions.v3 {
        tag.extend_from_slice(WHITESPACE_TAG_V3);
    }
    tag
}

/// Find and strip a whitespace tag embedded in `message`.
///
/// Returns the message with the base tag and any trailing version tags
/// removed, plus the set of versions the tag offered.
pub fn strip_whitespace_tag(message: &[u8]) -> Option<(Vec<u8>, VersionSet)> {
    let start = message
        .windows(WHITESPACE_TAG_BASE.len())
        .position(|w| w == WHITESPACE_TAG_BASE)?;
    let mut end = start + WHITESPACE_TAG_BASE.len();
    let mut offered = VersionSet {
        v2: false,
        v3: false,
    };
    loop {
        let rest = &message[end..];
        if rest.starts_with(WHITESPACE_TAG_V3) {
            offered.v3 = true;
            end += WHITESPACE_TAG_V3.len();
        } else if rest.starts_with(WHITESPACE_TAG_V2) {
            offered.v2 = true;
            end += WHITESPACE_TAG_V2.len();
        } else {
            break;
        }
    }
    let mut stripped = Vec::with_capacity(message.len() - (end - start));
    stripped.extend_from_slice(&message[..start]);
    stripped.extend_from_slice(&message[end..]);
    Some((stripped, offered))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOTH: VersionSet = VersionSet { v2: true, v3: true };
    const ONLY_V2: VersionSet = VersionSet { v2: true, v3: false };
    const ONLY_V3: VersionSet = VersionSet { v2: false, v3: true };

    #[test]
    fn test_query_table() {
        // (message, best version under an allow-v2-only policy as 2/0)
        let cases: &[(&[u8], Option<Version>)] = &[
            (b"foo", None),
            (b"?OtR", None),
            (b"?OtR?", None),
            (b"?OTR?", None),
            (b"?OTRv?", None),
            (b"?OTRv1?", None),
            (b"?OTR?v1?", None),
            (b"?OTR?v?", None),
            (b"?OTR?v2?", Some(Version::V2)),
            (b"?OTRv2?", Some(Version::V2)),
            (b"?OTRv23?", Some(Version::V2)),
            (b"?OTRv23 ?", None),
        ];
        for (msg, expected) in cases {
            assert_eq!(
                negotiate_query(msg, ONLY_V2),
                *expected,
                "message {:?}",
                String::from_utf8_lossy(msg)
            );
        }
    }

    #[test]
    fn test_query_prefers_v3() {
        assert_eq!(negotiate_query(b"?OTRv23?", BOTH), Some(Version::V3));
        assert_eq!(negotiate_query(b"?OTRv23?", ONLY_V3), Some(Version::V3));
        assert_eq!(negotiate_query(b"?OTRv2?", ONLY_V3), None);
    }

    #[test]
    fn test_query_message_forms() {
        assert_eq!(query_message(BOTH), b"?OTRv23?");
        assert_eq!(query_message(ONLY_V2), b"?OTRv2?");
        assert_eq!(query_message(ONLY_V3), b"?OTRv3?");
    }

    #[test]
    fn test_query_message_negotiates_with_itself() {
        assert_eq!(negotiate_query(&query_message(BOTH), BOTH), Some(Version::V3));
    }

    #[test]
    fn test_whitespace_tag_roundtrip() {
        let mut text = b"Hello".to_vec();
        text.extend_from_slice(&whitespace_tag(BOTH));
        text.extend_from_slice(b" world");

        let (stripped, offered) = strip_whitespace_tag(&text).unwrap();
        assert_eq!(stripped, b"Hello world");
        assert!(offered.v2);
        assert!(offered.v3);
    }

    #[test]
    fn test_whitespace_base_tag_alone() {
        let mut text = b"Hello".to_vec();
        text.extend_from_slice(WHITESPACE_TAG_BASE);
        text.extend_from_slice(b" world");

        let (stripped, offered) = strip_whitespace_tag(&text).unwrap();
        assert_eq!(stripped, b"Hello world");
        assert!(!offered.v2);
        assert!(!offered.v3);
    }

    #[test]
    fn test_untagged_text_passes_through() {
        assert!(strip_whitespace_tag(b"just some plain text").is_none());
    }
}
