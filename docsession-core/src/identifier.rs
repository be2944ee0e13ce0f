//! Session identifier generation and validation.

use crate::error::{SessionError, SessionResult};
use std::fmt;
use std::str::FromStr;

/// Number of random bytes behind every identifier (128 bits).
const ID_BYTES: usize = 16;

/// Length of the hex-encoded identifier.
pub const SESSION_ID_LEN: usize = ID_BYTES * 2;

/// Opaque session identifier.
///
/// Always 32 lowercase hexadecimal characters. Values can only be obtained
/// through [`SessionId::generate`] or a successful [`SessionId::parse`], so any
/// `SessionId` in hand is known to be well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use docsession_core::SessionId;
    ///
    /// let id = SessionId::generate();
    /// assert_eq!(id.as_str().len(), 32);
    /// ```
    pub fn generate() -> Self {
        let bytes: [u8; ID_BYTES] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Parse an identifier received from a client.
    pub fn parse(value: &str) -> SessionResult<Self> {
        if is_valid_session_id(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(SessionError::InvalidIdentifier(truncate(value)))
        }
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log output.
    pub(crate) fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check whether a string has the session identifier format.
pub fn is_valid_session_id(value: &str) -> bool {
    value.len() == SESSION_ID_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn truncate(value: &str) -> String {
    value.chars().take(SESSION_ID_LEN + 8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_format() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), SESSION_ID_LEN);
        assert!(is_valid_session_id(id.as_str()));
    }

    #[test]
    fn test_generate_unique() {
        let ids: HashSet<SessionId> = (0..1000).map(|_| SessionId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("invalid").is_err());
        assert!(SessionId::parse("0123456789ABCDEF0123456789abcdef").is_err());
        assert!(SessionId::parse("0123456789abcdef0123456789abcdeg").is_err());
        assert!(SessionId::parse("0123456789abcdef0123456789abcdef0").is_err());
    }

    #[test]
    fn test_parse_accepts_generated() {
        let id = SessionId::generate();
        let parsed: SessionId = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.to_string(), id.as_str());
    }

    #[test]
    fn test_invalid_identifier_is_truncated() {
        let long = "x".repeat(4096);
        match SessionId::parse(&long) {
            Err(SessionError::InvalidIdentifier(value)) => assert_eq!(value.len(), 40),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
