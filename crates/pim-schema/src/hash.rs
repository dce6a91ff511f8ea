//! Archive checksums.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Expected SHA-256 checksum of a plugin archive.
///
/// Update centers publish the digest base64-encoded; a 64 character hex
/// string is accepted as well. The actual digest is always rendered in the
/// same encoding as the expected one so both can be shown side by side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha256Checksum(String);

impl Sha256Checksum {
    /// Wrap a checksum string without validation (index data).
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_string())
    }

    /// Return the checksum as published.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the published value is hex rather than base64.
    pub fn is_hex(&self) -> bool {
        self.0.len() == 64 && self.0.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Render a raw digest in this checksum's encoding.
    pub fn encode(&self, digest: &[u8]) -> String {
        if self.is_hex() {
            hex::encode(digest)
        } else {
            STANDARD.encode(digest)
        }
    }

    /// Check a raw digest against this checksum.
    pub fn matches(&self, digest: &[u8]) -> bool {
        let actual = self.encode(digest);
        if self.is_hex() {
            actual.eq_ignore_ascii_case(&self.0)
        } else {
            actual == self.0
        }
    }
}

impl std::fmt::Display for Sha256Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Sha256Checksum {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Sha256Checksum {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Sha256Checksum {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn digest(data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    #[test]
    fn base64_checksum_matches() {
        let d = digest(b"hello world");
        let expected = Sha256Checksum::new(STANDARD.encode(&d));
        assert!(!expected.is_hex());
        assert!(expected.matches(&d));
        assert!(!expected.matches(&digest(b"other")));
    }

    #[test]
    fn hex_checksum_matches_case_insensitively() {
        let d = digest(b"hello world");
        let expected = Sha256Checksum::new(hex::encode(&d).to_uppercase());
        assert!(expected.is_hex());
        assert!(expected.matches(&d));
    }

    #[test]
    fn encode_follows_expected_format() {
        let d = digest(b"x");
        let b64 = Sha256Checksum::new("abc=");
        assert_eq!(b64.encode(&d), STANDARD.encode(&d));
    }
}
