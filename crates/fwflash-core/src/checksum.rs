//! Content checksum used to identify exactly which bytes were flashed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IntegrityError;

/// SHA-256 content checksum (lowercase hex).
///
/// The inner field is private so the string is always valid hex produced by
/// [`Checksum::compute`] or validated through `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(String);

impl Checksum {
    /// Compute the checksum of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Checksum(hex::encode(Sha256::digest(data)))
    }

    /// Full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }

    /// Recompute the checksum of `data` and compare it against `self`.
    pub fn verify(&self, data: &[u8]) -> Result<(), IntegrityError> {
        let actual = Checksum::compute(data);
        if actual != *self {
            return Err(IntegrityError::ChecksumMismatch {
                expected: self.0.clone(),
                actual: actual.0,
            });
        }
        Ok(())
    }
}

impl TryFrom<String> for Checksum {
    type Error = IntegrityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IntegrityError::InvalidChecksum(s));
        }
        Ok(Checksum(s.to_ascii_lowercase()))
    }
}

impl From<Checksum> for String {
    fn from(c: Checksum) -> Self {
        c.0
    }
}

impl FromStr for Checksum {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Checksum::try_from(s.to_string())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let c = Checksum::compute(b"abc");
        assert_eq!(
            c.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(c.short(), "ba7816bf8f01");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("not-hex".parse::<Checksum>().is_err());
        assert!("abcd".parse::<Checksum>().is_err());
    }

    #[test]
    fn test_parse_normalizes_case() {
        let upper = Checksum::compute(b"firmware").as_str().to_ascii_uppercase();
        let parsed: Checksum = upper.parse().unwrap();
        assert_eq!(parsed, Checksum::compute(b"firmware"));
    }

    #[test]
    fn test_verify_detects_corruption() {
        let c = Checksum::compute(b"image");
        assert!(c.verify(b"image").is_ok());
        assert!(matches!(
            c.verify(b"imagf"),
            Err(IntegrityError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_serde_validates() {
        let c = Checksum::compute(b"x");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, format!("\"{}\"", c));
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
        assert!(serde_json::from_str::<Checksum>("\"zz\"").is_err());
    }
}
