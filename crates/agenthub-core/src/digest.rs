//! Content-addressed payload digests.
//!
//! Every published version is fingerprinted with SHA-256 over the exact
//! payload bytes. The digest is a byte-level identity, not a semantic one:
//! two specs that parse to the same structure but differ in whitespace get
//! different digests, because the registry serves the raw bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// Algorithm prefix carried by every rendered digest.
pub const ALGORITHM: &str = "sha256";

/// A SHA-256 content digest rendered as `sha256:<64 lowercase hex chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the digest of the given payload.
    pub fn compute(payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        ContentDigest(format!("{ALGORITHM}:{}", hex::encode(hasher.finalize())))
    }

    /// Compute the digest, refusing payloads larger than `limit` bytes.
    ///
    /// Oversized input is reported, never truncated.
    pub fn compute_bounded(payload: &[u8], limit: u64) -> Result<Self> {
        let size = payload.len() as u64;
        if size > limit {
            return Err(CoreError::PayloadTooLarge { size, limit });
        }
        Ok(Self::compute(payload))
    }

    /// Parse a rendered digest string.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |detail: &str| CoreError::InvalidDigest {
            value: value.to_string(),
            detail: detail.to_string(),
        };

        let (algorithm, hex_part) = value
            .split_once(':')
            .ok_or_else(|| invalid("missing algorithm prefix"))?;
        if algorithm != ALGORITHM {
            return Err(invalid("unsupported algorithm"));
        }
        if hex_part.len() != 64
            || !hex_part
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(invalid("expected 64 lowercase hex characters"));
        }
        Ok(ContentDigest(value.to_string()))
    }

    /// Get the full rendered form, including the algorithm prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get only the hex portion.
    pub fn hex(&self) -> &str {
        &self.0[ALGORITHM.len() + 1..]
    }

    /// Verify that the given payload matches this digest.
    pub fn verify(&self, payload: &[u8]) -> bool {
        ContentDigest::compute(payload) == *self
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentDigest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        ContentDigest::parse(s)
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        ContentDigest::parse(&value)
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}
