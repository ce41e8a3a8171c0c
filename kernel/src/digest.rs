//! Content digests for reports, audit graphs and rollout traces.
//!
//! A digest is SHA-256 over a domain prefix followed by the canonical bytes
//! of a JSON value. Canonical bytes are compact `serde_json` output with every
//! object's keys in byte order, so two values that differ only in key order
//! or whitespace digest identically.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Nesting accepted by [`canonical_bytes`].
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    #[error("JSON nesting exceeds {limit} levels")]
    TooDeep { limit: usize },
    #[error("JSON encoding failed: {detail}")]
    Encode { detail: String },
    #[error("malformed digest {text:?}")]
    Malformed { text: String },
}

/// What a digest covers. The prefix keeps equal payloads of different kinds
/// from colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestDomain {
    RunReport,
    SearchGraph,
    Completions,
}

impl DigestDomain {
    #[must_use]
    pub fn prefix(self) -> &'static [u8] {
        match self {
            Self::RunReport => b"ARBOR/run-report/1\0",
            Self::SearchGraph => b"ARBOR/search-graph/1\0",
            Self::Completions => b"ARBOR/completions/1\0",
        }
    }
}

/// A SHA-256 digest, shown as `sha256:<64 hex digits>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    #[must_use]
    pub fn bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for ContentDigest {
    type Err = DigestError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let malformed = || DigestError::Malformed { text: text.to_string() };
        let hex_part = text.strip_prefix("sha256:").ok_or_else(malformed)?;
        let mut raw = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut raw).map_err(|_| malformed())?;
        Ok(Self(raw))
    }
}

/// Canonical bytes of `value`.
///
/// # Errors
///
/// [`DigestError::TooDeep`] past [`MAX_DEPTH`] levels of arrays and objects.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>, DigestError> {
    let sorted = sorted_copy(value, 0)?;
    serde_json::to_vec(&sorted).map_err(|e| DigestError::Encode { detail: e.to_string() })
}

// Keys are inserted in byte order, which is also the output order whether or
// not serde_json preserves insertion order.
fn sorted_copy(value: &Value, depth: usize) -> Result<Value, DigestError> {
    if depth > MAX_DEPTH {
        return Err(DigestError::TooDeep { limit: MAX_DEPTH });
    }
    Ok(match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sorted_copy(item, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted_copy(&map[key], depth + 1)?);
            }
            Value::Object(out)
        }
        scalar => scalar.clone(),
    })
}

#[must_use]
pub fn digest_bytes(domain: DigestDomain, bytes: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(domain.prefix());
    hasher.update(bytes);
    let mut raw = [0u8; 32];
    raw.copy_from_slice(&hasher.finalize());
    ContentDigest(raw)
}

/// [`canonical_bytes`] of `value`, digested under `domain`.
///
/// # Errors
///
/// As for [`canonical_bytes`].
pub fn digest_json(domain: DigestDomain, value: &Value) -> Result<ContentDigest, DigestError> {
    Ok(digest_bytes(domain, &canonical_bytes(value)?))
}
