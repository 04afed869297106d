//! Account and key identifiers.
//!
//! Both identifiers are 32-byte content hashes rendered as 64 lowercase hex
//! characters on the wire. The core never computes an `AccountHash` or an
//! incoming `KeyHash` itself — the HTTP path already carries the hash. The
//! client helper computes `KeyHash` from a user-chosen string via SHA-256.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// The reserved key identifying the implicit root of an account's tree.
pub const ROOT_KEY: &str = "root";

#[derive(Debug, thiserror::Error)]
#[error("malformed hash: expected 64 hex characters, got {0:?}")]
pub struct HashParseError(String);

/// 32-byte opaque account identifier; used as the bucket name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountHash([u8; 32]);

impl AccountHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AccountHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for AccountHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex32(s).ok_or_else(|| HashParseError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for AccountHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AccountHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A key identifier: either the literal `root`, or a 32-byte hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyHash {
    Root,
    Hash([u8; 32]),
}

impl KeyHash {
    pub fn is_root(&self) -> bool {
        matches!(self, KeyHash::Root)
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyHash::Root => write!(f, "{ROOT_KEY}"),
            KeyHash::Hash(bytes) => write!(f, "{}", hex::encode(bytes)),
        }
    }
}

impl FromStr for KeyHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ROOT_KEY {
            return Ok(KeyHash::Root);
        }
        let bytes = decode_hex32(s).ok_or_else(|| HashParseError(s.to_string()))?;
        Ok(KeyHash::Hash(bytes))
    }
}

fn decode_hex32(s: &str) -> Option<[u8; 32]> {
    if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let decoded = hex::decode(s).ok()?;
    decoded.try_into().ok()
}

/// `H`: the project's content hash over a UTF-8 string, used by the client
/// helper to turn a user-chosen key into a `KeyHash`. The core itself never
/// calls this — incoming keys arrive pre-hashed in the URL path.
pub fn hash_key(s: &str) -> KeyHash {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    KeyHash::Hash(digest)
}
