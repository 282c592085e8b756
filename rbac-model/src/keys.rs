//! Public keys and owner sets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// Length of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Base58 text of an Ed25519 public key, the way the ledger addresses owners.
///
/// # Example
///
/// ```
/// use rbac_model::PublicKey;
///
/// let key = PublicKey::from_bytes(&[7u8; 32]);
/// let parsed = PublicKey::parse(key.as_str()).unwrap();
/// assert_eq!(key, parsed);
///
/// assert!(PublicKey::parse("not-a-key").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(String);

impl PublicKey {
    /// Parse and validate base58 key text.
    pub fn parse(s: &str) -> ModelResult<Self> {
        decode(s)?;
        Ok(Self(s.to_string()))
    }

    /// Encode raw key bytes.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    /// Decode back to raw key bytes.
    pub fn to_bytes(&self) -> ModelResult<[u8; PUBLIC_KEY_LEN]> {
        decode(&self.0)
    }

    /// The base58 text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn decode(s: &str) -> ModelResult<[u8; PUBLIC_KEY_LEN]> {
    let invalid = |reason: String| ModelError::InvalidPublicKey {
        key: s.to_string(),
        reason,
    };

    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| invalid(e.to_string()))?;

    bytes
        .try_into()
        .map_err(|b: Vec<u8>| invalid(format!("expected {} bytes, got {}", PUBLIC_KEY_LEN, b.len())))
}

impl TryFrom<String> for PublicKey {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        decode(&value)?;
        Ok(Self(value))
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.0
    }
}

impl FromStr for PublicKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Explicit recipients of a CREATE output.
///
/// Passing an owner set, even with a single key, makes the record co-owned
/// by exactly those keys instead of by the signer alone. Keys are kept in
/// insertion order with duplicates dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PublicKey>", into = "Vec<PublicKey>")]
pub struct OwnerSet {
    keys: Vec<PublicKey>,
}

impl OwnerSet {
    /// Build an owner set; fails when no keys are given.
    pub fn new<I>(keys: I) -> ModelResult<Self>
    where
        I: IntoIterator<Item = PublicKey>,
    {
        let mut unique: Vec<PublicKey> = Vec::new();
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        if unique.is_empty() {
            return Err(ModelError::EmptyKeySet("owner set"));
        }
        Ok(Self { keys: unique })
    }

    /// An owner set with one key.
    pub fn single(key: PublicKey) -> Self {
        Self { keys: vec![key] }
    }

    /// The owners.
    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    /// Number of owners.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false; an owner set is never empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check if `key` is one of the owners.
    pub fn contains(&self, key: &PublicKey) -> bool {
        self.keys.contains(key)
    }
}

impl TryFrom<Vec<PublicKey>> for OwnerSet {
    type Error = ModelError;

    fn try_from(keys: Vec<PublicKey>) -> Result<Self, Self::Error> {
        Self::new(keys)
    }
}

impl From<OwnerSet> for Vec<PublicKey> {
    fn from(set: OwnerSet) -> Self {
        set.keys
    }
}
