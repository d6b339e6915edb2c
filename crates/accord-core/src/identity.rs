//! Party identities and signer keys.

use crate::error::{AccordError, Result};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stable, human-readable name of a party on the network.
///
/// Resolution of a name to a network address is the job of the external
/// directory service; the core never interprets names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyName(pub String);

impl PartyName {
    /// Create a party name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartyName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PartyName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An identity on the network: a stable name plus a public verification key.
///
/// Immutable. Two parties are the same identity only if both the name and
/// the key match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Stable name, resolved to an address by the directory service
    pub name: PartyName,
    /// Public verification key owned by this party
    pub key: VerifyingKey,
}

impl Party {
    /// Create a party identity
    pub fn new(name: impl Into<PartyName>, key: VerifyingKey) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }

    /// The party's key in map-friendly form
    pub fn signer_key(&self) -> SignerKey {
        SignerKey::of(&self.key)
    }
}

impl Hash for Party {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.key.as_bytes().hash(state);
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A public key in byte form, usable as an ordered map key.
///
/// `SignedTransaction` keys its signature set by this type so the set has a
/// canonical iteration order independent of insertion order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SignerKey(pub [u8; 32]);

impl SignerKey {
    /// Byte form of a verification key
    pub fn of(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    /// Recover the verification key, failing on non-canonical bytes
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|e| AccordError::crypto(format!("invalid verifying key: {e}")))
    }
}

impl fmt::Display for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn signer_key_round_trips() {
        let sk = SigningKey::from_bytes(&[7u8; 32]);
        let key = SignerKey::of(&sk.verifying_key());
        assert_eq!(key.verifying_key().unwrap(), sk.verifying_key());
    }

    #[test]
    fn party_equality_includes_key() {
        let a = SigningKey::from_bytes(&[1u8; 32]).verifying_key();
        let b = SigningKey::from_bytes(&[2u8; 32]).verifying_key();
        assert_ne!(Party::new("Alice", a), Party::new("Alice", b));
    }
}
