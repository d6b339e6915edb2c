//! Notary and state-replacement error taxonomy.
//!
//! These types cross the wire: a notary replies with a [`NotaryError`]
//! instead of a signature, and a replacement acceptor replies with a
//! [`StateReplacementRefused`] instead of one. Conflicts carry evidence
//! signed by the notary, so the recipient can verify a refusal is genuine
//! without trusting whoever relayed it.

use crate::error::{AccordError, Result};
use crate::identity::{PartyName, SignerKey};
use crate::transaction::{StateRef, TransactionSignature, TxId};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of the uniqueness ledger: which transaction consumed a state,
/// and on whose behalf the commit was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// The consuming transaction
    pub txid: TxId,
    /// Identity that requested the commit
    pub requester: PartyName,
}

/// Double-spend evidence: the inputs of a rejected transaction that were
/// already consumed, and by whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// The transaction whose commit was rejected
    pub rejected_txid: TxId,
    /// Already-consumed inputs with their recorded consumers
    pub consumed: BTreeMap<StateRef, CommitRecord>,
}

/// A [`Conflict`] signed by the notary, for non-repudiation.
///
/// Anyone holding the notary's public key can check the evidence without
/// trusting the party that handed it over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedConflict {
    /// The conflict evidence
    pub conflict: Conflict,
    /// Notary signature over the encoded evidence
    pub signature: TransactionSignature,
}

impl SignedConflict {
    /// Sign `conflict` with the notary's key
    pub fn sign(conflict: Conflict, notary_key: &SigningKey) -> Result<Self> {
        let bytes = bincode::serialize(&conflict)?;
        Ok(Self {
            signature: TransactionSignature::over(&bytes, notary_key),
            conflict,
        })
    }

    /// Verify the evidence was signed by `notary_key`
    pub fn verify(&self, notary_key: &VerifyingKey) -> Result<()> {
        if self.signature.by != SignerKey::of(notary_key) {
            return Err(AccordError::crypto(
                "conflict evidence not signed by the expected notary",
            ));
        }
        let bytes = bincode::serialize(&self.conflict)?;
        self.signature.verify(&bytes)
    }
}

/// Closed set of notary outcomes carried back to the requester instead of a
/// signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum NotaryError {
    /// The transaction's declared time window does not contain the
    /// notary's current time
    #[error("transaction time window is invalid")]
    TimestampInvalid,

    /// One or more inputs were already consumed by another transaction
    #[error("one or more inputs already consumed")]
    Conflict(SignedConflict),

    /// The validating notary found the transaction invalid
    #[error("transaction invalid: {0}")]
    TransactionInvalid(String),

    /// Signatures the notary is entitled to require were absent
    #[error("required signatures missing")]
    SignaturesMissing(Vec<SignerKey>),
}

/// Typed refusal sent by a replacement acceptor in place of a signature.
///
/// Acceptors convert internal verification failures into this structure
/// rather than letting an exception cross the wire, so the instigator can
/// tell an explicit refusal from a communication failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{by} refused replacement of {state_ref}: {detail}")]
pub struct StateReplacementRefused {
    /// Who refused
    pub by: PartyName,
    /// The state whose replacement was proposed
    pub state_ref: StateRef,
    /// Human-readable reason
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn conflict_evidence_verifies_only_with_signer_key() {
        let notary = SigningKey::from_bytes(&[3u8; 32]);
        let stranger = SigningKey::from_bytes(&[4u8; 32]);
        let conflict = Conflict {
            rejected_txid: TxId([1u8; 32]),
            consumed: BTreeMap::new(),
        };
        let signed = SignedConflict::sign(conflict, &notary).unwrap();
        signed.verify(&notary.verifying_key()).unwrap();
        assert!(signed.verify(&stranger.verifying_key()).is_err());
    }

    #[test]
    fn tampered_evidence_fails_verification() {
        let notary = SigningKey::from_bytes(&[3u8; 32]);
        let conflict = Conflict {
            rejected_txid: TxId([1u8; 32]),
            consumed: BTreeMap::new(),
        };
        let mut signed = SignedConflict::sign(conflict, &notary).unwrap();
        signed.conflict.rejected_txid = TxId([2u8; 32]);
        assert!(signed.verify(&notary.verifying_key()).is_err());
    }
}
