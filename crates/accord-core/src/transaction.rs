//! Transactions, state references and signature sets.
//!
//! A [`WireTransaction`] is the immutable body that gets hashed and signed;
//! [`SignedTransaction`] pairs it with an accumulating signature set. Adding
//! a signature never mutates in place, it produces a new value, so a
//! partially-signed transaction handed to a peer can never be retroactively
//! grown under the holder's feet.

use crate::error::{AccordError, Result};
use crate::identity::{Party, SignerKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::SystemTime;

/// Identifier of a transaction: sha-256 over its canonical wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub [u8; 32]);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// A reference to one output of a previously recorded transaction.
///
/// The unit of consumption: once a committed transaction validly consumes a
/// `StateRef`, no later transaction may consume it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateRef {
    /// Transaction that produced the output
    pub txid: TxId,
    /// Index of the output within that transaction
    pub index: u32,
}

impl StateRef {
    /// Reference output `index` of transaction `txid`
    pub fn new(txid: TxId, index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.txid, self.index)
    }
}

/// Declared validity window of a transaction, checked by the notary against
/// its own clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Earliest acceptable commit time, if bounded below
    pub from: Option<SystemTime>,
    /// Latest acceptable commit time, if bounded above
    pub until: Option<SystemTime>,
}

impl TimeWindow {
    /// A window bounded on both sides
    pub fn between(from: SystemTime, until: SystemTime) -> Self {
        Self {
            from: Some(from),
            until: Some(until),
        }
    }

    /// A window with only an upper bound
    pub fn until(until: SystemTime) -> Self {
        Self {
            from: None,
            until: Some(until),
        }
    }
}

/// Opaque contract state carried by a transaction output.
///
/// The contract verification engine interprets `payload`; this layer only
/// needs the participant list (who must agree to replace the state) and the
/// contract label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionState {
    /// Label of the contract governing this state
    pub contract: String,
    /// Contract-interpreted state data
    pub payload: Vec<u8>,
    /// Parties that must agree to any replacement of this state
    pub participants: Vec<Party>,
    /// Notary controlling consumption of this state. A transaction spending
    /// it must be committed by this notary.
    pub notary: Party,
}

/// A command: an instruction to the contract plus the keys required to have
/// signed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Instruction name, interpreted by the contract
    pub name: String,
    /// Keys whose signatures this command demands
    pub signers: Vec<SignerKey>,
}

/// The immutable transaction body: what gets hashed and signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransaction {
    /// State references consumed by this transaction
    pub inputs: Vec<StateRef>,
    /// States produced by this transaction
    pub outputs: Vec<TransactionState>,
    /// Commands with their required signers
    pub commands: Vec<Command>,
    /// Notary entitled to commit this transaction's inputs, if any
    pub notary: Option<Party>,
    /// Declared validity window, if any
    pub time_window: Option<TimeWindow>,
}

impl WireTransaction {
    /// Canonical byte encoding; the thing signatures cover.
    pub fn wire_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Transaction id: hash of the canonical bytes.
    pub fn id(&self) -> Result<TxId> {
        let bytes = self.wire_bytes()?;
        let digest = Sha256::digest(&bytes);
        Ok(TxId(digest.into()))
    }

    /// Union of all command signer keys. The notary's key is not part of
    /// this set; its signature is demanded separately by commit.
    pub fn required_signing_keys(&self) -> BTreeSet<SignerKey> {
        self.commands
            .iter()
            .flat_map(|c| c.signers.iter().copied())
            .collect()
    }

    /// Reference to output `index` of this transaction
    pub fn out_ref(&self, index: u32) -> Result<StateRef> {
        if (index as usize) >= self.outputs.len() {
            return Err(AccordError::invalid(format!(
                "output index {index} out of range"
            )));
        }
        Ok(StateRef::new(self.id()?, index))
    }
}

/// A single signature over a transaction's wire bytes, tagged with the
/// signer's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    /// Key the signature was made with
    pub by: SignerKey,
    /// The ed25519 signature over the wire bytes
    pub signature: Signature,
}

impl TransactionSignature {
    /// Sign `bytes` with `key`
    pub fn over(bytes: &[u8], key: &SigningKey) -> Self {
        Self {
            by: SignerKey::of(&key.verifying_key()),
            signature: key.sign(bytes),
        }
    }

    /// Check this signature against `bytes`
    pub fn verify(&self, bytes: &[u8]) -> Result<()> {
        let key = self.by.verifying_key()?;
        key.verify(bytes, &self.signature)
            .map_err(|_| AccordError::crypto(format!("bad signature by {}", self.by)))
    }
}

/// A transaction body plus the signatures collected so far.
///
/// Grows monotonically: [`SignedTransaction::with_signature`] returns a new
/// value rather than mutating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// The immutable body
    pub wire: WireTransaction,
    /// Signatures keyed by signer, canonical order
    pub sigs: BTreeMap<SignerKey, Signature>,
}

impl SignedTransaction {
    /// Wrap an unsigned body
    pub fn unsigned(wire: WireTransaction) -> Self {
        Self {
            wire,
            sigs: BTreeMap::new(),
        }
    }

    /// Wrap a body and sign it with `key` in one step
    pub fn signed_by(wire: WireTransaction, key: &SigningKey) -> Result<Self> {
        Self::unsigned(wire).with_key(key)
    }

    /// Transaction id of the body
    pub fn id(&self) -> Result<TxId> {
        self.wire.id()
    }

    /// A new value carrying all existing signatures plus `sig`.
    ///
    /// The signature is checked against the wire bytes before it is
    /// accepted; a signature over different bytes never enters the set.
    pub fn with_signature(&self, sig: TransactionSignature) -> Result<Self> {
        sig.verify(&self.wire.wire_bytes()?)?;
        let mut next = self.clone();
        next.sigs.insert(sig.by, sig.signature);
        Ok(next)
    }

    /// Sign with `key` and return the extended transaction
    pub fn with_key(&self, key: &SigningKey) -> Result<Self> {
        let sig = TransactionSignature::over(&self.wire.wire_bytes()?, key);
        self.with_signature(sig)
    }

    /// Produce the signature `key` would contribute, without attaching it
    pub fn sign_with(&self, key: &SigningKey) -> Result<TransactionSignature> {
        Ok(TransactionSignature::over(&self.wire.wire_bytes()?, key))
    }

    /// Keys required by the commands but not yet present, minus
    /// `allowed_missing`.
    pub fn missing_signers(&self, allowed_missing: &[SignerKey]) -> BTreeSet<SignerKey> {
        self.wire
            .required_signing_keys()
            .into_iter()
            .filter(|k| !self.sigs.contains_key(k) && !allowed_missing.contains(k))
            .collect()
    }

    /// Verify every attached signature against the wire bytes and check the
    /// required set is complete apart from `allowed_missing`.
    pub fn verify_signatures(&self, allowed_missing: &[SignerKey]) -> Result<()> {
        let bytes = self.wire.wire_bytes()?;
        for (by, signature) in &self.sigs {
            TransactionSignature {
                by: *by,
                signature: *signature,
            }
            .verify(&bytes)?;
        }
        let missing = self.missing_signers(allowed_missing);
        if !missing.is_empty() {
            return Err(AccordError::crypto(format!(
                "missing {} required signature(s)",
                missing.len()
            )));
        }
        Ok(())
    }

    /// True if `key` has signed
    pub fn is_signed_by(&self, key: &SignerKey) -> bool {
        self.sigs.contains_key(key)
    }
}
