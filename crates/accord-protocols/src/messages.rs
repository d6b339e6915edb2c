//! Wire messages of the state-replacement pattern.

use accord_core::{SignedTransaction, StateRef, StateReplacementRefused, TransactionSignature};
use serde::{Deserialize, Serialize};

/// The unit of agreement: sent by the Instigator to each participant of the
/// state being replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal<M> {
    /// The state to replace
    pub state_ref: StateRef,
    /// Protocol-specific description of the change
    pub modification: M,
    /// The proposed transaction, already signed by the Instigator
    pub tx: SignedTransaction,
}

/// A participant's verdict on a proposal: a signature or a typed refusal,
/// never a raw error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AcceptorResult {
    /// The participant signed the proposed transaction
    Signature(TransactionSignature),
    /// The participant declined
    Refused(StateReplacementRefused),
}

/// The completed transaction with every participant signature plus the
/// notary's, distributed back so each participant records an
/// identically-signed copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalSignatureSet {
    /// The fully-signed transaction
    pub tx: SignedTransaction,
}
