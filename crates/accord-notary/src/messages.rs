//! Wire messages of the notary protocol.

use accord_core::{NotaryError, PartyName, SignedTransaction, TransactionSignature};
use accord_flow::Topic;
use serde::{Deserialize, Serialize};

/// Topic the notary service listens on.
pub const NOTARY_TOPIC: &str = "platform.notary";

/// The notary topic as a [`Topic`] value
pub fn notary_topic() -> Topic {
    Topic::new(NOTARY_TOPIC)
}

/// Request to commit a transaction's inputs and sign it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRequest {
    /// The transaction to notarise
    pub tx: SignedTransaction,
    /// Identity on whose behalf the commit is requested; recorded in the
    /// uniqueness ledger alongside the consuming transaction id
    pub requester: PartyName,
}

/// The notary's reply: a signature or a typed error, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotaryResponse {
    /// Commit succeeded; notary signature over the transaction's wire bytes
    Signature(TransactionSignature),
    /// Commit refused
    Error(NotaryError),
}
