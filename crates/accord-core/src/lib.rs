//! # Accord Core - ledger data model
//!
//! Shared vocabulary for the Accord protocol layer: party identities,
//! transactions and their signature sets, the notary error taxonomy, the
//! [`UntrustworthyData`] wrapper for peer-supplied payloads, and the trait
//! seams for external collaborators (directory, time checker, dependency
//! resolver, transaction store).
//!
//! Everything in this crate is either immutable value types or narrow trait
//! interfaces; all protocol behaviour lives in the higher layers
//! (`accord-flow`, `accord-notary`, `accord-protocols`).

pub mod error;
pub mod identity;
pub mod notary;
pub mod services;
pub mod transaction;
pub mod untrustworthy;

pub use error::{AccordError, Result};
pub use identity::{Party, PartyName, SignerKey};
pub use notary::{CommitRecord, Conflict, NotaryError, SignedConflict, StateReplacementRefused};
pub use services::{
    ClockTimeWindowChecker, ContractVerifier, DependencyResolver, InMemoryTransactionStore,
    PartyDirectory, TimeWindowChecker, TransactionStore,
};
pub use transaction::{
    Command, SignedTransaction, StateRef, TimeWindow, TransactionSignature, TransactionState,
    TxId, WireTransaction,
};
pub use untrustworthy::UntrustworthyData;
