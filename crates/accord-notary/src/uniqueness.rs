//! The uniqueness ledger: `StateRef -> consuming transaction`.
//!
//! Append-only; an entry, once written, is permanent for the lifetime of the
//! network. This mapping is the platform's consensus state, and the commit
//! operation is the one place in the core where cross-flow mutual exclusion
//! is mandatory.

use accord_core::{CommitRecord, PartyName, StateRef, TxId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a failed commit: the already-consumed inputs with their
/// recorded consumers.
pub type ConsumedStates = BTreeMap<StateRef, CommitRecord>;

/// Exclusive owner of the uniqueness ledger.
///
/// `commit` must be atomic with respect to all concurrent commit attempts
/// touching overlapping input sets. No other component may read or write the
/// ledger directly.
pub trait UniquenessProvider: Send + Sync {
    /// Atomically test-and-set every input to `txid`.
    ///
    /// Succeeds iff each input is either unset or already set to this same
    /// `txid` (idempotent re-commit). On failure nothing is written and the
    /// conflicting entries are returned.
    fn commit(
        &self,
        inputs: &[StateRef],
        txid: TxId,
        requester: &PartyName,
    ) -> Result<(), ConsumedStates>;
}

/// In-memory uniqueness ledger behind a single lock.
#[derive(Default)]
pub struct InMemoryUniquenessProvider {
    ledger: Mutex<HashMap<StateRef, CommitRecord>>,
}

impl InMemoryUniquenessProvider {
    /// Empty ledger
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The recorded consumer of `state`, if committed
    pub fn consumer_of(&self, state: &StateRef) -> Option<CommitRecord> {
        self.ledger.lock().get(state).cloned()
    }

    /// Number of committed entries
    pub fn len(&self) -> usize {
        self.ledger.lock().len()
    }

    /// True if nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.ledger.lock().is_empty()
    }
}

impl UniquenessProvider for InMemoryUniquenessProvider {
    fn commit(
        &self,
        inputs: &[StateRef],
        txid: TxId,
        requester: &PartyName,
    ) -> Result<(), ConsumedStates> {
        let mut ledger = self.ledger.lock();

        let conflicting: ConsumedStates = inputs
            .iter()
            .filter_map(|input| {
                ledger
                    .get(input)
                    .filter(|record| record.txid != txid)
                    .map(|record| (*input, record.clone()))
            })
            .collect();
        if !conflicting.is_empty() {
            debug!(tx = %txid, conflicts = conflicting.len(), "commit rejected");
            return Err(conflicting);
        }

        for input in inputs {
            ledger.insert(
                *input,
                CommitRecord {
                    txid,
                    requester: requester.clone(),
                },
            );
        }
        info!(tx = %txid, inputs = inputs.len(), "inputs committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(tag: u8, index: u32) -> StateRef {
        StateRef::new(TxId([tag; 32]), index)
    }

    #[test]
    fn first_commit_wins() {
        let provider = InMemoryUniquenessProvider::new();
        let shared = state(1, 0);
        let alice = PartyName::new("Alice");

        provider.commit(&[shared], TxId([10; 32]), &alice).unwrap();
        let err = provider
            .commit(&[shared], TxId([11; 32]), &alice)
            .unwrap_err();
        assert_eq!(err[&shared].txid, TxId([10; 32]));
    }

    #[test]
    fn recommit_of_same_transaction_is_idempotent() {
        let provider = InMemoryUniquenessProvider::new();
        let inputs = [state(1, 0), state(1, 1)];
        let alice = PartyName::new("Alice");

        provider.commit(&inputs, TxId([10; 32]), &alice).unwrap();
        provider.commit(&inputs, TxId([10; 32]), &alice).unwrap();
        assert_eq!(provider.len(), 2);
    }

    #[test]
    fn failed_commit_writes_nothing() {
        let provider = InMemoryUniquenessProvider::new();
        let alice = PartyName::new("Alice");
        let taken = state(1, 0);
        let fresh = state(2, 0);

        provider.commit(&[taken], TxId([10; 32]), &alice).unwrap();
        provider
            .commit(&[fresh, taken], TxId([11; 32]), &alice)
            .unwrap_err();
        assert!(provider.consumer_of(&fresh).is_none());
    }

    #[test]
    fn concurrent_commits_have_one_winner_per_state() {
        let provider = InMemoryUniquenessProvider::new();
        let shared = state(9, 0);
        let mut handles = Vec::new();
        for i in 0..16u8 {
            let provider = Arc::clone(&provider);
            handles.push(std::thread::spawn(move || {
                let requester = PartyName::new(format!("P{i}"));
                provider.commit(&[shared], TxId([i; 32]), &requester).is_ok()
            }));
        }
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(provider.consumer_of(&shared).is_some());
    }
}
