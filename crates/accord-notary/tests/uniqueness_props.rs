//! Property tests for the uniqueness ledger under concurrent commits.

use accord_core::{PartyName, StateRef, TxId};
use accord_notary::{InMemoryUniquenessProvider, UniquenessProvider};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

fn state(tag: u8) -> StateRef {
    StateRef::new(TxId([tag; 32]), 0)
}

/// A batch of commit attempts, each picking a subset of a small shared
/// state pool so overlaps are common.
fn attempts() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(
        prop::collection::vec(0u8..8, 1..4),
        2..12,
    )
}

proptest! {
    #[test]
    fn concurrent_commits_never_share_a_state(input_sets in attempts()) {
        let provider = InMemoryUniquenessProvider::new();

        let handles: Vec<_> = input_sets
            .iter()
            .enumerate()
            .map(|(i, tags)| {
                let provider = Arc::clone(&provider);
                let inputs: Vec<StateRef> = tags.iter().map(|t| state(*t)).collect();
                let txid = TxId([i as u8 + 100; 32]);
                std::thread::spawn(move || {
                    let requester = PartyName::new(format!("P{i}"));
                    (txid, inputs.clone(), provider.commit(&inputs, txid, &requester))
                })
            })
            .collect();

        let mut consumed_by: HashMap<StateRef, TxId> = HashMap::new();
        for handle in handles {
            let (txid, inputs, outcome) = handle.join().unwrap();
            match outcome {
                Ok(()) => {
                    // A winner owns every one of its inputs; no two winners
                    // may overlap.
                    for input in &inputs {
                        prop_assert_eq!(provider.consumer_of(input).unwrap().txid, txid);
                        if let Some(prior) = consumed_by.insert(*input, txid) {
                            prop_assert_eq!(prior, txid);
                        }
                    }
                }
                Err(conflicting) => {
                    prop_assert!(!conflicting.is_empty());
                    for (input, record) in &conflicting {
                        // Entries are permanent, so the evidence must still
                        // agree with the ledger after the dust settles.
                        prop_assert!(inputs.contains(input));
                        prop_assert_ne!(record.txid, txid);
                        prop_assert_eq!(provider.consumer_of(input).unwrap().txid, record.txid);
                    }
                }
            }
        }
    }

    #[test]
    fn sequential_recommit_is_always_idempotent(tags in prop::collection::vec(0u8..8, 1..4)) {
        let provider = InMemoryUniquenessProvider::new();
        let inputs: Vec<StateRef> = tags.iter().map(|t| state(*t)).collect();
        let txid = TxId([200; 32]);
        let requester = PartyName::new("Alice");

        provider.commit(&inputs, txid, &requester).unwrap();
        let before = provider.len();
        provider.commit(&inputs, txid, &requester).unwrap();
        prop_assert_eq!(provider.len(), before);
    }
}
