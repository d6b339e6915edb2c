//! Await-style assertions for cross-node effects.

use accord_core::{InMemoryTransactionStore, TransactionStore, TxId};
use std::sync::Arc;
use std::time::Duration;

/// Wait (bounded) for `txid` to appear in `store`. Acceptor and recipient
/// flows record asynchronously, so tests poll rather than assume ordering.
pub async fn await_recorded(store: &Arc<InMemoryTransactionStore>, txid: &TxId) -> bool {
    for _ in 0..200 {
        if store.contains(txid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Short settling pause for negative assertions ("never records").
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
