//! Trait seams for external collaborators.
//!
//! The protocol layer consumes these services but does not implement them
//! beyond what tests need: a real node wires in its own directory, clock,
//! dependency fetcher and durable store.

use crate::error::{AccordError, Result};
use crate::identity::{Party, PartyName};
use crate::transaction::{SignedTransaction, TimeWindow, TxId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Network directory: resolves names to identities and knows which parties
/// run a notary service.
pub trait PartyDirectory: Send + Sync {
    /// Look up a party by name
    fn resolve(&self, name: &PartyName) -> Result<Party>;

    /// Identities currently operating a notary service
    fn notary_identities(&self) -> Vec<Party>;

    /// True if `party` runs a notary service
    fn is_notary(&self, party: &Party) -> bool {
        self.notary_identities().contains(party)
    }
}

/// Tolerant comparator for transaction time windows, supplied by the time
/// authority.
pub trait TimeWindowChecker: Send + Sync {
    /// True if "now", by this authority's clock, falls within `window`
    fn is_valid(&self, window: &TimeWindow) -> bool;
}

/// System-clock checker with a symmetric tolerance on both bounds.
pub struct ClockTimeWindowChecker {
    tolerance: Duration,
}

impl ClockTimeWindowChecker {
    /// Checker allowing `tolerance` of clock skew in either direction
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    /// Checker with a 30 second tolerance
    pub fn default_tolerance() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl TimeWindowChecker for ClockTimeWindowChecker {
    fn is_valid(&self, window: &TimeWindow) -> bool {
        let now = SystemTime::now();
        if let Some(from) = window.from {
            if now + self.tolerance < from {
                return false;
            }
        }
        if let Some(until) = window.until {
            if now > until + self.tolerance {
                return false;
            }
        }
        true
    }
}

/// Fetches missing transaction history from a peer before verification.
///
/// A transaction cannot be contract-validated without the transactions that
/// produced its inputs, so acceptors call this before verifying anything
/// peer-supplied.
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// Ensure `txids` are present in the local store, fetching from `from`
    /// where absent
    async fn fetch_missing(&self, txids: &[TxId], from: &Party) -> Result<()>;
}

/// Durable store of recorded transactions.
pub trait TransactionStore: Send + Sync {
    /// Record transactions as final
    fn record(&self, txs: &[SignedTransaction]) -> Result<()>;

    /// Fetch a recorded transaction
    fn get(&self, txid: &TxId) -> Result<SignedTransaction>;

    /// True if `txid` has been recorded
    fn contains(&self, txid: &TxId) -> bool;
}

/// Contract verification engine seam.
///
/// Acceptors and the validating notary call this after dependencies are
/// resolved; the base notary never does (a deliberate privacy trade-off,
/// not an omission).
pub trait ContractVerifier: Send + Sync {
    /// Verify `tx` is contract-valid given the history in `store`
    fn verify(&self, tx: &SignedTransaction, store: &dyn TransactionStore) -> Result<()>;
}

/// In-memory transaction store, usable as the durable store in tests and as
/// a node-local cache elsewhere.
#[derive(Default)]
pub struct InMemoryTransactionStore {
    txs: RwLock<HashMap<TxId, SignedTransaction>>,
}

impl InMemoryTransactionStore {
    /// Empty store
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn record(&self, txs: &[SignedTransaction]) -> Result<()> {
        let mut map = self.txs.write();
        for tx in txs {
            map.insert(tx.id()?, tx.clone());
        }
        Ok(())
    }

    fn get(&self, txid: &TxId) -> Result<SignedTransaction> {
        self.txs
            .read()
            .get(txid)
            .cloned()
            .ok_or_else(|| AccordError::not_found(format!("transaction {txid}")))
    }

    fn contains(&self, txid: &TxId) -> bool {
        self.txs.read().contains_key(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_checker_accepts_open_windows() {
        let checker = ClockTimeWindowChecker::default_tolerance();
        assert!(checker.is_valid(&TimeWindow {
            from: None,
            until: None
        }));
    }

    #[test]
    fn clock_checker_rejects_expired_window() {
        let checker = ClockTimeWindowChecker::new(Duration::from_secs(0));
        let past = SystemTime::now() - Duration::from_secs(3600);
        assert!(!checker.is_valid(&TimeWindow::until(past)));
    }

    #[test]
    fn clock_checker_rejects_future_window() {
        let checker = ClockTimeWindowChecker::new(Duration::from_secs(0));
        let future = SystemTime::now() + Duration::from_secs(3600);
        let window = TimeWindow {
            from: Some(future),
            until: None,
        };
        assert!(!checker.is_valid(&window));
    }
}
