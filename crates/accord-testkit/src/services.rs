//! Test implementations of the collaborator seams.

use accord_core::{
    AccordError, ContractVerifier, DependencyResolver, InMemoryTransactionStore, Party,
    PartyDirectory, PartyName, Result, SignedTransaction, TransactionStore, TxId,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared directory of every party on the test network.
#[derive(Default)]
pub struct TestDirectory {
    parties: RwLock<HashMap<PartyName, Party>>,
    notaries: RwLock<Vec<Party>>,
}

impl TestDirectory {
    /// Empty directory
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Announce a party
    pub fn add(&self, party: Party) {
        self.parties.write().insert(party.name.clone(), party);
    }

    /// Announce a party that runs a notary service
    pub fn add_notary(&self, party: Party) {
        self.add(party.clone());
        self.notaries.write().push(party);
    }
}

impl PartyDirectory for TestDirectory {
    fn resolve(&self, name: &PartyName) -> Result<Party> {
        self.parties
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AccordError::not_found(format!("party {name}")))
    }

    fn notary_identities(&self) -> Vec<Party> {
        self.notaries.read().clone()
    }
}

/// Dependency resolver that "fetches" from a shared universe store instead
/// of messaging the peer.
pub struct UniverseResolver {
    universe: Arc<InMemoryTransactionStore>,
    local: Arc<InMemoryTransactionStore>,
}

impl UniverseResolver {
    /// Resolver copying from `universe` into `local`
    pub fn new(
        universe: Arc<InMemoryTransactionStore>,
        local: Arc<InMemoryTransactionStore>,
    ) -> Arc<Self> {
        Arc::new(Self { universe, local })
    }
}

#[async_trait]
impl DependencyResolver for UniverseResolver {
    async fn fetch_missing(&self, txids: &[TxId], _from: &Party) -> Result<()> {
        for txid in txids {
            if !self.local.contains(txid) {
                let tx = self.universe.get(txid)?;
                self.local.record(&[tx])?;
            }
        }
        Ok(())
    }
}

/// Contract verifier that accepts everything.
#[derive(Default)]
pub struct AcceptAllVerifier;

impl ContractVerifier for AcceptAllVerifier {
    fn verify(&self, _tx: &SignedTransaction, _store: &dyn TransactionStore) -> Result<()> {
        Ok(())
    }
}

/// Contract verifier that rejects everything with a fixed reason.
pub struct RejectingVerifier(pub String);

impl ContractVerifier for RejectingVerifier {
    fn verify(&self, _tx: &SignedTransaction, _store: &dyn TransactionStore) -> Result<()> {
        Err(AccordError::verification(self.0.clone()))
    }
}
