//! In-memory multi-node test network.

use crate::services::{AcceptAllVerifier, TestDirectory, UniverseResolver};
use accord_core::{
    ContractVerifier, DependencyResolver, InMemoryTransactionStore, Party, PartyDirectory,
    Result, SignedTransaction, TransactionStore,
};
use accord_flow::{
    FlowManager, InMemoryNetwork, NodeIdentity, ServiceHub, SessionLayer, SessionRouter,
};
use ed25519_dalek::SigningKey;
use std::sync::Arc;

/// A whole simulated network: shared message fabric, shared directory, and a
/// "universe" store standing in for the global transaction history that
/// dependency resolution would normally fetch from peers.
pub struct TestNet {
    network: Arc<InMemoryNetwork>,
    directory: Arc<TestDirectory>,
    universe: Arc<InMemoryTransactionStore>,
}

impl TestNet {
    /// Empty network
    pub fn new() -> Self {
        Self {
            network: InMemoryNetwork::new(),
            directory: TestDirectory::new(),
            universe: InMemoryTransactionStore::new(),
        }
    }

    /// Add an ordinary node with a deterministic key derived from `seed`
    pub fn add_node(&self, name: &str, seed: u8) -> TestNode {
        self.build_node(name, seed, false, Arc::new(AcceptAllVerifier))
    }

    /// Add a node announced as running a notary service
    pub fn add_notary_node(&self, name: &str, seed: u8) -> TestNode {
        self.build_node(name, seed, true, Arc::new(AcceptAllVerifier))
    }

    /// Add a node with a specific contract verifier
    pub fn add_node_with_verifier(
        &self,
        name: &str,
        seed: u8,
        verifier: Arc<dyn ContractVerifier>,
    ) -> TestNode {
        self.build_node(name, seed, false, verifier)
    }

    fn build_node(
        &self,
        name: &str,
        seed: u8,
        notary: bool,
        verifier: Arc<dyn ContractVerifier>,
    ) -> TestNode {
        let identity = NodeIdentity::new(name, SigningKey::from_bytes(&[seed; 32]));
        let party = identity.party.clone();
        if notary {
            self.directory.add_notary(party.clone());
        } else {
            self.directory.add(party.clone());
        }

        let router = SessionRouter::new();
        self.network.attach(party.name.clone(), Arc::clone(&router));

        let store = InMemoryTransactionStore::new();
        let resolver = UniverseResolver::new(Arc::clone(&self.universe), Arc::clone(&store));
        let hub = Arc::new(ServiceHub {
            identity,
            network: Arc::clone(&self.network) as Arc<dyn SessionLayer>,
            router: Arc::clone(&router),
            directory: Arc::clone(&self.directory) as Arc<dyn PartyDirectory>,
            tx_store: Arc::clone(&store) as Arc<dyn TransactionStore>,
            resolver: resolver as Arc<dyn DependencyResolver>,
            verifier,
        });
        TestNode {
            party,
            store,
            router,
            manager: FlowManager::new(hub),
        }
    }

    /// The shared global-history store
    pub fn universe(&self) -> &Arc<InMemoryTransactionStore> {
        &self.universe
    }

    /// Record `tx` in the universe store so any node can resolve it
    pub fn seed_history(&self, tx: &SignedTransaction) -> Result<()> {
        self.universe.record(std::slice::from_ref(tx))
    }

    /// The shared directory
    pub fn directory(&self) -> &Arc<TestDirectory> {
        &self.directory
    }

    /// Detach a node; messages to it fail as unreachable
    pub fn disconnect(&self, party: &Party) {
        self.network.detach(&party.name);
    }
}

impl Default for TestNet {
    fn default() -> Self {
        Self::new()
    }
}

/// One simulated node.
pub struct TestNode {
    /// The node's identity
    pub party: Party,
    /// The node's local transaction store
    pub store: Arc<InMemoryTransactionStore>,
    /// The node's session router
    pub router: Arc<SessionRouter>,
    /// Flow manager for starting flows and registering services
    pub manager: FlowManager,
}
