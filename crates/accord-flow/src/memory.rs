//! In-memory session layer connecting routers in one process.

use crate::error::{FlowError, FlowResult};
use crate::session::{Envelope, SessionLayer, SessionRouter};
use accord_core::PartyName;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory network for tests and local simulation.
///
/// Holds one [`SessionRouter`] per attached party and delivers envelopes
/// synchronously. Delivery is in-order per sender/session because each
/// `deliver` call routes before returning.
#[derive(Default)]
pub struct InMemoryNetwork {
    nodes: RwLock<HashMap<PartyName, Arc<SessionRouter>>>,
}

impl InMemoryNetwork {
    /// Empty network
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a party's router to the network
    pub fn attach(&self, name: PartyName, router: Arc<SessionRouter>) {
        self.nodes.write().insert(name, router);
    }

    /// Detach a party; subsequent sends to it fail as unreachable
    pub fn detach(&self, name: &PartyName) {
        self.nodes.write().remove(name);
    }
}

#[async_trait]
impl SessionLayer for InMemoryNetwork {
    async fn deliver(&self, envelope: Envelope) -> FlowResult<()> {
        let router = self
            .nodes
            .read()
            .get(&envelope.to)
            .cloned()
            .ok_or_else(|| FlowError::Unreachable(envelope.to.clone()))?;
        router.route(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionId, Topic};

    #[tokio::test]
    async fn delivers_between_attached_routers() {
        let net = InMemoryNetwork::new();
        let router = SessionRouter::new();
        net.attach(PartyName::new("B"), Arc::clone(&router));

        let s = SessionId::random();
        let mut rx = router.register(Topic::new("t"), s);
        net.deliver(Envelope {
            topic: Topic::new("t"),
            session: s,
            from: PartyName::new("A"),
            to: PartyName::new("B"),
            payload: vec![7],
        })
        .await
        .unwrap();
        assert_eq!(rx.recv().await.unwrap().payload, vec![7]);
    }

    #[tokio::test]
    async fn detached_party_is_unreachable() {
        let net = InMemoryNetwork::new();
        let out = net
            .deliver(Envelope {
                topic: Topic::new("t"),
                session: SessionId::random(),
                from: PartyName::new("A"),
                to: PartyName::new("gone"),
                payload: vec![],
            })
            .await;
        assert!(matches!(out, Err(FlowError::Unreachable(_))));
    }
}
