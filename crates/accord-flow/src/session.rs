//! Session addressing and inbound-message routing.
//!
//! Every message on the wire is addressed by a `(topic, session id)` pair.
//! The [`SessionRouter`] owns the node-side routing table: flows register the
//! pair they are waiting on and get back the receive half of a channel; the
//! session layer hands arriving envelopes to [`SessionRouter::route`], which
//! forwards each to exactly the registered waiter. Per-session ordering
//! follows from the channel; there is no ordering across sessions.

use crate::error::{FlowError, FlowResult};
use accord_core::PartyName;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Topic string identifying a protocol family (e.g. `"platform.notary"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(pub String);

impl Topic {
    /// Create a topic
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session identifier: a random 63-bit value, generated without
/// coordination. Collisions are improbable enough that no registry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Fresh random 63-bit id
    pub fn random() -> Self {
        Self(rand::random::<u64>() >> 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One typed message in flight between two parties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol family
    pub topic: Topic,
    /// Inbox of the recipient flow
    pub session: SessionId,
    /// Sending party
    pub from: PartyName,
    /// Receiving party
    pub to: PartyName,
    /// Encoded payload
    pub payload: Vec<u8>,
}

/// The messaging substrate: point-to-point, ordered, reliable delivery of
/// envelopes to the party they name.
///
/// Implementations route to the destination node's [`SessionRouter`]. The
/// broker/transport behind this trait is out of scope for this layer.
#[async_trait]
pub trait SessionLayer: Send + Sync {
    /// Deliver `envelope` to the node identified by `envelope.to`
    async fn deliver(&self, envelope: Envelope) -> FlowResult<()>;
}

type Inbox = mpsc::UnboundedSender<Envelope>;

#[derive(Default)]
struct RouterState {
    inboxes: HashMap<(Topic, SessionId), Inbox>,
    /// Messages that raced ahead of their flow's `register` call. Drained on
    /// registration, in arrival order.
    early: HashMap<(Topic, SessionId), Vec<Envelope>>,
}

/// Node-side demultiplexer from `(topic, session)` pairs to waiting flows.
///
/// The routing table is the only piece of flow-runtime state shared across
/// flows, guarded by a single short-lived lock.
#[derive(Default)]
pub struct SessionRouter {
    state: Mutex<RouterState>,
}

impl SessionRouter {
    /// Empty router
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a waiter for `(topic, session)` and return its receive half.
    ///
    /// Envelopes that arrived before registration are delivered first, in
    /// arrival order.
    pub fn register(self: &Arc<Self>, topic: Topic, session: SessionId) -> SessionReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = (topic, session);
        {
            let mut state = self.state.lock();
            if let Some(buffered) = state.early.remove(&key) {
                for envelope in buffered {
                    // Receiver is in hand, the channel cannot be closed yet.
                    let _ = tx.send(envelope);
                }
            }
            if state.inboxes.insert(key.clone(), tx).is_some() {
                warn!(topic = %key.0, session = %key.1, "session re-registered; previous waiter dropped");
            }
        }
        debug!(topic = %key.0, session = %key.1, "session registered");
        SessionReceiver {
            router: Arc::clone(self),
            key: Some(key),
            rx,
        }
    }

    /// Route an arriving envelope to its registered waiter, or buffer it if
    /// the waiter has not registered yet.
    pub fn route(&self, envelope: Envelope) -> FlowResult<()> {
        let key = (envelope.topic.clone(), envelope.session);
        let mut state = self.state.lock();
        match state.inboxes.get(&key) {
            Some(inbox) => {
                trace!(topic = %key.0, session = %key.1, from = %envelope.from, "routing message");
                inbox.send(envelope).map_err(|_| FlowError::SessionClosed)
            }
            None => {
                trace!(topic = %key.0, session = %key.1, "buffering early message");
                state.early.entry(key).or_default().push(envelope);
                Ok(())
            }
        }
    }

    /// Drop every registered inbox, closing all waiting flows' sessions.
    /// Simulates node shutdown.
    pub fn close_all(&self) {
        let mut state = self.state.lock();
        state.inboxes.clear();
        state.early.clear();
    }

    fn unregister(&self, key: &(Topic, SessionId)) {
        let mut state = self.state.lock();
        state.inboxes.remove(key);
        state.early.remove(key);
    }
}

/// Receive half of a registered session. Unregisters itself on drop.
pub struct SessionReceiver {
    router: Arc<SessionRouter>,
    key: Option<(Topic, SessionId)>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl SessionReceiver {
    /// Await the next envelope on this session.
    ///
    /// Returns [`FlowError::SessionClosed`] if the session was torn down
    /// before anything arrived.
    pub async fn recv(&mut self) -> FlowResult<Envelope> {
        self.rx.recv().await.ok_or(FlowError::SessionClosed)
    }
}

impl Drop for SessionReceiver {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.router.unregister(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(topic: &str, session: SessionId, tag: u8) -> Envelope {
        Envelope {
            topic: Topic::new(topic),
            session,
            from: PartyName::new("A"),
            to: PartyName::new("B"),
            payload: vec![tag],
        }
    }

    #[tokio::test]
    async fn routes_to_matching_session_only() {
        let router = SessionRouter::new();
        let s1 = SessionId::random();
        let s2 = SessionId::random();
        let mut rx1 = router.register(Topic::new("t"), s1);
        let mut rx2 = router.register(Topic::new("t"), s2);

        router.route(envelope("t", s2, 2)).unwrap();
        router.route(envelope("t", s1, 1)).unwrap();

        assert_eq!(rx1.recv().await.unwrap().payload, vec![1]);
        assert_eq!(rx2.recv().await.unwrap().payload, vec![2]);
    }

    #[tokio::test]
    async fn early_messages_are_buffered_in_order() {
        let router = SessionRouter::new();
        let s = SessionId::random();
        router.route(envelope("t", s, 1)).unwrap();
        router.route(envelope("t", s, 2)).unwrap();

        let mut rx = router.register(Topic::new("t"), s);
        assert_eq!(rx.recv().await.unwrap().payload, vec![1]);
        assert_eq!(rx.recv().await.unwrap().payload, vec![2]);
    }

    #[tokio::test]
    async fn close_all_wakes_waiters_with_session_closed() {
        let router = SessionRouter::new();
        let mut rx = router.register(Topic::new("t"), SessionId::random());
        router.close_all();
        assert!(matches!(rx.recv().await, Err(FlowError::SessionClosed)));
    }

    #[tokio::test]
    async fn drop_unregisters_the_session() {
        let router = SessionRouter::new();
        let s = SessionId::random();
        {
            let _rx = router.register(Topic::new("t"), s);
        }
        // After drop, delivery buffers rather than routing to a dead inbox.
        router.route(envelope("t", s, 1)).unwrap();
        let mut rx = router.register(Topic::new("t"), s);
        assert_eq!(rx.recv().await.unwrap().payload, vec![1]);
    }
}
