//! Flow execution: contexts, peer sessions, and the manager.
//!
//! A flow body is an ordinary `async fn` taking a [`FlowCtx`]. It suspends
//! only inside [`PeerSession::send`], [`PeerSession::receive`] and
//! [`PeerSession::send_and_receive`]; everything else is plain sequential
//! logic. Sub-flows are invoked synchronously through [`FlowCtx::subflow`]
//! and return their result or error like any function call.

use crate::error::{FlowError, FlowResult};
use crate::handshake::{Handshake, HANDSHAKE_SESSION};
use crate::progress::ProgressTracker;
use crate::session::{Envelope, SessionId, SessionLayer, SessionReceiver, SessionRouter, Topic};
use accord_core::{
    ContractVerifier, DependencyResolver, Party, PartyDirectory, TransactionSignature,
    TransactionStore, UntrustworthyData,
};
use ed25519_dalek::SigningKey;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// This node's identity plus its signing key.
pub struct NodeIdentity {
    /// Public identity announced to peers
    pub party: Party,
    key: SigningKey,
}

impl NodeIdentity {
    /// Build an identity from a signing key
    pub fn new(name: impl Into<String>, key: SigningKey) -> Self {
        Self {
            party: Party::new(name.into(), key.verifying_key()),
            key,
        }
    }

    /// Sign arbitrary bytes with this node's key
    pub fn sign(&self, bytes: &[u8]) -> TransactionSignature {
        TransactionSignature::over(bytes, &self.key)
    }

    /// The signing key, for transaction signing
    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

/// Everything a flow body may touch: identity, messaging, and the external
/// collaborator services.
pub struct ServiceHub {
    /// This node's identity and signing key
    pub identity: NodeIdentity,
    /// Outbound message delivery
    pub network: Arc<dyn SessionLayer>,
    /// Inbound message demultiplexer
    pub router: Arc<SessionRouter>,
    /// Party/network directory
    pub directory: Arc<dyn PartyDirectory>,
    /// Durable transaction store
    pub tx_store: Arc<dyn TransactionStore>,
    /// Transaction-dependency fetcher
    pub resolver: Arc<dyn DependencyResolver>,
    /// Contract verification engine
    pub verifier: Arc<dyn ContractVerifier>,
}

impl ServiceHub {
    /// Shorthand for this node's party identity
    pub fn me(&self) -> &Party {
        &self.identity.party
    }
}

/// Per-flow execution context. Cheap to clone; clones share the hub but the
/// progress tracker is per flow instance.
#[derive(Clone)]
pub struct FlowCtx {
    hub: Arc<ServiceHub>,
    progress: ProgressTracker,
    flow_id: Uuid,
}

impl FlowCtx {
    /// Context for a fresh top-level flow
    pub fn new(hub: Arc<ServiceHub>) -> Self {
        Self {
            hub,
            progress: ProgressTracker::new(),
            flow_id: Uuid::new_v4(),
        }
    }

    /// The shared service hub
    pub fn hub(&self) -> &ServiceHub {
        &self.hub
    }

    /// This node's identity
    pub fn me(&self) -> &Party {
        self.hub.me()
    }

    /// This flow's progress cursor
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Unique id of this flow instance
    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    /// Open a session to `peer` on `topic`: generate the session-id pair,
    /// register the receive side, and send the handshake.
    pub async fn initiate(&self, peer: &Party, topic: &Topic) -> FlowResult<PeerSession> {
        let inbound = SessionId::random();
        let outbound = SessionId::random();
        let rx = self.hub.router.register(topic.clone(), inbound);
        let handshake = Handshake {
            reply_to: self.me().clone(),
            send_session: outbound,
            receive_session: inbound,
        };
        let payload = bincode::serialize(&handshake).map_err(accord_core::AccordError::from)?;
        self.hub
            .network
            .deliver(Envelope {
                topic: topic.clone(),
                session: HANDSHAKE_SESSION,
                from: self.me().name.clone(),
                to: peer.name.clone(),
                payload,
            })
            .await?;
        debug!(flow = %self.flow_id, peer = %peer, topic = %topic, "session initiated");
        Ok(PeerSession {
            hub: Arc::clone(&self.hub),
            peer: peer.clone(),
            topic: topic.clone(),
            outbound,
            inbound,
            rx,
        })
    }

    /// Accept a session from a received handshake (service side).
    pub fn accept(&self, topic: &Topic, handshake: &Handshake) -> PeerSession {
        let rx = self
            .hub
            .router
            .register(topic.clone(), handshake.send_session);
        debug!(flow = %self.flow_id, peer = %handshake.reply_to, topic = %topic, "session accepted");
        PeerSession {
            hub: Arc::clone(&self.hub),
            peer: handshake.reply_to.clone(),
            topic: topic.clone(),
            outbound: handshake.receive_session,
            inbound: handshake.send_session,
            rx,
        }
    }

    /// Run a sub-flow to completion. The parent's progress cursor exposes
    /// the child's current step while it runs; the child's result or error
    /// comes back as an ordinary return value.
    pub async fn subflow<T, F, Fut>(&self, label: &str, f: F) -> FlowResult<T>
    where
        F: FnOnce(FlowCtx) -> Fut,
        Fut: Future<Output = FlowResult<T>>,
    {
        let child = FlowCtx {
            hub: Arc::clone(&self.hub),
            progress: ProgressTracker::new(),
            flow_id: self.flow_id,
        };
        child.progress.set_step(label);
        self.progress.push_child(&child.progress);
        let out = f(child).await;
        self.progress.pop_child();
        out
    }
}

/// An established point-to-point session with one counterparty.
///
/// Owns the receive half of the flow's inbox for this counterparty; dropping
/// the session unregisters it.
pub struct PeerSession {
    hub: Arc<ServiceHub>,
    peer: Party,
    topic: Topic,
    /// Tag for messages we send (the peer's inbox)
    outbound: SessionId,
    /// Our inbox id
    inbound: SessionId,
    rx: SessionReceiver,
}

impl PeerSession {
    /// The counterparty
    pub fn peer(&self) -> &Party {
        &self.peer
    }

    /// Our inbox session id
    pub fn inbound_id(&self) -> SessionId {
        self.inbound
    }

    /// Enqueue `msg` for delivery to the counterparty. Does not wait for a
    /// reply.
    pub async fn send<M: Serialize>(&self, msg: &M) -> FlowResult<()> {
        let payload = bincode::serialize(msg).map_err(accord_core::AccordError::from)?;
        self.hub
            .network
            .deliver(Envelope {
                topic: self.topic.clone(),
                session: self.outbound,
                from: self.hub.me().name.clone(),
                to: self.peer.name.clone(),
                payload,
            })
            .await
    }

    /// Suspend until the counterparty's next message arrives on this
    /// session. The payload comes back unvalidated; callers must unwrap it
    /// with a validator before trusting its contents.
    pub async fn receive<M: DeserializeOwned>(&mut self) -> FlowResult<UntrustworthyData<M>> {
        let envelope = self.rx.recv().await?;
        if envelope.from != self.peer.name {
            return Err(FlowError::violation(format!(
                "message on session {} from {} but session belongs to {}",
                self.inbound, envelope.from, self.peer.name
            )));
        }
        let msg: M = bincode::deserialize(&envelope.payload)
            .map_err(|e| FlowError::Malformed(e.to_string()))?;
        Ok(UntrustworthyData::new(msg))
    }

    /// [`PeerSession::send`] then [`PeerSession::receive`], as one
    /// suspension point.
    pub async fn send_and_receive<M, R>(&mut self, msg: &M) -> FlowResult<UntrustworthyData<R>>
    where
        M: Serialize,
        R: DeserializeOwned,
    {
        self.send(msg).await?;
        self.receive().await
    }
}

/// Handle to a running flow.
pub struct FlowHandle<T> {
    name: String,
    flow_id: Uuid,
    progress: ProgressTracker,
    join: JoinHandle<FlowResult<T>>,
}

impl<T> FlowHandle<T> {
    /// The flow's progress cursor
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Unique id of the flow instance
    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    /// Await the flow's terminal outcome
    pub async fn result(self) -> FlowResult<T> {
        match self.join.await {
            Ok(out) => out,
            Err(e) => Err(FlowError::Aborted(format!("{}: {e}", self.name))),
        }
    }
}

/// Handle to a registered service listener.
pub struct ServiceHandle {
    topic: Topic,
    join: JoinHandle<()>,
}

impl ServiceHandle {
    /// Topic the service listens on
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Stop accepting new handshakes (running flows are unaffected)
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Spawns and tracks flows for one node.
///
/// Each flow runs as its own task; an error or panic in one flow never
/// terminates its siblings.
pub struct FlowManager {
    hub: Arc<ServiceHub>,
}

impl FlowManager {
    /// Manager over the node's service hub
    pub fn new(hub: Arc<ServiceHub>) -> Self {
        Self { hub }
    }

    /// The node's service hub
    pub fn hub(&self) -> &Arc<ServiceHub> {
        &self.hub
    }

    /// Start a top-level flow and return a handle to its outcome.
    pub fn start<T, F, Fut>(&self, name: impl Into<String>, f: F) -> FlowHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(FlowCtx) -> Fut,
        Fut: Future<Output = FlowResult<T>> + Send + 'static,
    {
        let name = name.into();
        let ctx = FlowCtx::new(Arc::clone(&self.hub));
        let flow_id = ctx.flow_id;
        let progress = ctx.progress.clone();
        debug!(flow = %flow_id, name = %name, "flow started");
        let log_name = name.clone();
        let fut = f(ctx);
        let join = tokio::spawn(async move {
            let out = fut.await;
            match &out {
                Ok(_) => debug!(flow = %flow_id, name = %log_name, "flow completed"),
                Err(e) => warn!(flow = %flow_id, name = %log_name, error = %e, "flow failed"),
            }
            out
        });
        FlowHandle {
            name,
            flow_id,
            progress,
            join,
        }
    }

    /// Register a service: a listener on `(topic, HANDSHAKE_SESSION)` that
    /// spawns `handler` as a fresh flow for every arriving handshake.
    pub fn register_service<F, Fut>(&self, topic: Topic, handler: F) -> ServiceHandle
    where
        F: Fn(FlowCtx, Handshake) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<()>> + Send + 'static,
    {
        let mut rx = self.hub.router.register(topic.clone(), HANDSHAKE_SESSION);
        let hub = Arc::clone(&self.hub);
        let listen_topic = topic.clone();
        let join = tokio::spawn(async move {
            loop {
                let envelope = match rx.recv().await {
                    Ok(envelope) => envelope,
                    Err(_) => break,
                };
                let handshake: Handshake = match bincode::deserialize(&envelope.payload) {
                    Ok(handshake) => handshake,
                    Err(e) => {
                        warn!(topic = %listen_topic, error = %e, "dropping malformed handshake");
                        continue;
                    }
                };
                let ctx = FlowCtx::new(Arc::clone(&hub));
                let flow_id = ctx.flow_id;
                let fut = handler(ctx, handshake);
                let flow_topic = listen_topic.clone();
                tokio::spawn(async move {
                    if let Err(e) = fut.await {
                        warn!(flow = %flow_id, topic = %flow_topic, error = %e, "service flow failed");
                    }
                });
            }
        });
        ServiceHandle { topic, join }
    }
}
