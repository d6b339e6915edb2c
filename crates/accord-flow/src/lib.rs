//! # Accord Flow - cooperative protocol runtime
//!
//! Executes a Flow (one running instance of a multi-party protocol) as a
//! single logical thread that suspends at exactly three primitives: `send`,
//! `receive` and `send_and_receive`. Many flows run concurrently, each as its
//! own tokio task; a suspended flow holds nothing but its captured locals and
//! is woken only by delivery of a message matching its `(topic, session)`
//! pair.
//!
//! ## Architecture
//!
//! - **session**: topics, 63-bit session ids, envelopes, and the
//!   [`SessionRouter`] that demultiplexes inbound messages to waiting flows
//! - **memory**: in-memory [`SessionLayer`] connecting routers in-process
//! - **handshake**: the session-establishment message exchanged before
//!   substantive traffic
//! - **runtime**: [`ServiceHub`], [`FlowCtx`] with the suspension
//!   primitives, [`FlowManager`] and failure isolation
//! - **progress**: hierarchical named progress cursors (observability only)

pub mod error;
pub mod handshake;
pub mod memory;
pub mod progress;
pub mod runtime;
pub mod session;

pub use error::{FlowError, FlowResult};
pub use handshake::{Handshake, HANDSHAKE_SESSION};
pub use memory::InMemoryNetwork;
pub use progress::ProgressTracker;
pub use runtime::{
    FlowCtx, FlowHandle, FlowManager, NodeIdentity, PeerSession, ServiceHandle, ServiceHub,
};
pub use session::{Envelope, SessionId, SessionLayer, SessionReceiver, SessionRouter, Topic};
