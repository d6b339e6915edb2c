//! # Accord Notary - uniqueness consensus service
//!
//! The platform's only true consensus point: a trusted service that
//! atomically commits a transaction's input state references and detects
//! double spends. For any `StateRef` the uniqueness ledger holds at most one
//! consuming transaction id for the lifetime of the network, under arbitrary
//! interleavings of concurrent commit requests.
//!
//! Two roles:
//! - [`service::NotaryService`] runs at the notary: time-window gate,
//!   optional full validation, atomic commit, signed conflict evidence.
//! - [`client::notarise`] runs as a sub-flow at the requester and verifies
//!   everything the notary sends back.

pub mod client;
pub mod messages;
pub mod service;
pub mod uniqueness;

pub use client::notarise;
pub use messages::{notary_topic, NotaryResponse, SignRequest, NOTARY_TOPIC};
pub use service::NotaryService;
pub use uniqueness::{InMemoryUniquenessProvider, UniquenessProvider};
