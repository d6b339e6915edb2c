//! # Accord Testing Infrastructure
//!
//! Common fixtures for protocol tests: deterministic identities, an
//! in-memory multi-node network, permissive/rejecting contract verifiers,
//! and transaction builders.
//!
//! Add to a crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! accord-testkit = { path = "../accord-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod assertions;
pub mod fixtures;
pub mod net;
pub mod services;

pub use assertions::{await_recorded, settle};
pub use fixtures::{issuance_tx, move_tx};
pub use net::{TestNet, TestNode};
pub use services::{AcceptAllVerifier, RejectingVerifier, TestDirectory, UniverseResolver};
