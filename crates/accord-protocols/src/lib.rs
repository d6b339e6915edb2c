//! # Accord Protocols - the agreement protocol family
//!
//! Thin concrete protocols built on two reusable patterns:
//!
//! - the **generic state-replacement protocol** ([`replace`]): one
//!   Instigator proposes replacing exactly one ledger state with a modified
//!   version; every participant of the original state verifies and signs, the
//!   notary commits, and the full signature set is distributed back.
//! - the **two-party deal** ([`deal`]): a Primary/Secondary exchange where
//!   the Secondary proposes a partially-signed transaction and the Primary
//!   verifies, signs and notarises it.
//!
//! Concrete instances: [`notary_change`], [`finality`] broadcast, and the
//! [`rate_fix`] deal whose request carries an explicit deadline (timeout
//! policy lives in the payload, never in the runtime).

pub mod deal;
pub mod finality;
pub mod messages;
pub mod notary_change;
pub mod rate_fix;
pub mod replace;

pub use deal::{instigate_deal, register_deal_responder, Deal, DealResult};
pub use finality::{finalise, register_finality_recipient, finality_topic};
pub use messages::{AcceptorResult, FinalSignatureSet, Proposal};
pub use notary_change::{change_notary, register_notary_change_acceptor, NotaryChange};
pub use rate_fix::{FixRequest, RateFixDeal};
pub use replace::{instigate, register_acceptor, ReplacementScheme};
