//! Session establishment.
//!
//! Before the substantive exchange, the initiating flow sends a [`Handshake`]
//! on the protocol topic's well-known handshake session so the counterparty
//! can address replies. Both session ids are freshly generated random 63-bit
//! values; no coordination is needed to avoid collisions.

use crate::session::SessionId;
use accord_core::Party;
use serde::{Deserialize, Serialize};

/// Well-known session id on which service flows listen for handshakes.
pub const HANDSHAKE_SESSION: SessionId = SessionId(0);

/// First message of a protocol instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    /// Identity replies should be addressed to
    pub reply_to: Party,
    /// Session id the initiator will tag its subsequent sends with; the
    /// counterparty registers this as its inbox
    pub send_session: SessionId,
    /// The initiator's inbox; the counterparty tags replies with it
    pub receive_session: SessionId,
}
