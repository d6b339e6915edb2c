//! Flow-level error taxonomy.

use accord_core::{AccordError, NotaryError, PartyName, StateReplacementRefused};

/// Result alias for flow bodies and suspension primitives.
pub type FlowResult<T> = std::result::Result<T, FlowError>;

/// Terminal failure of a flow.
///
/// Typed refusals (`Notary`, `Refused`) are expected outcomes the caller can
/// pattern-match on; the rest are communication or runtime failures with no
/// automatic retry at this layer.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The underlying session closed before a reply arrived
    #[error("session closed before a reply arrived")]
    SessionClosed,

    /// The counterparty is not reachable through the session layer
    #[error("peer unreachable: {0}")]
    Unreachable(PartyName),

    /// A received message could not be decoded as the expected type
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The counterparty broke the protocol contract (e.g. a signature over
    /// the wrong bytes)
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The notary declined to sign
    #[error("notary refused: {0}")]
    Notary(#[from] NotaryError),

    /// A replacement participant declined to sign
    #[error(transparent)]
    Refused(#[from] StateReplacementRefused),

    /// Failure in the ledger model underneath the protocol
    #[error(transparent)]
    Core(#[from] AccordError),

    /// The flow task panicked or was cancelled
    #[error("flow aborted: {0}")]
    Aborted(String),
}

impl FlowError {
    /// Shorthand for a protocol violation
    pub fn violation(detail: impl Into<String>) -> Self {
        Self::ProtocolViolation(detail.into())
    }
}
