//! Unified error type for core ledger operations.

use serde::{Deserialize, Serialize};

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, AccordError>;

/// Unified error type for ledger-model operations.
///
/// Protocol-level failures (notary refusals, replacement refusals) have their
/// own typed representations in [`crate::notary`]; this enum covers the
/// mechanical failures underneath them.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AccordError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Description of the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was not found
        message: String,
    },

    /// Cryptographic operation failed
    #[error("Crypto error: {message}")]
    Crypto {
        /// Description of the cryptographic failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure
        message: String,
    },

    /// Transaction store operation failed
    #[error("Store error: {message}")]
    Store {
        /// Description of the storage failure
        message: String,
    },

    /// Contract verification failed
    #[error("Verification failed: {message}")]
    Verification {
        /// Description of the verification failure
        message: String,
    },
}

impl AccordError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a verification error
    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification {
            message: message.into(),
        }
    }
}

impl From<bincode::Error> for AccordError {
    fn from(e: bincode::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
