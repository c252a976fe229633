//! Record access for the memory map
//!
//! Query negotiation against a document store whose indexes may still be
//! building, and live record streams fed by store subscriptions.

pub mod negotiation;
pub mod query;
pub mod sources;
pub mod store;
pub mod stream;

use thiserror::Error;

// Re-exports
pub use negotiation::{
    Negotiation, NegotiationError, ProbeAttempt, QueryNegotiator, QueryPlan, QueryTarget, QueryTier,
};
pub use query::{Direction, FieldValue, Filter, FilterOp, OrderBy, Query, QueryShape};
pub use sources::MemoryStore;
pub use store::{DocumentStore, ListenerRegistration, SnapshotListener};
pub use stream::{RecordStream, StreamCloser, StreamError};

/// Failures reported by a document store
///
/// Raw backend codes are classified once, when they enter the crate, so no
/// caller has to inspect codes again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Missing index: {0}")]
    MissingIndex(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store error ({code}): {message}")]
    Other { code: String, message: String },
}

/// How a store failure may be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A server-side capability is missing; a coarser query may work
    Degradable,
    /// A recognised fault of the data or of the caller
    NonDegradable,
    /// Anything the classification does not know
    Other,
}

impl StoreError {
    /// Classify a raw backend error code
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "failed-precondition" => StoreError::MissingIndex(message),
            "permission-denied" | "unauthenticated" => StoreError::PermissionDenied(message),
            "unavailable" | "deadline-exceeded" => StoreError::Unavailable(message),
            "invalid-argument" => StoreError::InvalidQuery(message),
            other => StoreError::Other {
                code: other.to_string(),
                message,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::MissingIndex(_) => ErrorKind::Degradable,
            StoreError::PermissionDenied(_)
            | StoreError::Unavailable(_)
            | StoreError::InvalidQuery(_) => ErrorKind::NonDegradable,
            StoreError::Other { .. } => ErrorKind::Other,
        }
    }

    pub fn is_degradable(&self) -> bool {
        self.kind() == ErrorKind::Degradable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_failed_precondition_is_degradable() {
        assert!(StoreError::from_code("failed-precondition", "index building").is_degradable());

        for code in ["permission-denied", "unavailable", "invalid-argument", "aborted"] {
            let err = StoreError::from_code(code, "boom");
            assert!(!err.is_degradable(), "{} must not degrade", code);
        }
    }

    #[test]
    fn test_unknown_codes_are_other() {
        let err = StoreError::from_code("resource-exhausted", "quota");
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.to_string(), "Store error (resource-exhausted): quota");
    }
}
