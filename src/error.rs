//! Error types for corral.
//!
//! Uses thiserror for derive macros. The taxonomy separates expected
//! contention (retriable by the caller) from contract violations that must
//! never be swallowed.

use crate::store::StoreError;
use thiserror::Error;

/// Main error type for corral operations.
#[derive(Error, Debug)]
pub enum CorralError {
    /// The lock on `key` could not be acquired before the deadline.
    ///
    /// Expected under contention; the caller may retry.
    #[error("timed out after {waited_ms} ms waiting for lock on '{key}'")]
    LockWaitTimeout { key: String, waited_ms: u64 },

    /// A release or locked write was attempted by a token that does not
    /// hold the key. A contract violation, surfaced unchanged.
    #[error("invalid lock owner for '{key}': {reason}")]
    InvalidLockOwner { key: String, reason: String },

    /// An unlocked write raced a locked read. The caller should re-read
    /// and retry.
    #[error("concurrent unlocked write detected on '{key}'")]
    ConcurrentReadWrite { key: String },

    /// The document store failed.
    #[error("document store failure: {0}")]
    Store(#[from] StoreError),

    /// A value could not be serialized or deserialized.
    #[error("failed to encode or decode value: {0}")]
    Codec(#[from] serde_json::Error),
}

impl CorralError {
    /// Whether the caller can reasonably retry the failed operation.
    ///
    /// Contention and write races are part of normal operation; ownership
    /// violations and codec failures indicate a bug in the caller.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            CorralError::LockWaitTimeout { .. } | CorralError::ConcurrentReadWrite { .. }
        )
    }
}

/// Result type alias for corral operations.
pub type Result<T> = std::result::Result<T, CorralError>;
