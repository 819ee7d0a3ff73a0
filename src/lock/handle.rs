//! Conventional per-key lock handle.

use super::pessimistic::{PessimisticLock, Wait};
use crate::error::{CorralError, Result};
use crate::store::DocumentStore;
use std::time::Duration;
use uuid::Uuid;

/// A mutex-style handle over one lock key, owned by a token generated at
/// construction.
///
/// Ownership is scoped to the handle instance, not to any thread: whichever
/// thread calls through the same handle acts as the same owner. The
/// capability set is deliberately narrow: bounded, unbounded and
/// non-blocking acquisition, release, and an ownership probe. Interruptible
/// waits and condition variables are not offered at all: acquisition is a
/// poll/retry loop against the store, not an OS-level wait that could be
/// interrupted or signalled.
pub struct KeyLock<S> {
    lock: PessimisticLock<S>,
    key: String,
    token: String,
}

impl<S: DocumentStore> KeyLock<S> {
    /// Bind a handle to `key` with a freshly generated ownership token.
    pub fn new(lock: PessimisticLock<S>, key: impl Into<String>) -> Self {
        Self {
            lock,
            key: key.into(),
            token: Uuid::new_v4().to_string(),
        }
    }

    /// The key this handle guards.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// This handle's ownership token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Acquire, waiting indefinitely.
    pub fn lock(&self) -> Result<()> {
        self.lock.try_lock(&self.key, &self.token, Wait::Forever)
    }

    /// One non-blocking acquisition attempt.
    pub fn try_lock(&self) -> Result<bool> {
        self.acquired(Wait::None)
    }

    /// Acquire, waiting at most `limit`.
    pub fn try_lock_for(&self, limit: Duration) -> Result<bool> {
        self.acquired(Wait::For(limit))
    }

    /// Release the key held by this handle.
    pub fn unlock(&self) -> Result<()> {
        self.lock.unlock(&self.key, &self.token)
    }

    /// Whether this handle currently holds its key.
    pub fn is_held_by_me(&self) -> Result<bool> {
        self.lock.is_locked_by_me(&self.key, &self.token)
    }

    fn acquired(&self, wait: Wait) -> Result<bool> {
        match self.lock.try_lock(&self.key, &self.token, wait) {
            Ok(()) => Ok(true),
            Err(CorralError::LockWaitTimeout { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
