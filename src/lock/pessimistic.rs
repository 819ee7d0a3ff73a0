//! The core mutual-exclusion primitive.

use super::document::LockDocument;
use crate::clock::{Clock, SystemClock};
use crate::error::{CorralError, Result};
use crate::store::DocumentStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Field of [`LockDocument`] that conditional updates are predicated on.
pub const OWNER_FIELD: &str = "owner";

/// Collection holding claim documents unless overridden.
pub const DEFAULT_LOCKS_COLLECTION: &str = "corral.locks";

/// Sleep between failed claim attempts. Small enough to bound acquisition
/// latency, large enough not to hammer the store.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// How long an acquisition may wait for a contended key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// One non-blocking claim attempt.
    None,
    /// Retry until the given duration has elapsed.
    For(Duration),
    /// Retry indefinitely.
    Forever,
}

impl Wait {
    /// Millisecond mapping for callers porting timeout-valued APIs:
    /// `0` is a single attempt, `u64::MAX` waits indefinitely.
    pub fn from_millis(timeout_ms: u64) -> Self {
        match timeout_ms {
            0 => Wait::None,
            u64::MAX => Wait::Forever,
            ms => Wait::For(Duration::from_millis(ms)),
        }
    }
}

/// Mutual exclusion over arbitrary string keys, arbitrated entirely by the
/// store. Holds no authoritative in-process state, so it survives process
/// restarts: whoever the store says owns the key, owns the key.
pub struct PessimisticLock<S> {
    store: Arc<S>,
    collection: String,
    retry_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for PessimisticLock<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
            retry_interval: self.retry_interval,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: DocumentStore> PessimisticLock<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            collection: DEFAULT_LOCKS_COLLECTION.to_string(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different collection for claim documents.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Override the sleep between failed claim attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Inject a time source (tests use a virtual clock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Claim `key` for `token`, retrying on a bounded backoff within `wait`.
    ///
    /// Exactly one contender wins any given claim; there is no fairness
    /// ordering among waiters. A token that already holds the key re-claims
    /// it immediately, refreshing the acquisition stamp. Deadline expiry
    /// fails with [`CorralError::LockWaitTimeout`], which the caller may
    /// retry.
    pub fn try_lock(&self, key: &str, token: &str, wait: Wait) -> Result<()> {
        let started = self.clock.now();
        let deadline = match wait {
            Wait::For(limit) => Some(started + limit),
            Wait::None | Wait::Forever => None,
        };
        loop {
            if self.claim(key, token)? {
                return Ok(());
            }
            if matches!(wait, Wait::None) {
                return Err(self.wait_timeout(key, started));
            }
            self.clock.sleep(self.retry_interval);
            if let Some(deadline) = deadline
                && self.clock.now() >= deadline
            {
                return Err(self.wait_timeout(key, started));
            }
        }
    }

    /// Release `key`, but only if `token` is the recorded owner.
    ///
    /// Releasing a key that is free, or held by someone else, fails with
    /// [`CorralError::InvalidLockOwner`] and leaves the lock state
    /// unchanged.
    pub fn unlock(&self, key: &str, token: &str) -> Result<()> {
        let owner = Value::String(token.to_string());
        if self
            .store
            .remove_if(&self.collection, key, OWNER_FIELD, &owner)?
        {
            return Ok(());
        }
        let reason = match self.owner_of(key)? {
            Some(current) => format!("held by '{current}', not by '{token}'"),
            None => "not locked".to_string(),
        };
        Err(CorralError::InvalidLockOwner {
            key: key.to_string(),
            reason,
        })
    }

    /// Non-blocking ownership probe. No side effects.
    pub fn is_locked_by_me(&self, key: &str, token: &str) -> Result<bool> {
        Ok(self.owner_of(key)?.as_deref() == Some(token))
    }

    /// Whether any token currently holds `key`.
    pub fn is_locked(&self, key: &str) -> Result<bool> {
        Ok(self.owner_of(key)?.is_some())
    }

    /// Token currently recorded as the owner of `key`, if any.
    pub fn owner_of(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.get(&self.collection, key)?.and_then(|doc| {
            doc.get(OWNER_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string)
        }))
    }

    /// Unconditionally clear `key`, regardless of owner.
    ///
    /// This is the manual recovery path for holders that crashed without
    /// unlocking; there is no automatic lease expiry. Clearing a free key
    /// is a no-op.
    pub fn force_unlock(&self, key: &str) -> Result<()> {
        if let Some(owner) = self.owner_of(key)? {
            warn!(key, owner = %owner, "forcibly clearing lock");
            self.store.remove(&self.collection, key)?;
        }
        Ok(())
    }

    /// One claim attempt: insert a fresh claim document if the key is free,
    /// or refresh it if this token already owns the key.
    fn claim(&self, key: &str, token: &str) -> Result<bool> {
        let doc = serde_json::to_value(LockDocument::new(token))?;
        if self
            .store
            .insert_if_absent(&self.collection, key, doc.clone())?
        {
            return Ok(true);
        }
        let owner = Value::String(token.to_string());
        Ok(self
            .store
            .replace_if(&self.collection, key, OWNER_FIELD, &owner, doc)?)
    }

    fn wait_timeout(&self, key: &str, started: Instant) -> CorralError {
        let waited = self.clock.now().duration_since(started);
        CorralError::LockWaitTimeout {
            key: key.to_string(),
            waited_ms: waited.as_millis() as u64,
        }
    }
}
