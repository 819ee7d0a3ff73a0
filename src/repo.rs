//! Locked keyed repository.
//!
//! Composes a keyed values collection with [`PessimisticLock`] so callers
//! can run read-modify-write cycles without losing updates: acquire and
//! read in one step, write and release in another. Unlocked passthrough
//! operations exist for callers managing their own coordination.
//!
//! Each repository instance owns one generated token, so ownership is
//! instance-scoped: threads sharing an instance act as one owner, while a
//! second instance (or process) is a distinct contender.

use crate::error::{CorralError, Result};
use crate::lock::{PessimisticLock, Wait};
use crate::store::DocumentStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// On-store record envelope: the value plus its write stamp.
///
/// The stamp is what makes unlocked write races detectable: a record
/// written after a lock acquisition cannot have been covered by it.
#[derive(Debug, Serialize, Deserialize)]
struct RepoRecord<T> {
    value: T,
    written_at: DateTime<Utc>,
}

/// Keyed repository of serializable values, guarded by a pessimistic lock
/// sharing the record keys.
pub struct PessimisticRepo<T, S> {
    store: Arc<S>,
    collection: String,
    lock: PessimisticLock<S>,
    token: String,
    _values: PhantomData<fn() -> T>,
}

impl<T, S> PessimisticRepo<T, S>
where
    T: Serialize + DeserializeOwned,
    S: DocumentStore,
{
    /// Create a repository over `collection`, with claim documents kept in
    /// a sibling `<collection>.locks` collection.
    pub fn new(store: Arc<S>, collection: impl Into<String>) -> Self {
        let collection = collection.into();
        let lock = PessimisticLock::new(Arc::clone(&store))
            .with_collection(format!("{collection}.locks"));
        Self {
            store,
            collection,
            lock,
            token: Uuid::new_v4().to_string(),
            _values: PhantomData,
        }
    }

    /// Replace the underlying lock, e.g. to tune its retry interval or
    /// share a locks collection across repositories.
    pub fn with_lock(mut self, lock: PessimisticLock<S>) -> Self {
        self.lock = lock;
        self
    }

    /// Acquire the lock on `key`, then read the current value.
    ///
    /// Propagates [`CorralError::LockWaitTimeout`] on deadline expiry. If
    /// an unlocked write landed between acquisition and the read, fails
    /// with [`CorralError::ConcurrentReadWrite`]; the lock stays held so
    /// the caller can re-read and retry.
    pub fn try_lock_and_get(&self, key: &str, wait: Wait) -> Result<Option<T>> {
        self.lock.try_lock(key, &self.token, wait)?;
        let acquired_at = Utc::now();
        match self.record(key)? {
            None => Ok(None),
            Some(record) if record.written_at > acquired_at => {
                Err(CorralError::ConcurrentReadWrite {
                    key: key.to_string(),
                })
            }
            Some(record) => Ok(Some(record.value)),
        }
    }

    /// Write `value` under `key` and release the lock as one logical step.
    ///
    /// Requires that this instance already holds the key, else fails with
    /// [`CorralError::InvalidLockOwner`]. Release is attempted even when
    /// the write fails, so the key is never left stranded locked.
    pub fn put_and_unlock(&self, key: &str, value: &T) -> Result<()> {
        self.ensure_owned(key)?;
        let write = self.put(key, value);
        let release = self.lock.unlock(key, &self.token);
        write?;
        release
    }

    /// Delete `key` and release the lock as one logical step.
    ///
    /// Same ownership and release discipline as [`Self::put_and_unlock`].
    pub fn remove_and_unlock(&self, key: &str) -> Result<()> {
        self.ensure_owned(key)?;
        let delete = self.remove(key);
        let release = self.lock.unlock(key, &self.token);
        delete?;
        release
    }

    /// Unlocked write.
    pub fn put(&self, key: &str, value: &T) -> Result<()> {
        let doc = serde_json::to_value(RepoRecord {
            value,
            written_at: Utc::now(),
        })?;
        self.store.put(&self.collection, key, doc)?;
        Ok(())
    }

    /// Unlocked read.
    pub fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.record(key)?.map(|record| record.value))
    }

    /// Unlocked delete.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(&self.collection, key)?;
        Ok(())
    }

    /// Point-in-time snapshot of the present keys, not linearized against
    /// concurrent writers.
    pub fn key_set(&self) -> Result<Vec<String>> {
        Ok(self.store.keys(&self.collection)?)
    }

    /// The underlying lock, for callers coordinating beyond the repo
    /// operations.
    pub fn lock(&self) -> &PessimisticLock<S> {
        &self.lock
    }

    /// This instance's ownership token.
    pub fn token(&self) -> &str {
        &self.token
    }

    fn ensure_owned(&self, key: &str) -> Result<()> {
        if self.lock.is_locked_by_me(key, &self.token)? {
            return Ok(());
        }
        Err(CorralError::InvalidLockOwner {
            key: key.to_string(),
            reason: format!("repository token '{}' does not hold the key", self.token),
        })
    }

    fn record(&self, key: &str) -> Result<Option<RepoRecord<T>>> {
        match self.store.get(&self.collection, key)? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }
}
