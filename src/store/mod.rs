//! Document store boundary.
//!
//! The store is the sole arbiter of mutual exclusion: the only concurrency
//! primitive it exposes is an atomic conditional update on a single keyed
//! document. On top of that it offers capacity-capped collections with
//! oldest-first eviction and a blocking, order-preserving tail cursor.
//!
//! Everything in this crate talks to the store through [`DocumentStore`];
//! [`MemoryStore`] is the in-process reference implementation used for
//! embedding and tests.

mod memory;


pub use memory::MemoryStore;

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors raised at the store boundary.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The connection to the store was lost. Transient; callers holding a
    /// cursor are expected to resubscribe.
    #[error("connection to the store was lost: {0}")]
    ConnectionLost(String),

    /// The named collection does not exist (or was dropped).
    #[error("no such collection '{0}'")]
    MissingCollection(String),

    /// Creation was requested for a collection that already exists.
    #[error("collection '{0}' already exists")]
    AlreadyExists(String),
}

/// Atomic conditional updates, capped collections and tail cursors.
///
/// Keyed collections are created implicitly on first write, the way
/// document stores usually behave. Capped collections must be created
/// explicitly so their bounds are fixed up front.
pub trait DocumentStore: Send + Sync {
    /// Read the document stored under `key`, if any.
    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Store `doc` under `key`, replacing any existing document.
    fn put(&self, collection: &str, key: &str, doc: Value) -> Result<(), StoreError>;

    /// Delete the document under `key`. Deleting an absent key is a no-op.
    fn remove(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    /// Snapshot of the keys currently present in `collection`.
    fn keys(&self, collection: &str) -> Result<Vec<String>, StoreError>;

    /// Atomically store `doc` under `key` only if no document is there.
    ///
    /// Returns whether the insert happened. This is the claim half of the
    /// store's compare-and-set primitive.
    fn insert_if_absent(&self, collection: &str, key: &str, doc: Value)
    -> Result<bool, StoreError>;

    /// Atomically replace the document under `key` only if its `field`
    /// currently equals `expected`. Returns whether the replace happened.
    fn replace_if(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        expected: &Value,
        doc: Value,
    ) -> Result<bool, StoreError>;

    /// Atomically delete the document under `key` only if its `field`
    /// currently equals `expected`. Returns whether the delete happened.
    fn remove_if(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        expected: &Value,
    ) -> Result<bool, StoreError>;

    /// Create a capped collection bounded by `max_entries` documents and
    /// approximately `max_bytes` of serialized payload. Oldest entries are
    /// evicted once either bound is exceeded.
    fn create_capped(
        &self,
        collection: &str,
        max_entries: u64,
        max_bytes: u64,
    ) -> Result<(), StoreError>;

    /// Whether a collection with this name exists.
    fn exists(&self, collection: &str) -> Result<bool, StoreError>;

    /// Append `doc` to a capped collection. Never blocks on consumers.
    fn append(&self, collection: &str, doc: Value) -> Result<(), StoreError>;

    /// Approximate number of entries currently in a capped collection.
    fn count(&self, collection: &str) -> Result<u64, StoreError>;

    /// Irreversibly delete a collection, waking any blocked cursors.
    fn drop_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Open a blocking cursor over a capped collection.
    ///
    /// Entries are yielded in insertion order with their sequence numbers.
    /// With `after` set, delivery resumes past that sequence; entries
    /// evicted in the meantime are skipped. `await_timeout` bounds how long
    /// a single [`TailCursor::advance`] call may block.
    fn tail(
        &self,
        collection: &str,
        after: Option<u64>,
        await_timeout: Duration,
    ) -> Result<Box<dyn TailCursor>, StoreError>;
}

/// A blocking, order-preserving cursor over a capped collection.
pub trait TailCursor: Send {
    /// Block until the next entry arrives, the await timeout elapses, or
    /// the store fails.
    ///
    /// Returns `Ok(Some((sequence, doc)))` on data, `Ok(None)` when the
    /// await timeout elapsed with nothing new, and `Err` on a store fault,
    /// after which the cursor is dead and must be reopened.
    fn advance(&mut self) -> Result<Option<(u64, Value)>, StoreError>;
}
