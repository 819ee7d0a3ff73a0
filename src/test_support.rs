//! Shared helpers for unit tests: a virtual clock and a fault-injecting
//! store wrapper.

use crate::clock::Clock;
use crate::store::{DocumentStore, MemoryStore, StoreError, TailCursor};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A clock whose time only advances when something sleeps on it.
///
/// Lets lock-timeout tests simulate long waits without wall-clock delays.
pub(crate) struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        })
    }

    /// Total virtual time spent sleeping.
    pub(crate) fn slept(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }

    fn sleep(&self, dur: Duration) {
        *self.offset.lock().unwrap() += dur;
    }
}

/// A [`MemoryStore`] wrapper that injects transient cursor faults.
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    tail_failures: AtomicUsize,
    advance_failures: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            tail_failures: AtomicUsize::new(0),
            advance_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the next `n` cursor opens with a connection loss.
    pub(crate) fn fail_tail_opens(&self, n: usize) {
        self.tail_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` cursor advances with a connection loss.
    pub(crate) fn fail_next_advances(&self, n: usize) {
        self.advance_failures.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl DocumentStore for FlakyStore {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(collection, key)
    }

    fn put(&self, collection: &str, key: &str, doc: Value) -> Result<(), StoreError> {
        self.inner.put(collection, key, doc)
    }

    fn remove(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.inner.remove(collection, key)
    }

    fn keys(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys(collection)
    }

    fn insert_if_absent(
        &self,
        collection: &str,
        key: &str,
        doc: Value,
    ) -> Result<bool, StoreError> {
        self.inner.insert_if_absent(collection, key, doc)
    }

    fn replace_if(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        expected: &Value,
        doc: Value,
    ) -> Result<bool, StoreError> {
        self.inner.replace_if(collection, key, field, expected, doc)
    }

    fn remove_if(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        expected: &Value,
    ) -> Result<bool, StoreError> {
        self.inner.remove_if(collection, key, field, expected)
    }

    fn create_capped(
        &self,
        collection: &str,
        max_entries: u64,
        max_bytes: u64,
    ) -> Result<(), StoreError> {
        self.inner.create_capped(collection, max_entries, max_bytes)
    }

    fn exists(&self, collection: &str) -> Result<bool, StoreError> {
        self.inner.exists(collection)
    }

    fn append(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        self.inner.append(collection, doc)
    }

    fn count(&self, collection: &str) -> Result<u64, StoreError> {
        self.inner.count(collection)
    }

    fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.inner.drop_collection(collection)
    }

    fn tail(
        &self,
        collection: &str,
        after: Option<u64>,
        await_timeout: Duration,
    ) -> Result<Box<dyn TailCursor>, StoreError> {
        if Self::take_failure(&self.tail_failures) {
            return Err(StoreError::ConnectionLost("injected tail failure".to_string()));
        }
        let inner = self.inner.tail(collection, after, await_timeout)?;
        Ok(Box::new(FlakyCursor {
            inner,
            failures: Arc::clone(&self.advance_failures),
        }))
    }
}

struct FlakyCursor {
    inner: Box<dyn TailCursor>,
    failures: Arc<AtomicUsize>,
}

impl TailCursor for FlakyCursor {
    fn advance(&mut self) -> Result<Option<(u64, Value)>, StoreError> {
        if FlakyStore::take_failure(&self.failures) {
            return Err(StoreError::ConnectionLost("injected cursor failure".to_string()));
        }
        self.inner.advance()
    }
}
