//! In-memory reference implementation of the store contract.
//!
//! Keyed collections are plain maps behind a mutex. Capped collections keep
//! a sequence-numbered deque with approximate byte accounting; a condvar
//! wakes blocked tail cursors on append and on drop.

use super::{DocumentStore, StoreError, TailCursor};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// In-process [`DocumentStore`]. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    keyed: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    capped: Mutex<HashMap<String, Arc<CappedCollection>>>,
}

struct CappedCollection {
    name: String,
    max_entries: u64,
    max_bytes: u64,
    state: Mutex<CappedState>,
    new_entries: Condvar,
}

#[derive(Default)]
struct CappedState {
    /// (sequence, approximate serialized size, document), oldest first.
    entries: VecDeque<(u64, u64, Value)>,
    next_seq: u64,
    total_bytes: u64,
    dropped: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn keyed(&self) -> MutexGuard<'_, HashMap<String, BTreeMap<String, Value>>> {
        self.inner
            .keyed
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn capped(&self) -> MutexGuard<'_, HashMap<String, Arc<CappedCollection>>> {
        self.inner
            .capped
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn capped_collection(&self, name: &str) -> Result<Arc<CappedCollection>, StoreError> {
        self.capped()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::MissingCollection(name.to_string()))
    }
}

impl CappedCollection {
    fn state(&self) -> MutexGuard<'_, CappedState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .keyed()
            .get(collection)
            .and_then(|docs| docs.get(key).cloned()))
    }

    fn put(&self, collection: &str, key: &str, doc: Value) -> Result<(), StoreError> {
        self.keyed()
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), doc);
        Ok(())
    }

    fn remove(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        if let Some(docs) = self.keyed().get_mut(collection) {
            docs.remove(key);
        }
        Ok(())
    }

    fn keys(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .keyed()
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn insert_if_absent(
        &self,
        collection: &str,
        key: &str,
        doc: Value,
    ) -> Result<bool, StoreError> {
        let mut keyed = self.keyed();
        let docs = keyed.entry(collection.to_string()).or_default();
        if docs.contains_key(key) {
            return Ok(false);
        }
        docs.insert(key.to_string(), doc);
        Ok(true)
    }

    fn replace_if(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        expected: &Value,
        doc: Value,
    ) -> Result<bool, StoreError> {
        let mut keyed = self.keyed();
        let Some(docs) = keyed.get_mut(collection) else {
            return Ok(false);
        };
        match docs.get(key) {
            Some(current) if current.get(field) == Some(expected) => {
                docs.insert(key.to_string(), doc);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn remove_if(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        expected: &Value,
    ) -> Result<bool, StoreError> {
        let mut keyed = self.keyed();
        let Some(docs) = keyed.get_mut(collection) else {
            return Ok(false);
        };
        match docs.get(key) {
            Some(current) if current.get(field) == Some(expected) => {
                docs.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn create_capped(
        &self,
        collection: &str,
        max_entries: u64,
        max_bytes: u64,
    ) -> Result<(), StoreError> {
        let mut capped = self.capped();
        if capped.contains_key(collection) {
            return Err(StoreError::AlreadyExists(collection.to_string()));
        }
        capped.insert(
            collection.to_string(),
            Arc::new(CappedCollection {
                name: collection.to_string(),
                max_entries,
                max_bytes,
                state: Mutex::new(CappedState::default()),
                new_entries: Condvar::new(),
            }),
        );
        Ok(())
    }

    fn exists(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.capped().contains_key(collection) || self.keyed().contains_key(collection))
    }

    fn append(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        let coll = self.capped_collection(collection)?;
        let size = serde_json::to_vec(&doc).map(|bytes| bytes.len() as u64).unwrap_or(0);
        let mut state = coll.state();
        if state.dropped {
            return Err(StoreError::MissingCollection(collection.to_string()));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.total_bytes += size;
        state.entries.push_back((seq, size, doc));
        // Oldest-first eviction once either bound is exceeded.
        while state.entries.len() as u64 > coll.max_entries || state.total_bytes > coll.max_bytes {
            match state.entries.pop_front() {
                Some((_, evicted, _)) => state.total_bytes -= evicted,
                None => break,
            }
        }
        coll.new_entries.notify_all();
        Ok(())
    }

    fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let coll = self.capped_collection(collection)?;
        let state = coll.state();
        if state.dropped {
            return Err(StoreError::MissingCollection(collection.to_string()));
        }
        Ok(state.entries.len() as u64)
    }

    fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        if let Some(coll) = self.capped().remove(collection) {
            let mut state = coll.state();
            state.dropped = true;
            state.entries.clear();
            state.total_bytes = 0;
            coll.new_entries.notify_all();
            return Ok(());
        }
        if self.keyed().remove(collection).is_some() {
            return Ok(());
        }
        Err(StoreError::MissingCollection(collection.to_string()))
    }

    fn tail(
        &self,
        collection: &str,
        after: Option<u64>,
        await_timeout: Duration,
    ) -> Result<Box<dyn TailCursor>, StoreError> {
        let coll = self.capped_collection(collection)?;
        Ok(Box::new(MemoryTailCursor {
            coll,
            next: after.map(|seq| seq + 1).unwrap_or(0),
            await_timeout,
        }))
    }
}

struct MemoryTailCursor {
    coll: Arc<CappedCollection>,
    /// Lowest sequence number still to be delivered.
    next: u64,
    await_timeout: Duration,
}

impl TailCursor for MemoryTailCursor {
    fn advance(&mut self) -> Result<Option<(u64, Value)>, StoreError> {
        let coll = Arc::clone(&self.coll);
        let mut state = coll.state();
        loop {
            if state.dropped {
                return Err(StoreError::MissingCollection(coll.name.clone()));
            }
            // Evicted entries are gone for good; resume at the oldest survivor.
            if let Some((seq, _, doc)) = state.entries.iter().find(|entry| entry.0 >= self.next) {
                let (seq, doc) = (*seq, doc.clone());
                self.next = seq + 1;
                return Ok(Some((seq, doc)));
            }
            let (guard, wait) = coll
                .new_entries
                .wait_timeout(state, self.await_timeout)
                .unwrap_or_else(|poison| poison.into_inner());
            state = guard;
            if wait.timed_out() {
                return Ok(None);
            }
        }
    }
}
