//! Bounded tailing queue.
//!
//! An append-only queue over a capacity-capped collection: producers append
//! and never wait for consumers, the store evicts the oldest entries on
//! overflow, and a consumer follows the collection through a blocking
//! order-preserving cursor. Delivery is approximate-once: entries evicted
//! before a consumer reaches them are gone, and that is the design, not a
//! failure.
//!
//! The consume loop is fault tolerant: when the cursor dies on a transient
//! store fault it sleeps briefly and resubscribes past the last delivered
//! entry, so per-consumer ordering survives resubscription.

#[cfg(test)]
mod tests;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::store::DocumentStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Entry-count bound used unless overridden.
pub const DEFAULT_MAX_SIZE: u64 = 1000;

/// Assumed worst-case serialized entry size; the collection's byte budget
/// is this bound times the entry-count bound.
pub const ENTRY_SIZE_BOUND: u64 = 1024 * 1024;

/// Sleep before resubscribing after a cursor fault.
pub const SLEEP_BETWEEN_FAILURES: Duration = Duration::from_millis(500);

/// How long a single cursor wait may block before re-checking the stop
/// token.
pub const DEFAULT_AWAIT_TIMEOUT: Duration = Duration::from_millis(250);

/// Field the serialized item is stored under in each queue entry.
const PAYLOAD_FIELD: &str = "payload";

/// Cooperative cancellation token for the consume loop.
///
/// Cloneable and sticky: once stopped, every clone observes it and no
/// later call unsets it.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request loop exit. Does not interrupt an in-flight cursor wait;
    /// the loop notices within its await timeout.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Bounded append log with a resilient blocking consumer loop.
///
/// Cheap to clone; clones share the backing collection and the stop token,
/// so a producer half and a consumer half can live on different threads.
pub struct TailingQueue<T, S> {
    store: Arc<S>,
    name: String,
    max_size: u64,
    await_timeout: Duration,
    failure_backoff: Duration,
    stop: StopToken,
    clock: Arc<dyn Clock>,
    _items: PhantomData<fn() -> T>,
}

impl<T, S> Clone for TailingQueue<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            name: self.name.clone(),
            max_size: self.max_size,
            await_timeout: self.await_timeout,
            failure_backoff: self.failure_backoff,
            stop: self.stop.clone(),
            clock: Arc::clone(&self.clock),
            _items: PhantomData,
        }
    }
}

impl<T, S> TailingQueue<T, S>
where
    T: Serialize + DeserializeOwned,
    S: DocumentStore,
{
    pub fn new(store: Arc<S>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            max_size: DEFAULT_MAX_SIZE,
            await_timeout: DEFAULT_AWAIT_TIMEOUT,
            failure_backoff: SLEEP_BETWEEN_FAILURES,
            stop: StopToken::new(),
            clock: Arc::new(SystemClock),
            _items: PhantomData,
        }
    }

    /// Override the entry-count bound. Takes effect at [`Self::init`].
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Override how long a single cursor wait may block.
    pub fn with_await_timeout(mut self, await_timeout: Duration) -> Self {
        self.await_timeout = await_timeout;
        self
    }

    /// Override the sleep before resubscribing after a fault.
    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    /// Inject a time source (tests use a virtual clock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The stop token shared by all clones of this queue.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Create the backing capped collection if it does not exist yet.
    ///
    /// Idempotent: repeated calls never error and never touch existing
    /// data.
    pub fn init(&self) -> Result<()> {
        if !self.store.exists(&self.name)? {
            self.store
                .create_capped(&self.name, self.max_size, self.max_size * ENTRY_SIZE_BOUND)?;
        }
        Ok(())
    }

    /// Serialize and append one item.
    ///
    /// Never blocks on consumer readiness; the entry may later fall to
    /// capacity eviction.
    pub fn add(&self, item: &T) -> Result<()> {
        let mut entry = serde_json::Map::new();
        entry.insert(PAYLOAD_FIELD.to_string(), serde_json::to_value(item)?);
        self.store.append(&self.name, Value::Object(entry))?;
        Ok(())
    }

    /// Consume the queue, invoking `callback` once per entry in insertion
    /// order, until the stop token is observed.
    ///
    /// Transient store faults are recovered locally: the loop logs, sleeps
    /// the failure backoff and resubscribes past the last delivered entry.
    /// They never reach `callback`, and neither do entries that fail to
    /// decode; those are logged and skipped. Entries evicted while the
    /// cursor was down are lost, bounded by the collection capacity.
    pub fn poll<F>(&self, mut callback: F)
    where
        F: FnMut(T),
    {
        if self.stop.is_stopped() {
            warn!(queue = %self.name, "queue is stopped, refusing to poll");
            return;
        }
        let mut delivered: Option<u64> = None;
        while !self.stop.is_stopped() {
            let mut cursor = match self.store.tail(&self.name, delivered, self.await_timeout) {
                Ok(cursor) => cursor,
                Err(err) => {
                    debug!(queue = %self.name, error = %err, "failed to open queue cursor");
                    self.clock.sleep(self.failure_backoff);
                    continue;
                }
            };
            loop {
                if self.stop.is_stopped() {
                    return;
                }
                match cursor.advance() {
                    Ok(Some((seq, entry))) => {
                        delivered = Some(seq);
                        match self.decode(entry) {
                            Ok(item) => callback(item),
                            Err(err) => {
                                warn!(
                                    queue = %self.name,
                                    seq,
                                    error = %err,
                                    "skipping undecodable queue entry"
                                );
                            }
                        }
                    }
                    // Await timeout: nothing new, go re-check the stop token.
                    Ok(None) => {}
                    Err(err) => {
                        debug!(queue = %self.name, error = %err, "queue cursor failed, resubscribing");
                        self.clock.sleep(self.failure_backoff);
                        break;
                    }
                }
            }
        }
    }

    /// Request consume-loop exit. Cooperative: an in-flight callback
    /// finishes, and a blocked cursor wait runs out its await timeout.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Eventually-consistent approximate entry count.
    pub fn size(&self) -> Result<u64> {
        Ok(self.store.count(&self.name)?)
    }

    /// Irreversibly delete the backing collection.
    pub fn destroy(&self) -> Result<()> {
        self.store.drop_collection(&self.name)?;
        Ok(())
    }

    fn decode(&self, entry: Value) -> Result<T> {
        let payload = entry
            .get(PAYLOAD_FIELD)
            .cloned()
            .unwrap_or(Value::Null);
        Ok(serde_json::from_value(payload)?)
    }
}
