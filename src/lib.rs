//! Corral: coordination primitives for processes sharing a replicated
//! document store.
//!
//! The store's only synchronization primitive is an atomic conditional
//! update on a single document. On top of that, this crate builds:
//!
//! - [`PessimisticLock`]: mutual exclusion keyed by arbitrary strings and
//!   owned by opaque tokens, with bounded-wait acquisition.
//! - [`KeyLock`]: a conventional mutex-style handle over one key, with a
//!   per-instance ownership token.
//! - [`PessimisticRepo`]: a keyed repository whose read-modify-write
//!   cycles are guarded by the lock.
//! - [`TailingQueue`]: an approximate pub/sub channel over a capped
//!   collection, consumed through a fault-tolerant blocking cursor loop.
//!
//! The store itself stays behind the [`DocumentStore`] trait;
//! [`MemoryStore`] is the in-process reference implementation.

pub mod clock;
pub mod error;
pub mod lock;
pub mod queue;
pub mod repo;
pub mod store;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, SystemClock};
pub use error::{CorralError, Result};
pub use lock::{KeyLock, LockDocument, PessimisticLock, Wait};
pub use queue::{StopToken, TailingQueue};
pub use repo::PessimisticRepo;
pub use store::{DocumentStore, MemoryStore, StoreError, TailCursor};
