//! Pessimistic locking over the document store.
//!
//! The store's single-document compare-and-set is the only synchronization
//! primitive available, so mutual exclusion is built as a claim document per
//! protected key:
//! - claiming inserts a [`LockDocument`] only if the key is free,
//! - contenders retry on a bounded backoff until their deadline,
//! - release is conditional on the recorded owner token.
//!
//! # Ownership
//!
//! Owners are opaque string tokens, not threads. A token may re-claim a key
//! it already holds (instance-scoped reentrancy), and only the recorded
//! owner may clear or refresh a claim.
//!
//! # Liveness
//!
//! There is no lease or heartbeat expiry: a holder that crashes without
//! unlocking blocks the key until [`PessimisticLock::force_unlock`] clears
//! it manually.

mod document;
mod handle;
mod pessimistic;


pub use document::LockDocument;
pub use handle::KeyLock;
pub use pessimistic::{
    DEFAULT_LOCKS_COLLECTION, DEFAULT_RETRY_INTERVAL, OWNER_FIELD, PessimisticLock, Wait,
};
