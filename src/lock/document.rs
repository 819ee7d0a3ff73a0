//! The claim document stored under a locked key.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Claim document recorded in the locks collection while a key is held.
///
/// `owner` is the authoritative field: every conditional update that claims,
/// refreshes or releases the key is predicated on it. The rest is
/// diagnostic context for operators deciding whether a holder is dead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockDocument {
    /// Opaque token of the current holder.
    pub owner: String,

    /// Process ID of the holder (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Host the holder runs on.
    pub host: String,

    /// Timestamp of the most recent claim or re-claim (RFC3339).
    pub acquired_at: DateTime<Utc>,
}

impl LockDocument {
    /// Create a claim document for `owner` stamped with the current time.
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            pid: Some(std::process::id()),
            host: host_string(),
            acquired_at: Utc::now(),
        }
    }

    /// How long ago the key was claimed or last re-claimed.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.acquired_at)
    }
}

fn host_string() -> String {
    hostname::get()
        .map(|host| host.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
