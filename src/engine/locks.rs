//! Per-channel tick locks.
//!
//! Tick processing is single-writer per channel: whoever holds the channel's
//! lock owns that channel's session for the duration of one critical
//! section. Acquisition is non-blocking; contention means the caller skips
//! this tick entirely (at-most-one-in-flight, never queued). A lock older
//! than the staleness threshold belongs to a crashed or hung tick and is
//! forcibly reclaimed. Release happens on every exit path through the
//! guard's `Drop`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lock age at which a holder is presumed dead.
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(120);

/// Process-scoped registry of per-channel tick locks. Constructed once and
/// shared by reference; never a module-level global.
#[derive(Debug)]
pub struct ChannelLocks {
    held: Mutex<HashMap<String, Instant>>,
    staleness: Duration,
}

impl Default for ChannelLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STALENESS)
    }
}

impl ChannelLocks {
    /// Creates a registry with the given staleness threshold.
    #[must_use]
    pub fn new(staleness: Duration) -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            staleness,
        }
    }

    /// Non-blocking acquisition. Returns `None` while another tick holds a
    /// fresh lock on the channel; a stale lock is reclaimed in place.
    pub fn try_acquire(&self, channel_id: &str) -> Option<ChannelLockGuard<'_>> {
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(acquired_at) = held.get(channel_id) {
            if acquired_at.elapsed() < self.staleness {
                debug!(channel_id, "tick lock contended, skipping");
                return None;
            }
            warn!(
                channel_id,
                age_secs = acquired_at.elapsed().as_secs(),
                "reclaiming stale tick lock"
            );
        }
        held.insert(channel_id.to_string(), Instant::now());
        Some(ChannelLockGuard {
            locks: self,
            channel_id: channel_id.to_string(),
        })
    }

    fn release(&self, channel_id: &str) {
        self.held
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(channel_id);
    }

    /// Whether a channel is currently locked (fresh or stale).
    #[must_use]
    pub fn is_held(&self, channel_id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(channel_id)
    }
}

/// Scoped ownership of one channel's critical section.
#[derive(Debug)]
pub struct ChannelLockGuard<'a> {
    locks: &'a ChannelLocks,
    channel_id: String,
}

impl Drop for ChannelLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.channel_id);
    }
}
