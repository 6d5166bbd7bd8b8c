//! Session cache and write batching.
//!
//! All mutations a tick produces are merged into the in-memory session and
//! written to the store at most once per tick. Routine ticks are debounced:
//! the document only goes to disk when [`WRITE_DEBOUNCE`] has elapsed since
//! the last flush. Critical ticks (phase transitions, level changes, session
//! creation) flush immediately so externally meaningful state is never lost
//! to the debounce window. The cache also hosts the notification dedup
//! window that suppresses double-emitted channel-level events.

use crate::core::events::GameEvent;
use crate::core::session::SessionState;
use crate::errors::Result;
use crate::store::SessionStore;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Minimum interval between routine flushes of one channel's document.
pub const WRITE_DEBOUNCE: Duration = Duration::from_secs(20);
/// Window within which identical channel-level notifications are suppressed.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(30);

struct CacheEntry {
    state: SessionState,
    last_flushed: Option<Instant>,
    dirty: bool,
}

/// Read/write-through cache over the session store, one entry per channel.
#[derive(Default)]
pub struct SessionCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SessionCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached session or reads through to the store. A store
    /// miss returns `None`; decode failures propagate so the engine can
    /// apply its channel-scoped fatal handling.
    pub async fn get_or_load(
        &self,
        store: &dyn SessionStore,
        channel_id: &str,
    ) -> Result<Option<SessionState>> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(channel_id) {
            return Ok(Some(entry.state.clone()));
        }
        let Some(state) = store.load(channel_id).await? else {
            return Ok(None);
        };
        entries.insert(
            channel_id.to_string(),
            CacheEntry {
                state: state.clone(),
                last_flushed: Some(Instant::now()),
                dirty: false,
            },
        );
        Ok(Some(state))
    }

    /// Merges a tick's mutated session back into the cache and flushes it
    /// to the store when due. `critical` bypasses the debounce. A failed
    /// store write is transient: the entry stays dirty and the next tick
    /// retries.
    pub async fn put(
        &self,
        store: &dyn SessionStore,
        state: SessionState,
        critical: bool,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let channel_id = state.channel_id.clone();
        let entry = entries.entry(channel_id.clone()).or_insert(CacheEntry {
            state: state.clone(),
            last_flushed: None,
            dirty: true,
        });
        entry.state = state;
        entry.dirty = true;

        let due = critical
            || entry
                .last_flushed
                .is_none_or(|at| at.elapsed() >= WRITE_DEBOUNCE);
        if !due {
            debug!(channel_id, "flush debounced");
            return Ok(());
        }
        match store.save(&entry.state).await {
            Ok(()) => {
                entry.last_flushed = Some(Instant::now());
                entry.dirty = false;
                Ok(())
            }
            Err(e) => {
                warn!(channel_id, error = %e, "session flush failed, will retry next tick");
                Ok(())
            }
        }
    }

    /// Drops a channel's entry so the next read goes to the store. Used
    /// after reinitializing a session or detecting a stuck state.
    pub async fn invalidate(&self, channel_id: &str) {
        self.entries.lock().await.remove(channel_id);
    }

    /// Writes every dirty entry out, ignoring the debounce. Called on
    /// shutdown.
    pub async fn flush_all(&self, store: &dyn SessionStore) {
        let mut entries = self.entries.lock().await;
        for (channel_id, entry) in entries.iter_mut() {
            if !entry.dirty {
                continue;
            }
            match store.save(&entry.state).await {
                Ok(()) => {
                    entry.last_flushed = Some(Instant::now());
                    entry.dirty = false;
                }
                Err(e) => warn!(channel_id, error = %e, "final flush failed"),
            }
        }
    }
}

/// Suppresses identical channel-level notifications emitted twice within
/// [`DEDUP_WINDOW`], guarding against an (incorrectly) double-invoked tick
/// producing duplicate externally visible side effects. Per-actor events
/// pass through untouched.
#[derive(Default)]
pub struct NotificationDedup {
    recent: Mutex<HashMap<(String, &'static str), Instant>>,
}

impl NotificationDedup {
    /// An empty window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this event should reach the sink.
    pub async fn allow(&self, event: &GameEvent) -> bool {
        if !Self::deduplicable(event) {
            return true;
        }
        let key = (event.channel_id().to_string(), event.kind());
        let mut recent = self.recent.lock().await;
        recent.retain(|_, at| at.elapsed() < DEDUP_WINDOW);
        if recent.contains_key(&key) {
            debug!(channel_id = %key.0, kind = key.1, "suppressing duplicate notification");
            return false;
        }
        recent.insert(key, Instant::now());
        true
    }

    /// Channel-level events are deduped; per-actor narrative is not.
    const fn deduplicable(event: &GameEvent) -> bool {
        matches!(
            event,
            GameEvent::BreakStarted { .. }
                | GameEvent::WorkResumed { .. }
                | GameEvent::SpecialEventStarted { .. }
                | GameEvent::SpecialEventResolved { .. }
                | GameEvent::ExitSpawned { .. }
                | GameEvent::LevelUnlocked { .. }
                | GameEvent::SessionReset { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::store::SqlSessionStore;
    use crate::test_utils::{setup_test_db, test_registry, test_rng};
    use chrono::Utc;

    async fn store() -> SqlSessionStore {
        SqlSessionStore::new(setup_test_db().await.unwrap())
    }

    fn session(channel_id: &str) -> SessionState {
        let registry = test_registry();
        SessionState::create(channel_id, registry.default_mine(), Utc::now(), &mut test_rng())
    }

    #[tokio::test]
    async fn get_or_load_reads_through_and_caches() {
        let store = store().await;
        let cache = SessionCache::new();
        assert!(cache.get_or_load(&store, "chan-1").await.unwrap().is_none());

        let state = session("chan-1");
        store.save(&state).await.unwrap();
        let loaded = cache.get_or_load(&store, "chan-1").await.unwrap().unwrap();
        assert_eq!(loaded.channel_id, "chan-1");

        // Now served from cache even if the row disappears underneath.
        store.delete("chan-1").await.unwrap();
        assert!(cache.get_or_load(&store, "chan-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn routine_puts_are_debounced_after_a_flush() {
        let store = store().await;
        let cache = SessionCache::new();
        let mut state = session("chan-1");

        // First put has never flushed: writes through.
        cache.put(&store, state.clone(), false).await.unwrap();
        assert!(store.load("chan-1").await.unwrap().is_some());

        // Immediately after, a routine put stays in memory.
        state.stats.walls_broken = 5;
        cache.put(&store, state.clone(), false).await.unwrap();
        let on_disk = store.load("chan-1").await.unwrap().unwrap();
        assert_eq!(on_disk.stats.walls_broken, 0);

        // A critical put bypasses the debounce.
        state.stats.walls_broken = 9;
        cache.put(&store, state.clone(), true).await.unwrap();
        let on_disk = store.load("chan-1").await.unwrap().unwrap();
        assert_eq!(on_disk.stats.walls_broken, 9);
    }

    #[tokio::test]
    async fn invalidate_forces_a_store_read() {
        let store = store().await;
        let cache = SessionCache::new();
        let state = session("chan-1");
        cache.put(&store, state, true).await.unwrap();
        cache.invalidate("chan-1").await;
        store.delete("chan-1").await.unwrap();
        assert!(cache.get_or_load(&store, "chan-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn flush_all_writes_dirty_entries() {
        let store = store().await;
        let cache = SessionCache::new();
        let mut state = session("chan-1");
        cache.put(&store, state.clone(), true).await.unwrap();
        state.stats.walls_broken = 7;
        cache.put(&store, state, false).await.unwrap(); // debounced
        cache.flush_all(&store).await;
        let on_disk = store.load("chan-1").await.unwrap().unwrap();
        assert_eq!(on_disk.stats.walls_broken, 7);
    }

    #[tokio::test]
    async fn dedup_suppresses_repeat_channel_events_only() {
        let dedup = NotificationDedup::new();
        let break_started = GameEvent::BreakStarted {
            channel_id: "chan-1".to_string(),
            long: false,
            until: Utc::now(),
        };
        assert!(dedup.allow(&break_started).await);
        assert!(!dedup.allow(&break_started).await);

        // Same kind, different channel: allowed.
        let other_channel = GameEvent::BreakStarted {
            channel_id: "chan-2".to_string(),
            long: false,
            until: Utc::now(),
        };
        assert!(dedup.allow(&other_channel).await);

        // Per-actor narrative is never deduped.
        let found = GameEvent::ItemFound {
            channel_id: "chan-1".to_string(),
            actor_id: "p1".to_string(),
            item_id: "coal_ore".to_string(),
            quantity: 1,
            to_minecart: true,
        };
        assert!(dedup.allow(&found).await);
        assert!(dedup.allow(&found).await);
    }
}
