//! Tick engine - the per-channel critical section and the interval driver.
//!
//! An external timer calls [`TickEngine::run`], which processes every active
//! channel concurrently on a fixed interval. Per channel, a tick is: acquire
//! the channel lock (skip the tick on contention) → load the session from
//! cache or store (creating or reinitializing it when needed) → advance the
//! scheduler → if Working, run the resolver for every present player and
//! shadow helper → check the deeper-level unlock → flush the batched
//! mutations once → emit deduplicated notifications. Nothing that happens to
//! one channel can crash the driver.

use crate::config::mines::MineRegistry;
use crate::core::events::GameEvent;
use crate::core::inventory::InventoryService;
use crate::core::resolver::{Actor, ResolverDeps, resolve_actor_tick};
use crate::core::scheduler;
use crate::core::session::{Phase, SessionState};
use crate::engine::cache::{NotificationDedup, SessionCache};
use crate::engine::locks::ChannelLocks;
use crate::errors::{Error, Result};
use crate::store::SessionStore;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// How often the driver processes each channel.
pub const TICK_INTERVAL: Duration = Duration::from_secs(20);

/// Read-only snapshot of who is where, supplied by the platform layer.
pub trait MembershipProvider: Send + Sync {
    /// Channels that currently have anyone in them.
    fn active_channels(&self) -> Vec<String>;
    /// Players present in one channel at this instant.
    fn present_players(&self, channel_id: &str) -> Vec<String>;
}

/// Receives structured events for external rendering.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one event. Failures are the sink's problem to report; the
    /// engine only logs them.
    async fn notify(&self, event: &GameEvent) -> Result<()>;
}

/// Everything a tick needs, constructed once per process and shared.
pub struct TickEngine {
    store: Arc<dyn SessionStore>,
    registry: Arc<MineRegistry>,
    inventory: Arc<dyn InventoryService>,
    membership: Arc<dyn MembershipProvider>,
    sink: Arc<dyn NotificationSink>,
    locks: ChannelLocks,
    cache: SessionCache,
    dedup: NotificationDedup,
}

impl TickEngine {
    /// Wires up the engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        registry: Arc<MineRegistry>,
        inventory: Arc<dyn InventoryService>,
        membership: Arc<dyn MembershipProvider>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            registry,
            inventory,
            membership,
            sink,
            locks: ChannelLocks::default(),
            cache: SessionCache::new(),
            dedup: NotificationDedup::new(),
        }
    }

    /// Runs the interval driver until the process ends. Channels are
    /// processed concurrently; a slow channel skips its own next tick (lock
    /// contention) without delaying the others.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = TICK_INTERVAL.as_secs(), "tick driver started");
        loop {
            interval.tick().await;
            for channel_id in self.membership.active_channels() {
                let engine = Arc::clone(&self);
                tokio::spawn(async move {
                    if let Err(e) = engine.process_channel(&channel_id).await {
                        // Transient by taxonomy: the next interval retries.
                        error!(channel_id, error = %e, "tick failed");
                    }
                });
            }
        }
    }

    /// Processes one tick for one channel. The channel lock is held for the
    /// whole critical section and released on every exit path.
    #[instrument(skip(self))]
    pub async fn process_channel(&self, channel_id: &str) -> Result<()> {
        let Some(_guard) = self.locks.try_acquire(channel_id) else {
            debug!(channel_id, "skipping tick, previous one still running");
            return Ok(());
        };

        let players = self.membership.present_players(channel_id);
        let mut events: Vec<GameEvent> = Vec::new();
        let mut rng = StdRng::from_entropy();
        let now = Utc::now();

        let (mut session, mut critical) =
            match self.load_or_create(channel_id, &players, &mut events, &mut rng).await? {
                Some(loaded) => loaded,
                None => return Ok(()),
            };
        if let Err(e) = self.registry.get(&session.mine_type_id) {
            // The mine was removed from the configuration; the document can
            // never tick again, so rebuild it like any other fatal
            // corruption rather than erroring every interval.
            error!(channel_id, error = %e, "session references an unconfigured mine, reinitializing");
            self.cache.invalidate(channel_id).await;
            session = SessionState::create(channel_id, self.registry.default_mine(), now, &mut rng);
            events.push(GameEvent::SessionReset {
                channel_id: channel_id.to_string(),
            });
            critical = true;
        }
        session.sanitize();

        let transitioned = scheduler::advance(&mut session, now, &mut rng, &mut events);
        critical |= transitioned;

        if session.phase == Phase::Working {
            let mine = self.registry.get(&session.mine_type_id)?;
            let deps = ResolverDeps {
                mine,
                catalog: self.registry.catalog(),
                inventory: self.inventory.as_ref(),
            };
            let mut actors: Vec<Actor> = players.iter().map(|p| Actor::player(p)).collect();
            actors.extend(session.helpers.iter().map(|h| Actor::shadow(&h.id)));
            for actor in &actors {
                resolve_actor_tick(&mut session, actor, &deps, &mut rng, &mut events).await;
            }

            if scheduler::unlock_satisfied(&session, mine) {
                let next = self.registry.next_after(mine)?;
                info!(channel_id, next_mine = %next.id, "deeper level unlocked");
                session.descend(next, now, &mut rng);
                self.cache.invalidate(channel_id).await;
                events.push(GameEvent::LevelUnlocked {
                    channel_id: channel_id.to_string(),
                    mine_type_id: session.mine_type_id.clone(),
                    depth: session.depth,
                });
                critical = true;
            }
        }

        self.cache
            .put(self.store.as_ref(), session, critical)
            .await?;

        for event in events {
            if self.dedup.allow(&event).await {
                if let Err(e) = self.sink.notify(&event).await {
                    warn!(channel_id, error = %e, "notification delivery failed");
                }
            }
        }
        Ok(())
    }

    /// Loads the channel's session, creating a fresh one on first entry and
    /// rebuilding from scratch when the stored document is unusable (the
    /// channel-scoped fatal path). Returns `None` when the channel has no
    /// session and nobody is present.
    async fn load_or_create(
        &self,
        channel_id: &str,
        players: &[String],
        events: &mut Vec<GameEvent>,
        rng: &mut StdRng,
    ) -> Result<Option<(SessionState, bool)>> {
        match self.cache.get_or_load(self.store.as_ref(), channel_id).await {
            Ok(Some(session)) => Ok(Some((session, false))),
            Ok(None) => {
                if players.is_empty() {
                    return Ok(None);
                }
                info!(channel_id, "first entry, creating mining session");
                let session = SessionState::create(
                    channel_id,
                    self.registry.default_mine(),
                    Utc::now(),
                    rng,
                );
                Ok(Some((session, true)))
            }
            Err(Error::SessionCorrupt { message, .. }) => {
                error!(channel_id, detail = %message, "session document corrupt, reinitializing");
                self.cache.invalidate(channel_id).await;
                self.store.delete(channel_id).await?;
                let session = SessionState::create(
                    channel_id,
                    self.registry.default_mine(),
                    Utc::now(),
                    rng,
                );
                events.push(GameEvent::SessionReset {
                    channel_id: channel_id.to_string(),
                });
                Ok(Some((session, true)))
            }
            Err(e) => Err(e),
        }
    }

    /// Flushes every cached session. Called on shutdown.
    pub async fn flush_all(&self) {
        self.cache.flush_all(self.store.as_ref()).await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::inventory::MemoryInventory;
    use crate::entities::{Session, session};
    use crate::store::SqlSessionStore;
    use crate::test_utils::{setup_test_db, test_registry};
    use sea_orm::{EntityTrait, Set};
    use std::sync::Mutex;

    struct FixedMembership {
        channels: Vec<String>,
        players: Vec<String>,
    }

    impl MembershipProvider for FixedMembership {
        fn active_channels(&self) -> Vec<String> {
            self.channels.clone()
        }
        fn present_players(&self, _channel_id: &str) -> Vec<String> {
            self.players.clone()
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<GameEvent>>,
    }

    #[async_trait::async_trait]
    impl NotificationSink for CollectingSink {
        async fn notify(&self, event: &GameEvent) -> Result<()> {
            self.events
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(event.clone());
            Ok(())
        }
    }

    async fn engine_with(
        players: Vec<&str>,
    ) -> (
        Arc<TickEngine>,
        Arc<SqlSessionStore>,
        Arc<CollectingSink>,
        sea_orm::DatabaseConnection,
    ) {
        let db = setup_test_db().await.unwrap();
        let store = Arc::new(SqlSessionStore::new(db.clone()));
        let sink = Arc::new(CollectingSink::default());
        let membership = Arc::new(FixedMembership {
            channels: vec!["chan-1".to_string()],
            players: players.into_iter().map(String::from).collect(),
        });
        let engine = Arc::new(TickEngine::new(
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::new(test_registry()),
            Arc::new(MemoryInventory::new()),
            membership,
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
        ));
        (engine, store, sink, db)
    }

    #[tokio::test]
    async fn first_tick_with_players_creates_and_persists_a_session() {
        let (engine, store, _sink, _db) = engine_with(vec!["p1"]).await;
        engine.process_channel("chan-1").await.unwrap();
        let session = store.load("chan-1").await.unwrap().unwrap();
        assert_eq!(session.phase, Phase::Working);
        assert!(session.map.position_of("p1").is_some());
    }

    #[tokio::test]
    async fn empty_channel_without_session_is_untouched() {
        let (engine, store, sink, _db) = engine_with(vec![]).await;
        engine.process_channel("chan-1").await.unwrap();
        assert!(store.load("chan-1").await.unwrap().is_none());
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn working_tick_produces_narrative_events() {
        let (engine, _store, sink, _db) = engine_with(vec!["p1"]).await;
        engine.process_channel("chan-1").await.unwrap();
        let events = sink.events.lock().unwrap();
        // Whatever the dig yielded, the player's turn produced something.
        assert!(!events.is_empty());
    }

    #[tokio::test]
    async fn corrupt_document_reinitializes_the_session() {
        let (engine, store, sink, db) = engine_with(vec!["p1"]).await;
        engine.process_channel("chan-1").await.unwrap();

        // Corrupt the stored world document, then force a cache miss.
        let model = Session::find_by_id("chan-1")
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        let mut active: session::ActiveModel = model.into();
        active.world = Set("garbage".to_string());
        Session::update(active).exec(&db).await.unwrap();
        engine.cache.invalidate("chan-1").await;

        engine.process_channel("chan-1").await.unwrap();
        let events = sink.events.lock().unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, GameEvent::SessionReset { .. }))
        );
        drop(events);
        let session = store.load("chan-1").await.unwrap().unwrap();
        assert_eq!(session.stats.walls_broken, 0);
    }

    #[tokio::test]
    async fn unconfigured_mine_reinitializes_the_session() {
        let (engine, store, sink, db) = engine_with(vec!["p1"]).await;
        engine.process_channel("chan-1").await.unwrap();

        // Point the stored document at a mine the operator removed from the
        // configuration, then force a cache miss.
        let model = Session::find_by_id("chan-1")
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        let mut active: session::ActiveModel = model.into();
        active.mine_type_id = Set("decommissioned_shaft".to_string());
        Session::update(active).exec(&db).await.unwrap();
        engine.cache.invalidate("chan-1").await;

        // Ticks keep succeeding and the document heals back to the default
        // mine instead of erroring forever.
        engine.process_channel("chan-1").await.unwrap();
        engine.process_channel("chan-1").await.unwrap();
        let events = sink.events.lock().unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, GameEvent::SessionReset { .. }))
        );
        drop(events);
        let session = store.load("chan-1").await.unwrap().unwrap();
        assert_eq!(session.mine_type_id, test_registry().default_mine().id);
    }

    #[tokio::test]
    async fn contended_channel_skips_the_tick() {
        let (engine, _store, _sink, _db) = engine_with(vec!["p1"]).await;
        let guard = engine.locks.try_acquire("chan-1").unwrap();
        // Processing under contention is a silent no-op.
        engine.process_channel("chan-1").await.unwrap();
        drop(guard);
        assert!(engine.locks.try_acquire("chan-1").is_some());
    }
}
