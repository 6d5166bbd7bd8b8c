//! Session store boundary - the durability layer for session documents.
//!
//! The engine treats persistence as a keyed document store with
//! at-least-once semantics: saves are idempotent whole-document upserts, so
//! re-applying one after a retried tick is harmless. [`SqlSessionStore`] is
//! the sea-orm/SQLite implementation; the trait exists so tests and other
//! deployments can substitute their own.

use crate::core::hazard::HazardSet;
use crate::core::map::MapData;
use crate::core::minecart::Minecart;
use crate::core::session::{
    ExitTileState, Phase, SessionState, SessionStats, ShadowHelper, SpecialEvent,
};
use crate::entities::{Session, SessionModel, session};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};

/// Keyed session document store consumed by the engine.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads a channel's session; `None` when the channel has none yet.
    async fn load(&self, channel_id: &str) -> Result<Option<SessionState>>;

    /// Upserts a channel's session document.
    async fn save(&self, state: &SessionState) -> Result<()>;

    /// Removes a channel's session document.
    async fn delete(&self, channel_id: &str) -> Result<()>;
}

/// The world sub-documents packed into the entity's JSON column.
#[derive(Debug, Serialize, Deserialize)]
struct WorldDoc {
    map: MapData,
    hazards: HazardSet,
    minecart: Minecart,
    #[serde(default)]
    special_event: Option<SpecialEvent>,
    #[serde(default)]
    helpers: Vec<ShadowHelper>,
    #[serde(default)]
    exit: Option<ExitTileState>,
}

fn phase_to_column(phase: Phase) -> &'static str {
    match phase {
        Phase::Working => "working",
        Phase::Break => "break",
        Phase::LongBreak => "long_break",
    }
}

fn phase_from_column(value: &str, channel_id: &str) -> Result<Phase> {
    match value {
        "working" => Ok(Phase::Working),
        "break" => Ok(Phase::Break),
        "long_break" => Ok(Phase::LongBreak),
        other => Err(Error::SessionCorrupt {
            channel_id: channel_id.to_string(),
            message: format!("unknown phase '{other}'"),
        }),
    }
}

fn stat_to_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn stat_from_column(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn decode(model: SessionModel) -> Result<SessionState> {
    let channel_id = model.channel_id.clone();
    let phase = phase_from_column(&model.phase, &channel_id)?;
    let world: WorldDoc =
        serde_json::from_str(&model.world).map_err(|e| Error::SessionCorrupt {
            channel_id: channel_id.clone(),
            message: format!("world document: {e}"),
        })?;

    Ok(SessionState {
        channel_id,
        mine_type_id: model.mine_type_id,
        depth: u32::try_from(model.depth).unwrap_or(0),
        phase,
        next_trigger_at: model.next_trigger_at,
        next_shop_refresh_at: model.next_shop_refresh_at,
        cycle_count: stat_from_column(model.cycle_count),
        stats: SessionStats {
            walls_broken: stat_from_column(model.walls_broken),
            ores_found: stat_from_column(model.ores_found),
            treasures_found: stat_from_column(model.treasures_found),
            rare_ores_found: stat_from_column(model.rare_ores_found),
            lifetime_value: stat_from_column(model.lifetime_value),
        },
        special_event: world.special_event,
        helpers: world.helpers,
        exit: world.exit,
        map: world.map,
        hazards: world.hazards,
        minecart: world.minecart,
    })
}

fn encode(state: &SessionState) -> Result<session::ActiveModel> {
    let world = WorldDoc {
        map: state.map.clone(),
        hazards: state.hazards.clone(),
        minecart: state.minecart.clone(),
        special_event: state.special_event.clone(),
        helpers: state.helpers.clone(),
        exit: state.exit,
    };
    Ok(session::ActiveModel {
        channel_id: Set(state.channel_id.clone()),
        mine_type_id: Set(state.mine_type_id.clone()),
        depth: Set(i32::try_from(state.depth).unwrap_or(i32::MAX)),
        phase: Set(phase_to_column(state.phase).to_string()),
        next_trigger_at: Set(state.next_trigger_at),
        next_shop_refresh_at: Set(state.next_shop_refresh_at),
        cycle_count: Set(stat_to_column(state.cycle_count)),
        walls_broken: Set(stat_to_column(state.stats.walls_broken)),
        ores_found: Set(stat_to_column(state.stats.ores_found)),
        treasures_found: Set(stat_to_column(state.stats.treasures_found)),
        rare_ores_found: Set(stat_to_column(state.stats.rare_ores_found)),
        lifetime_value: Set(stat_to_column(state.stats.lifetime_value)),
        world: Set(serde_json::to_string(&world)?),
        updated_at: Set(Utc::now()),
    })
}

/// SeaORM-backed session store.
#[derive(Clone, Debug)]
pub struct SqlSessionStore {
    db: DatabaseConnection,
}

impl SqlSessionStore {
    /// Wraps a database connection.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn load(&self, channel_id: &str) -> Result<Option<SessionState>> {
        let model = Session::find_by_id(channel_id).one(&self.db).await?;
        model.map(decode).transpose()
    }

    async fn save(&self, state: &SessionState) -> Result<()> {
        let active = encode(state)?;
        let exists = Session::find_by_id(&state.channel_id)
            .one(&self.db)
            .await?
            .is_some();
        if exists {
            Session::update(active).exec(&self.db).await?;
        } else {
            Session::insert(active).exec(&self.db).await?;
        }
        Ok(())
    }

    async fn delete(&self, channel_id: &str) -> Result<()> {
        Session::delete_by_id(channel_id).exec(&self.db).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{setup_test_db, test_registry, test_rng};

    async fn store() -> SqlSessionStore {
        SqlSessionStore::new(setup_test_db().await.unwrap())
    }

    #[tokio::test]
    async fn load_missing_channel_is_none() {
        let store = store().await;
        assert!(store.load("chan-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_and_load_round_trips() {
        let store = store().await;
        let registry = test_registry();
        let mut session =
            SessionState::create("chan-1", registry.default_mine(), Utc::now(), &mut test_rng());
        session.minecart.add_item("p1", "coal_ore", 7);
        session.stats.walls_broken = 12;
        session.ensure_present("p1");

        store.save(&session).await.unwrap();
        let loaded = store.load("chan-1").await.unwrap().unwrap();
        assert_eq!(loaded.minecart.quantity_of("coal_ore"), 7);
        assert_eq!(loaded.stats.walls_broken, 12);
        assert_eq!(loaded.map, session.map);
        assert_eq!(loaded.phase, session.phase);
    }

    #[tokio::test]
    async fn save_is_an_idempotent_upsert() {
        let store = store().await;
        let registry = test_registry();
        let mut session =
            SessionState::create("chan-1", registry.default_mine(), Utc::now(), &mut test_rng());
        store.save(&session).await.unwrap();
        session.stats.walls_broken = 3;
        store.save(&session).await.unwrap();
        store.save(&session).await.unwrap();
        let loaded = store.load("chan-1").await.unwrap().unwrap();
        assert_eq!(loaded.stats.walls_broken, 3);
    }

    #[tokio::test]
    async fn corrupt_world_document_is_a_session_corrupt_error() {
        let store = store().await;
        let registry = test_registry();
        let session =
            SessionState::create("chan-1", registry.default_mine(), Utc::now(), &mut test_rng());
        store.save(&session).await.unwrap();

        // Clobber the world column directly.
        let model = Session::find_by_id("chan-1").one(&store.db).await.unwrap().unwrap();
        let mut active: session::ActiveModel = model.into();
        active.world = Set("{not json".to_string());
        Session::update(active).exec(&store.db).await.unwrap();

        let err = store.load("chan-1").await;
        assert!(matches!(err, Err(Error::SessionCorrupt { .. })));
    }

    #[tokio::test]
    async fn delete_removes_the_document() {
        let store = store().await;
        let registry = test_registry();
        let session =
            SessionState::create("chan-1", registry.default_mine(), Utc::now(), &mut test_rng());
        store.save(&session).await.unwrap();
        store.delete("chan-1").await.unwrap();
        assert!(store.load("chan-1").await.unwrap().is_none());
    }
}
