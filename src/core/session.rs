//! Session state - the per-channel world document.
//!
//! One [`SessionState`] exists per voice channel and owns everything the
//! tick mutates: the map, the hazard layer, the minecart, scheduler fields,
//! lifetime stats, and any active special event or shadow helpers. It is
//! created on the first tick that finds players present, lives as long as
//! the channel does, and is only ever touched inside the channel's critical
//! section.

use crate::config::mines::MineTypeConfig;
use crate::core::hazard::HazardSet;
use crate::core::map::{
    DEFAULT_MAP_HEIGHT, DEFAULT_MAP_WIDTH, MapData, Position, Rect, TileKind,
};
use crate::core::minecart::Minecart;
use crate::core::scheduler;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level scheduler phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Players mine; the resolver runs every tick
    #[default]
    Working,
    /// Short rest between work windows
    Break,
    /// Longer rest every few cycles
    LongBreak,
}

/// Non-negative lifetime counters for one session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    #[serde(default)]
    pub walls_broken: u64,
    #[serde(default)]
    pub ores_found: u64,
    #[serde(default)]
    pub treasures_found: u64,
    #[serde(default)]
    pub rare_ores_found: u64,
    /// Credit value of everything ever found in this session
    #[serde(default)]
    pub lifetime_value: u64,
}

/// Timed event overlaying the Working phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialEventKind {
    /// A thief eyes the minecart; contributions during the window reduce
    /// the eventual theft
    Thief,
    /// Rail building; completion spawns a shadow helper
    RailBuilding,
}

impl SpecialEventKind {
    /// Display/dedup label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Thief => "thief",
            Self::RailBuilding => "rail_building",
        }
    }
}

/// An active special-event window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialEvent {
    pub kind: SpecialEventKind,
    pub ends_at: DateTime<Utc>,
    /// Per-player progress contributed during the window
    #[serde(default)]
    pub participants: BTreeMap<String, u64>,
}

/// A non-human actor consuming action budget like a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowHelper {
    /// Synthetic actor id, distinct from any player id
    pub id: String,
    pub power: u32,
    pub speed: u32,
    pub expires_at: DateTime<Utc>,
}

/// State of the rare exit tile for spawn-and-reach unlocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitTileState {
    pub pos: Position,
    pub reached: bool,
}

/// The complete per-channel world document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub channel_id: String,
    pub mine_type_id: String,
    /// How many levels deep this channel has progressed
    #[serde(default)]
    pub depth: u32,
    pub phase: Phase,
    /// When the current phase ends
    pub next_trigger_at: DateTime<Utc>,
    pub next_shop_refresh_at: DateTime<Utc>,
    #[serde(default)]
    pub cycle_count: u64,
    #[serde(default)]
    pub stats: SessionStats,
    #[serde(default)]
    pub special_event: Option<SpecialEvent>,
    #[serde(default)]
    pub helpers: Vec<ShadowHelper>,
    #[serde(default)]
    pub exit: Option<ExitTileState>,
    pub map: MapData,
    pub hazards: HazardSet,
    pub minecart: Minecart,
}

impl SessionState {
    /// Creates a fresh session in the given mine: Working phase, newly
    /// seeded map and hazards, empty minecart, zero stats.
    pub fn create<R: Rng>(
        channel_id: &str,
        mine: &MineTypeConfig,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Self {
        let map = MapData::initialize(DEFAULT_MAP_WIDTH, DEFAULT_MAP_HEIGHT, mine.power_level, rng);
        let mut hazards = HazardSet::new();
        hazards.generate_for_area(
            Rect {
                x0: 0,
                y0: 0,
                x1: map.width,
                y1: map.height,
            },
            mine.hazard_chance,
            mine.power_level,
            &mine.allowed_hazards,
            (map.entrance_x, map.entrance_y),
            rng,
        );

        Self {
            channel_id: channel_id.to_string(),
            mine_type_id: mine.id.clone(),
            depth: 0,
            phase: Phase::Working,
            next_trigger_at: now + scheduler::work_duration(),
            next_shop_refresh_at: now + scheduler::shop_refresh_interval(),
            cycle_count: 0,
            stats: SessionStats::default(),
            special_event: None,
            helpers: Vec::new(),
            exit: None,
            map,
            hazards,
            minecart: Minecart::new(),
        }
    }

    /// Reinitializes the session against the next-level mine: new map and
    /// hazards, depth incremented, phase back to Working. The minecart and
    /// lifetime stats travel with the channel.
    pub fn descend<R: Rng>(&mut self, next: &MineTypeConfig, now: DateTime<Utc>, rng: &mut R) {
        let fresh = Self::create(&self.channel_id, next, now, rng);
        self.mine_type_id = fresh.mine_type_id;
        self.depth += 1;
        self.phase = Phase::Working;
        self.next_trigger_at = fresh.next_trigger_at;
        self.next_shop_refresh_at = fresh.next_shop_refresh_at;
        self.special_event = None;
        self.helpers.clear();
        self.exit = None;
        self.map = fresh.map;
        self.hazards = fresh.hazards;
    }

    /// Repairs integrity violations a persisted document may carry: the
    /// entrance tile invariant, out-of-bounds actor positions, and
    /// degenerate minecart counters. Violations are corrected in place and
    /// logged, never propagated.
    pub fn sanitize(&mut self) {
        let entrance = self.map.entrance();
        let entrance_ok = self
            .map
            .tile(entrance.x, entrance.y)
            .is_some_and(|t| t.kind == TileKind::Entrance && t.discovered);
        if !entrance_ok {
            tracing::warn!(channel_id = %self.channel_id, "repairing entrance tile invariant");
            if let Some(tile) = self.map.tile_mut(entrance.x, entrance.y) {
                tile.kind = TileKind::Entrance;
                tile.discovered = true;
                tile.hardness = 0;
            }
        }

        let out_of_bounds: Vec<String> = self
            .map
            .player_positions
            .iter()
            .filter(|(_, p)| !self.map.in_bounds(p.x, p.y))
            .map(|(id, _)| id.clone())
            .collect();
        for id in out_of_bounds {
            tracing::warn!(channel_id = %self.channel_id, actor_id = %id, "clamping out-of-bounds position");
            self.map.set_position(&id, entrance);
        }

        self.minecart.sanitize();
    }

    /// Places an actor at the entrance if they have no position yet.
    pub fn ensure_present(&mut self, actor_id: &str) {
        if self.map.position_of(actor_id).is_none() {
            let entrance = self.map.entrance();
            self.map.set_position(actor_id, entrance);
        }
    }

    /// Drops helpers whose window has passed.
    pub fn expire_helpers(&mut self, now: DateTime<Utc>) {
        self.helpers.retain(|h| h.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{test_registry, test_rng};

    #[test]
    fn create_starts_working_with_empty_cart_and_zero_stats() {
        let registry = test_registry();
        let now = Utc::now();
        let session =
            SessionState::create("chan-1", registry.default_mine(), now, &mut test_rng());
        assert_eq!(session.phase, Phase::Working);
        assert_eq!(session.stats, SessionStats::default());
        assert!(session.minecart.is_empty());
        assert!(session.next_trigger_at > now);
        let entrance = session.map.entrance();
        assert_eq!(
            session.map.tile(entrance.x, entrance.y).unwrap().kind,
            TileKind::Entrance
        );
    }

    #[test]
    fn descend_keeps_cart_and_stats_but_rebuilds_world() {
        let registry = test_registry();
        let now = Utc::now();
        let mut rng = test_rng();
        let mut session = SessionState::create("chan-1", registry.default_mine(), now, &mut rng);
        session.minecart.add_item("p1", "coal_ore", 5);
        session.stats.walls_broken = 42;
        let old_map = session.map.clone();

        let next = registry.get("crystal_cavern").unwrap();
        session.descend(next, now, &mut rng);

        assert_eq!(session.depth, 1);
        assert_eq!(session.mine_type_id, "crystal_cavern");
        assert_eq!(session.phase, Phase::Working);
        assert_eq!(session.minecart.quantity_of("coal_ore"), 5);
        assert_eq!(session.stats.walls_broken, 42);
        assert_ne!(session.map, old_map);
        assert!(session.exit.is_none());
        assert!(session.helpers.is_empty());
    }

    #[test]
    fn sanitize_repairs_entrance_and_positions() {
        let registry = test_registry();
        let mut rng = test_rng();
        let mut session =
            SessionState::create("chan-1", registry.default_mine(), Utc::now(), &mut rng);
        let entrance = session.map.entrance();
        session.map.tile_mut(entrance.x, entrance.y).unwrap().kind = TileKind::Wall;
        session
            .map
            .player_positions
            .insert("p1".to_string(), Position::new(999, 999));

        session.sanitize();

        let tile = session.map.tile(entrance.x, entrance.y).unwrap();
        assert_eq!(tile.kind, TileKind::Entrance);
        assert!(tile.discovered);
        assert_eq!(session.map.position_of("p1").unwrap(), entrance);
    }

    #[test]
    fn session_round_trips_through_json() {
        let registry = test_registry();
        let mut rng = test_rng();
        let mut session =
            SessionState::create("chan-1", registry.default_mine(), Utc::now(), &mut rng);
        session.minecart.add_item("p1", "coal_ore", 2);
        session.ensure_present("p1");

        let json = serde_json::to_string(&session).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn expire_helpers_drops_past_windows() {
        let registry = test_registry();
        let mut rng = test_rng();
        let now = Utc::now();
        let mut session = SessionState::create("chan-1", registry.default_mine(), now, &mut rng);
        session.helpers.push(ShadowHelper {
            id: "helper:rail:1".to_string(),
            power: 3,
            speed: 2,
            expires_at: now - chrono::Duration::seconds(1),
        });
        session.helpers.push(ShadowHelper {
            id: "helper:rail:2".to_string(),
            power: 3,
            speed: 2,
            expires_at: now + chrono::Duration::minutes(10),
        });
        session.expire_helpers(now);
        assert_eq!(session.helpers.len(), 1);
        assert_eq!(session.helpers[0].id, "helper:rail:2");
    }
}
