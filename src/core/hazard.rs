//! Hazard layer - sparse, coordinate-keyed hidden effects.
//!
//! Hazards are placed at session creation and at every map expansion by
//! weighted random placement scaled by the mine's power level. A hazard fires
//! at most once: the first actor to land on its coordinate triggers it and
//! the entry stays behind as an inert marker. Which hazard kinds may appear
//! is a per-mine-type allow-list, a hard constraint rather than flavor.

use crate::core::map::Rect;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The hazard vocabulary. Individual mine types allow only a subset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    /// Collapsing ceiling; sends the actor back to the entrance
    CaveIn,
    /// Pocket of gas; stuns the actor for the rest of the tick
    GasPocket,
    /// Leftover explosive; damages and stuns the actor
    BombTrap,
    /// A lucky seam; grants bonus ore instead of harming anyone
    LuckyVein,
}

/// What the resolver should apply after an encounter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HazardEffect {
    /// Move the actor to the entrance
    TeleportToEntrance,
    /// End the actor's remaining action budget this tick
    Stun,
    /// Damage the actor's tool and end their budget
    DamageAndStun {
        /// Extra durability loss applied to the active tool
        durability_loss: u32,
    },
    /// Grant bonus ore to the minecart
    BonusOre {
        /// Number of fallback-ore units granted
        quantity: u32,
    },
}

impl HazardKind {
    /// The effect this kind produces when triggered.
    #[must_use]
    pub const fn effect(self) -> HazardEffect {
        match self {
            Self::CaveIn => HazardEffect::TeleportToEntrance,
            Self::GasPocket => HazardEffect::Stun,
            Self::BombTrap => HazardEffect::DamageAndStun { durability_loss: 5 },
            Self::LuckyVein => HazardEffect::BonusOre { quantity: 3 },
        }
    }
}

/// One placed hazard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hazard {
    pub kind: HazardKind,
    pub triggered: bool,
}

/// Sparse mapping of `"x,y"` coordinate keys to hazards. A coordinate holds
/// at most one hazard for the lifetime of the map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardSet {
    hazards: BTreeMap<String, Hazard>,
}

fn key(x: u32, y: u32) -> String {
    format!("{x},{y}")
}

fn parse_key(key: &str) -> Option<(u32, u32)> {
    let (x, y) = key.split_once(',')?;
    Some((x.parse().ok()?, y.parse().ok()?))
}

impl HazardSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of placed hazards, triggered or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hazards.len()
    }

    /// Whether no hazards are placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hazards.is_empty()
    }

    /// The hazard at a coordinate, if any.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<&Hazard> {
        self.hazards.get(&key(x, y))
    }

    /// Weighted random placement over a rectangle. Each tile independently
    /// receives a hazard with `spawn_chance` scaled up by `power_level`,
    /// drawing kinds uniformly from `allowed` only. Existing entries and the
    /// excluded coordinate (the entrance) are never overwritten.
    pub fn generate_for_area<R: Rng>(
        &mut self,
        area: Rect,
        spawn_chance: f64,
        power_level: u32,
        allowed: &[HazardKind],
        exclude: (u32, u32),
        rng: &mut R,
    ) {
        if allowed.is_empty() {
            return;
        }
        // A misconfigured negative chance must not reach gen_bool.
        let chance = (spawn_chance * (1.0 + 0.15 * f64::from(power_level))).clamp(0.0, 0.5);
        for (x, y) in area.coords() {
            if (x, y) == exclude {
                continue;
            }
            let k = key(x, y);
            if self.hazards.contains_key(&k) {
                continue;
            }
            if rng.gen_bool(chance) {
                let kind = allowed[rng.gen_range(0..allowed.len())];
                self.hazards.insert(
                    k,
                    Hazard {
                        kind,
                        triggered: false,
                    },
                );
            }
        }
    }

    /// Fires the hazard at a coordinate. Returns its effect on the first
    /// call and `None` forever after; absent coordinates also return `None`.
    pub fn resolve_encounter(&mut self, x: u32, y: u32) -> Option<HazardEffect> {
        let hazard = self.hazards.get_mut(&key(x, y))?;
        if hazard.triggered {
            return None;
        }
        hazard.triggered = true;
        Some(hazard.kind.effect())
    }

    /// Rewrites all coordinate keys after a left/top map expansion shifted
    /// the grid by `(dx, dy)`.
    pub fn shift(&mut self, dx: u32, dy: u32) {
        if dx == 0 && dy == 0 {
            return;
        }
        let old = std::mem::take(&mut self.hazards);
        for (k, hazard) in old {
            if let Some((x, y)) = parse_key(&k) {
                self.hazards.insert(key(x + dx, y + dy), hazard);
            }
        }
    }

    /// Iterates placed hazards with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = ((u32, u32), &Hazard)> {
        self.hazards
            .iter()
            .filter_map(|(k, h)| Some((parse_key(k)?, h)))
    }
}
