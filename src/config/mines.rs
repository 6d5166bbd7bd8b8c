//! Mine type registry and item catalog loading from config.toml.
//!
//! Mine types define everything theme-specific: power level, hazard
//! allow-list and spawn chance, drop tables per loot category, the
//! deeper-level unlock condition, and the follow-on mine. A themed mine may
//! substitute an entirely different loot pool (the gullet serves meat, not
//! ore); the allow-lists and tables here are the single source of truth the
//! core consults, so a kind or item never configured for a mine can never
//! appear in it.

use crate::core::catalog::{ItemInfo, StaticCatalog};
use crate::core::hazard::HazardKind;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Configuration baked into the binary so the bot runs without an external
/// config.toml; an on-disk file takes precedence when present.
const EMBEDDED_CONFIG: &str = include_str!("../../config.toml");

/// One weighted entry of a drop table.
#[derive(Clone, Debug, Deserialize)]
pub struct DropEntry {
    pub item_id: String,
    pub weight: u32,
}

/// The deeper-level progression condition for a mine type.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnlockCondition {
    /// Cumulative walls broken across the session's lifetime
    WallsBroken { count: u64 },
    /// Cumulative credit value of everything found
    LifetimeValue { value: u64 },
    /// Cumulative ore-category finds
    OresFound { count: u64 },
    /// Cumulative rare-ore tile breaks
    RareOresFound { count: u64 },
    /// A hidden exit tile spawns on wall breaks and must be reached
    ExitTile { spawn_chance: f64 },
}

/// Category weights rolled after breaking a plain wall.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct LootWeights {
    pub ore: u32,
    pub treasure: u32,
    pub equipment: u32,
    pub nothing: u32,
}

/// Full definition of one mine theme.
#[derive(Clone, Debug, Deserialize)]
pub struct MineTypeConfig {
    pub id: String,
    pub name: String,
    /// Scales tile seeding, hazard danger, and ore odds
    pub power_level: u32,
    /// Base per-tile hazard spawn probability
    pub hazard_chance: f64,
    /// The only hazard kinds allowed to spawn in this mine
    pub allowed_hazards: Vec<HazardKind>,
    /// Weights for the loot-category roll on a plain wall break
    pub loot_weights: LootWeights,
    /// Ore-category drop table (minecart-routed)
    pub ore_table: Vec<DropEntry>,
    /// Treasure-category drop table (minecart-routed)
    pub treasure_table: Vec<DropEntry>,
    /// Equipment/consumable drop table (inventory-routed)
    pub equipment_table: Vec<DropEntry>,
    /// Condition unlocking the next level
    pub unlock: UnlockCondition,
    /// Mine type the session descends into; `None` loops back to itself
    pub next_mine: Option<String>,
}

/// Raw shape of config.toml.
#[derive(Debug, Deserialize)]
struct MinesFile {
    default_mine: String,
    mines: Vec<MineTypeConfig>,
    items: Vec<ItemInfo>,
}

/// Validated registry of every configured mine type plus the item catalog
/// built from the same file. Constructed once at startup and shared.
#[derive(Debug)]
pub struct MineRegistry {
    default_mine: String,
    mines: HashMap<String, MineTypeConfig>,
    catalog: StaticCatalog,
}

impl MineRegistry {
    /// Parses and validates a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: MinesFile = toml::from_str(contents).map_err(|e| Error::Config {
            message: format!("Failed to parse mine configuration: {e}"),
        })?;
        let catalog = StaticCatalog::new(file.items);
        let mines: HashMap<String, MineTypeConfig> = file
            .mines
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        if !mines.contains_key(&file.default_mine) {
            return Err(Error::Config {
                message: format!("default_mine '{}' is not defined", file.default_mine),
            });
        }
        for mine in mines.values() {
            if let Some(next) = &mine.next_mine {
                if !mines.contains_key(next) {
                    return Err(Error::Config {
                        message: format!("mine '{}' references unknown next_mine '{next}'", mine.id),
                    });
                }
            }
        }

        Ok(Self {
            default_mine: file.default_mine,
            mines,
            catalog,
        })
    }

    /// Loads from a config file, falling back to the embedded defaults when
    /// the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
                message: format!("Failed to read {}: {e}", path.display()),
            })?;
            Self::from_toml(&contents)
        } else {
            tracing::info!("no config file at {}, using embedded defaults", path.display());
            Self::from_toml(EMBEDDED_CONFIG)
        }
    }

    /// Loads from the default location (./config.toml).
    pub fn load_default() -> Result<Self> {
        Self::load("config.toml")
    }

    /// The mine type new sessions start in.
    #[must_use]
    pub fn default_mine(&self) -> &MineTypeConfig {
        // Presence is validated at construction.
        &self.mines[&self.default_mine]
    }

    /// Resolves a mine type id.
    pub fn get(&self, id: &str) -> Result<&MineTypeConfig> {
        self.mines.get(id).ok_or_else(|| Error::UnknownMineType {
            id: id.to_string(),
        })
    }

    /// The mine a session descends into from `mine`. A mine without an
    /// explicit successor deepens into itself.
    pub fn next_after<'a>(&'a self, mine: &'a MineTypeConfig) -> Result<&'a MineTypeConfig> {
        match &mine.next_mine {
            Some(next) => self.get(next),
            None => Ok(mine),
        }
    }

    /// The item catalog defined alongside the mines.
    #[must_use]
    pub const fn catalog(&self) -> &StaticCatalog {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::catalog::ItemCatalog;

    #[test]
    fn embedded_config_parses_and_validates() {
        let registry = MineRegistry::from_toml(EMBEDDED_CONFIG).unwrap();
        assert_eq!(registry.default_mine().id, "coal_mine");
        assert!(registry.catalog().resolve_item("coal_ore").is_some());
    }

    #[test]
    fn gullet_theme_excludes_bomb_traps_and_ore() {
        let registry = MineRegistry::from_toml(EMBEDDED_CONFIG).unwrap();
        let gullet = registry.get("gullet").unwrap();
        assert!(!gullet.allowed_hazards.contains(&HazardKind::BombTrap));
        // The themed mine substitutes its own pool, not the ore catalog.
        assert!(gullet.ore_table.iter().all(|d| d.item_id.contains("meat")));
    }

    #[test]
    fn unknown_mine_type_is_an_error() {
        let registry = MineRegistry::from_toml(EMBEDDED_CONFIG).unwrap();
        assert!(matches!(
            registry.get("chocolate_factory"),
            Err(Error::UnknownMineType { .. })
        ));
    }

    #[test]
    fn unknown_next_mine_fails_validation() {
        let bad = r#"
            default_mine = "a"

            [[mines]]
            id = "a"
            name = "A"
            power_level = 1
            hazard_chance = 0.1
            allowed_hazards = ["cave_in"]
            loot_weights = { ore = 1, treasure = 0, equipment = 0, nothing = 1 }
            ore_table = [{ item_id = "coal_ore", weight = 1 }]
            treasure_table = []
            equipment_table = []
            unlock = { kind = "walls_broken", count = 10 }
            next_mine = "nope"

            [[items]]
            id = "coal_ore"
            name = "Coal Ore"
            value = 5
            tier = 1
            category = "ore"
        "#;
        assert!(matches!(
            MineRegistry::from_toml(bad),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn next_after_defaults_to_self() {
        let registry = MineRegistry::from_toml(EMBEDDED_CONFIG).unwrap();
        let gullet = registry.get("gullet").unwrap();
        let next = registry.next_after(gullet).unwrap();
        assert_eq!(next.id, gullet.id);
    }
}
