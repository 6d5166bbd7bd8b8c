//! Item catalog boundary - read-only item lookups with a mandatory fallback.
//!
//! The core never owns item definitions; it consumes a [`ItemCatalog`]
//! lookup. Lookups can miss (stale config, themed mines swapping catalogs),
//! so every resolution site goes through [`resolve_or_fallback`] rather than
//! letting an absent item propagate into arithmetic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Routing class of an item, validated at the catalog boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    /// Shared loot; always routed to the minecart
    Ore,
    /// Valuable find; routed to the minecart, counted separately in stats
    Treasure,
    /// Personal gear; always routed to the player's inventory
    Equipment,
    /// Personal consumable; always routed to the player's inventory
    Consumable,
}

/// A resolved item definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub id: String,
    pub name: String,
    /// Unit value in credits
    pub value: u64,
    /// Loot tier, 1 = lowest
    pub tier: u32,
    pub category: ItemCategory,
}

/// Id of the guaranteed lowest-tier item substituted when a lookup misses
/// or a drop pool resolves to nothing.
pub const FALLBACK_ITEM_ID: &str = "stone_chunk";

/// The guaranteed fallback item. Exists even with an empty catalog.
#[must_use]
pub fn fallback_item() -> ItemInfo {
    ItemInfo {
        id: FALLBACK_ITEM_ID.to_string(),
        name: "Stone Chunk".to_string(),
        value: 1,
        tier: 1,
        category: ItemCategory::Ore,
    }
}

/// Read-only item lookup consumed by the core.
pub trait ItemCatalog: Send + Sync {
    /// Resolves an item id; `None` when the id is unknown.
    fn resolve_item(&self, item_id: &str) -> Option<ItemInfo>;
}

/// Resolves an item id, substituting the fallback item on a miss so that no
/// undefined selection ever reaches the minecart or inventory.
#[must_use]
pub fn resolve_or_fallback(catalog: &dyn ItemCatalog, item_id: &str) -> ItemInfo {
    catalog.resolve_item(item_id).unwrap_or_else(|| {
        tracing::warn!(item_id, "catalog miss, substituting fallback item");
        fallback_item()
    })
}

/// In-memory catalog backed by a map, built from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    items: HashMap<String, ItemInfo>,
}

impl StaticCatalog {
    /// Builds a catalog from item definitions.
    #[must_use]
    pub fn new(items: Vec<ItemInfo>) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.id.clone(), i)).collect(),
        }
    }
}

impl ItemCatalog for StaticCatalog {
    fn resolve_item(&self, item_id: &str) -> Option<ItemInfo> {
        self.items.get(item_id).cloned()
    }
}
