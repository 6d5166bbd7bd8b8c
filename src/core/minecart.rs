//! Minecart ledger - the channel-shared accumulator of collected loot.
//!
//! Tracks total quantity per item and a per-player contribution counter.
//! Counters are plain unsigned integers and stay that way: a historical bug
//! class corrupted these with non-numeric values, so every increment path
//! coerces invalid input to a zero contribution and a [`sanitize`] pass
//! repairs anything questionable coming back from the store.
//!
//! [`sanitize`]: Minecart::sanitize

use crate::core::catalog::{ItemCatalog, resolve_or_fallback};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Aggregate of everything mined in a channel, pending distribution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minecart {
    /// Item id -> collected quantity
    #[serde(default)]
    items: BTreeMap<String, u64>,
    /// Player id -> number of items that player contributed
    #[serde(default)]
    contributors: BTreeMap<String, u64>,
}

/// Pure read summary of a minecart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MinecartSummary {
    /// Total credit value of the cart contents
    pub total_value: u64,
    /// Total number of items in the cart
    pub item_count: u64,
    /// Number of distinct contributing players
    pub contributor_count: usize,
}

impl Minecart {
    /// An empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` of an item on behalf of a player. Quantities must be
    /// positive; zero or negative input is coerced to a no-op contribution
    /// rather than corrupting the stored counters.
    pub fn add_item(&mut self, player_id: &str, item_id: &str, quantity: i64) {
        let Ok(qty) = u64::try_from(quantity) else {
            warn!(player_id, item_id, quantity, "rejecting negative minecart increment");
            return;
        };
        if qty == 0 {
            warn!(player_id, item_id, "rejecting zero minecart increment");
            return;
        }
        let total = self.items.entry(item_id.to_string()).or_insert(0);
        *total = total.saturating_add(qty);
        let contributed = self.contributors.entry(player_id.to_string()).or_insert(0);
        *contributed = contributed.saturating_add(qty);
    }

    /// Quantity of one item currently in the cart.
    #[must_use]
    pub fn quantity_of(&self, item_id: &str) -> u64 {
        self.items.get(item_id).copied().unwrap_or(0)
    }

    /// Items contributed by one player.
    #[must_use]
    pub fn contribution_of(&self, player_id: &str) -> u64 {
        self.contributors.get(player_id).copied().unwrap_or(0)
    }

    /// Whether the cart holds anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pure read rollup. Never fails: an empty or partially initialized cart
    /// summarizes to zeros, and unresolvable items are valued via the
    /// catalog fallback.
    #[must_use]
    pub fn summarize(&self, catalog: &dyn ItemCatalog) -> MinecartSummary {
        let mut total_value = 0u64;
        let mut item_count = 0u64;
        for (item_id, qty) in &self.items {
            let info = resolve_or_fallback(catalog, item_id);
            total_value = total_value.saturating_add(info.value.saturating_mul(*qty));
            item_count = item_count.saturating_add(*qty);
        }
        MinecartSummary {
            total_value,
            item_count,
            contributor_count: self.contributors.len(),
        }
    }

    /// Removes `numer/denom` of every item stack (rounded down), returning
    /// the total quantity removed. Used by the thief event; contributor
    /// counters are untouched since they record who mined what.
    pub fn skim(&mut self, numer: u64, denom: u64) -> u64 {
        if denom == 0 {
            return 0;
        }
        let mut removed = 0;
        for qty in self.items.values_mut() {
            let taken = *qty * numer / denom;
            *qty -= taken;
            removed += taken;
        }
        self.items.retain(|_, qty| *qty > 0);
        removed
    }

    /// Drops zero-quantity entries that may have crept into a persisted
    /// document. The unsigned types already exclude negatives; this keeps
    /// reloaded documents canonical.
    pub fn sanitize(&mut self) {
        let before = self.items.len() + self.contributors.len();
        self.items.retain(|_, qty| *qty > 0);
        self.contributors.retain(|_, qty| *qty > 0);
        let dropped = before - self.items.len() - self.contributors.len();
        if dropped > 0 {
            warn!(dropped, "sanitized degenerate minecart counters");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::catalog::{ItemCategory, ItemInfo, StaticCatalog};

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(vec![
            ItemInfo {
                id: "coal_ore".to_string(),
                name: "Coal Ore".to_string(),
                value: 5,
                tier: 1,
                category: ItemCategory::Ore,
            },
            ItemInfo {
                id: "ruby".to_string(),
                name: "Ruby".to_string(),
                value: 120,
                tier: 4,
                category: ItemCategory::Treasure,
            },
        ])
    }

    #[test]
    fn add_item_tracks_totals_and_contributions() {
        let mut cart = Minecart::new();
        cart.add_item("p1", "coal_ore", 3);
        cart.add_item("p2", "coal_ore", 2);
        cart.add_item("p1", "ruby", 1);
        assert_eq!(cart.quantity_of("coal_ore"), 5);
        assert_eq!(cart.quantity_of("ruby"), 1);
        assert_eq!(cart.contribution_of("p1"), 4);
        assert_eq!(cart.contribution_of("p2"), 2);
    }

    #[test]
    fn invalid_increments_are_coerced_to_nothing() {
        let mut cart = Minecart::new();
        cart.add_item("p1", "coal_ore", 3);
        cart.add_item("p1", "coal_ore", -7);
        cart.add_item("p1", "coal_ore", 0);
        cart.add_item("p1", "coal_ore", i64::MIN);
        assert_eq!(cart.quantity_of("coal_ore"), 3);
        assert_eq!(cart.contribution_of("p1"), 3);
    }

    #[test]
    fn summarize_handles_empty_cart() {
        let cart = Minecart::new();
        let summary = cart.summarize(&catalog());
        assert_eq!(summary, MinecartSummary::default());
    }

    #[test]
    fn summarize_values_items_and_counts_contributors() {
        let mut cart = Minecart::new();
        cart.add_item("p1", "coal_ore", 4);
        cart.add_item("p2", "ruby", 1);
        let summary = cart.summarize(&catalog());
        assert_eq!(summary.total_value, 4 * 5 + 120);
        assert_eq!(summary.item_count, 5);
        assert_eq!(summary.contributor_count, 2);
    }

    #[test]
    fn summarize_uses_fallback_value_for_unknown_items() {
        let mut cart = Minecart::new();
        cart.add_item("p1", "mystery_rock", 2);
        let summary = cart.summarize(&catalog());
        // Fallback item is worth 1 credit.
        assert_eq!(summary.total_value, 2);
    }

}
