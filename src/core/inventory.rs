//! Inventory service boundary - tool ownership lives outside the core.
//!
//! The resolver only issues "apply durability loss" commands and consumes
//! the resulting state. The break semantics are a required invariant of the
//! collaborator, encoded by [`MemoryInventory`], the in-memory reference
//! implementation used in tests and as the default backend: losing the last
//! durability point breaks one unit of the tool, and while units remain the
//! durability resets to the tool's maximum (never to zero); at zero units
//! the tool is removed entirely.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Baseline mining power with no tool equipped.
pub const BARE_HANDS_POWER: u32 = 1;
/// Baseline actions per tick with no tool equipped.
pub const BARE_HANDS_SPEED: u32 = 1;

/// A stack of identical tools owned by one player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolState {
    pub item_id: String,
    /// Remaining durability of the unit currently in use
    pub durability: u32,
    /// Durability a fresh unit starts with
    pub max_durability: u32,
    /// Units in the stack, including the one in use
    pub quantity: u32,
    /// Mining power granted while this tool is equipped
    pub power: u32,
    /// Actions per tick granted while this tool is equipped
    pub speed: u32,
}

/// Result of applying durability loss to a tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DurabilityOutcome {
    /// The tool is gone entirely; the caller must fall back to another
    pub removed: bool,
    /// Durability of the unit now in use (0 when removed)
    pub durability: u32,
    /// Units remaining in the stack
    pub quantity: u32,
}

/// External inventory collaborator consumed by the core.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Grants items (equipment/consumable finds) to a player.
    async fn add_item(&self, player_id: &str, item_id: &str, quantity: u32) -> Result<()>;

    /// The player's mining tools, best first.
    async fn mining_tools(&self, player_id: &str) -> Result<Vec<ToolState>>;

    /// Applies durability loss to one tool, breaking units as needed.
    async fn apply_durability_loss(
        &self,
        player_id: &str,
        item_id: &str,
        loss: u32,
    ) -> Result<DurabilityOutcome>;
}

/// In-memory inventory, the reference implementation of the durability
/// invariant. Production deployments swap in a store-backed service.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    players: Mutex<HashMap<String, Vec<ToolState>>>,
}

impl MemoryInventory {
    /// An empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a player's tools, sorted best-power-first.
    pub fn set_tools(&self, player_id: &str, mut tools: Vec<ToolState>) {
        tools.sort_by(|a, b| b.power.cmp(&a.power));
        self.players
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(player_id.to_string(), tools);
    }
}

#[async_trait]
impl InventoryService for MemoryInventory {
    async fn add_item(&self, player_id: &str, item_id: &str, quantity: u32) -> Result<()> {
        let mut players = self
            .players
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let tools = players.entry(player_id.to_string()).or_default();
        if let Some(tool) = tools.iter_mut().find(|t| t.item_id == item_id) {
            tool.quantity = tool.quantity.saturating_add(quantity);
        } else {
            tools.push(ToolState {
                item_id: item_id.to_string(),
                durability: 50,
                max_durability: 50,
                quantity,
                power: 2,
                speed: 2,
            });
            tools.sort_by(|a, b| b.power.cmp(&a.power));
        }
        Ok(())
    }

    async fn mining_tools(&self, player_id: &str) -> Result<Vec<ToolState>> {
        Ok(self
            .players
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(player_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn apply_durability_loss(
        &self,
        player_id: &str,
        item_id: &str,
        loss: u32,
    ) -> Result<DurabilityOutcome> {
        let mut players = self
            .players
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let tools = players
            .get_mut(player_id)
            .ok_or_else(|| Error::Inventory {
                player_id: player_id.to_string(),
                message: "player has no inventory".to_string(),
            })?;
        let index = tools
            .iter()
            .position(|t| t.item_id == item_id)
            .ok_or_else(|| Error::Inventory {
                player_id: player_id.to_string(),
                message: format!("tool {item_id} not found"),
            })?;

        let tool = &mut tools[index];
        tool.durability = tool.durability.saturating_sub(loss);
        if tool.durability > 0 {
            return Ok(DurabilityOutcome {
                removed: false,
                durability: tool.durability,
                quantity: tool.quantity,
            });
        }

        // The unit in use broke. Consume it; while units remain, the next
        // one starts at full durability.
        tool.quantity = tool.quantity.saturating_sub(1);
        if tool.quantity > 0 {
            tool.durability = tool.max_durability;
            return Ok(DurabilityOutcome {
                removed: false,
                durability: tool.durability,
                quantity: tool.quantity,
            });
        }

        tools.remove(index);
        Ok(DurabilityOutcome {
            removed: true,
            durability: 0,
            quantity: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn pickaxe(durability: u32, quantity: u32) -> ToolState {
        ToolState {
            item_id: "pickaxe".to_string(),
            durability,
            max_durability: 100,
            quantity,
            power: 3,
            speed: 3,
        }
    }

    #[tokio::test]
    async fn durability_loss_without_break() {
        let inv = MemoryInventory::new();
        inv.set_tools("p1", vec![pickaxe(40, 1)]);
        let outcome = inv.apply_durability_loss("p1", "pickaxe", 10).await.unwrap();
        assert_eq!(
            outcome,
            DurabilityOutcome {
                removed: false,
                durability: 30,
                quantity: 1,
            }
        );
    }

    #[tokio::test]
    async fn break_resets_durability_to_max_while_units_remain() {
        let inv = MemoryInventory::new();
        inv.set_tools("p1", vec![pickaxe(5, 2)]);
        // 10 damage on 5 durability: one unit breaks, the next starts fresh.
        let outcome = inv.apply_durability_loss("p1", "pickaxe", 10).await.unwrap();
        assert_eq!(
            outcome,
            DurabilityOutcome {
                removed: false,
                durability: 100,
                quantity: 1,
            }
        );
    }

    #[tokio::test]
    async fn breaking_the_last_unit_removes_the_tool() {
        let inv = MemoryInventory::new();
        inv.set_tools("p1", vec![pickaxe(5, 1)]);
        let outcome = inv.apply_durability_loss("p1", "pickaxe", 10).await.unwrap();
        assert!(outcome.removed);
        assert_eq!(outcome.quantity, 0);
        assert_eq!(outcome.durability, 0);
        // No dangling durability record.
        assert!(inv.mining_tools("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_tool_is_an_inventory_error() {
        let inv = MemoryInventory::new();
        inv.set_tools("p1", vec![]);
        let err = inv.apply_durability_loss("p1", "pickaxe", 1).await;
        assert!(matches!(err, Err(Error::Inventory { .. })));
    }

    #[tokio::test]
    async fn tools_are_ordered_best_first() {
        let inv = MemoryInventory::new();
        inv.set_tools(
            "p1",
            vec![
                pickaxe(10, 1),
                ToolState {
                    item_id: "drill".to_string(),
                    durability: 10,
                    max_durability: 10,
                    quantity: 1,
                    power: 9,
                    speed: 4,
                },
            ],
        );
        let tools = inv.mining_tools("p1").await.unwrap();
        assert_eq!(tools[0].item_id, "drill");
    }
}
