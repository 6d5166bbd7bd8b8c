//! Action resolver - one actor's mining turn within a tick.
//!
//! Each present player (and each shadow helper) gets an action budget
//! derived from their mining speed, clamped to [`MAX_SPEED_ACTIONS`]. Every
//! budgeted step picks a destination, attempts a wall break or a move,
//! rolls item discovery on successful breaks, wears down the active tool,
//! and checks the hazard layer on landing. A failed break just consumes the
//! step; an actor-scoped anomaly (inventory failure, desynced record)
//! abandons that actor's remaining budget and nothing else - one player's
//! problem must never abort the channel's tick.

use crate::config::mines::{DropEntry, MineTypeConfig, UnlockCondition};
use crate::core::catalog::{ItemCatalog, ItemCategory, ItemInfo, resolve_or_fallback};
use crate::core::events::GameEvent;
use crate::core::hazard::HazardEffect;
use crate::core::inventory::{
    BARE_HANDS_POWER, BARE_HANDS_SPEED, InventoryService, ToolState,
};
use crate::core::map::{Position, Tile, TileKind};
use crate::core::session::{ExitTileState, SessionState};
use rand::Rng;
use tracing::{debug, warn};

/// Upper bound on actions per actor per tick, whatever their speed stat.
pub const MAX_SPEED_ACTIONS: u32 = 5;

/// Durability worn off the active tool by one blow against a wall.
const WEAR_PER_BLOW: u32 = 1;

/// An entity whose turn the resolver processes.
#[derive(Clone, Debug)]
pub struct Actor {
    pub id: String,
    /// Shadow helpers have no inventory; their stats come from the session
    /// and everything they find goes to the minecart
    pub is_shadow: bool,
}

impl Actor {
    /// A human player.
    #[must_use]
    pub fn player(id: &str) -> Self {
        Self {
            id: id.to_string(),
            is_shadow: false,
        }
    }

    /// A shadow helper entity.
    #[must_use]
    pub fn shadow(id: &str) -> Self {
        Self {
            id: id.to_string(),
            is_shadow: true,
        }
    }
}

/// External collaborators the resolver needs.
pub struct ResolverDeps<'a> {
    pub mine: &'a MineTypeConfig,
    pub catalog: &'a dyn ItemCatalog,
    pub inventory: &'a dyn InventoryService,
}

/// Runs one actor's full action budget against the session. Never fails:
/// anomalies are logged and the remaining budget is dropped.
pub async fn resolve_actor_tick<R: Rng>(
    session: &mut SessionState,
    actor: &Actor,
    deps: &ResolverDeps<'_>,
    rng: &mut R,
    events: &mut Vec<GameEvent>,
) {
    session.ensure_present(&actor.id);

    let (mut power, speed, mut tool) = match actor_stats(session, actor, deps).await {
        Some(stats) => stats,
        None => return,
    };
    let budget = speed.clamp(1, MAX_SPEED_ACTIONS);
    let events_before = events.len();

    for _ in 0..budget {
        // Re-read the position every step: an expansion earlier in this
        // same tick (or this same budget) may have shifted coordinates.
        let Some(pos) = session.map.position_of(&actor.id) else {
            warn!(actor_id = %actor.id, "actor lost their map position mid-tick");
            break;
        };

        let Some(dest) = pick_destination(session, pos, rng) else {
            continue;
        };
        let Some(dest_tile) = session.map.tile(dest.x, dest.y).copied() else {
            continue;
        };

        if dest_tile.kind.is_breakable() {
            let broke = swing_at_wall(session, actor, dest, dest_tile, power, deps, rng, events)
                .await;
            if matches!(broke, SwingResult::Abandon) {
                break;
            }
            // Tool wear applies to every blow, landed or not.
            if let Some(active) = tool.as_ref() {
                match wear_tool(session, actor, active, WEAR_PER_BLOW, deps, events).await {
                    WearResult::Ok(updated) => tool = updated,
                    WearResult::Abandon => break,
                }
                power = effective_power(tool.as_ref());
            }
            if matches!(broke, SwingResult::Broke) {
                // Step into the opened tile; a hazard there may end the turn.
                let stunned = move_actor(session, actor, dest, deps, rng, events).await;
                if stunned {
                    break;
                }
            }
        } else if dest_tile.kind.is_walkable() {
            let stunned = move_actor(session, actor, dest, deps, rng, events).await;
            if stunned {
                break;
            }
        }
    }

    if events.len() == events_before {
        events.push(GameEvent::NothingHappened {
            channel_id: session.channel_id.clone(),
            actor_id: actor.id.clone(),
        });
    }
}

fn effective_power(tool: Option<&ToolState>) -> u32 {
    tool.map_or(BARE_HANDS_POWER, |t| BARE_HANDS_POWER + t.power)
}

/// Resolves power/speed/tool for the actor. `None` abandons the turn
/// (player-scoped anomaly already logged).
async fn actor_stats(
    session: &SessionState,
    actor: &Actor,
    deps: &ResolverDeps<'_>,
) -> Option<(u32, u32, Option<ToolState>)> {
    if actor.is_shadow {
        let helper = session.helpers.iter().find(|h| h.id == actor.id);
        return match helper {
            Some(h) => Some((h.power, h.speed, None)),
            None => {
                warn!(actor_id = %actor.id, "shadow helper has no session record, skipping");
                None
            }
        };
    }
    match deps.inventory.mining_tools(&actor.id).await {
        Ok(tools) => {
            let tool = tools.into_iter().next();
            let power = effective_power(tool.as_ref());
            let speed = tool
                .as_ref()
                .map_or(BARE_HANDS_SPEED, |t| BARE_HANDS_SPEED + t.speed);
            Some((power, speed, tool))
        }
        Err(e) => {
            warn!(actor_id = %actor.id, error = %e, "inventory unavailable, abandoning turn");
            None
        }
    }
}

/// Picks where the actor digs or walks next: breakable walls first, then
/// open floor, uniformly at random within each class.
fn pick_destination<R: Rng>(
    session: &SessionState,
    pos: Position,
    rng: &mut R,
) -> Option<Position> {
    let neighbors = session.map.neighbors(pos);
    let breakable: Vec<Position> = neighbors
        .iter()
        .copied()
        .filter(|p| {
            session
                .map
                .tile(p.x, p.y)
                .is_some_and(|t| t.kind.is_breakable())
        })
        .collect();
    if !breakable.is_empty() {
        return Some(breakable[rng.gen_range(0..breakable.len())]);
    }
    let walkable: Vec<Position> = neighbors
        .into_iter()
        .filter(|p| {
            session
                .map
                .tile(p.x, p.y)
                .is_some_and(|t| t.kind.is_walkable())
        })
        .collect();
    if walkable.is_empty() {
        None
    } else {
        Some(walkable[rng.gen_range(0..walkable.len())])
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SwingResult {
    Broke,
    Held,
    Abandon,
}

/// One blow against a breakable tile. Success converts it to floor and
/// rolls item discovery; a miss chips reinforced walls and otherwise just
/// consumes the step.
#[allow(clippy::too_many_arguments)]
async fn swing_at_wall<R: Rng>(
    session: &mut SessionState,
    actor: &Actor,
    dest: Position,
    dest_tile: Tile,
    power: u32,
    deps: &ResolverDeps<'_>,
    rng: &mut R,
    events: &mut Vec<GameEvent>,
) -> SwingResult {
    if power < dest_tile.hardness {
        if dest_tile.kind == TileKind::ReinforcedWall {
            // Cumulative chipping: reinforced walls yield to repeated blows.
            if let Some(tile) = session.map.tile_mut(dest.x, dest.y) {
                tile.hardness = tile.hardness.saturating_sub(power);
            }
        }
        return SwingResult::Held;
    }

    if let Some(tile) = session.map.tile_mut(dest.x, dest.y) {
        *tile = Tile::floor();
    } else {
        // The coordinate vanished between read and write; treat as a
        // consumed step.
        return SwingResult::Held;
    }

    session.stats.walls_broken += 1;
    if dest_tile.kind == TileKind::RareOre {
        session.stats.rare_ores_found += 1;
    }
    if let Some(event) = session.special_event.as_mut() {
        *event.participants.entry(actor.id.clone()).or_insert(0) += 1;
    }

    roll_exit_spawn(session, dest, deps.mine, rng, events);

    let find = roll_discovery(dest_tile.kind, actor, deps.mine, deps.catalog, rng);
    if let Some(item) = find {
        if grant_item(session, actor, &item, 1, deps, events).await.is_err() {
            return SwingResult::Abandon;
        }
    }
    SwingResult::Broke
}

/// Rolls what a broken tile yields. `None` means an honest empty roll, not
/// a lookup failure - those fall back inside the table draw.
fn roll_discovery<R: Rng>(
    broken: TileKind,
    actor: &Actor,
    mine: &MineTypeConfig,
    catalog: &dyn ItemCatalog,
    rng: &mut R,
) -> Option<ItemInfo> {
    match broken {
        TileKind::WallWithOre => Some(draw_from_table(&mine.ore_table, catalog, rng)),
        TileKind::RareOre | TileKind::ReinforcedWall => {
            Some(draw_from_table(&mine.treasure_table, catalog, rng))
        }
        TileKind::Wall => {
            let w = &mine.loot_weights;
            // Shadow helpers have no inventory, so their plain-wall finds
            // stay in the cart-routed pools.
            let equipment = if actor.is_shadow { 0 } else { w.equipment };
            let total = w.ore + w.treasure + equipment + w.nothing;
            if total == 0 {
                return None;
            }
            let roll = rng.gen_range(0..total);
            if roll < w.ore {
                Some(draw_from_table(&mine.ore_table, catalog, rng))
            } else if roll < w.ore + w.treasure {
                Some(draw_from_table(&mine.treasure_table, catalog, rng))
            } else if roll < w.ore + w.treasure + equipment {
                Some(draw_from_table(&mine.equipment_table, catalog, rng))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Weighted draw from a drop table. An empty or zero-weight table resolves
/// to the guaranteed fallback item rather than an undefined selection.
fn draw_from_table<R: Rng>(
    table: &[DropEntry],
    catalog: &dyn ItemCatalog,
    rng: &mut R,
) -> ItemInfo {
    let total: u32 = table.iter().map(|e| e.weight).sum();
    if total == 0 {
        return resolve_or_fallback(catalog, crate::core::catalog::FALLBACK_ITEM_ID);
    }
    let mut roll = rng.gen_range(0..total);
    for entry in table {
        if roll < entry.weight {
            return resolve_or_fallback(catalog, &entry.item_id);
        }
        roll -= entry.weight;
    }
    resolve_or_fallback(catalog, crate::core::catalog::FALLBACK_ITEM_ID)
}

/// Routes a found item by its category: cart loot to the minecart,
/// personal loot to the inventory service. The routing is an invariant,
/// not a preference - ore never lands in a personal inventory and gear
/// never lands in the cart.
async fn grant_item(
    session: &mut SessionState,
    actor: &Actor,
    item: &ItemInfo,
    quantity: u32,
    deps: &ResolverDeps<'_>,
    events: &mut Vec<GameEvent>,
) -> Result<(), ()> {
    let to_minecart = match item.category {
        ItemCategory::Ore | ItemCategory::Treasure => true,
        ItemCategory::Equipment | ItemCategory::Consumable => {
            // Shadow finds are pre-filtered to cart categories; reaching
            // here with one is a drop-table misconfiguration.
            if actor.is_shadow {
                warn!(item_id = %item.id, "shadow helper rolled personal loot, discarding");
                return Ok(());
            }
            false
        }
    };

    if to_minecart {
        session
            .minecart
            .add_item(&actor.id, &item.id, i64::from(quantity));
        match item.category {
            ItemCategory::Ore => session.stats.ores_found += u64::from(quantity),
            ItemCategory::Treasure => session.stats.treasures_found += u64::from(quantity),
            _ => {}
        }
        session.stats.lifetime_value += item.value * u64::from(quantity);
    } else if let Err(e) = deps
        .inventory
        .add_item(&actor.id, &item.id, quantity)
        .await
    {
        warn!(actor_id = %actor.id, error = %e, "inventory grant failed, abandoning turn");
        return Err(());
    } else {
        session.stats.lifetime_value += item.value * u64::from(quantity);
    }

    events.push(GameEvent::ItemFound {
        channel_id: session.channel_id.clone(),
        actor_id: actor.id.clone(),
        item_id: item.id.clone(),
        quantity,
        to_minecart,
    });
    Ok(())
}

/// Rolls the rare exit-tile spawn for mines with a spawn-and-reach unlock.
fn roll_exit_spawn<R: Rng>(
    session: &mut SessionState,
    dest: Position,
    mine: &MineTypeConfig,
    rng: &mut R,
    events: &mut Vec<GameEvent>,
) {
    let UnlockCondition::ExitTile { spawn_chance } = mine.unlock else {
        return;
    };
    if session.exit.is_none() && rng.gen_bool(spawn_chance.clamp(0.0, 1.0)) {
        session.exit = Some(ExitTileState {
            pos: dest,
            reached: false,
        });
        events.push(GameEvent::ExitSpawned {
            channel_id: session.channel_id.clone(),
        });
    }
}

/// Moves the actor onto an open tile, running expansion, hazard, and
/// exit-reached checks. Returns `true` when a hazard stunned the actor.
async fn move_actor<R: Rng>(
    session: &mut SessionState,
    actor: &Actor,
    dest: Position,
    deps: &ResolverDeps<'_>,
    rng: &mut R,
    events: &mut Vec<GameEvent>,
) -> bool {
    if let Some(tile) = session.map.tile_mut(dest.x, dest.y) {
        tile.discovered = true;
    }
    session.map.set_position(&actor.id, dest);

    // Expansion may shift every coordinate; re-read our own afterwards.
    let dest = apply_expansion(session, dest, deps.mine, rng);

    if let Some(exit) = session.exit.as_mut() {
        if exit.pos == dest {
            exit.reached = true;
        }
    }

    let Some(effect) = session.hazards.resolve_encounter(dest.x, dest.y) else {
        return false;
    };
    // Leave an inert marker where it went off.
    if let Some(tile) = session.map.tile_mut(dest.x, dest.y) {
        if tile.kind == TileKind::Floor {
            tile.kind = TileKind::Hazard;
        }
    }
    let hazard_name = match effect {
        HazardEffect::TeleportToEntrance => "cave_in",
        HazardEffect::Stun => "gas_pocket",
        HazardEffect::DamageAndStun { .. } => "bomb_trap",
        HazardEffect::BonusOre { .. } => "lucky_vein",
    };
    events.push(GameEvent::HazardTriggered {
        channel_id: session.channel_id.clone(),
        actor_id: actor.id.clone(),
        hazard: hazard_name.to_string(),
    });

    match effect {
        HazardEffect::TeleportToEntrance => {
            let entrance = session.map.entrance();
            session.map.set_position(&actor.id, entrance);
            false
        }
        HazardEffect::Stun => true,
        HazardEffect::DamageAndStun { durability_loss } => {
            if !actor.is_shadow {
                if let Ok(tools) = deps.inventory.mining_tools(&actor.id).await {
                    if let Some(active) = tools.first() {
                        let _ = wear_tool(session, actor, active, durability_loss, deps, events)
                            .await;
                    }
                }
            }
            true
        }
        HazardEffect::BonusOre { quantity } => {
            let item = draw_from_table(&deps.mine.ore_table, deps.catalog, rng);
            let _ = grant_item(session, actor, &item, quantity, deps, events).await;
            false
        }
    }
}

/// Expands the map when the position is near an edge, reseeding hazards in
/// the new area and shifting every coordinate-keyed structure. Returns the
/// possibly shifted position.
fn apply_expansion<R: Rng>(
    session: &mut SessionState,
    pos: Position,
    mine: &MineTypeConfig,
    rng: &mut R,
) -> Position {
    let Some(expansion) = session.map.expand(pos.x, pos.y, mine.power_level, rng) else {
        return pos;
    };
    debug!(
        channel_id = %session.channel_id,
        dx = expansion.dx,
        dy = expansion.dy,
        "map expanded"
    );
    session.hazards.shift(expansion.dx, expansion.dy);
    if let Some(exit) = session.exit.as_mut() {
        exit.pos.x += expansion.dx;
        exit.pos.y += expansion.dy;
    }
    let exclude = (session.map.entrance_x, session.map.entrance_y);
    for rect in &expansion.added {
        session.hazards.generate_for_area(
            *rect,
            mine.hazard_chance,
            mine.power_level,
            &mine.allowed_hazards,
            exclude,
            rng,
        );
    }
    Position::new(pos.x + expansion.dx, pos.y + expansion.dy)
}

enum WearResult {
    /// The (possibly broken-and-replaced, possibly removed) active tool
    Ok(Option<ToolState>),
    /// Inventory collaborator failed; abandon the turn
    Abandon,
}

/// Applies durability loss via the inventory service and reconciles the
/// local view of the active tool, falling back to the next-best tool when
/// one is removed entirely.
async fn wear_tool(
    session: &SessionState,
    actor: &Actor,
    active: &ToolState,
    loss: u32,
    deps: &ResolverDeps<'_>,
    events: &mut Vec<GameEvent>,
) -> WearResult {
    let outcome = match deps
        .inventory
        .apply_durability_loss(&actor.id, &active.item_id, loss)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(actor_id = %actor.id, error = %e, "durability update failed, abandoning turn");
            return WearResult::Abandon;
        }
    };

    let unit_broke = outcome.removed || outcome.quantity < active.quantity;
    if unit_broke {
        events.push(GameEvent::ToolBroken {
            channel_id: session.channel_id.clone(),
            actor_id: actor.id.clone(),
            item_id: active.item_id.clone(),
            removed: outcome.removed,
        });
    }

    if outcome.removed {
        // Fall back to whatever is next best, or bare hands.
        match deps.inventory.mining_tools(&actor.id).await {
            Ok(tools) => WearResult::Ok(tools.into_iter().next()),
            Err(e) => {
                warn!(actor_id = %actor.id, error = %e, "tool refetch failed, abandoning turn");
                WearResult::Abandon
            }
        }
    } else {
        let mut updated = active.clone();
        updated.durability = outcome.durability;
        updated.quantity = outcome.quantity;
        WearResult::Ok(Some(updated))
    }
}
