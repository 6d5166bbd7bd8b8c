//! World map model - tile grid, coordinate system, and expansion logic.
//!
//! Each voice channel's mine is a rectangular grid of [`Tile`]s centered on a
//! permanently discovered entrance. The grid only ever grows: when a player
//! approaches an edge, [`MapData::expand`] adds freshly seeded rows/columns in
//! that direction, up to [`MAX_MAP_SIZE`] per axis. Growth on the left or top
//! edge shifts every existing coordinate, so `expand` reports the applied
//! offset for callers that keep coordinate-keyed state (hazards, positions)
//! alongside the map.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default width of a freshly initialized mine.
pub const DEFAULT_MAP_WIDTH: u32 = 11;
/// Default height of a freshly initialized mine.
pub const DEFAULT_MAP_HEIGHT: u32 = 11;
/// Hard cap on either map dimension; expansion stops here.
pub const MAX_MAP_SIZE: u32 = 64;
/// Distance from an edge at which movement triggers expansion.
pub const EXPANSION_MARGIN: u32 = 2;
/// Rows/columns added per expansion in the approached direction.
pub const EXPANSION_STEP: u32 = 4;

/// What occupies a single cell of the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    /// Plain rock, breakable
    Wall,
    /// Open, walkable ground
    Floor,
    /// The fixed spawn/return point; always discovered
    Entrance,
    /// Rock with a visible ore seam
    WallWithOre,
    /// Rock with a rare ore seam
    RareOre,
    /// Hardened rock requiring cumulative blows to break
    ReinforcedWall,
    /// Floor where a hazard has already gone off; inert marker
    Hazard,
}

impl TileKind {
    /// Whether an actor can stand on this tile.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        matches!(self, Self::Floor | Self::Entrance | Self::Hazard)
    }

    /// Whether this tile can be targeted by a wall-break action.
    #[must_use]
    pub const fn is_breakable(self) -> bool {
        matches!(
            self,
            Self::Wall | Self::WallWithOre | Self::RareOre | Self::ReinforcedWall
        )
    }
}

/// One cell of the map grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// What occupies the cell
    pub kind: TileKind,
    /// Whether any player has seen/opened this cell
    pub discovered: bool,
    /// Remaining toughness; blows chip reinforced walls down toward 0
    pub hardness: u32,
}

impl Tile {
    /// An open floor tile, as produced by a successful wall-break.
    #[must_use]
    pub const fn floor() -> Self {
        Self {
            kind: TileKind::Floor,
            discovered: true,
            hardness: 0,
        }
    }
}

/// A grid coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column, `0..width`
    pub x: u32,
    /// Row, `0..height`
    pub y: u32,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Half-open rectangle `[x0, x1) × [y0, y1)` in map coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    /// Iterates every coordinate inside the rectangle.
    pub fn coords(self) -> impl Iterator<Item = (u32, u32)> {
        (self.y0..self.y1).flat_map(move |y| (self.x0..self.x1).map(move |x| (x, y)))
    }

    fn is_empty(self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

/// Result of a map expansion: the coordinate shift applied to all existing
/// tiles (non-zero only for left/top growth) and the freshly seeded areas,
/// expressed in the new coordinate space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expansion {
    /// Amount existing x coordinates moved right
    pub dx: u32,
    /// Amount existing y coordinates moved down
    pub dy: u32,
    /// Newly created areas needing hazard seeding
    pub added: Vec<Rect>,
}

/// The tile grid for one channel's mine, plus current actor positions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    pub width: u32,
    pub height: u32,
    pub entrance_x: u32,
    pub entrance_y: u32,
    /// Row-major tile storage, `tiles[y][x]`
    pub tiles: Vec<Vec<Tile>>,
    /// Current position of every actor in the mine
    pub player_positions: HashMap<String, Position>,
}

impl MapData {
    /// Builds a fresh grid of the given size with a discovered entrance at
    /// the center and every other tile seeded as a wall variant weighted by
    /// `power_level`.
    pub fn initialize<R: Rng>(width: u32, height: u32, power_level: u32, rng: &mut R) -> Self {
        let width = width.clamp(3, MAX_MAP_SIZE);
        let height = height.clamp(3, MAX_MAP_SIZE);
        let entrance_x = width / 2;
        let entrance_y = height / 2;

        let mut tiles = Vec::with_capacity(height as usize);
        for y in 0..height {
            let mut row = Vec::with_capacity(width as usize);
            for x in 0..width {
                if x == entrance_x && y == entrance_y {
                    row.push(Tile {
                        kind: TileKind::Entrance,
                        discovered: true,
                        hardness: 0,
                    });
                } else {
                    row.push(seed_tile(power_level, rng));
                }
            }
            tiles.push(row);
        }

        Self {
            width,
            height,
            entrance_x,
            entrance_y,
            tiles,
            player_positions: HashMap::new(),
        }
    }

    /// Bounds-checked tile read. Out-of-range coordinates return `None`;
    /// callers must re-validate coordinates after any expansion in the same
    /// tick rather than assume a previously valid coordinate stays valid.
    #[must_use]
    pub fn tile(&self, x: u32, y: u32) -> Option<&Tile> {
        self.tiles.get(y as usize)?.get(x as usize)
    }

    /// Bounds-checked mutable tile access.
    pub fn tile_mut(&mut self, x: u32, y: u32) -> Option<&mut Tile> {
        self.tiles.get_mut(y as usize)?.get_mut(x as usize)
    }

    /// The entrance coordinate.
    #[must_use]
    pub const fn entrance(&self) -> Position {
        Position::new(self.entrance_x, self.entrance_y)
    }

    /// Whether a coordinate is inside the current grid.
    #[must_use]
    pub const fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// In-bounds 4-neighborhood of a position.
    #[must_use]
    pub fn neighbors(&self, pos: Position) -> Vec<Position> {
        let mut out = Vec::with_capacity(4);
        if pos.x > 0 {
            out.push(Position::new(pos.x - 1, pos.y));
        }
        if pos.y > 0 {
            out.push(Position::new(pos.x, pos.y - 1));
        }
        if pos.x + 1 < self.width {
            out.push(Position::new(pos.x + 1, pos.y));
        }
        if pos.y + 1 < self.height {
            out.push(Position::new(pos.x, pos.y + 1));
        }
        out
    }

    /// Grows the grid toward an edge the given position is within
    /// [`EXPANSION_MARGIN`] of, seeding new tiles like [`Self::initialize`].
    /// Returns `None` without touching the map when no growth is needed or
    /// both axes are already at [`MAX_MAP_SIZE`].
    pub fn expand<R: Rng>(
        &mut self,
        approach_x: u32,
        approach_y: u32,
        power_level: u32,
        rng: &mut R,
    ) -> Option<Expansion> {
        if !self.in_bounds(approach_x, approach_y) {
            return None;
        }

        // A hand-corrupted document can carry oversized dimensions; treat
        // them as having no room left rather than underflowing.
        let room_x = MAX_MAP_SIZE.saturating_sub(self.width);
        let room_y = MAX_MAP_SIZE.saturating_sub(self.height);

        let grow_left = if approach_x < EXPANSION_MARGIN {
            EXPANSION_STEP.min(room_x)
        } else {
            0
        };
        let grow_right = if approach_x + EXPANSION_MARGIN >= self.width {
            EXPANSION_STEP.min(room_x - grow_left)
        } else {
            0
        };
        let grow_top = if approach_y < EXPANSION_MARGIN {
            EXPANSION_STEP.min(room_y)
        } else {
            0
        };
        let grow_bottom = if approach_y + EXPANSION_MARGIN >= self.height {
            EXPANSION_STEP.min(room_y - grow_top)
        } else {
            0
        };

        if grow_left + grow_right + grow_top + grow_bottom == 0 {
            return None;
        }

        let old_width = self.width;
        let old_height = self.height;
        let new_width = old_width + grow_left + grow_right;
        let new_height = old_height + grow_top + grow_bottom;

        let mut tiles = Vec::with_capacity(new_height as usize);
        for y in 0..new_height {
            let mut row = Vec::with_capacity(new_width as usize);
            for x in 0..new_width {
                let old_x = x.checked_sub(grow_left);
                let old_y = y.checked_sub(grow_top);
                let existing = match (old_x, old_y) {
                    (Some(ox), Some(oy)) if ox < old_width && oy < old_height => {
                        Some(self.tiles[oy as usize][ox as usize])
                    }
                    _ => None,
                };
                row.push(existing.unwrap_or_else(|| seed_tile(power_level, rng)));
            }
            tiles.push(row);
        }

        self.tiles = tiles;
        self.width = new_width;
        self.height = new_height;
        self.entrance_x += grow_left;
        self.entrance_y += grow_top;
        for pos in self.player_positions.values_mut() {
            pos.x += grow_left;
            pos.y += grow_top;
        }

        let added: Vec<Rect> = [
            Rect {
                x0: 0,
                y0: 0,
                x1: grow_left,
                y1: new_height,
            },
            Rect {
                x0: grow_left + old_width,
                y0: 0,
                x1: new_width,
                y1: new_height,
            },
            Rect {
                x0: grow_left,
                y0: 0,
                x1: grow_left + old_width,
                y1: grow_top,
            },
            Rect {
                x0: grow_left,
                y0: grow_top + old_height,
                x1: grow_left + old_width,
                y1: new_height,
            },
        ]
        .into_iter()
        .filter(|r| !r.is_empty())
        .collect();

        Some(Expansion {
            dx: grow_left,
            dy: grow_top,
            added,
        })
    }

    /// Places or moves an actor, clamping to the entrance if the coordinate
    /// is somehow out of range (a corrected data-integrity violation, not an
    /// error).
    pub fn set_position(&mut self, actor_id: &str, pos: Position) {
        let pos = if self.in_bounds(pos.x, pos.y) {
            pos
        } else {
            self.entrance()
        };
        self.player_positions.insert(actor_id.to_string(), pos);
    }

    /// Current position of an actor, if they are in the mine.
    #[must_use]
    pub fn position_of(&self, actor_id: &str) -> Option<Position> {
        self.player_positions.get(actor_id).copied()
    }
}

/// Seeds one unexplored tile. Ore and rare-ore odds scale with the mine's
/// power level; reinforced walls stay rare at any level.
fn seed_tile<R: Rng>(power_level: u32, rng: &mut R) -> Tile {
    let ore_chance = (0.10 + 0.02 * f64::from(power_level)).min(0.35);
    let rare_chance = (0.01 * f64::from(power_level)).min(0.08);
    let reinforced_chance = 0.03;

    let roll: f64 = rng.r#gen();
    if roll < rare_chance {
        Tile {
            kind: TileKind::RareOre,
            discovered: false,
            hardness: 2 + power_level,
        }
    } else if roll < rare_chance + ore_chance {
        Tile {
            kind: TileKind::WallWithOre,
            discovered: false,
            hardness: 1 + power_level / 2,
        }
    } else if roll < rare_chance + ore_chance + reinforced_chance {
        Tile {
            kind: TileKind::ReinforcedWall,
            discovered: false,
            hardness: 8 + 2 * power_level,
        }
    } else {
        Tile {
            kind: TileKind::Wall,
            discovered: false,
            hardness: 1 + power_level / 3,
        }
    }
}
