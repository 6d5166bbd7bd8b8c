//! Session entity - the persisted per-channel mining session document.
//!
//! Scheduler fields and lifetime stats live in scalar columns so they can
//! be inspected with plain SQL; the world sub-documents (map, hazards,
//! minecart, special event, helpers, exit) are serialized JSON in a TEXT
//! column. The store layer owns the mapping to and from
//! [`crate::core::session::SessionState`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Mining session database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    /// Discord voice channel id owning this session
    #[sea_orm(primary_key, auto_increment = false)]
    pub channel_id: String,
    /// Mine theme the channel is currently digging in
    pub mine_type_id: String,
    /// Deeper-level counter
    pub depth: i32,
    /// Scheduler phase: `working`, `break`, or `long_break`
    pub phase: String,
    /// When the current phase ends
    pub next_trigger_at: DateTimeUtc,
    /// When the shop next restocks
    pub next_shop_refresh_at: DateTimeUtc,
    /// Completed work cycles
    pub cycle_count: i64,
    /// Lifetime walls broken
    pub walls_broken: i64,
    /// Lifetime ore-category finds
    pub ores_found: i64,
    /// Lifetime treasure-category finds
    pub treasures_found: i64,
    /// Lifetime rare-ore tile breaks
    pub rare_ores_found: i64,
    /// Lifetime credit value of everything found
    pub lifetime_value: i64,
    /// JSON world document: map, hazards, minecart, special event, helpers
    #[sea_orm(column_type = "Text")]
    pub world: String,
    /// When this row was last written
    pub updated_at: DateTimeUtc,
}

/// Sessions have no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
