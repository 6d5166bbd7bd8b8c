//! Structured game events handed to the notification sink.
//!
//! The core never formats user-facing text; it emits these values and lets
//! the bot layer (or any other sink) render them. `kind()` is the dedup key
//! used by the engine to suppress identical notifications double-emitted
//! within a short window.

use chrono::{DateTime, Utc};

/// One externally visible thing that happened during a tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    /// A work window ended
    BreakStarted {
        channel_id: String,
        long: bool,
        until: DateTime<Utc>,
    },
    /// A break ended
    WorkResumed { channel_id: String },
    /// An actor broke a wall and found something
    ItemFound {
        channel_id: String,
        actor_id: String,
        item_id: String,
        quantity: u32,
        /// true: routed to the minecart; false: to the player's inventory
        to_minecart: bool,
    },
    /// An actor's step resolved to nothing (failed break, empty roll)
    NothingHappened {
        channel_id: String,
        actor_id: String,
    },
    /// A hazard fired under an actor
    HazardTriggered {
        channel_id: String,
        actor_id: String,
        hazard: String,
    },
    /// A tool unit broke (and possibly the whole tool was removed)
    ToolBroken {
        channel_id: String,
        actor_id: String,
        item_id: String,
        removed: bool,
    },
    /// A special event window opened
    SpecialEventStarted {
        channel_id: String,
        event: String,
        until: DateTime<Utc>,
    },
    /// A special event window closed
    SpecialEventResolved {
        channel_id: String,
        event: String,
        /// Items lost to a thief, helpers earned from rails, etc.
        detail: String,
    },
    /// A hidden exit to the next level appeared
    ExitSpawned { channel_id: String },
    /// The deeper-level unlock condition was satisfied
    LevelUnlocked {
        channel_id: String,
        mine_type_id: String,
        depth: u32,
    },
    /// The session document was unusable and had to be rebuilt
    SessionReset { channel_id: String },
}

impl GameEvent {
    /// Stable identifier for dedup windows.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BreakStarted { .. } => "break_started",
            Self::WorkResumed { .. } => "work_resumed",
            Self::ItemFound { .. } => "item_found",
            Self::NothingHappened { .. } => "nothing_happened",
            Self::HazardTriggered { .. } => "hazard_triggered",
            Self::ToolBroken { .. } => "tool_broken",
            Self::SpecialEventStarted { .. } => "special_event_started",
            Self::SpecialEventResolved { .. } => "special_event_resolved",
            Self::ExitSpawned { .. } => "exit_spawned",
            Self::LevelUnlocked { .. } => "level_unlocked",
            Self::SessionReset { .. } => "session_reset",
        }
    }

    /// The channel this event belongs to.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        match self {
            Self::BreakStarted { channel_id, .. }
            | Self::WorkResumed { channel_id }
            | Self::ItemFound { channel_id, .. }
            | Self::NothingHappened { channel_id, .. }
            | Self::HazardTriggered { channel_id, .. }
            | Self::ToolBroken { channel_id, .. }
            | Self::SpecialEventStarted { channel_id, .. }
            | Self::SpecialEventResolved { channel_id, .. }
            | Self::ExitSpawned { channel_id }
            | Self::LevelUnlocked { channel_id, .. }
            | Self::SessionReset { channel_id } => channel_id,
        }
    }
}
