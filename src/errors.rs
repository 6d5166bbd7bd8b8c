//! Unified error types for `MineBuddy`.
//!
//! All fallible operations in the crate return [`Result<T>`], backed by the
//! single [`Error`] enum below. Lower-level game components (map, hazards,
//! minecart) deliberately avoid returning errors for expected edge cases and
//! use `Option`/defaults instead; the variants here cover configuration,
//! persistence, and collaborator failures.

use thiserror::Error;

/// Unified error type for all `MineBuddy` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading or validation failed
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong
        message: String,
    },

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Serializing or deserializing a persisted session document failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted session document for a channel is unusable
    #[error("Corrupt session document for channel {channel_id}: {message}")]
    SessionCorrupt {
        /// Channel whose document failed to load
        channel_id: String,
        /// Description of the corruption
        message: String,
    },

    /// A mine type id referenced a configuration that does not exist
    #[error("Unknown mine type: {id}")]
    UnknownMineType {
        /// The unresolved mine type id
        id: String,
    },

    /// An inventory collaborator call failed for one player
    #[error("Inventory error for player {player_id}: {message}")]
    Inventory {
        /// Player whose inventory operation failed
        player_id: String,
        /// Description of the failure
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable lookup failed
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Serenity/Poise framework error
    #[error("Serenity/Poise framework error: {0}")]
    Framework(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Framework(Box::new(value))
    }
}

/// Convenience `Result` type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
