/// Database configuration and connection management
pub mod database;

/// Mine type registry and item catalog loading from config.toml
pub mod mines;
