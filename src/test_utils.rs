//! Shared test utilities for `MineBuddy`.
//!
//! This module provides common helper functions for setting up test
//! databases, loading the mine registry, and obtaining a deterministic RNG.

#![allow(clippy::unwrap_used)]

use crate::config::mines::MineRegistry;
use crate::errors::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use sea_orm::DatabaseConnection;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all persistence tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// The registry built from the embedded config, independent of any file on
/// disk.
pub fn test_registry() -> MineRegistry {
    MineRegistry::from_toml(include_str!("../config.toml")).unwrap()
}

/// A seeded RNG so map layouts and loot rolls are reproducible.
pub fn test_rng() -> StdRng {
    StdRng::seed_from_u64(42)
}
