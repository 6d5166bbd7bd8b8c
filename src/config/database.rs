//! Database configuration module for `MineBuddy`.
//!
//! This module handles `SQLite` database connection and table creation using
//! `SeaORM`. The schema is generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the database always matches the
//! Rust struct definitions without manual SQL.

use crate::entities::Session;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

/// Gets the database URL from environment variable or returns the default
/// `SQLite` path.
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://data/minebuddy.sqlite?mode=rwc".to_string())
}

/// Establishes a connection to the `SQLite` database using the
/// `DATABASE_URL` environment variable, falling back to a default local
/// `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all necessary database tables from the entity definitions.
/// Idempotent: existing tables are left alone.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut session_table = schema.create_table_from_entity(Session);
    session_table.if_not_exists();
    db.execute(builder.build(&session_table)).await?;

    Ok(())
}
