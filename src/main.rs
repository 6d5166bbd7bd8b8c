//! Binary entry point: logging, configuration, database, then the bot.

use dotenvy::dotenv;
use minebuddy::bot;
use minebuddy::config::{database, mines::MineRegistry};
use minebuddy::errors::Result;
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Non-fatal: env vars can be set externally.
    dotenv().ok();

    let registry = Arc::new(MineRegistry::load_default()?);
    info!(
        default_mine = %registry.default_mine().id,
        "Mine registry loaded."
    );

    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;
    database::create_tables(&db).await?;
    info!("Database initialized successfully.");

    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {e}"))?;

    bot::run_bot(token, registry, db).await
}
