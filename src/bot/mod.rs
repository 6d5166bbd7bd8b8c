//! Bot layer - Discord-specific interface.
//!
//! The game has no command surface: presence in a voice channel is the only
//! input. This module tracks voice state from the gateway, wires the tick
//! engine to a Discord notification sink, and runs the serenity client.

/// Voice channel presence tracking for the tick engine
pub mod membership;
/// Event rendering and delivery to Discord channels
pub mod notify;

use crate::config::mines::MineRegistry;
use crate::core::inventory::MemoryInventory;
use crate::engine::{MembershipProvider, NotificationSink, TickEngine};
use crate::errors::{Error, Result};
use crate::store::{SessionStore, SqlSessionStore};
use membership::VoiceMembership;
use notify::DiscordNotifier;
use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Shared data available to the gateway event handler.
pub struct BotData {
    /// Live voice presence, fed by voice state updates
    pub membership: Arc<VoiceMembership>,
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            panic!("Failed to start bot: {error:?}");
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {e}");
            }
        }
    }
}

async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, BotData, Error>,
    data: &BotData,
) -> Result<()> {
    if let serenity::FullEvent::VoiceStateUpdate { new, .. } = event {
        // Other bots in the channel do not mine.
        if new.member.as_ref().is_some_and(|m| m.user.bot) {
            return Ok(());
        }
        let channel = new.channel_id.map(|c| c.to_string());
        data.membership
            .update(&new.user_id.to_string(), channel.as_deref());
    }
    Ok(())
}

/// Connects to Discord and runs the bot until the gateway connection ends.
/// Spawns the tick engine alongside the client and flushes pending session
/// writes before returning.
#[instrument(skip(token, registry, db))]
pub async fn run_bot(
    token: String,
    registry: Arc<MineRegistry>,
    db: DatabaseConnection,
) -> Result<()> {
    let membership = Arc::new(VoiceMembership::new());

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup({
            let membership = Arc::clone(&membership);
            move |_ctx, ready, _framework| {
                Box::pin(async move {
                    info!("Logged in as {}", ready.user.name);
                    Ok(BotData { membership })
                })
            }
        })
        .build();

    let intents =
        serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_VOICE_STATES;

    info!("Setting up Serenity client for Poise framework...");
    let mut client = serenity::Client::builder(&token, intents)
        .framework(framework)
        .await
        .map_err(Error::from)?;

    let store: Arc<dyn SessionStore> = Arc::new(SqlSessionStore::new(db));
    let sink: Arc<dyn NotificationSink> =
        Arc::new(DiscordNotifier::new(Arc::clone(&client.http)));
    let engine = Arc::new(TickEngine::new(
        store,
        registry,
        Arc::new(MemoryInventory::new()),
        Arc::clone(&membership) as Arc<dyn MembershipProvider>,
        sink,
    ));
    let driver = tokio::spawn(Arc::clone(&engine).run());

    info!("Starting bot client...");
    let result = client.start().await;
    driver.abort();
    engine.flush_all().await;
    result.map_err(Error::from)
}
