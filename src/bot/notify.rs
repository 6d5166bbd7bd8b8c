//! Event rendering and delivery to Discord.
//!
//! The engine hands over structured [`GameEvent`] values; this module turns
//! them into the plain-text lines posted in the voice channel's chat and
//! ships them through the HTTP client.

use crate::core::events::GameEvent;
use crate::engine::NotificationSink;
use crate::errors::{Error, Result};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Formats an actor id for display. Player ids are numeric Discord user ids
/// and become mentions; shadow helper ids are printed as-is.
fn actor_name(id: &str) -> String {
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        format!("<@{id}>")
    } else {
        id.to_string()
    }
}

/// Renders one event as the message posted to its channel.
#[must_use]
pub fn render(event: &GameEvent) -> String {
    match event {
        GameEvent::BreakStarted { long, until, .. } => {
            let label = if *long { "Long break" } else { "Break time" };
            format!("⛏️ {label}! Everyone out of the mine. Work resumes <t:{}:R>.", until.timestamp())
        }
        GameEvent::WorkResumed { .. } => "⛏️ Back to work! The mine awaits.".to_string(),
        GameEvent::ItemFound {
            actor_id,
            item_id,
            quantity,
            to_minecart,
            ..
        } => {
            let destination = if *to_minecart {
                "into the minecart"
            } else {
                "into their pack"
            };
            format!(
                "{} dug up {quantity}x `{item_id}` and tossed it {destination}.",
                actor_name(actor_id)
            )
        }
        GameEvent::NothingHappened { actor_id, .. } => {
            format!("{} swung away at the rock. Nothing but dust.", actor_name(actor_id))
        }
        GameEvent::HazardTriggered {
            actor_id, hazard, ..
        } => format!("💥 {} set off a {hazard}!", actor_name(actor_id)),
        GameEvent::ToolBroken {
            actor_id,
            item_id,
            removed,
            ..
        } => {
            if *removed {
                format!("{}'s last `{item_id}` shattered. Back to bare hands.", actor_name(actor_id))
            } else {
                format!("{}'s `{item_id}` broke. They grab a fresh one.", actor_name(actor_id))
            }
        }
        GameEvent::SpecialEventStarted { event, until, .. } => {
            format!("❗ {event} - act before <t:{}:R>!", until.timestamp())
        }
        GameEvent::SpecialEventResolved { event, detail, .. } => {
            format!("❗ {event} is over. {detail}")
        }
        GameEvent::ExitSpawned { .. } => {
            "✨ Something glimmers deeper in the rock. There may be a way down.".to_string()
        }
        GameEvent::LevelUnlocked {
            mine_type_id,
            depth,
            ..
        } => format!("⬇️ The way down opened! Descending to `{mine_type_id}` (depth {depth})."),
        GameEvent::SessionReset { .. } => {
            "The old tunnels collapsed beyond repair. A fresh mine has been dug.".to_string()
        }
    }
}

/// Posts rendered events into the channel they belong to.
pub struct DiscordNotifier {
    http: Arc<serenity::Http>,
}

impl DiscordNotifier {
    /// Wraps the client's HTTP handle.
    #[must_use]
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl NotificationSink for DiscordNotifier {
    async fn notify(&self, event: &GameEvent) -> Result<()> {
        let raw = event.channel_id();
        let id: u64 = raw.parse().map_err(|_| Error::Config {
            message: format!("invalid channel id '{raw}'"),
        })?;
        serenity::ChannelId::new(id)
            .say(&self.http, render(event))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn player_ids_render_as_mentions() {
        let event = GameEvent::ItemFound {
            channel_id: "1".to_string(),
            actor_id: "123456".to_string(),
            item_id: "coal_ore".to_string(),
            quantity: 2,
            to_minecart: true,
        };
        let text = render(&event);
        assert!(text.contains("<@123456>"));
        assert!(text.contains("2x `coal_ore`"));
        assert!(text.contains("minecart"));
    }

    #[test]
    fn shadow_ids_render_verbatim() {
        let event = GameEvent::NothingHappened {
            channel_id: "1".to_string(),
            actor_id: "shadow-1".to_string(),
        };
        assert!(render(&event).contains("shadow-1"));
        assert!(!render(&event).contains("<@"));
    }

    #[test]
    fn breaks_mention_the_resume_time() {
        let until = Utc::now();
        let event = GameEvent::BreakStarted {
            channel_id: "1".to_string(),
            long: true,
            until,
        };
        let text = render(&event);
        assert!(text.contains("Long break"));
        assert!(text.contains(&format!("<t:{}:R>", until.timestamp())));
    }
}
