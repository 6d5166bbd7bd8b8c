//! Voice channel presence tracking.
//!
//! The gateway pushes voice state updates; this module folds them into a
//! channel → members map the tick engine snapshots synchronously. A user is
//! in at most one voice channel, so every update first clears the user from
//! the whole map and then inserts them at their new location. That also
//! self-heals after missed disconnect events.

use crate::engine::MembershipProvider;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

/// Live voice presence, shared between the gateway handler and the engine.
#[derive(Default)]
pub struct VoiceMembership {
    channels: Mutex<HashMap<String, HashSet<String>>>,
}

impl VoiceMembership {
    /// An empty presence map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a user is now in `channel_id` (or nowhere, on
    /// disconnect).
    pub fn update(&self, user_id: &str, channel_id: Option<&str>) {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for members in channels.values_mut() {
            members.remove(user_id);
        }
        if let Some(id) = channel_id {
            channels
                .entry(id.to_string())
                .or_default()
                .insert(user_id.to_string());
        }
        channels.retain(|_, members| !members.is_empty());
    }
}

impl MembershipProvider for VoiceMembership {
    fn active_channels(&self) -> Vec<String> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn present_players(&self, channel_id: &str) -> Vec<String> {
        let channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut players: Vec<String> = channels
            .get(channel_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        players.sort();
        players
    }
}
