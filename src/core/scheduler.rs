//! Session scheduler - the work/break state machine.
//!
//! Phases cycle `Working -> Break -> Working -> ...`, with every
//! [`LONG_BREAK_EVERY`]-th cycle promoting to a long break. Special events
//! overlay the Working phase only. Transitions are driven purely by
//! comparing `next_trigger_at` against the tick's clock, and an overdue
//! boundary is force-applied on the next processed tick no matter how late
//! it is found: the historical system could wedge in Break forever when a
//! tick was missed at exactly the break-end boundary, so self-healing here
//! is a requirement, not a nicety.

use crate::config::mines::{MineTypeConfig, UnlockCondition};
use crate::core::events::GameEvent;
use crate::core::session::{
    Phase, SessionState, ShadowHelper, SpecialEvent, SpecialEventKind,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{info, warn};

/// Work windows per long break.
pub const LONG_BREAK_EVERY: u64 = 4;
/// Chance a special event opens when a work window begins.
pub const SPECIAL_EVENT_CHANCE: f64 = 0.08;
/// Rail-building progress required to earn a shadow helper.
pub const RAIL_PROGRESS_TARGET: u64 = 20;

/// Length of one work window.
#[must_use]
pub fn work_duration() -> Duration {
    Duration::minutes(25)
}

/// Length of a short break.
#[must_use]
pub fn break_duration() -> Duration {
    Duration::minutes(5)
}

/// Length of a long break.
#[must_use]
pub fn long_break_duration() -> Duration {
    Duration::minutes(15)
}

/// How late a transition may be before it is logged as a forced recovery.
#[must_use]
pub fn overdue_tolerance() -> Duration {
    Duration::seconds(90)
}

/// How often the shop restocks.
#[must_use]
pub fn shop_refresh_interval() -> Duration {
    Duration::minutes(60)
}

/// Length of a special-event window.
#[must_use]
pub fn special_event_window() -> Duration {
    Duration::minutes(3)
}

/// Advances the state machine to `now`. Resolves any expired special event,
/// applies every due phase transition (force-applying overdue ones), and
/// rolls the shop refresh timestamp. Returns `true` when a phase transition
/// happened, which callers treat as a critical flush.
pub fn advance<R: Rng>(
    session: &mut SessionState,
    now: DateTime<Utc>,
    rng: &mut R,
    events: &mut Vec<GameEvent>,
) -> bool {
    resolve_expired_special_event(session, now, events);
    session.expire_helpers(now);

    let mut transitioned = false;
    while now >= session.next_trigger_at {
        let overdue = now - session.next_trigger_at;
        if overdue > overdue_tolerance() {
            warn!(
                channel_id = %session.channel_id,
                phase = ?session.phase,
                overdue_secs = overdue.num_seconds(),
                "force-applying overdue phase transition"
            );
        }
        match session.phase {
            Phase::Working => begin_break(session, now, events),
            Phase::Break | Phase::LongBreak => resume_work(session, now, rng, events),
        }
        transitioned = true;
    }

    if now >= session.next_shop_refresh_at {
        session.next_shop_refresh_at = now + shop_refresh_interval();
        info!(channel_id = %session.channel_id, "shop refreshed");
    }

    transitioned
}

/// Whether the mine's deeper-level condition is satisfied.
#[must_use]
pub fn unlock_satisfied(session: &SessionState, mine: &MineTypeConfig) -> bool {
    match &mine.unlock {
        UnlockCondition::WallsBroken { count } => session.stats.walls_broken >= *count,
        UnlockCondition::LifetimeValue { value } => session.stats.lifetime_value >= *value,
        UnlockCondition::OresFound { count } => session.stats.ores_found >= *count,
        UnlockCondition::RareOresFound { count } => session.stats.rare_ores_found >= *count,
        UnlockCondition::ExitTile { .. } => session.exit.is_some_and(|e| e.reached),
    }
}

fn begin_break(session: &mut SessionState, now: DateTime<Utc>, events: &mut Vec<GameEvent>) {
    // A work window closing resolves its overlay immediately.
    force_resolve_special_event(session, events);

    session.cycle_count += 1;
    let long = session.cycle_count.is_multiple_of(LONG_BREAK_EVERY);
    let duration = if long {
        long_break_duration()
    } else {
        break_duration()
    };
    session.phase = if long { Phase::LongBreak } else { Phase::Break };
    // Scheduled from `now`, not the stale boundary, so a badly overdue
    // transition cannot cascade into an instantly expired break.
    session.next_trigger_at = now + duration;
    events.push(GameEvent::BreakStarted {
        channel_id: session.channel_id.clone(),
        long,
        until: session.next_trigger_at,
    });
}

fn resume_work<R: Rng>(
    session: &mut SessionState,
    now: DateTime<Utc>,
    rng: &mut R,
    events: &mut Vec<GameEvent>,
) {
    session.phase = Phase::Working;
    session.next_trigger_at = now + work_duration();
    events.push(GameEvent::WorkResumed {
        channel_id: session.channel_id.clone(),
    });
    maybe_start_special_event(session, now, rng, events);
}

fn maybe_start_special_event<R: Rng>(
    session: &mut SessionState,
    now: DateTime<Utc>,
    rng: &mut R,
    events: &mut Vec<GameEvent>,
) {
    if session.special_event.is_some() || !rng.gen_bool(SPECIAL_EVENT_CHANCE) {
        return;
    }
    let kind = if rng.gen_bool(0.5) {
        SpecialEventKind::Thief
    } else {
        SpecialEventKind::RailBuilding
    };
    let ends_at = now + special_event_window();
    session.special_event = Some(SpecialEvent {
        kind,
        ends_at,
        participants: std::collections::BTreeMap::new(),
    });
    events.push(GameEvent::SpecialEventStarted {
        channel_id: session.channel_id.clone(),
        event: kind.label().to_string(),
        until: ends_at,
    });
}

fn resolve_expired_special_event(
    session: &mut SessionState,
    now: DateTime<Utc>,
    events: &mut Vec<GameEvent>,
) {
    if session
        .special_event
        .as_ref()
        .is_some_and(|e| now >= e.ends_at)
    {
        force_resolve_special_event(session, events);
    }
}

/// Closes the active special event, applying its outcome.
fn force_resolve_special_event(session: &mut SessionState, events: &mut Vec<GameEvent>) {
    let Some(event) = session.special_event.take() else {
        return;
    };
    let progress: u64 = event.participants.values().sum();
    let detail = match event.kind {
        SpecialEventKind::Thief => {
            // Base theft of a quarter of every stack, talked down by how
            // much the crew mined during the window.
            let steal_pct = 25 * 10 / (10 + progress.min(90));
            let stolen = session.minecart.skim(steal_pct, 100);
            format!("stole {stolen} items ({steal_pct}% of the cart)")
        }
        SpecialEventKind::RailBuilding => {
            if progress >= RAIL_PROGRESS_TARGET {
                let helper = ShadowHelper {
                    id: format!("helper:rail:{}", session.cycle_count),
                    power: 2 + session.depth,
                    speed: 2,
                    expires_at: event.ends_at + work_duration(),
                };
                session.helpers.push(helper);
                format!("rails complete ({progress} segments), a cart helper joins the dig")
            } else {
                format!("rails unfinished ({progress}/{RAIL_PROGRESS_TARGET} segments)")
            }
        }
    };
    events.push(GameEvent::SpecialEventResolved {
        channel_id: session.channel_id.clone(),
        event: event.kind.label().to_string(),
        detail,
    });
}
