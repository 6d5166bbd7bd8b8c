//! Engine layer - the machinery that drives sessions between the core and
//! the outside world: per-channel locking, write batching, and the tick
//! driver itself.

/// Session cache, debounced persistence, and notification dedup
pub mod cache;
/// Per-channel mutual exclusion with stale-lock recovery
pub mod locks;
/// The tick driver and its collaborator traits
pub mod tick;

pub use tick::{MembershipProvider, NotificationSink, TickEngine};
