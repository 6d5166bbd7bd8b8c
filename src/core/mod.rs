//! Core game logic - framework-agnostic mining simulation.
//!
//! Everything in here is pure with respect to Discord: the modules operate
//! on [`session::SessionState`] values, random number generators, and the
//! collaborator traits, and emit [`events::GameEvent`] values for the outer
//! layers to render.

/// Item catalog trait and the static config-backed implementation
pub mod catalog;
/// Structured events emitted toward the notification sink
pub mod events;
/// Hazard tiles: placement, triggering, and effects
pub mod hazard;
/// Player inventory and mining tool collaborator boundary
pub mod inventory;
/// Grid map: tiles, discovery, positions, and expansion
pub mod map;
/// The communal minecart and its contribution ledger
pub mod minecart;
/// Per-actor tick resolution: movement, wall breaking, loot
pub mod resolver;
/// Work/break phase machine and special event windows
pub mod scheduler;
/// The per-channel session aggregate
pub mod session;
