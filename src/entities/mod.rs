//! Entity module - SeaORM entity definitions for the database.
//! Each entity has a Model struct for data and an Entity struct for
//! operations.

pub mod session;

pub use session::{Entity as Session, Model as SessionModel};
