//! SQLite storage for the Unora engine.
//!
//! Read paths used by request handlers are `EngineDatabase` methods. The
//! statements that take part in multi-row transactions are free functions
//! over `&mut SqliteConnection` so engines can compose them inside one
//! `sqlx` transaction.

mod db;
mod models;
pub mod queries_connections;
pub mod queries_interests;
pub mod queries_reveals;
pub mod queries_streaks;
pub mod queries_users;

#[cfg(test)]
mod tests;

pub use db::{DatabaseError, EngineDatabase};
pub use models::*;

/// Generate a new random identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
