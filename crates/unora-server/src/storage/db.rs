//! SQLite database for the Unora engine.

pub use unora_core::db::DatabaseError;

unora_core::define_database!(EngineDatabase, "Engine database migrations complete");
