//! Unora Server Library
//!
//! Matching and streak lifecycle engine:
//! - `SQLite` storage for users, interests, connections, streaks, nudges and reveals
//! - Interest ledger and connection manager with tier slot enforcement
//! - 15-day streak state machine with decay sweep and paid recovery
//! - Nudge tracker and milestone reveal unlocks
//! - JSON HTTP API with bearer-token and admin-key authentication

pub mod auth;
pub mod credits;
pub mod error;
pub mod http;
pub mod matching;
pub mod reveal;
pub mod storage;
pub mod streak;

#[cfg(test)]
mod test_support;
