//! Unora Core Library
//!
//! Shared functionality for Unora components:
//! - Configuration resolution and hierarchy
//! - Subscription tier policy (slots, cooldowns, quotas)
//! - `SQLite` pool helpers and storage error classification
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tier;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use tier::{Tier, TierLimits, TierPolicy};
