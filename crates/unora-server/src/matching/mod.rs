//! Interest ledger and connection manager.

pub mod connections;
pub mod interests;


use unora_core::TierPolicy;

use crate::storage::EngineDatabase;

pub use connections::{ConnectionSummary, SeverReport, StreakSummary, create_connection};
pub use interests::ExpressOutcome;

/// Owns interests and connections, and creates the streak of every new connection.
#[derive(Clone)]
pub struct MatchingService {
    db: EngineDatabase,
    tiers: TierPolicy,
}

impl MatchingService {
    pub const fn new(db: EngineDatabase, tiers: TierPolicy) -> Self {
        Self { db, tiers }
    }
}
