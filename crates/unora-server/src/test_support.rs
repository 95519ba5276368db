//! Fixtures shared by the service test modules.

#![allow(clippy::unwrap_used)]

use unora_core::{Tier, TierPolicy};

use crate::matching::MatchingService;
use crate::storage::queries_users::NewUser;
use crate::storage::{Connection, EngineDatabase, ServerType, Streak};

/// 2026-03-02T00:00:00Z, a Monday.
pub const T0: i64 = 1_772_409_600;
pub const DAY: i64 = 86_400;
pub const HOUR: i64 = 3_600;

pub async fn test_db() -> EngineDatabase {
    EngineDatabase::open_in_memory().await.unwrap()
}

/// On-disk database with a multi-connection pool, for tests that race
/// transactions against each other. Keep the directory alive for the test.
pub async fn file_db() -> (tempfile::TempDir, EngineDatabase) {
    let dir = tempfile::tempdir().unwrap();
    let db = EngineDatabase::open(&dir.path().join("unora.db"))
        .await
        .unwrap();
    (dir, db)
}

pub async fn seed_user(db: &EngineDatabase, id: &str, tier: Tier, credits: i64) {
    db.create_user(&NewUser {
        id,
        display_name: id,
        tier,
        credit_balance: credits,
        ..NewUser::default()
    })
    .await
    .unwrap();
}

/// Create a discovery card showing `candidate` to `viewer` and return its ID.
pub async fn card(db: &EngineDatabase, viewer: &str, candidate: &str) -> String {
    db.create_discovery_card(viewer, candidate, ServerType::Partner)
        .await
        .unwrap()
        .id
}

/// Connect two existing users through mutual interest at `now`.
pub async fn connect(db: &EngineDatabase, a: &str, b: &str, now: i64) -> (Connection, Streak) {
    let matching = MatchingService::new(db.clone(), TierPolicy::default());
    let first = card(db, a, b).await;
    let second = card(db, b, a).await;
    matching.express_interest(a, &first, now).await.unwrap();
    let outcome = matching.express_interest(b, &second, now).await.unwrap();
    (outcome.connection.unwrap(), outcome.streak.unwrap())
}

/// Two plus-tier users with 500 credits each, connected at `T0`.
pub async fn connected_pair(db: &EngineDatabase) -> (Connection, Streak) {
    seed_user(db, "alice", Tier::Plus, 500).await;
    seed_user(db, "bob", Tier::Plus, 500).await;
    connect(db, "alice", "bob", T0).await
}
