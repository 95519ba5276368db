#![allow(clippy::unwrap_used)]

use std::collections::HashMap;

use unora_core::{Tier, TierLimits, TierPolicy};

use super::{MAX_MESSAGE_CHARS, NudgeService, StreakService};
use crate::error::EngineError;
use crate::storage::{EngineDatabase, NudgeStatus};
use crate::test_support::{
    DAY, HOUR, T0, connect, connected_pair, file_db, seed_user, test_db,
};

fn service(db: &EngineDatabase) -> NudgeService {
    NudgeService::new(db.clone(), TierPolicy::default())
}

#[tokio::test]
async fn nudge_reaches_the_partner() {
    let db = test_db().await;
    let (connection, streak) = connected_pair(&db).await;
    let nudges = service(&db);

    let nudge = nudges
        .send("alice", &connection.id, Some("your turn"), T0 + HOUR)
        .await
        .unwrap();
    assert_eq!(nudge.receiver_user_id, "bob");
    assert_eq!(nudge.streak_id, streak.id);
    assert_eq!(nudge.day_number, 1);
    assert_eq!(nudge.status, NudgeStatus::Sent);
    assert_eq!(nudge.message.as_deref(), Some("your turn"));

    let received = nudges.list_received("bob").await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(nudges.list_received("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn one_nudge_per_streak_day() {
    let db = test_db().await;
    let (connection, _) = connected_pair(&db).await;
    let nudges = service(&db);

    nudges.send("alice", &connection.id, None, T0 + HOUR).await.unwrap();
    let err = nudges
        .send("alice", &connection.id, None, T0 + 2 * HOUR)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // The partner has their own allowance, and a new UTC day resets it.
    nudges.send("bob", &connection.id, None, T0 + 2 * HOUR).await.unwrap();
    nudges.send("alice", &connection.id, None, T0 + DAY + HOUR).await.unwrap();
}

/// Plus limits with a single nudge per UTC day.
fn one_nudge_a_day() -> TierPolicy {
    let plus = TierLimits {
        nudges_per_day: 1,
        ..TierPolicy::default().limits(Tier::Plus).clone()
    };
    TierPolicy::with_overrides(HashMap::from([(Tier::Plus, plus)]))
}

#[tokio::test]
async fn daily_quota_spans_every_streak() {
    let db = test_db().await;
    for id in ["alice", "bob", "carol"] {
        seed_user(&db, id, Tier::Plus, 0).await;
    }
    let (with_bob, _) = connect(&db, "alice", "bob", T0).await;
    let (with_carol, _) = connect(&db, "alice", "carol", T0).await;
    let nudges = NudgeService::new(db.clone(), one_nudge_a_day());

    nudges.send("alice", &with_bob.id, None, T0 + HOUR).await.unwrap();
    let err = nudges
        .send("alice", &with_carol.id, None, T0 + 2 * HOUR)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(ref m) if m.contains("daily nudge limit")));

    nudges.send("alice", &with_carol.id, None, T0 + DAY).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_nudges_cannot_exceed_the_daily_quota() {
    let (_dir, db) = file_db().await;
    for id in ["alice", "bob", "carol"] {
        seed_user(&db, id, Tier::Plus, 0).await;
    }
    let (with_bob, _) = connect(&db, "alice", "bob", T0).await;
    let (with_carol, _) = connect(&db, "alice", "carol", T0).await;

    let handles: Vec<_> = [with_bob.id, with_carol.id]
        .into_iter()
        .map(|connection_id| {
            let nudges = NudgeService::new(db.clone(), one_nudge_a_day());
            tokio::spawn(async move { nudges.send("alice", &connection_id, None, T0 + HOUR).await })
        })
        .collect();

    let mut sent = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => sent += 1,
            Err(e) => assert!(matches!(e, EngineError::Conflict(_)), "{e}"),
        }
    }
    assert_eq!(sent, 1);
}

#[tokio::test]
async fn long_message_is_rejected() {
    let db = test_db().await;
    let (connection, _) = connected_pair(&db).await;

    let message = "a".repeat(MAX_MESSAGE_CHARS + 1);
    let err = service(&db)
        .send("alice", &connection.id, Some(&message), T0 + HOUR)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn nudging_a_broken_streak_is_invalid() {
    let db = test_db().await;
    let (connection, _) = connected_pair(&db).await;
    StreakService::new(db.clone(), TierPolicy::default(), Default::default())
        .sweep(T0 + 3 * DAY)
        .await
        .unwrap();

    let err = service(&db)
        .send("alice", &connection.id, None, T0 + 3 * DAY + HOUR)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn only_the_receiver_marks_seen() {
    let db = test_db().await;
    let (connection, _) = connected_pair(&db).await;
    let nudges = service(&db);
    let nudge = nudges.send("alice", &connection.id, None, T0 + HOUR).await.unwrap();

    let err = nudges.mark_seen("alice", &nudge.id, T0 + 2 * HOUR).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let seen = nudges.mark_seen("bob", &nudge.id, T0 + 2 * HOUR).await.unwrap();
    assert_eq!(seen.status, NudgeStatus::Seen);
    assert_eq!(seen.seen_at, Some(T0 + 2 * HOUR));

    let again = nudges.mark_seen("bob", &nudge.id, T0 + 3 * HOUR).await.unwrap();
    assert_eq!(again.seen_at, Some(T0 + 2 * HOUR));
}
