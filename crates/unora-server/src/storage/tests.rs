//! Storage layer tests for the Unora engine.

#![allow(clippy::unwrap_used)]

use unora_core::Tier;

use super::db::{DatabaseError, EngineDatabase};
use super::models::{
    CheckInType, InterestStatus, RevealStatus, ServerType, StreakState, UnlockMethod,
};
use super::queries_connections::{canonical_pair, find_pair, insert_connection};
use super::queries_interests::{find_pending, insert_pending, mark_matched, wipe_outgoing_pending};
use super::queries_reveals::unlock_reveal;
use super::queries_streaks::{NewCheckIn, insert_check_in, insert_streak, save_streak};
use super::queries_users::NewUser;

const NOW: i64 = 1_772_409_600;

async fn test_db() -> EngineDatabase {
    EngineDatabase::open_in_memory().await.unwrap()
}

async fn seed(db: &EngineDatabase, id: &str) {
    db.create_user(&NewUser {
        id,
        display_name: id,
        city: Some("Lisbon"),
        age: Some(29),
        tier: Tier::Free,
        credit_balance: 100,
        ..NewUser::default()
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn file_database_keeps_data_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("unora.db");

    let db = EngineDatabase::open(&path).await.unwrap();
    seed(&db, "alice").await;
    db.pool().close().await;

    let reopened = EngineDatabase::open(&path).await.unwrap();
    assert_eq!(reopened.get_user("alice").await.unwrap().display_name, "alice");
    assert_eq!(reopened.list_active_milestones().await.unwrap().len(), 3);
}

// === User tests ===

#[tokio::test]
async fn create_and_get_user() {
    let db = test_db().await;
    seed(&db, "alice").await;

    let user = db.get_user("alice").await.unwrap();
    assert_eq!(user.display_name, "alice");
    assert_eq!(user.city.as_deref(), Some("Lisbon"));
    assert_eq!(user.tier(), Tier::Free);
    assert_eq!(user.credit_balance, 100);
    assert_eq!(user.active_connection_count, 0);
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let db = test_db().await;
    assert!(matches!(
        db.get_user("ghost").await,
        Err(DatabaseError::NotFound(_))
    ));
}

// === Interest tests ===

#[tokio::test]
async fn second_pending_interest_for_same_pair_conflicts() {
    let db = test_db().await;
    seed(&db, "alice").await;
    seed(&db, "bob").await;
    let card = db
        .create_discovery_card("alice", "bob", ServerType::Partner)
        .await
        .unwrap();

    let mut conn = db.pool().acquire().await.unwrap();
    insert_pending(&mut conn, "alice", "bob", ServerType::Partner, &card.id, NOW)
        .await
        .unwrap();
    let again = insert_pending(&mut conn, "alice", "bob", ServerType::Partner, &card.id, NOW).await;
    assert!(matches!(again, Err(DatabaseError::Conflict(_))));

    // A different server type is a different ledger.
    insert_pending(&mut conn, "alice", "bob", ServerType::Friend, &card.id, NOW)
        .await
        .unwrap();
}

#[tokio::test]
async fn mark_matched_only_moves_pending_interests() {
    let db = test_db().await;
    seed(&db, "alice").await;
    seed(&db, "bob").await;
    let card = db
        .create_discovery_card("alice", "bob", ServerType::Partner)
        .await
        .unwrap();

    let mut conn = db.pool().acquire().await.unwrap();
    let interest = insert_pending(&mut conn, "alice", "bob", ServerType::Partner, &card.id, NOW)
        .await
        .unwrap();
    assert!(mark_matched(&mut conn, &interest.id, NOW).await.unwrap());
    assert!(!mark_matched(&mut conn, &interest.id, NOW).await.unwrap());
    assert!(
        find_pending(&mut conn, "alice", "bob", ServerType::Partner)
            .await
            .unwrap()
            .is_none()
    );
    drop(conn);

    let stored = db.get_interest(&interest.id).await.unwrap();
    assert_eq!(stored.status, InterestStatus::Matched);
    assert_eq!(stored.matched_at, Some(NOW));
}

#[tokio::test]
async fn wipe_only_touches_outgoing_pending() {
    let db = test_db().await;
    for id in ["alice", "bob", "carol"] {
        seed(&db, id).await;
    }
    let to_bob = db
        .create_discovery_card("alice", "bob", ServerType::Partner)
        .await
        .unwrap();
    let to_carol = db
        .create_discovery_card("alice", "carol", ServerType::Partner)
        .await
        .unwrap();
    let from_bob = db
        .create_discovery_card("bob", "alice", ServerType::Partner)
        .await
        .unwrap();

    let mut conn = db.pool().acquire().await.unwrap();
    insert_pending(&mut conn, "alice", "bob", ServerType::Partner, &to_bob.id, NOW)
        .await
        .unwrap();
    insert_pending(&mut conn, "alice", "carol", ServerType::Partner, &to_carol.id, NOW)
        .await
        .unwrap();
    let incoming = insert_pending(&mut conn, "bob", "alice", ServerType::Partner, &from_bob.id, NOW)
        .await
        .unwrap();

    assert_eq!(wipe_outgoing_pending(&mut conn, "alice").await.unwrap(), 2);
    drop(conn);

    let incoming = db.get_interest(&incoming.id).await.unwrap();
    assert_eq!(incoming.status, InterestStatus::Pending);
    assert!(
        db.list_sent_interests("alice")
            .await
            .unwrap()
            .iter()
            .all(|i| i.interest.status == InterestStatus::Wiped)
    );
}

// === Connection tests ===

#[test]
fn canonical_pair_orders_ids() {
    assert_eq!(canonical_pair("bob", "alice"), ("alice", "bob"));
    assert_eq!(canonical_pair("alice", "bob"), ("alice", "bob"));
}

#[tokio::test]
async fn pair_has_at_most_one_connection_per_server_type() {
    let db = test_db().await;
    seed(&db, "alice").await;
    seed(&db, "bob").await;

    let mut conn = db.pool().acquire().await.unwrap();
    let created = insert_connection(&mut conn, "alice", "bob", ServerType::Partner, NOW)
        .await
        .unwrap();
    let duplicate = insert_connection(&mut conn, "alice", "bob", ServerType::Partner, NOW).await;
    assert!(matches!(duplicate, Err(DatabaseError::Conflict(_))));

    let found = find_pair(&mut conn, "bob", "alice", ServerType::Partner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, created.id);
    assert_eq!(found.partner_of("alice"), Some("bob"));
    assert_eq!(found.partner_of("carol"), None);
}

// === Streak tests ===

#[tokio::test]
async fn new_streak_starts_active_on_day_one() {
    let db = test_db().await;
    seed(&db, "alice").await;
    seed(&db, "bob").await;

    let mut conn = db.pool().acquire().await.unwrap();
    let connection = insert_connection(&mut conn, "alice", "bob", ServerType::Partner, NOW)
        .await
        .unwrap();
    let streak = insert_streak(&mut conn, &connection.id, NOW).await.unwrap();
    drop(conn);

    assert_eq!(streak.state, StreakState::Active);
    assert_eq!(streak.current_day, 1);
    let by_connection = db.get_streak_by_connection(&connection.id).await.unwrap();
    assert_eq!(by_connection.id, streak.id);
}

#[tokio::test]
async fn stale_streak_version_is_reported_busy() {
    let db = test_db().await;
    seed(&db, "alice").await;
    seed(&db, "bob").await;

    let mut conn = db.pool().acquire().await.unwrap();
    let connection = insert_connection(&mut conn, "alice", "bob", ServerType::Partner, NOW)
        .await
        .unwrap();
    let original = insert_streak(&mut conn, &connection.id, NOW).await.unwrap();

    let mut first = original.clone();
    first.current_day = 2;
    let saved = save_streak(&mut conn, &first).await.unwrap();
    assert_eq!(saved.version, original.version + 1);

    let mut stale = original;
    stale.current_day = 3;
    let result = save_streak(&mut conn, &stale).await;
    assert!(matches!(result, Err(DatabaseError::Busy(_))));
}

#[tokio::test]
async fn running_streaks_are_paged_by_rowid() {
    let db = test_db().await;
    for id in ["alice", "bob", "carol"] {
        seed(&db, id).await;
    }

    let mut conn = db.pool().acquire().await.unwrap();
    let mut ids = Vec::new();
    for (a, b) in [("alice", "bob"), ("alice", "carol"), ("bob", "carol")] {
        let connection = insert_connection(&mut conn, a, b, ServerType::Partner, NOW)
            .await
            .unwrap();
        ids.push(insert_streak(&mut conn, &connection.id, NOW).await.unwrap());
    }
    let mut finished = ids.remove(1);
    finished.state = StreakState::Terminated;
    save_streak(&mut conn, &finished).await.unwrap();
    drop(conn);

    let first = db.page_running_streaks(0, 1).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].1, ids[0].id);
    let second = db.page_running_streaks(first[0].0, 1).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].1, ids[1].id);
    assert!(db.page_running_streaks(second[0].0, 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_check_in_for_a_day_conflicts() {
    let db = test_db().await;
    seed(&db, "alice").await;
    seed(&db, "bob").await;

    let mut conn = db.pool().acquire().await.unwrap();
    let connection = insert_connection(&mut conn, "alice", "bob", ServerType::Partner, NOW)
        .await
        .unwrap();
    let streak = insert_streak(&mut conn, &connection.id, NOW).await.unwrap();

    let check_in = NewCheckIn {
        streak_id: &streak.id,
        user_id: "alice",
        day_number: 0,
        utc_day: NOW / 86_400,
        check_in_type: CheckInType::Manual,
        event_data: None,
    };
    insert_check_in(&mut conn, &check_in, NOW).await.unwrap();
    let again = insert_check_in(&mut conn, &check_in, NOW + 60).await;
    assert!(matches!(again, Err(DatabaseError::Conflict(_))));
}

// === Reveal tests ===

#[tokio::test]
async fn milestones_are_seeded_in_order() {
    let db = test_db().await;
    let milestones = db.list_active_milestones().await.unwrap();

    let days: Vec<i64> = milestones.iter().map(|m| m.day_required).collect();
    assert_eq!(days, vec![3, 10, 15]);
    let costs: Vec<i64> = milestones.iter().map(|m| m.credit_cost).collect();
    assert_eq!(costs, vec![50, 75, 100]);
}

#[tokio::test]
async fn reveal_unlocks_once_and_content_is_stored_once() {
    let db = test_db().await;
    seed(&db, "alice").await;
    seed(&db, "bob").await;

    let mut conn = db.pool().acquire().await.unwrap();
    let connection = insert_connection(&mut conn, "alice", "bob", ServerType::Partner, NOW)
        .await
        .unwrap();
    let reveal = unlock_reveal(
        &mut conn,
        &connection.id,
        "milestone-personality",
        UnlockMethod::Earned,
        NOW,
    )
    .await
    .unwrap();
    assert_eq!(reveal.status, RevealStatus::Unlocked);
    assert_eq!(reveal.unlocked_at, Some(NOW));

    let again = unlock_reveal(
        &mut conn,
        &connection.id,
        "milestone-personality",
        UnlockMethod::Purchased,
        NOW,
    )
    .await;
    assert!(matches!(again, Err(DatabaseError::Conflict(_))));
    drop(conn);

    let starters = vec!["a".to_string(), "b".to_string()];
    assert!(
        db.insert_reveal_content(&reveal.id, "summary", "insight", &starters, NOW)
            .await
            .unwrap()
    );
    assert!(
        !db.insert_reveal_content(&reveal.id, "other", "other", &starters, NOW)
            .await
            .unwrap()
    );
    let content = db.get_reveal_content(&reveal.id).await.unwrap().unwrap();
    assert_eq!(content.summary, "summary");
    assert_eq!(content.starters(), starters);
}

#[tokio::test]
async fn missing_content_respects_attempt_budget() {
    let db = test_db().await;
    seed(&db, "alice").await;
    seed(&db, "bob").await;

    let mut conn = db.pool().acquire().await.unwrap();
    let connection = insert_connection(&mut conn, "alice", "bob", ServerType::Partner, NOW)
        .await
        .unwrap();
    let reveal = unlock_reveal(
        &mut conn,
        &connection.id,
        "milestone-values",
        UnlockMethod::Purchased,
        NOW,
    )
    .await
    .unwrap();
    drop(conn);

    assert_eq!(db.list_reveals_missing_content(2, 10).await.unwrap().len(), 1);
    assert_eq!(db.increment_content_attempts(&reveal.id).await.unwrap(), 1);
    assert_eq!(db.increment_content_attempts(&reveal.id).await.unwrap(), 2);
    assert!(db.list_reveals_missing_content(2, 10).await.unwrap().is_empty());
}
