//! Interest ledger queries.

use serde::Serialize;
use sqlx::SqliteConnection;

use super::db::{DatabaseError, EngineDatabase};
use super::models::{Interest, ServerType};
use super::new_id;

/// An interest with the counterpart's public profile.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InterestWithProfile {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub interest: Interest,
    pub counterpart_name: String,
    pub counterpart_city: Option<String>,
    pub counterpart_age: Option<i64>,
    pub counterpart_photo_url: Option<String>,
}

impl EngineDatabase {
    /// Every live interest sent by `user_id`, newest first.
    pub async fn list_sent_interests(
        &self,
        user_id: &str,
    ) -> Result<Vec<InterestWithProfile>, DatabaseError> {
        let rows = sqlx::query_as::<_, InterestWithProfile>(
            "SELECT i.*, u.display_name AS counterpart_name, u.city AS counterpart_city, \
             u.age AS counterpart_age, u.photo_url AS counterpart_photo_url \
             FROM interests i JOIN users u ON u.id = i.receiver_user_id \
             WHERE i.sender_user_id = ? AND i.deleted_at IS NULL \
             ORDER BY i.created_at DESC, i.rowid DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Live pending interests addressed to `user_id`, newest first.
    pub async fn list_received_interests(
        &self,
        user_id: &str,
    ) -> Result<Vec<InterestWithProfile>, DatabaseError> {
        let rows = sqlx::query_as::<_, InterestWithProfile>(
            "SELECT i.*, u.display_name AS counterpart_name, u.city AS counterpart_city, \
             u.age AS counterpart_age, u.photo_url AS counterpart_photo_url \
             FROM interests i JOIN users u ON u.id = i.sender_user_id \
             WHERE i.receiver_user_id = ? AND i.status = 'pending' AND i.deleted_at IS NULL \
             ORDER BY i.created_at DESC, i.rowid DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Get an interest by ID.
    pub async fn get_interest(&self, id: &str) -> Result<Interest, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        fetch_interest(&mut conn, id).await
    }
}

pub async fn fetch_interest(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Interest, DatabaseError> {
    sqlx::query_as::<_, Interest>("SELECT * FROM interests WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Interest {id}")))
}

/// The live pending interest from `sender` to `receiver` in `server_type`, if any.
pub async fn find_pending(
    conn: &mut SqliteConnection,
    sender_user_id: &str,
    receiver_user_id: &str,
    server_type: ServerType,
) -> Result<Option<Interest>, DatabaseError> {
    let interest = sqlx::query_as::<_, Interest>(
        "SELECT * FROM interests WHERE sender_user_id = ? AND receiver_user_id = ? \
         AND server_type = ? AND status = 'pending' AND deleted_at IS NULL",
    )
    .bind(sender_user_id)
    .bind(receiver_user_id)
    .bind(server_type)
    .fetch_optional(conn)
    .await?;

    Ok(interest)
}

/// Insert a pending interest. A concurrent duplicate surfaces as `Conflict`.
pub async fn insert_pending(
    conn: &mut SqliteConnection,
    sender_user_id: &str,
    receiver_user_id: &str,
    server_type: ServerType,
    discovery_card_id: &str,
    now: i64,
) -> Result<Interest, DatabaseError> {
    let id = new_id();

    sqlx::query(
        "INSERT INTO interests (id, sender_user_id, receiver_user_id, server_type, \
         discovery_card_id, status, created_at) VALUES (?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(&id)
    .bind(sender_user_id)
    .bind(receiver_user_id)
    .bind(server_type)
    .bind(discovery_card_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    fetch_interest(conn, &id).await
}

/// Insert an interest that is matched on creation (the second half of a mutual pair).
pub async fn insert_matched(
    conn: &mut SqliteConnection,
    sender_user_id: &str,
    receiver_user_id: &str,
    server_type: ServerType,
    discovery_card_id: &str,
    now: i64,
) -> Result<Interest, DatabaseError> {
    let id = new_id();

    sqlx::query(
        "INSERT INTO interests (id, sender_user_id, receiver_user_id, server_type, \
         discovery_card_id, status, created_at, matched_at) \
         VALUES (?, ?, ?, ?, ?, 'matched', ?, ?)",
    )
    .bind(&id)
    .bind(sender_user_id)
    .bind(receiver_user_id)
    .bind(server_type)
    .bind(discovery_card_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    fetch_interest(conn, &id).await
}

/// Move a pending interest to `matched`. Returns false if it was no longer pending.
pub async fn mark_matched(
    conn: &mut SqliteConnection,
    id: &str,
    matched_at: i64,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        "UPDATE interests SET status = 'matched', matched_at = ? \
         WHERE id = ? AND status = 'pending'",
    )
    .bind(matched_at)
    .bind(id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Total Wipe: every live pending interest sent by `user_id` becomes `wiped`.
pub async fn wipe_outgoing_pending(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<u64, DatabaseError> {
    let result = sqlx::query(
        "UPDATE interests SET status = 'wiped' \
         WHERE sender_user_id = ? AND status = 'pending' AND deleted_at IS NULL",
    )
    .bind(user_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Expire every pending interest between two users, in both directions.
pub async fn expire_between(
    conn: &mut SqliteConnection,
    user_a: &str,
    user_b: &str,
) -> Result<u64, DatabaseError> {
    let result = sqlx::query(
        "UPDATE interests SET status = 'expired' WHERE status = 'pending' \
         AND ((sender_user_id = ? AND receiver_user_id = ?) \
           OR (sender_user_id = ? AND receiver_user_id = ?))",
    )
    .bind(user_a)
    .bind(user_b)
    .bind(user_b)
    .bind(user_a)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}
