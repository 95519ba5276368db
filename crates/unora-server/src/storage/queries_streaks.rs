//! Streak, check-in and nudge queries.

use sqlx::SqliteConnection;

use super::db::{DatabaseError, EngineDatabase};
use super::models::{CheckIn, CheckInType, Nudge, Streak};
use super::new_id;

/// Most received nudges returned in one listing.
pub const RECEIVED_NUDGES_LIMIT: i64 = 50;

impl EngineDatabase {
    /// Get a streak by ID.
    pub async fn get_streak(&self, id: &str) -> Result<Streak, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        fetch_streak(&mut conn, id).await
    }

    /// Get the streak owned by a connection.
    pub async fn get_streak_by_connection(
        &self,
        connection_id: &str,
    ) -> Result<Streak, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        fetch_streak_by_connection(&mut conn, connection_id).await
    }

    /// Nudges still awaiting a reaction from `user_id`, newest first.
    pub async fn list_received_nudges(&self, user_id: &str) -> Result<Vec<Nudge>, DatabaseError> {
        let rows = sqlx::query_as::<_, Nudge>(
            "SELECT * FROM nudges WHERE receiver_user_id = ? AND status IN ('sent', 'seen') \
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(RECEIVED_NUDGES_LIMIT)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// One page of `(rowid, id)` for streaks that can still decay, with rowid
    /// above `after`. Pass the last rowid of a page to fetch the next one.
    pub async fn page_running_streaks(
        &self,
        after: i64,
        limit: i64,
    ) -> Result<Vec<(i64, String)>, DatabaseError> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT rowid, id FROM streaks \
             WHERE state IN ('active', 'at_risk', 'payment_window') AND rowid > ? \
             ORDER BY rowid LIMIT ?",
        )
        .bind(after)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }
}

// ===== Streaks =====

pub async fn fetch_streak(conn: &mut SqliteConnection, id: &str) -> Result<Streak, DatabaseError> {
    sqlx::query_as::<_, Streak>("SELECT * FROM streaks WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Streak {id}")))
}

pub async fn fetch_streak_by_connection(
    conn: &mut SqliteConnection,
    connection_id: &str,
) -> Result<Streak, DatabaseError> {
    sqlx::query_as::<_, Streak>("SELECT * FROM streaks WHERE connection_id = ?")
        .bind(connection_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Streak for connection {connection_id}")))
}

/// Create the streak owned by a new connection: day 1, active.
pub async fn insert_streak(
    conn: &mut SqliteConnection,
    connection_id: &str,
    now: i64,
) -> Result<Streak, DatabaseError> {
    let id = new_id();

    sqlx::query(
        "INSERT INTO streaks (id, connection_id, state, current_day, day_started_at, \
         created_at, updated_at) VALUES (?, ?, 'active', 1, ?, ?, ?)",
    )
    .bind(&id)
    .bind(connection_id)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    fetch_streak(conn, &id).await
}

/// Persist the mutable fields of a streak.
///
/// The write only lands if nobody saved the streak since it was read
/// (`version` unchanged); a lost race is reported as `Busy` so the caller's
/// retry re-reads and re-validates.
pub async fn save_streak(
    conn: &mut SqliteConnection,
    streak: &Streak,
) -> Result<Streak, DatabaseError> {
    let result = sqlx::query(
        "UPDATE streaks SET state = ?, current_day = ?, reset_count = ?, breaker_user_id = ?, \
         recovery_deadline_at = ?, recovery_payment_id = ?, health_score = ?, \
         day_started_at = ?, completed_at = ?, updated_at = ?, version = version + 1 \
         WHERE id = ? AND version = ?",
    )
    .bind(streak.state)
    .bind(streak.current_day)
    .bind(streak.reset_count)
    .bind(&streak.breaker_user_id)
    .bind(streak.recovery_deadline_at)
    .bind(&streak.recovery_payment_id)
    .bind(streak.health_score)
    .bind(streak.day_started_at)
    .bind(streak.completed_at)
    .bind(streak.updated_at)
    .bind(&streak.id)
    .bind(streak.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::Busy(format!(
            "Streak {} was modified concurrently",
            streak.id
        )));
    }

    fetch_streak(conn, &streak.id).await
}

// ===== Check-ins =====

/// Fields of a new check-in row.
#[derive(Debug, Clone)]
pub struct NewCheckIn<'a> {
    pub streak_id: &'a str,
    pub user_id: &'a str,
    pub day_number: i64,
    pub utc_day: i64,
    pub check_in_type: CheckInType,
    pub event_data: Option<&'a str>,
}

/// Append a check-in. A second check-in for the same day surfaces as `Conflict`.
pub async fn insert_check_in(
    conn: &mut SqliteConnection,
    new: &NewCheckIn<'_>,
    now: i64,
) -> Result<CheckIn, DatabaseError> {
    let id = new_id();

    sqlx::query(
        "INSERT INTO check_ins (id, streak_id, user_id, day_number, utc_day, check_in_type, \
         event_data, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(new.streak_id)
    .bind(new.user_id)
    .bind(new.day_number)
    .bind(new.utc_day)
    .bind(new.check_in_type)
    .bind(new.event_data)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    sqlx::query_as::<_, CheckIn>("SELECT * FROM check_ins WHERE id = ?")
        .bind(&id)
        .fetch_one(conn)
        .await
        .map_err(Into::into)
}

/// Whether `user_id` checked in for `day_number` on `utc_day`.
pub async fn has_check_in(
    conn: &mut SqliteConnection,
    streak_id: &str,
    user_id: &str,
    day_number: i64,
    utc_day: i64,
) -> Result<bool, DatabaseError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM check_ins WHERE streak_id = ? AND user_id = ? \
         AND day_number = ? AND utc_day = ?",
    )
    .bind(streak_id)
    .bind(user_id)
    .bind(day_number)
    .bind(utc_day)
    .fetch_one(conn)
    .await?;

    Ok(count > 0)
}

/// The latest UTC day on which anyone checked in for `day_number`, if any.
pub async fn latest_check_in_day(
    conn: &mut SqliteConnection,
    streak_id: &str,
    day_number: i64,
) -> Result<Option<i64>, DatabaseError> {
    let day: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(utc_day) FROM check_ins WHERE streak_id = ? AND day_number = ?",
    )
    .bind(streak_id)
    .bind(day_number)
    .fetch_one(conn)
    .await?;

    Ok(day)
}

pub async fn check_ins_of(
    conn: &mut SqliteConnection,
    streak_id: &str,
) -> Result<Vec<CheckIn>, DatabaseError> {
    let rows = sqlx::query_as::<_, CheckIn>(
        "SELECT * FROM check_ins WHERE streak_id = ? ORDER BY day_number, created_at, rowid",
    )
    .bind(streak_id)
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

// ===== Nudges =====

pub async fn fetch_nudge(conn: &mut SqliteConnection, id: &str) -> Result<Nudge, DatabaseError> {
    sqlx::query_as::<_, Nudge>("SELECT * FROM nudges WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Nudge {id}")))
}

/// Fields of a new nudge row.
#[derive(Debug, Clone)]
pub struct NewNudge<'a> {
    pub streak_id: &'a str,
    pub sender_user_id: &'a str,
    pub receiver_user_id: &'a str,
    pub day_number: i64,
    pub utc_day: i64,
    pub message: Option<&'a str>,
}

/// Insert a nudge. A second nudge for the same day surfaces as `Conflict`.
pub async fn insert_nudge(
    conn: &mut SqliteConnection,
    new: &NewNudge<'_>,
    now: i64,
) -> Result<Nudge, DatabaseError> {
    let id = new_id();

    sqlx::query(
        "INSERT INTO nudges (id, streak_id, sender_user_id, receiver_user_id, day_number, \
         utc_day, status, message, created_at) VALUES (?, ?, ?, ?, ?, ?, 'sent', ?, ?)",
    )
    .bind(&id)
    .bind(new.streak_id)
    .bind(new.sender_user_id)
    .bind(new.receiver_user_id)
    .bind(new.day_number)
    .bind(new.utc_day)
    .bind(new.message)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    fetch_nudge(conn, &id).await
}

/// Whether `sender` already nudged on this streak for `day_number` on `utc_day`.
pub async fn has_nudge(
    conn: &mut SqliteConnection,
    streak_id: &str,
    sender_user_id: &str,
    day_number: i64,
    utc_day: i64,
) -> Result<bool, DatabaseError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM nudges WHERE streak_id = ? AND sender_user_id = ? \
         AND day_number = ? AND utc_day = ?",
    )
    .bind(streak_id)
    .bind(sender_user_id)
    .bind(day_number)
    .bind(utc_day)
    .fetch_one(conn)
    .await?;

    Ok(count > 0)
}

/// Nudges `user_id` sent during a UTC day, across all streaks.
pub async fn count_nudges_sent_on(
    conn: &mut SqliteConnection,
    user_id: &str,
    utc_day: i64,
) -> Result<i64, DatabaseError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM nudges WHERE sender_user_id = ? AND utc_day = ?")
            .bind(user_id)
            .bind(utc_day)
            .fetch_one(conn)
            .await?;

    Ok(count)
}

/// Mark every open nudge addressed to `receiver` for this streak day as responded.
pub async fn respond_to_nudges(
    conn: &mut SqliteConnection,
    streak_id: &str,
    receiver_user_id: &str,
    day_number: i64,
    now: i64,
) -> Result<u64, DatabaseError> {
    let result = sqlx::query(
        "UPDATE nudges SET status = 'responded', responded_at = ? \
         WHERE streak_id = ? AND receiver_user_id = ? AND day_number = ? \
         AND status IN ('sent', 'seen')",
    )
    .bind(now)
    .bind(streak_id)
    .bind(receiver_user_id)
    .bind(day_number)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Move a `sent` nudge to `seen`. Returns false if it was not `sent`.
pub async fn mark_nudge_seen(
    conn: &mut SqliteConnection,
    id: &str,
    now: i64,
) -> Result<bool, DatabaseError> {
    let result =
        sqlx::query("UPDATE nudges SET status = 'seen', seen_at = ? WHERE id = ? AND status = 'sent'")
            .bind(now)
            .bind(id)
            .execute(conn)
            .await?;

    Ok(result.rows_affected() > 0)
}
