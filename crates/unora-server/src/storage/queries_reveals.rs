//! Reveal milestone, reveal and reveal content queries.

use sqlx::SqliteConnection;

use super::db::{DatabaseError, EngineDatabase};
use super::models::{Reveal, RevealContent, RevealMilestone, UnlockMethod};
use super::new_id;

impl EngineDatabase {
    // =========================================================================
    // Milestone queries
    // =========================================================================

    /// Active milestones ordered by reveal number.
    pub async fn list_active_milestones(&self) -> Result<Vec<RevealMilestone>, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        active_milestones(&mut conn).await
    }

    // =========================================================================
    // Reveal queries
    // =========================================================================

    /// Get a reveal by ID.
    pub async fn get_reveal(&self, id: &str) -> Result<Reveal, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        fetch_reveal(&mut conn, id).await
    }

    /// Reveals of a connection with their content, if any.
    pub async fn list_reveals_with_content(
        &self,
        connection_id: &str,
    ) -> Result<Vec<(Reveal, Option<RevealContent>)>, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        let reveals = sqlx::query_as::<_, Reveal>("SELECT * FROM reveals WHERE connection_id = ?")
            .bind(connection_id)
            .fetch_all(&mut *conn)
            .await?;

        let mut out = Vec::with_capacity(reveals.len());
        for reveal in reveals {
            let content = content_of(&mut conn, &reveal.id).await?;
            out.push((reveal, content));
        }
        Ok(out)
    }

    /// Content for a reveal, if it has been generated.
    pub async fn get_reveal_content(
        &self,
        reveal_id: &str,
    ) -> Result<Option<RevealContent>, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        content_of(&mut conn, reveal_id).await
    }

    /// Unlocked reveals still lacking content with attempts left, oldest first.
    pub async fn list_reveals_missing_content(
        &self,
        max_attempts: i64,
        limit: i64,
    ) -> Result<Vec<Reveal>, DatabaseError> {
        let rows = sqlx::query_as::<_, Reveal>(
            "SELECT r.* FROM reveals r LEFT JOIN reveal_contents c ON c.reveal_id = r.id \
             WHERE r.status != 'locked' AND c.id IS NULL AND r.content_attempts < ? \
             ORDER BY r.unlocked_at, r.rowid LIMIT ?",
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Store generated content. A second insert for the same reveal is ignored.
    pub async fn insert_reveal_content(
        &self,
        reveal_id: &str,
        summary: &str,
        insight: &str,
        conversation_starters: &[String],
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let starters = serde_json::to_string(conversation_starters)
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO reveal_contents (id, reveal_id, summary, insight, conversation_starters, \
             created_at) VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT(reveal_id) DO NOTHING",
        )
        .bind(new_id())
        .bind(reveal_id)
        .bind(summary)
        .bind(insight)
        .bind(starters)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a failed content generation attempt. Returns the new attempt count.
    pub async fn increment_content_attempts(&self, reveal_id: &str) -> Result<i64, DatabaseError> {
        let attempts: Option<i64> = sqlx::query_scalar(
            "UPDATE reveals SET content_attempts = content_attempts + 1 WHERE id = ? \
             RETURNING content_attempts",
        )
        .bind(reveal_id)
        .fetch_optional(self.pool())
        .await?;

        attempts.ok_or_else(|| DatabaseError::NotFound(format!("Reveal {reveal_id}")))
    }
}

pub async fn active_milestones(
    conn: &mut SqliteConnection,
) -> Result<Vec<RevealMilestone>, DatabaseError> {
    let rows = sqlx::query_as::<_, RevealMilestone>(
        "SELECT * FROM reveal_milestones WHERE is_active = 1 ORDER BY reveal_number",
    )
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

pub async fn fetch_milestone(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<RevealMilestone, DatabaseError> {
    sqlx::query_as::<_, RevealMilestone>(
        "SELECT * FROM reveal_milestones WHERE id = ? AND is_active = 1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DatabaseError::NotFound(format!("Milestone {id}")))
}

pub async fn fetch_reveal(conn: &mut SqliteConnection, id: &str) -> Result<Reveal, DatabaseError> {
    sqlx::query_as::<_, Reveal>("SELECT * FROM reveals WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Reveal {id}")))
}

pub async fn find_reveal(
    conn: &mut SqliteConnection,
    connection_id: &str,
    milestone_id: &str,
) -> Result<Option<Reveal>, DatabaseError> {
    let reveal = sqlx::query_as::<_, Reveal>(
        "SELECT * FROM reveals WHERE connection_id = ? AND milestone_id = ?",
    )
    .bind(connection_id)
    .bind(milestone_id)
    .fetch_optional(conn)
    .await?;

    Ok(reveal)
}

/// Unlock a reveal, creating the row or upgrading a `locked` one in place.
///
/// Returns `Conflict` when the reveal is already unlocked.
pub async fn unlock_reveal(
    conn: &mut SqliteConnection,
    connection_id: &str,
    milestone_id: &str,
    method: UnlockMethod,
    now: i64,
) -> Result<Reveal, DatabaseError> {
    let result = sqlx::query(
        "INSERT INTO reveals (id, connection_id, milestone_id, unlock_method, status, \
         created_at, unlocked_at) VALUES (?, ?, ?, ?, 'unlocked', ?, ?) \
         ON CONFLICT(connection_id, milestone_id) DO UPDATE SET \
         unlock_method = excluded.unlock_method, status = 'unlocked', \
         unlocked_at = excluded.unlocked_at WHERE reveals.status = 'locked'",
    )
    .bind(new_id())
    .bind(connection_id)
    .bind(milestone_id)
    .bind(method)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::Conflict(format!(
            "Reveal for milestone {milestone_id} already unlocked"
        )));
    }

    find_reveal(conn, connection_id, milestone_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Reveal for milestone {milestone_id}")))
}

/// Move an unlocked reveal to `viewed`. Returns false if it was not `unlocked`.
pub async fn mark_viewed(
    conn: &mut SqliteConnection,
    id: &str,
    now: i64,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        "UPDATE reveals SET status = 'viewed', viewed_at = ? WHERE id = ? AND status = 'unlocked'",
    )
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn content_of(
    conn: &mut SqliteConnection,
    reveal_id: &str,
) -> Result<Option<RevealContent>, DatabaseError> {
    let content =
        sqlx::query_as::<_, RevealContent>("SELECT * FROM reveal_contents WHERE reveal_id = ?")
            .bind(reveal_id)
            .fetch_optional(conn)
            .await?;

    Ok(content)
}
