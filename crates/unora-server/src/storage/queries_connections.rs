//! Connection queries.

use sqlx::SqliteConnection;

use super::db::{DatabaseError, EngineDatabase};
use super::models::{Connection, ServerType};
use super::new_id;

impl EngineDatabase {
    /// Get a live connection by ID.
    pub async fn get_connection(&self, id: &str) -> Result<Connection, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        fetch_connection(&mut conn, id).await
    }
}

pub async fn fetch_connection(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Connection, DatabaseError> {
    sqlx::query_as::<_, Connection>("SELECT * FROM connections WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Connection {id}")))
}

/// A live connection that `user_id` takes part in. Non-participants get
/// `NotFound`, the same as a missing connection.
pub async fn fetch_connection_for(
    conn: &mut SqliteConnection,
    id: &str,
    user_id: &str,
) -> Result<Connection, DatabaseError> {
    let connection = fetch_connection(conn, id).await?;
    if connection.is_participant(user_id) {
        Ok(connection)
    } else {
        Err(DatabaseError::NotFound(format!("Connection {id}")))
    }
}

/// The connection for a canonically ordered pair, in any status.
pub async fn find_pair(
    conn: &mut SqliteConnection,
    user_a_id: &str,
    user_b_id: &str,
    server_type: ServerType,
) -> Result<Option<Connection>, DatabaseError> {
    let connection = sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections WHERE user_a_id = ? AND user_b_id = ? AND server_type = ?",
    )
    .bind(user_a_id)
    .bind(user_b_id)
    .bind(server_type)
    .fetch_optional(conn)
    .await?;

    Ok(connection)
}

/// Insert an active connection. Callers pass the pair already in canonical order.
pub async fn insert_connection(
    conn: &mut SqliteConnection,
    user_a_id: &str,
    user_b_id: &str,
    server_type: ServerType,
    now: i64,
) -> Result<Connection, DatabaseError> {
    let id = new_id();

    sqlx::query(
        "INSERT INTO connections (id, user_a_id, user_b_id, server_type, status, created_at) \
         VALUES (?, ?, ?, ?, 'active', ?)",
    )
    .bind(&id)
    .bind(user_a_id)
    .bind(user_b_id)
    .bind(server_type)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    fetch_connection(conn, &id).await
}

/// Mark an active connection terminated. Returns false if it was not active.
pub async fn terminate_connection(
    conn: &mut SqliteConnection,
    id: &str,
    now: i64,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        "UPDATE connections SET status = 'terminated', terminated_at = ? \
         WHERE id = ? AND status = 'active'",
    )
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn active_connections_of(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Vec<Connection>, DatabaseError> {
    let rows = sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections WHERE (user_a_id = ? OR user_b_id = ?) \
         AND status = 'active' AND deleted_at IS NULL ORDER BY created_at DESC, rowid DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

/// Active connections between two users in any server type.
pub async fn active_connections_between(
    conn: &mut SqliteConnection,
    user_a_id: &str,
    user_b_id: &str,
) -> Result<Vec<Connection>, DatabaseError> {
    let (a, b) = canonical_pair(user_a_id, user_b_id);
    let rows = sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections WHERE user_a_id = ? AND user_b_id = ? \
         AND status = 'active' AND deleted_at IS NULL",
    )
    .bind(a)
    .bind(b)
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

/// Order a pair so that the first ID sorts before the second.
pub fn canonical_pair<'a>(first: &'a str, second: &'a str) -> (&'a str, &'a str) {
    if first <= second {
        (first, second)
    } else {
        (second, first)
    }
}
