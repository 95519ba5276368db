//! Connection manager: the symmetric pair entity and its owned streak.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, instrument};
use unora_core::db::{utc_day, with_busy_retry};

use super::MatchingService;
use crate::error::{EngineError, EngineResult};
use crate::storage::queries_connections::{
    active_connections_between, active_connections_of, canonical_pair, fetch_connection_for,
    insert_connection, terminate_connection,
};
use crate::storage::queries_interests::expire_between;
use crate::storage::queries_streaks::{
    fetch_streak_by_connection, has_check_in, insert_streak, save_streak,
};
use crate::storage::queries_users::{fetch_profile, increment_active_connections};
use crate::storage::{Connection, ConnectionStatus, ProfileSummary, ServerType, Streak, StreakState};

/// Streak fields shown alongside a connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakSummary {
    pub id: String,
    pub current_day: i64,
    pub state: StreakState,
    pub needs_check_in: bool,
}

/// A connection as seen by one participant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub connection: Connection,
    pub partner: ProfileSummary,
    pub streak: StreakSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverReport {
    pub expired_interests: u64,
    pub terminated_connections: u64,
}

/// Create a connection and its day-1 streak, and charge a slot to both users.
///
/// Runs on the caller's transaction so a connection never exists without
/// its streak.
pub async fn create_connection(
    conn: &mut SqliteConnection,
    first_user_id: &str,
    second_user_id: &str,
    server_type: ServerType,
    now: i64,
) -> EngineResult<(Connection, Streak)> {
    let (user_a, user_b) = canonical_pair(first_user_id, second_user_id);
    if user_a == user_b {
        return Err(EngineError::InvalidInput(
            "a connection needs two distinct users".to_string(),
        ));
    }

    let connection = insert_connection(conn, user_a, user_b, server_type, now).await?;
    let streak = insert_streak(conn, &connection.id, now).await?;
    increment_active_connections(conn, user_a, now).await?;
    increment_active_connections(conn, user_b, now).await?;

    Ok((connection, streak))
}

/// End a connection and its streak. Slot counts are not returned.
async fn terminate_in(
    conn: &mut SqliteConnection,
    connection: &Connection,
    now: i64,
) -> EngineResult<()> {
    if !terminate_connection(conn, &connection.id, now).await? {
        return Err(EngineError::InvalidState(format!(
            "connection {} is already terminated",
            connection.id
        )));
    }

    let mut streak = fetch_streak_by_connection(conn, &connection.id).await?;
    if !streak.state.is_terminal() {
        streak.terminate(now)?;
        save_streak(conn, &streak).await?;
    }
    Ok(())
}

impl MatchingService {
    /// Terminate a connection on behalf of one of its participants.
    ///
    /// The active connection count is deliberately left as is: slots are
    /// consumed for the tier cycle, not handed back early.
    #[instrument(skip(self), fields(op = "terminate_connection"))]
    pub async fn terminate_connection(
        &self,
        acting_user_id: &str,
        connection_id: &str,
        now: i64,
    ) -> EngineResult<Connection> {
        let connection = with_busy_retry(move || async move {
            let mut tx = self.db.pool().begin().await?;
            let connection = fetch_connection_for(&mut tx, connection_id, acting_user_id).await?;
            if connection.status == ConnectionStatus::Terminated {
                return Err(EngineError::InvalidState(format!(
                    "connection {connection_id} is already terminated"
                )));
            }
            terminate_in(&mut tx, &connection, now).await?;
            let connection = fetch_connection_for(&mut tx, connection_id, acting_user_id).await?;
            tx.commit().await?;
            Ok(connection)
        })
        .await?;

        info!(connection_id, acting_user_id, "Connection terminated");
        Ok(connection)
    }

    /// Safety hook for blocks and reports: expire pending interests between
    /// the two users in both directions and terminate their active connections.
    #[instrument(skip(self), fields(op = "sever_pair"))]
    pub async fn sever_pair(&self, user_a: &str, user_b: &str, now: i64) -> EngineResult<SeverReport> {
        let report = with_busy_retry(move || async move {
            let mut tx = self.db.pool().begin().await?;
            let expired_interests = expire_between(&mut tx, user_a, user_b).await?;

            let mut terminated_connections = 0;
            for connection in active_connections_between(&mut tx, user_a, user_b).await? {
                terminate_in(&mut tx, &connection, now).await?;
                terminated_connections += 1;
            }

            tx.commit().await?;
            Ok::<_, EngineError>(SeverReport {
                expired_interests,
                terminated_connections,
            })
        })
        .await?;

        info!(
            user_a,
            user_b,
            expired = report.expired_interests,
            terminated = report.terminated_connections,
            "Pair severed"
        );
        Ok(report)
    }

    /// Active connections of the user with partner and streak summaries.
    pub async fn list_connections(
        &self,
        user_id: &str,
        now: i64,
    ) -> EngineResult<Vec<ConnectionSummary>> {
        let mut conn = self.db.pool().acquire().await?;
        let mut summaries = Vec::new();
        for connection in active_connections_of(&mut conn, user_id).await? {
            summaries.push(summarize(&mut conn, connection, user_id, now).await?);
        }
        Ok(summaries)
    }

    /// One connection the user takes part in.
    pub async fn get_connection(
        &self,
        user_id: &str,
        connection_id: &str,
        now: i64,
    ) -> EngineResult<ConnectionSummary> {
        let mut conn = self.db.pool().acquire().await?;
        let connection = fetch_connection_for(&mut conn, connection_id, user_id).await?;
        summarize(&mut conn, connection, user_id, now).await
    }
}

async fn summarize(
    conn: &mut SqliteConnection,
    connection: Connection,
    user_id: &str,
    now: i64,
) -> EngineResult<ConnectionSummary> {
    let partner_id = connection
        .partner_of(user_id)
        .ok_or_else(|| EngineError::NotFound(format!("Connection {}", connection.id)))?;
    let partner = fetch_profile(conn, partner_id).await?;
    let streak = fetch_streak_by_connection(conn, &connection.id).await?;
    let checked_in =
        has_check_in(conn, &streak.id, user_id, streak.current_day, utc_day(now)).await?;

    Ok(ConnectionSummary {
        partner,
        streak: StreakSummary {
            needs_check_in: streak.state.accepts_check_in() && !checked_in,
            id: streak.id,
            current_day: streak.current_day,
            state: streak.state,
        },
        connection,
    })
}
