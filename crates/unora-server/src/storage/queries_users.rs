//! User, profile and discovery card queries.

use sqlx::SqliteConnection;
use unora_core::Tier;
use unora_core::db::unix_timestamp;

use super::db::{DatabaseError, EngineDatabase};
use super::models::{DiscoveryCard, ProfileSummary, ServerType, User};
use super::new_id;

/// Profile fields supplied when seeding a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
    pub city: Option<&'a str>,
    pub age: Option<i64>,
    pub photo_url: Option<&'a str>,
    pub tier: Tier,
    pub credit_balance: i64,
}

impl EngineDatabase {
    // =========================================================================
    // User queries
    // =========================================================================

    /// Create a user. Profiles are owned by the identity service; this exists
    /// for seeding and tests.
    pub async fn create_user(&self, user: &NewUser<'_>) -> Result<User, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO users (id, display_name, city, age, photo_url, tier, credit_balance, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(user.display_name)
        .bind(user.city)
        .bind(user.age)
        .bind(user.photo_url)
        .bind(user.tier.as_str())
        .bind(user.credit_balance)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_user(user.id).await
    }

    /// Get a live user by ID.
    pub async fn get_user(&self, id: &str) -> Result<User, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        fetch_user(&mut conn, id).await
    }

    // =========================================================================
    // Discovery card queries
    // =========================================================================

    /// Record that `candidate` was shown to `viewer`.
    pub async fn create_discovery_card(
        &self,
        viewer_user_id: &str,
        candidate_user_id: &str,
        server_type: ServerType,
    ) -> Result<DiscoveryCard, DatabaseError> {
        let id = new_id();
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO discovery_cards (id, viewer_user_id, candidate_user_id, server_type, \
             created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(viewer_user_id)
        .bind(candidate_user_id)
        .bind(server_type)
        .bind(now)
        .execute(self.pool())
        .await?;

        let mut conn = self.pool().acquire().await?;
        fetch_discovery_card(&mut conn, &id).await
    }
}

pub async fn fetch_user(conn: &mut SqliteConnection, id: &str) -> Result<User, DatabaseError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
}

pub async fn fetch_profile(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<ProfileSummary, DatabaseError> {
    sqlx::query_as::<_, ProfileSummary>(
        "SELECT id, display_name, city, age, photo_url FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
}

pub async fn fetch_discovery_card(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<DiscoveryCard, DatabaseError> {
    sqlx::query_as::<_, DiscoveryCard>(
        "SELECT * FROM discovery_cards WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DatabaseError::NotFound(format!("Discovery card {id}")))
}

/// Atomically bump a user's active connection count.
pub async fn increment_active_connections(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: i64,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        "UPDATE users SET active_connection_count = active_connection_count + 1, updated_at = ? \
         WHERE id = ?",
    )
    .bind(now)
    .bind(user_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound(format!("User {user_id}")));
    }
    Ok(())
}

/// Consume one free streak recovery.
pub async fn increment_free_recoveries_used(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: i64,
) -> Result<(), DatabaseError> {
    sqlx::query(
        "UPDATE users SET free_recoveries_used = free_recoveries_used + 1, updated_at = ? \
         WHERE id = ?",
    )
    .bind(now)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(())
}
