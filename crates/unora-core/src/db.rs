//! Shared database types and utilities.
//!
//! Provides `DatabaseError`, `unix_timestamp()`, UTC day helpers, pool
//! creation helpers and the `define_database!` macro used by the server's
//! storage layer.

use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

/// Seconds in a UTC calendar day.
pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Attempts made by [`with_busy_retry`] before giving up.
pub const BUSY_RETRY_ATTEMPTS: u32 = 5;

/// Database errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique or partial unique index rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The database was locked by a concurrent writer.
    #[error("Database busy: {0}")]
    Busy(String),
}

/// Errors that can report a transient lock contention.
pub trait BusyError {
    fn is_busy(&self) -> bool;
}

impl BusyError for DatabaseError {
    fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

// SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_SNAPSHOT
const BUSY_CODES: [&str; 3] = ["5", "6", "517"];

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Conflict(db_err.message().to_string())
            }
            sqlx::Error::Database(db_err)
                if db_err
                    .code()
                    .is_some_and(|code| BUSY_CODES.contains(&code.as_ref())) =>
            {
                Self::Busy(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut => Self::Busy(e.to_string()),
            _ => Self::Query(e.to_string()),
        }
    }
}

/// Run `op` again when it fails with [`DatabaseError::Busy`], up to
/// [`BUSY_RETRY_ATTEMPTS`] times in total.
///
/// `op` must restart its transaction from scratch on every call.
pub async fn with_busy_retry<T, E, F, Fut>(mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: BusyError,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_busy() && attempt < BUSY_RETRY_ATTEMPTS => {
                debug!(attempt, "Database busy, retrying");
                tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Open (or create) a `SQLite` connection pool at the given file path.
///
/// Creates the parent directory if it does not exist, enables WAL journal
/// mode, foreign keys, and sets a 5-second busy timeout.
pub async fn open_pool(path: &Path) -> Result<Pool<Sqlite>, DatabaseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io(e.to_string()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
        .map_err(|e| DatabaseError::Connection(e.to_string()))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;

    info!(path = %path.display(), "Database opened");

    Ok(pool)
}

/// Open an in-memory `SQLite` connection pool (for testing).
///
/// The pool holds a single connection; callers must not touch the pool
/// while a transaction from it is still open.
pub async fn open_pool_in_memory() -> Result<Pool<Sqlite>, DatabaseError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| DatabaseError::Connection(e.to_string()))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;

    Ok(pool)
}

/// Returns the current time as a Unix timestamp (seconds since epoch).
#[allow(clippy::cast_possible_wrap)]
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// UTC calendar day number (days since the epoch) containing `ts`.
pub const fn utc_day(ts: i64) -> i64 {
    ts.div_euclid(SECONDS_PER_DAY)
}

/// Timestamp of the UTC midnight that starts the day containing `ts`.
pub const fn utc_day_start(ts: i64) -> i64 {
    utc_day(ts) * SECONDS_PER_DAY
}

/// Macro to define a `Database`-like struct with `open`, `open_in_memory`,
/// `run_migrations`, and `pool` methods.
///
/// Usage:
/// ```ignore
/// unora_core::define_database!(EngineDatabase, "Engine database migrations complete");
/// ```
///
/// The generated struct has:
/// - `pub async fn open(path: &Path) -> Result<Self, DatabaseError>`
/// - `pub async fn open_in_memory() -> Result<Self, DatabaseError>`
/// - `async fn run_migrations(&self) -> Result<(), DatabaseError>`
/// - `pub const fn pool(&self) -> &Pool<Sqlite>`
#[macro_export]
macro_rules! define_database {
    ($name:ident, $migration_msg:expr) => {
        #[derive(Clone)]
        pub struct $name {
            pool: ::sqlx::Pool<::sqlx::Sqlite>,
        }

        impl $name {
            /// Open or create a database at the given path.
            pub async fn open(
                path: &::std::path::Path,
            ) -> ::std::result::Result<Self, $crate::db::DatabaseError> {
                let pool = $crate::db::open_pool(path).await?;
                let db = Self { pool };
                db.run_migrations().await?;
                Ok(db)
            }

            /// Open an in-memory database (for testing).
            pub async fn open_in_memory() -> ::std::result::Result<Self, $crate::db::DatabaseError>
            {
                let pool = $crate::db::open_pool_in_memory().await?;
                let db = Self { pool };
                db.run_migrations().await?;
                Ok(db)
            }

            /// Run database migrations.
            async fn run_migrations(&self) -> ::std::result::Result<(), $crate::db::DatabaseError> {
                ::sqlx::migrate!("./migrations")
                    .run(&self.pool)
                    .await
                    .map_err(|e| $crate::db::DatabaseError::Migration(e.to_string()))?;

                ::tracing::info!($migration_msg);
                Ok(())
            }

            /// Get a reference to the connection pool.
            pub const fn pool(&self) -> &::sqlx::Pool<::sqlx::Sqlite> {
                &self.pool
            }
        }
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unix_timestamp_is_reasonable() {
        let ts = unix_timestamp();
        // Should be after 2024-01-01
        assert!(ts > 1_704_067_200);
    }

    #[test]
    fn utc_day_boundaries() {
        // 2024-01-01T00:00:00Z
        let midnight = 1_704_067_200;
        assert_eq!(utc_day(midnight), utc_day(midnight + SECONDS_PER_DAY - 1));
        assert_eq!(utc_day(midnight) + 1, utc_day(midnight + SECONDS_PER_DAY));
        assert_eq!(utc_day_start(midnight + 3600), midnight);
        assert_eq!(utc_day(-1), -1);
    }

    #[tokio::test]
    async fn unique_violation_maps_to_conflict() {
        let pool = open_pool_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE t (k TEXT PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t (k) VALUES ('a')")
            .execute(&pool)
            .await
            .unwrap();
        let err: DatabaseError = sqlx::query("INSERT INTO t (k) VALUES ('a')")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DatabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn busy_retry_gives_up_after_limit() {
        let mut calls = 0;
        let result: Result<(), DatabaseError> = with_busy_retry(|| {
            calls += 1;
            async { Err(DatabaseError::Busy("locked".into())) }
        })
        .await;
        assert!(result.unwrap_err().is_busy());
        assert_eq!(calls, BUSY_RETRY_ATTEMPTS);
    }

    #[tokio::test]
    async fn busy_retry_does_not_retry_other_errors() {
        let mut calls = 0;
        let result: Result<(), DatabaseError> = with_busy_retry(|| {
            calls += 1;
            async { Err(DatabaseError::NotFound("x".into())) }
        })
        .await;
        assert!(matches!(result, Err(DatabaseError::NotFound(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn open_pool_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("unora.db");
        let pool = open_pool(&path).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(path.exists());
    }
}
