//! Credit ledger.
//!
//! Balance changes are a single guarded `UPDATE` plus a `credit_transactions`
//! row, both on the caller's transaction so they commit or roll back with the
//! write that paid for them.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info, instrument};
use unora_core::db::with_busy_retry;

use crate::error::{EngineError, EngineResult};
use crate::storage::queries_users::fetch_user;
use crate::storage::{CreditTransaction, EngineDatabase, TransactionType, new_id};

/// Why a balance changed, and what it paid for.
#[derive(Debug, Clone, Copy)]
pub struct LedgerEntry<'a> {
    pub transaction_type: TransactionType,
    pub reference_id: Option<&'a str>,
    pub description: &'a str,
}

/// Remove `amount` credits from a user. Fails with `InsufficientFunds` and
/// leaves the balance untouched when it would go negative.
pub async fn deduct_credits(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    entry: LedgerEntry<'_>,
    now: i64,
) -> EngineResult<CreditTransaction> {
    let balance: Option<i64> = sqlx::query_scalar(
        "UPDATE users SET credit_balance = credit_balance - ?, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL AND credit_balance >= ? RETURNING credit_balance",
    )
    .bind(amount)
    .bind(now)
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(balance_after) = balance else {
        let available: Option<i64> = sqlx::query_scalar(
            "SELECT credit_balance FROM users WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        return Err(match available {
            Some(available) => EngineError::InsufficientFunds {
                required: amount,
                available,
            },
            None => EngineError::NotFound(format!("User {user_id}")),
        });
    };

    debug!(user_id, amount, balance_after, "Credits deducted");
    record(conn, user_id, -amount, balance_after, entry, now).await
}

/// Add `amount` credits to a user.
pub async fn add_credits(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    entry: LedgerEntry<'_>,
    now: i64,
) -> EngineResult<CreditTransaction> {
    let balance: Option<i64> = sqlx::query_scalar(
        "UPDATE users SET credit_balance = credit_balance + ?, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL RETURNING credit_balance",
    )
    .bind(amount)
    .bind(now)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let balance_after = balance.ok_or_else(|| EngineError::NotFound(format!("User {user_id}")))?;

    debug!(user_id, amount, balance_after, "Credits added");
    record(conn, user_id, amount, balance_after, entry, now).await
}

async fn record(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    balance_after: i64,
    entry: LedgerEntry<'_>,
    now: i64,
) -> EngineResult<CreditTransaction> {
    let id = new_id();

    sqlx::query(
        "INSERT INTO credit_transactions (id, user_id, amount, balance_after, transaction_type, \
         reference_id, description, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(amount)
    .bind(balance_after)
    .bind(entry.transaction_type)
    .bind(entry.reference_id)
    .bind(entry.description)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let txn = sqlx::query_as::<_, CreditTransaction>(
        "SELECT * FROM credit_transactions WHERE id = ?",
    )
    .bind(&id)
    .fetch_one(conn)
    .await?;

    Ok(txn)
}

/// Ledger rows for a user, newest first.
pub async fn transactions_of(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> EngineResult<Vec<CreditTransaction>> {
    let rows = sqlx::query_as::<_, CreditTransaction>(
        "SELECT * FROM credit_transactions WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

/// Balance and ledger of one user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditSummary {
    pub balance: i64,
    pub transactions: Vec<CreditTransaction>,
}

/// Pool-level entry points for the ledger.
#[derive(Clone)]
pub struct CreditLedger {
    db: EngineDatabase,
}

impl CreditLedger {
    pub const fn new(db: EngineDatabase) -> Self {
        Self { db }
    }

    pub async fn summary(&self, user_id: &str) -> EngineResult<CreditSummary> {
        let mut conn = self.db.pool().acquire().await?;
        let user = fetch_user(&mut conn, user_id).await?;
        Ok(CreditSummary {
            balance: user.credit_balance,
            transactions: transactions_of(&mut conn, user_id).await?,
        })
    }

    /// Admin correction: positive amounts are added, negative ones deducted.
    #[instrument(skip(self), fields(op = "admin_adjust_credits"))]
    pub async fn admin_adjust(
        &self,
        user_id: &str,
        amount: i64,
        description: &str,
        now: i64,
    ) -> EngineResult<CreditTransaction> {
        if amount == 0 {
            return Err(EngineError::InvalidInput(
                "amount must not be zero".to_string(),
            ));
        }

        let entry = LedgerEntry {
            transaction_type: TransactionType::AdminAdjustment,
            reference_id: None,
            description,
        };
        let txn = with_busy_retry(move || async move {
            let mut tx = self.db.pool().begin().await?;
            let txn = if amount > 0 {
                add_credits(&mut tx, user_id, amount, entry, now).await?
            } else {
                deduct_credits(&mut tx, user_id, -amount, entry, now).await?
            };
            tx.commit().await?;
            Ok::<_, EngineError>(txn)
        })
        .await?;

        info!(user_id, amount, balance_after = txn.balance_after, "Credits adjusted by admin");
        Ok(txn)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::EngineDatabase;
    use crate::storage::queries_users::{NewUser, fetch_user};

    async fn db_with_user(balance: i64) -> EngineDatabase {
        let db = EngineDatabase::open_in_memory().await.unwrap();
        db.create_user(&NewUser {
            id: "u1",
            display_name: "Asha",
            credit_balance: balance,
            ..NewUser::default()
        })
        .await
        .unwrap();
        db
    }

    const ENTRY: LedgerEntry<'static> = LedgerEntry {
        transaction_type: TransactionType::EarlyReveal,
        reference_id: Some("m1"),
        description: "early reveal",
    };

    #[tokio::test]
    async fn deduct_writes_ledger_row() {
        let db = db_with_user(100).await;
        let mut conn = db.pool().acquire().await.unwrap();

        let txn = deduct_credits(&mut conn, "u1", 30, ENTRY, 1_000).await.unwrap();
        assert_eq!(txn.amount, -30);
        assert_eq!(txn.balance_after, 70);
        assert_eq!(txn.transaction_type, TransactionType::EarlyReveal);
        assert_eq!(fetch_user(&mut conn, "u1").await.unwrap().credit_balance, 70);
    }

    #[tokio::test]
    async fn deduct_beyond_balance_leaves_it_untouched() {
        let db = db_with_user(20).await;
        let mut conn = db.pool().acquire().await.unwrap();

        let err = deduct_credits(&mut conn, "u1", 50, ENTRY, 1_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientFunds {
                required: 50,
                available: 20
            }
        ));
        assert_eq!(fetch_user(&mut conn, "u1").await.unwrap().credit_balance, 20);
        assert!(transactions_of(&mut conn, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_credits_for_unknown_user_is_not_found() {
        let db = db_with_user(0).await;
        let mut conn = db.pool().acquire().await.unwrap();

        let entry = LedgerEntry {
            transaction_type: TransactionType::WelcomeBonus,
            reference_id: None,
            description: "welcome",
        };
        assert!(matches!(
            add_credits(&mut conn, "ghost", 10, entry, 1_000).await,
            Err(EngineError::NotFound(_))
        ));
        let txn = add_credits(&mut conn, "u1", 10, entry, 1_000).await.unwrap();
        assert_eq!(txn.balance_after, 10);
    }

    #[tokio::test]
    async fn admin_adjust_moves_balance_both_ways() {
        let db = db_with_user(40).await;
        let ledger = CreditLedger::new(db.clone());

        let added = ledger.admin_adjust("u1", 60, "goodwill", 1_000).await.unwrap();
        assert_eq!(added.balance_after, 100);
        assert_eq!(added.transaction_type, TransactionType::AdminAdjustment);

        let removed = ledger.admin_adjust("u1", -30, "chargeback", 1_001).await.unwrap();
        assert_eq!(removed.amount, -30);
        assert_eq!(removed.balance_after, 70);

        assert!(matches!(
            ledger.admin_adjust("u1", 0, "noop", 1_002).await,
            Err(EngineError::InvalidInput(_))
        ));

        let summary = ledger.summary("u1").await.unwrap();
        assert_eq!(summary.balance, 70);
        assert_eq!(summary.transactions.len(), 2);
        assert_eq!(summary.transactions[0].amount, -30);
    }
}
