//! Interest ledger: one-way "I'm interested" records that become a
//! connection once they are mutual.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, instrument};
use unora_core::db::{DatabaseError, with_busy_retry};

use super::MatchingService;
use super::connections::create_connection;
use crate::error::{EngineError, EngineResult};
use crate::storage::queries_connections::{canonical_pair, find_pair};
use crate::storage::queries_interests::{
    InterestWithProfile, find_pending, insert_matched, insert_pending, mark_matched,
    wipe_outgoing_pending,
};
use crate::storage::queries_users::{fetch_discovery_card, fetch_user};
use crate::storage::{Connection, Interest, Streak};

/// Result of expressing interest. `connection` and `streak` are set when the
/// interest completed a mutual pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressOutcome {
    pub interest: Interest,
    pub matched: bool,
    pub connection: Option<Connection>,
    pub streak: Option<Streak>,
    /// Pending interests wiped because a participant ran out of slots.
    pub wiped: u64,
}

impl MatchingService {
    /// Express interest in the candidate shown on `discovery_card_id`.
    #[instrument(skip(self), fields(op = "express_interest"))]
    pub async fn express_interest(
        &self,
        sender_user_id: &str,
        discovery_card_id: &str,
        now: i64,
    ) -> EngineResult<ExpressOutcome> {
        let outcome =
            with_busy_retry(move || self.express_once(sender_user_id, discovery_card_id, now))
                .await?;

        if let Some(connection) = &outcome.connection {
            info!(
                sender_user_id,
                connection_id = %connection.id,
                wiped = outcome.wiped,
                "Mutual interest, connection created"
            );
        } else {
            info!(
                sender_user_id,
                receiver_user_id = %outcome.interest.receiver_user_id,
                "Interest recorded"
            );
        }
        Ok(outcome)
    }

    async fn express_once(
        &self,
        sender_user_id: &str,
        discovery_card_id: &str,
        now: i64,
    ) -> EngineResult<ExpressOutcome> {
        let mut tx = self.db.pool().begin().await?;

        let card = fetch_discovery_card(&mut tx, discovery_card_id).await?;
        if card.viewer_user_id != sender_user_id {
            return Err(EngineError::NotFound(format!(
                "Discovery card {discovery_card_id}"
            )));
        }
        let receiver_user_id = card.candidate_user_id.as_str();
        if receiver_user_id == sender_user_id {
            return Err(EngineError::InvalidInput(
                "cannot express interest in yourself".to_string(),
            ));
        }
        fetch_user(&mut tx, receiver_user_id).await?;

        if find_pending(&mut tx, sender_user_id, receiver_user_id, card.server_type)
            .await?
            .is_some()
        {
            return Err(already_pending());
        }

        let Some(reciprocal) =
            find_pending(&mut tx, receiver_user_id, sender_user_id, card.server_type).await?
        else {
            let interest = insert_pending(
                &mut tx,
                sender_user_id,
                receiver_user_id,
                card.server_type,
                &card.id,
                now,
            )
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict(_) => already_pending(),
                other => other.into(),
            })?;
            tx.commit().await?;

            return Ok(ExpressOutcome {
                interest,
                matched: false,
                connection: None,
                streak: None,
                wiped: 0,
            });
        };

        let (user_a, user_b) = canonical_pair(sender_user_id, receiver_user_id);
        if find_pair(&mut tx, user_a, user_b, card.server_type)
            .await?
            .is_some()
        {
            return Err(EngineError::Conflict(
                "a connection already exists for this pair".to_string(),
            ));
        }
        self.ensure_capacity(&mut tx, sender_user_id).await?;
        self.ensure_capacity(&mut tx, receiver_user_id).await?;

        let (connection, streak) =
            create_connection(&mut tx, user_a, user_b, card.server_type, now)
                .await
                .map_err(|e| match e {
                    EngineError::Conflict(_) => EngineError::Conflict(
                        "a connection already exists for this pair".to_string(),
                    ),
                    other => other,
                })?;

        let interest = insert_matched(
            &mut tx,
            sender_user_id,
            receiver_user_id,
            card.server_type,
            &card.id,
            now,
        )
        .await?;
        if !mark_matched(&mut tx, &reciprocal.id, now).await? {
            // Consumed by a concurrent match; start over.
            return Err(DatabaseError::Busy(format!(
                "Interest {} was matched concurrently",
                reciprocal.id
            ))
            .into());
        }

        let mut wiped = 0;
        for user_id in [user_a, user_b] {
            wiped += self.wipe_if_full(&mut tx, user_id).await?;
        }

        tx.commit().await?;

        Ok(ExpressOutcome {
            interest,
            matched: true,
            connection: Some(connection),
            streak: Some(streak),
            wiped,
        })
    }

    async fn ensure_capacity(&self, conn: &mut SqliteConnection, user_id: &str) -> EngineResult<()> {
        let user = fetch_user(conn, user_id).await?;
        if self
            .tiers
            .at_capacity(user.tier(), user.active_connection_count)
        {
            return Err(EngineError::CapacityReached(format!(
                "user {user_id} has no free connection slot"
            )));
        }
        Ok(())
    }

    /// Total Wipe: a user who just filled their last slot loses every
    /// outgoing pending interest.
    async fn wipe_if_full(&self, conn: &mut SqliteConnection, user_id: &str) -> EngineResult<u64> {
        let user = fetch_user(conn, user_id).await?;
        if !self
            .tiers
            .at_capacity(user.tier(), user.active_connection_count)
        {
            return Ok(0);
        }

        let wiped = wipe_outgoing_pending(conn, user_id).await?;
        if wiped > 0 {
            info!(user_id, wiped, "Slots full, outgoing interests wiped");
        }
        Ok(wiped)
    }

    /// Every interest the user has sent, newest first.
    pub async fn list_sent(&self, user_id: &str) -> EngineResult<Vec<InterestWithProfile>> {
        Ok(self.db.list_sent_interests(user_id).await?)
    }

    /// Pending interests addressed to the user, newest first.
    pub async fn list_received(&self, user_id: &str) -> EngineResult<Vec<InterestWithProfile>> {
        Ok(self.db.list_received_interests(user_id).await?)
    }
}

fn already_pending() -> EngineError {
    EngineError::Conflict("interest already pending".to_string())
}
