//! Nudge tracker: once-per-day reminders between streak partners.

use tracing::{info, instrument};
use unora_core::TierPolicy;
use unora_core::db::{DatabaseError, utc_day, with_busy_retry};

use crate::error::{EngineError, EngineResult};
use crate::storage::queries_connections::fetch_connection_for;
use crate::storage::queries_streaks::{
    NewNudge, count_nudges_sent_on, fetch_nudge, fetch_streak_by_connection, has_nudge,
    insert_nudge, mark_nudge_seen,
};
use crate::storage::queries_users::fetch_user;
use crate::storage::{EngineDatabase, Nudge};

/// Longest nudge message accepted, in characters.
pub const MAX_MESSAGE_CHARS: usize = 280;

#[derive(Clone)]
pub struct NudgeService {
    db: EngineDatabase,
    tiers: TierPolicy,
}

impl NudgeService {
    pub const fn new(db: EngineDatabase, tiers: TierPolicy) -> Self {
        Self { db, tiers }
    }

    /// Nudge the partner on the connection's streak for the current day.
    ///
    /// Besides the once-per-streak-day rule, the sender's tier caps nudges per
    /// UTC day across every streak they take part in.
    #[instrument(skip(self, message), fields(op = "send_nudge"))]
    pub async fn send(
        &self,
        sender_user_id: &str,
        connection_id: &str,
        message: Option<&str>,
        now: i64,
    ) -> EngineResult<Nudge> {
        if message.is_some_and(|m| m.chars().count() > MAX_MESSAGE_CHARS) {
            return Err(EngineError::InvalidInput(format!(
                "nudge message is longer than {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let nudge =
            with_busy_retry(move || self.send_once(sender_user_id, connection_id, message, now))
                .await?;

        info!(
            sender_user_id,
            receiver_user_id = %nudge.receiver_user_id,
            day = nudge.day_number,
            "Nudge sent"
        );
        Ok(nudge)
    }

    async fn send_once(
        &self,
        sender_user_id: &str,
        connection_id: &str,
        message: Option<&str>,
        now: i64,
    ) -> EngineResult<Nudge> {
        let mut tx = self.db.pool().begin().await?;

        let connection = fetch_connection_for(&mut tx, connection_id, sender_user_id).await?;
        let streak = fetch_streak_by_connection(&mut tx, &connection.id).await?;
        if !streak.state.accepts_check_in() {
            return Err(EngineError::InvalidState(format!(
                "cannot nudge while the streak is {:?}",
                streak.state
            )));
        }
        let receiver = connection
            .partner_of(sender_user_id)
            .ok_or_else(|| EngineError::NotFound(format!("Connection {connection_id}")))?;

        let today = utc_day(now);
        if has_nudge(&mut tx, &streak.id, sender_user_id, streak.current_day, today).await? {
            return Err(already_nudged());
        }

        let sender = fetch_user(&mut tx, sender_user_id).await?;
        let sent_today = count_nudges_sent_on(&mut tx, sender_user_id, today).await?;
        if !self.tiers.can_send_nudge(sender.tier(), sent_today) {
            return Err(EngineError::Conflict("daily nudge limit reached".to_string()));
        }

        let nudge = insert_nudge(
            &mut tx,
            &NewNudge {
                streak_id: &streak.id,
                sender_user_id,
                receiver_user_id: receiver,
                day_number: streak.current_day,
                utc_day: today,
                message,
            },
            now,
        )
        .await
        .map_err(|e| match e {
            DatabaseError::Conflict(_) => already_nudged(),
            other => other.into(),
        })?;

        tx.commit().await?;
        Ok(nudge)
    }

    /// Open nudges addressed to the user, newest first.
    pub async fn list_received(&self, user_id: &str) -> EngineResult<Vec<Nudge>> {
        Ok(self.db.list_received_nudges(user_id).await?)
    }

    /// Receiver acknowledges a nudge. Repeating it is a no-op.
    pub async fn mark_seen(&self, user_id: &str, nudge_id: &str, now: i64) -> EngineResult<Nudge> {
        let mut tx = self.db.pool().begin().await?;
        let nudge = fetch_nudge(&mut tx, nudge_id).await?;
        if nudge.receiver_user_id != user_id {
            return Err(EngineError::Forbidden(
                "only the receiver can mark a nudge as seen".to_string(),
            ));
        }

        if mark_nudge_seen(&mut tx, nudge_id, now).await? {
            let nudge = fetch_nudge(&mut tx, nudge_id).await?;
            tx.commit().await?;
            return Ok(nudge);
        }
        Ok(nudge)
    }
}

fn already_nudged() -> EngineError {
    EngineError::Conflict("already sent a nudge today".to_string())
}
