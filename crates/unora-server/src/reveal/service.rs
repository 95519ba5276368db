//! Reveal unlock engine.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, instrument};
use unora_core::db::{DatabaseError, with_busy_retry};

use super::worker::ContentWorker;
use crate::credits::{self, LedgerEntry};
use crate::error::{EngineError, EngineResult};
use crate::storage::queries_connections::{fetch_connection, fetch_connection_for};
use crate::storage::queries_reveals::{
    active_milestones, fetch_milestone, fetch_reveal, find_reveal, mark_viewed, unlock_reveal,
};
use crate::storage::queries_streaks::fetch_streak_by_connection;
use crate::storage::queries_users::fetch_user;
use crate::storage::{
    EngineDatabase, Reveal, RevealContent, RevealMilestone, RevealStatus, TransactionType,
    UnlockMethod,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentView {
    pub id: String,
    pub summary: String,
    pub insight: String,
    pub conversation_starters: Vec<String>,
}

impl From<RevealContent> for ContentView {
    fn from(content: RevealContent) -> Self {
        Self {
            conversation_starters: content.starters(),
            id: content.id,
            summary: content.summary,
            insight: content.insight,
        }
    }
}

/// One milestone of a connection, unlocked or not.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealView {
    /// Reveal ID; absent until the milestone is unlocked.
    pub id: Option<String>,
    pub connection_id: String,
    pub milestone_id: String,
    pub reveal_number: i64,
    pub day_required: i64,
    pub reveal_type: String,
    pub title: String,
    pub credit_cost: i64,
    pub status: RevealStatus,
    pub unlock_method: Option<UnlockMethod>,
    pub can_unlock: bool,
    pub content: Option<ContentView>,
    pub unlocked_at: Option<i64>,
    pub viewed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReveals {
    pub connection_id: String,
    pub current_day: i64,
    pub streak_active: bool,
    pub reveals: Vec<RevealView>,
    pub next_reveal_day: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockOutcome {
    pub reveal: Reveal,
    pub credits_used: i64,
    pub remaining_credits: i64,
}

#[derive(Clone)]
pub struct RevealService {
    db: EngineDatabase,
    content: ContentWorker,
}

impl RevealService {
    pub const fn new(db: EngineDatabase, content: ContentWorker) -> Self {
        Self { db, content }
    }

    pub const fn content_worker(&self) -> &ContentWorker {
        &self.content
    }

    /// Active milestones ordered by reveal number.
    pub async fn list_milestones(&self) -> EngineResult<Vec<RevealMilestone>> {
        Ok(self.db.list_active_milestones().await?)
    }

    /// Every active milestone of the connection with its reveal state.
    pub async fn connection_reveals(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> EngineResult<ConnectionReveals> {
        let (streak, milestones) = {
            let mut conn = self.db.pool().acquire().await?;
            let connection = fetch_connection_for(&mut conn, connection_id, user_id).await?;
            let streak = fetch_streak_by_connection(&mut conn, &connection.id).await?;
            (streak, active_milestones(&mut conn).await?)
        };

        let mut existing: HashMap<String, (Reveal, Option<RevealContent>)> = self
            .db
            .list_reveals_with_content(connection_id)
            .await?
            .into_iter()
            .map(|(reveal, content)| (reveal.milestone_id.clone(), (reveal, content)))
            .collect();

        let current_day = streak.current_day;
        let mut next_reveal_day = None;
        let mut reveals = Vec::with_capacity(milestones.len());

        for milestone in milestones {
            let entry = existing
                .remove(&milestone.id)
                .filter(|(reveal, _)| reveal.status != RevealStatus::Locked);

            let view = match entry {
                Some((reveal, content)) => RevealView {
                    id: Some(reveal.id),
                    connection_id: reveal.connection_id,
                    milestone_id: milestone.id,
                    reveal_number: milestone.reveal_number,
                    day_required: milestone.day_required,
                    reveal_type: milestone.reveal_type,
                    title: milestone.title,
                    credit_cost: milestone.credit_cost,
                    status: reveal.status,
                    unlock_method: reveal.unlock_method,
                    can_unlock: false,
                    content: content.map(ContentView::from),
                    unlocked_at: reveal.unlocked_at,
                    viewed_at: reveal.viewed_at,
                },
                None => {
                    if milestone.day_required > current_day {
                        let day = milestone.day_required;
                        next_reveal_day = Some(next_reveal_day.map_or(day, |next: i64| next.min(day)));
                    }
                    RevealView {
                        id: None,
                        connection_id: connection_id.to_string(),
                        can_unlock: current_day >= milestone.day_required,
                        milestone_id: milestone.id,
                        reveal_number: milestone.reveal_number,
                        day_required: milestone.day_required,
                        reveal_type: milestone.reveal_type,
                        title: milestone.title,
                        credit_cost: milestone.credit_cost,
                        status: RevealStatus::Locked,
                        unlock_method: None,
                        content: None,
                        unlocked_at: None,
                        viewed_at: None,
                    }
                }
            };
            reveals.push(view);
        }

        Ok(ConnectionReveals {
            connection_id: connection_id.to_string(),
            current_day,
            streak_active: streak.state.accepts_check_in(),
            reveals,
            next_reveal_day,
        })
    }

    /// Unlock a milestone for the connection: earned once the streak reaches
    /// the milestone day, otherwise bought with the caller's credits.
    #[instrument(skip(self), fields(op = "unlock_reveal"))]
    pub async fn unlock(
        &self,
        user_id: &str,
        connection_id: &str,
        milestone_id: &str,
        use_credits: bool,
        now: i64,
    ) -> EngineResult<UnlockOutcome> {
        let (outcome, milestone) = with_busy_retry(move || {
            self.unlock_once(user_id, connection_id, milestone_id, use_credits, now)
        })
        .await?;

        info!(
            user_id,
            connection_id,
            milestone_id,
            credits_used = outcome.credits_used,
            "Reveal unlocked"
        );
        self.content.spawn(
            outcome.reveal.id.clone(),
            connection_id.to_string(),
            milestone,
        );
        Ok(outcome)
    }

    async fn unlock_once(
        &self,
        user_id: &str,
        connection_id: &str,
        milestone_id: &str,
        use_credits: bool,
        now: i64,
    ) -> EngineResult<(UnlockOutcome, RevealMilestone)> {
        let mut tx = self.db.pool().begin().await?;

        let connection = fetch_connection_for(&mut tx, connection_id, user_id).await?;
        let milestone = fetch_milestone(&mut tx, milestone_id).await?;
        if find_reveal(&mut tx, &connection.id, milestone_id)
            .await?
            .is_some_and(|r| r.status != RevealStatus::Locked)
        {
            return Err(already_unlocked());
        }

        let streak = fetch_streak_by_connection(&mut tx, &connection.id).await?;
        let earned = streak.current_day >= milestone.day_required;
        if !earned && !use_credits {
            return Err(EngineError::InvalidState(
                "not enough streak days to unlock, use credits to unlock early".to_string(),
            ));
        }

        let method = if earned {
            UnlockMethod::Earned
        } else {
            UnlockMethod::Purchased
        };
        let reveal = unlock_reveal(&mut tx, &connection.id, milestone_id, method, now)
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict(_) => already_unlocked(),
                other => other.into(),
            })?;

        let (credits_used, remaining_credits) = if earned {
            (0, fetch_user(&mut tx, user_id).await?.credit_balance)
        } else {
            let txn = credits::deduct_credits(
                &mut tx,
                user_id,
                milestone.credit_cost,
                LedgerEntry {
                    transaction_type: TransactionType::EarlyReveal,
                    reference_id: Some(reveal.id.as_str()),
                    description: "early reveal",
                },
                now,
            )
            .await?;
            (milestone.credit_cost, txn.balance_after)
        };

        tx.commit().await?;

        Ok((
            UnlockOutcome {
                reveal,
                credits_used,
                remaining_credits,
            },
            milestone,
        ))
    }

    /// A participant opened an unlocked reveal. Repeating it is a no-op.
    pub async fn mark_viewed(&self, user_id: &str, reveal_id: &str, now: i64) -> EngineResult<Reveal> {
        let mut tx = self.db.pool().begin().await?;
        let reveal = fetch_reveal(&mut tx, reveal_id).await?;
        let connection = fetch_connection(&mut tx, &reveal.connection_id).await?;
        if !connection.is_participant(user_id) {
            return Err(EngineError::Forbidden(
                "only connection participants can view this reveal".to_string(),
            ));
        }

        match reveal.status {
            RevealStatus::Locked => Err(EngineError::InvalidState(
                "reveal is still locked".to_string(),
            )),
            RevealStatus::Viewed => Ok(reveal),
            RevealStatus::Unlocked => {
                mark_viewed(&mut tx, reveal_id, now).await?;
                let reveal = fetch_reveal(&mut tx, reveal_id).await?;
                tx.commit().await?;
                Ok(reveal)
            }
        }
    }
}

fn already_unlocked() -> EngineError {
    EngineError::Conflict("reveal already unlocked".to_string())
}
