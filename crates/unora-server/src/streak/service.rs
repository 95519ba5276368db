//! Streak lifecycle service: check-ins, recovery, decay sweep and admin overrides.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, instrument, warn};
use unora_core::TierPolicy;
use unora_core::config::StreakConfig;
use unora_core::db::{DatabaseError, utc_day, with_busy_retry};

use super::machine::TransitionError;
use crate::credits::{self, LedgerEntry};
use crate::error::{EngineError, EngineResult};
use crate::storage::queries_connections::{
    active_connections_of, fetch_connection, fetch_connection_for,
};
use crate::storage::queries_streaks::{
    NewCheckIn, check_ins_of, fetch_streak, fetch_streak_by_connection, has_check_in,
    insert_check_in, latest_check_in_day, respond_to_nudges, save_streak,
};
use crate::storage::queries_users::{fetch_profile, fetch_user, increment_free_recoveries_used};
use crate::storage::{
    CheckIn, CheckInType, Connection, EngineDatabase, ProfileSummary, Streak, StreakState,
    TransactionType,
};

/// Result of a check-in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInOutcome {
    pub check_in: CheckIn,
    pub streak: Streak,
    /// Whether this check-in completed the day for both participants.
    pub day_advanced: bool,
}

/// A streak as seen by one participant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakDetail {
    pub streak: Streak,
    pub user_checked_in_today: bool,
    pub partner_checked_in_today: bool,
    pub check_ins: Vec<CheckIn>,
}

/// One entry of the "today" overview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayStreak {
    pub connection_id: String,
    pub streak_id: String,
    pub partner: ProfileSummary,
    pub current_day: i64,
    pub state: StreakState,
    pub needs_check_in: bool,
    pub partner_checked_in: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayOverview {
    pub streaks: Vec<TodayStreak>,
    pub pending_count: usize,
    pub completed_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryOptions {
    pub streak_id: String,
    pub state: StreakState,
    pub current_day: i64,
    pub can_recover: bool,
    pub recovery_deadline_at: Option<i64>,
    pub credit_cost: i64,
    pub credit_balance: i64,
    pub free_recovery_available: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverOutcome {
    pub streak: Streak,
    pub credits_spent: i64,
    pub used_free_recovery: bool,
    pub credit_balance: i64,
}

/// Counts of transitions applied by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub at_risk: u64,
    pub payment_window: u64,
    pub terminated: u64,
    pub failed: u64,
}

impl SweepReport {
    pub const fn total(&self) -> u64 {
        self.at_risk + self.payment_window + self.terminated
    }
}

/// UTC days after `day_started_at` at which an unfinished day puts the streak at risk.
const AT_RISK_AFTER_DAYS: i64 = 2;
/// UTC days after `day_started_at` at which the payment window opens.
const PAYMENT_WINDOW_AFTER_DAYS: i64 = 3;
/// Streaks loaded per sweep page.
const SWEEP_BATCH: i64 = 200;

/// Owns every write to streaks.
#[derive(Clone)]
pub struct StreakService {
    db: EngineDatabase,
    tiers: TierPolicy,
    config: StreakConfig,
}

impl StreakService {
    pub const fn new(db: EngineDatabase, tiers: TierPolicy, config: StreakConfig) -> Self {
        Self { db, tiers, config }
    }

    /// Record `user_id`'s check-in for the current day of the connection's
    /// streak, advancing the day once both participants checked in on the
    /// same UTC day.
    #[instrument(skip(self, activity), fields(op = "check_in"))]
    pub async fn check_in(
        &self,
        user_id: &str,
        connection_id: &str,
        activity: Option<&serde_json::Value>,
        now: i64,
    ) -> EngineResult<CheckInOutcome> {
        let event_data = activity.map(serde_json::Value::to_string);
        let event_data = event_data.as_deref();
        let outcome =
            with_busy_retry(move || self.check_in_once(user_id, connection_id, event_data, now))
                .await?;

        info!(
            user_id,
            streak_id = %outcome.streak.id,
            day = outcome.streak.current_day,
            advanced = outcome.day_advanced,
            "Check-in recorded"
        );
        Ok(outcome)
    }

    async fn check_in_once(
        &self,
        user_id: &str,
        connection_id: &str,
        event_data: Option<&str>,
        now: i64,
    ) -> EngineResult<CheckInOutcome> {
        let mut tx = self.db.pool().begin().await?;

        let connection = fetch_connection_for(&mut tx, connection_id, user_id).await?;
        let mut streak = fetch_streak_by_connection(&mut tx, &connection.id).await?;
        if !streak.state.accepts_check_in() {
            return Err(EngineError::InvalidState(format!(
                "cannot check in while the streak is {:?}",
                streak.state
            )));
        }

        let day = streak.current_day;
        let today = utc_day(now);
        let answered = respond_to_nudges(&mut tx, &streak.id, user_id, day, now).await?;
        let check_in_type = if answered > 0 {
            CheckInType::NudgeResponse
        } else {
            CheckInType::Manual
        };

        let check_in = insert_check_in(
            &mut tx,
            &NewCheckIn {
                streak_id: &streak.id,
                user_id,
                day_number: day,
                utc_day: today,
                check_in_type,
                event_data,
            },
            now,
        )
        .await
        .map_err(|e| match e {
            DatabaseError::Conflict(_) => {
                EngineError::Conflict("already checked in today".to_string())
            }
            other => other.into(),
        })?;

        let partner = partner_of(&connection, user_id)?;
        let partner_done = has_check_in(&mut tx, &streak.id, partner, day, today).await?;
        if partner_done {
            streak.advance(now)?;
            streak = save_streak(&mut tx, &streak).await?;
        }

        tx.commit().await?;

        Ok(CheckInOutcome {
            check_in,
            streak,
            day_advanced: partner_done,
        })
    }

    /// Streak of a connection with today's check-in flags and history.
    pub async fn get_streak(
        &self,
        user_id: &str,
        connection_id: &str,
        now: i64,
    ) -> EngineResult<StreakDetail> {
        let mut conn = self.db.pool().acquire().await?;
        let connection = fetch_connection_for(&mut conn, connection_id, user_id).await?;
        let streak = fetch_streak_by_connection(&mut conn, &connection.id).await?;
        let partner = partner_of(&connection, user_id)?;

        let today = utc_day(now);
        let user_checked_in_today =
            has_check_in(&mut conn, &streak.id, user_id, streak.current_day, today).await?;
        let partner_checked_in_today =
            has_check_in(&mut conn, &streak.id, partner, streak.current_day, today).await?;
        let check_ins = check_ins_of(&mut conn, &streak.id).await?;

        Ok(StreakDetail {
            streak,
            user_checked_in_today,
            partner_checked_in_today,
            check_ins,
        })
    }

    /// Every running streak of the user's active connections with today's status.
    pub async fn today(&self, user_id: &str, now: i64) -> EngineResult<TodayOverview> {
        let mut conn = self.db.pool().acquire().await?;
        let today = utc_day(now);

        let mut streaks = Vec::new();
        for connection in active_connections_of(&mut conn, user_id).await? {
            let streak = fetch_streak_by_connection(&mut conn, &connection.id).await?;
            if !streak.state.accepts_check_in() {
                continue;
            }
            let partner_id = partner_of(&connection, user_id)?;
            let mine =
                has_check_in(&mut conn, &streak.id, user_id, streak.current_day, today).await?;
            let theirs =
                has_check_in(&mut conn, &streak.id, partner_id, streak.current_day, today).await?;
            let partner = fetch_profile(&mut conn, partner_id).await?;

            streaks.push(TodayStreak {
                connection_id: connection.id,
                streak_id: streak.id,
                partner,
                current_day: streak.current_day,
                state: streak.state,
                needs_check_in: !mine,
                partner_checked_in: theirs,
            });
        }

        let pending_count = streaks.iter().filter(|s| s.needs_check_in).count();
        Ok(TodayOverview {
            completed_count: streaks.len() - pending_count,
            pending_count,
            streaks,
        })
    }

    /// What recovering this streak would take.
    pub async fn recovery_options(
        &self,
        user_id: &str,
        streak_id: &str,
        now: i64,
    ) -> EngineResult<RecoveryOptions> {
        let mut conn = self.db.pool().acquire().await?;
        let streak = fetch_streak(&mut conn, streak_id).await?;
        fetch_connection_for(&mut conn, &streak.connection_id, user_id).await?;
        let user = fetch_user(&mut conn, user_id).await?;

        let within_deadline = streak.recovery_deadline_at.is_none_or(|d| now <= d);
        Ok(RecoveryOptions {
            streak_id: streak.id,
            state: streak.state,
            current_day: streak.current_day,
            can_recover: streak.state.is_recoverable() && within_deadline,
            recovery_deadline_at: streak.recovery_deadline_at,
            credit_cost: self.config.recovery_cost(streak.current_day),
            credit_balance: user.credit_balance,
            free_recovery_available: self
                .tiers
                .has_free_recovery(user.tier(), user.free_recoveries_used),
        })
    }

    /// Bring a broken streak back to `active`, keeping its day.
    ///
    /// With `pay_with_credits` the recovery cost is deducted; otherwise one of
    /// the tier's free recoveries is used.
    #[instrument(skip(self), fields(op = "recover_streak"))]
    pub async fn recover(
        &self,
        user_id: &str,
        streak_id: &str,
        pay_with_credits: bool,
        now: i64,
    ) -> EngineResult<RecoverOutcome> {
        let outcome = with_busy_retry(move || {
            self.recover_once(user_id, streak_id, pay_with_credits, now)
        })
        .await?;

        info!(
            user_id,
            streak_id,
            credits_spent = outcome.credits_spent,
            free = outcome.used_free_recovery,
            "Streak recovered"
        );
        Ok(outcome)
    }

    async fn recover_once(
        &self,
        user_id: &str,
        streak_id: &str,
        pay_with_credits: bool,
        now: i64,
    ) -> EngineResult<RecoverOutcome> {
        let mut tx = self.db.pool().begin().await?;

        let mut streak = fetch_streak(&mut tx, streak_id).await?;
        fetch_connection_for(&mut tx, &streak.connection_id, user_id).await?;
        streak.recover(None, now)?;

        let (credits_spent, credit_balance) = if pay_with_credits {
            let cost = self.config.recovery_cost(streak.current_day);
            let txn = credits::deduct_credits(
                &mut tx,
                user_id,
                cost,
                LedgerEntry {
                    transaction_type: TransactionType::StreakRecovery,
                    reference_id: Some(streak_id),
                    description: "streak recovery",
                },
                now,
            )
            .await?;
            streak.recovery_payment_id = Some(txn.id);
            (cost, txn.balance_after)
        } else {
            let user = fetch_user(&mut tx, user_id).await?;
            if !self
                .tiers
                .has_free_recovery(user.tier(), user.free_recoveries_used)
            {
                return Err(EngineError::InvalidState(
                    "no free recoveries left, pay with credits".to_string(),
                ));
            }
            increment_free_recoveries_used(&mut tx, user_id, now).await?;
            (0, user.credit_balance)
        };

        let streak = save_streak(&mut tx, &streak).await?;
        tx.commit().await?;

        Ok(RecoverOutcome {
            streak,
            credits_spent,
            used_free_recovery: !pay_with_credits,
            credit_balance,
        })
    }

    /// Apply time-based decay to every running streak.
    ///
    /// Each streak is handled in its own transaction; a failure is logged and
    /// counted without stopping the sweep.
    #[instrument(skip(self), fields(op = "sweep"))]
    pub async fn sweep(&self, now: i64) -> EngineResult<SweepReport> {
        let mut report = SweepReport::default();
        let mut after = 0;
        loop {
            let page = self.db.page_running_streaks(after, SWEEP_BATCH).await?;
            let Some(&(last, _)) = page.last() else {
                break;
            };
            after = last;

            for (_, id) in &page {
                let id = id.as_str();
                match with_busy_retry(move || self.decay_once(id, now)).await {
                    Ok(applied) => {
                        report.at_risk += applied.at_risk;
                        report.payment_window += applied.payment_window;
                        report.terminated += applied.terminated;
                    }
                    Err(e) => {
                        warn!(streak_id = id, error = %e, "Streak decay failed");
                        report.failed += 1;
                    }
                }
            }
        }

        if report.total() > 0 {
            info!(
                at_risk = report.at_risk,
                payment_window = report.payment_window,
                terminated = report.terminated,
                "Streak sweep applied transitions"
            );
        }
        Ok(report)
    }

    async fn decay_once(&self, streak_id: &str, now: i64) -> EngineResult<SweepReport> {
        let mut tx = self.db.pool().begin().await?;
        let mut streak = fetch_streak(&mut tx, streak_id).await?;
        let mut applied = SweepReport::default();
        let elapsed = utc_day(now) - utc_day(streak.day_started_at);

        if streak.state == StreakState::Active && elapsed >= AT_RISK_AFTER_DAYS {
            streak.mark_at_risk(now)?;
            applied.at_risk += 1;
        }
        if streak.state == StreakState::AtRisk && elapsed >= PAYMENT_WINDOW_AFTER_DAYS {
            let connection = fetch_connection(&mut tx, &streak.connection_id).await?;
            let breaker = find_breaker(&mut tx, &streak, &connection).await?;
            streak.open_payment_window(&breaker, now + self.config.recovery_window_secs, now)?;
            applied.payment_window += 1;
        }
        if streak.state == StreakState::PaymentWindow
            && streak.recovery_deadline_at.is_some_and(|d| now > d)
        {
            streak.expire(now)?;
            applied.terminated += 1;
        }

        if applied.total() > 0 {
            save_streak(&mut tx, &streak).await?;
            tx.commit().await?;
        }
        Ok(applied)
    }

    /// Admin: discard progress and restart at day 1.
    #[instrument(skip(self), fields(op = "admin_reset_streak"))]
    pub async fn admin_reset(&self, streak_id: &str, now: i64) -> EngineResult<Streak> {
        let streak = with_busy_retry(move || {
            self.apply_admin(streak_id, now, move |s: &mut Streak| s.reset(now))
        })
        .await?;
        info!(streak_id, reset_count = streak.reset_count, "Streak reset by admin");
        Ok(streak)
    }

    /// Admin: move the streak to `day`, clamped to [1, 15].
    #[instrument(skip(self), fields(op = "admin_adjust_streak"))]
    pub async fn admin_adjust(&self, streak_id: &str, day: i64, now: i64) -> EngineResult<Streak> {
        let streak = with_busy_retry(move || {
            self.apply_admin(streak_id, now, move |s: &mut Streak| s.adjust(day, now))
        })
        .await?;
        info!(streak_id, day = streak.current_day, "Streak adjusted by admin");
        Ok(streak)
    }

    async fn apply_admin<F>(&self, streak_id: &str, now: i64, transition: F) -> EngineResult<Streak>
    where
        F: FnOnce(&mut Streak) -> Result<(), TransitionError>,
    {
        let mut tx = self.db.pool().begin().await?;
        let mut streak = fetch_streak(&mut tx, streak_id).await?;
        transition(&mut streak)?;
        streak.updated_at = now;
        let streak = save_streak(&mut tx, &streak).await?;
        tx.commit().await?;
        Ok(streak)
    }
}

fn partner_of<'a>(connection: &'a Connection, user_id: &str) -> EngineResult<&'a str> {
    connection
        .partner_of(user_id)
        .ok_or_else(|| EngineError::NotFound(format!("Connection {}", connection.id)))
}

/// The participant (A before B) who did not check in for the current day on
/// the latest UTC day anyone did; user A when nobody checked in.
async fn find_breaker(
    conn: &mut SqliteConnection,
    streak: &Streak,
    connection: &Connection,
) -> EngineResult<String> {
    let Some(day) = latest_check_in_day(conn, &streak.id, streak.current_day).await? else {
        return Ok(connection.user_a_id.clone());
    };

    for user_id in [&connection.user_a_id, &connection.user_b_id] {
        if !has_check_in(conn, &streak.id, user_id, streak.current_day, day).await? {
            return Ok(user_id.clone());
        }
    }
    Ok(connection.user_a_id.clone())
}
