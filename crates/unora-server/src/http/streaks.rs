//! Streak, recovery and nudge routes.

use axum::extract::{Path, State};
use serde::Deserialize;
use unora_core::db::unix_timestamp;

use super::AppState;
use super::error::{ApiResult, ok};
use super::extract::{AuthUser, OptionalJson};
use crate::storage::Nudge;
use crate::streak::{CheckInOutcome, RecoverOutcome, RecoveryOptions, StreakDetail, TodayOverview};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    /// Free-form description of what the user did, stored with the check-in.
    pub activity: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NudgeRequest {
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverRequest {
    #[serde(default)]
    pub pay_with_credits: bool,
}

/// `GET /connections/{id}/streak`
pub async fn get_streak(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(connection_id): Path<String>,
) -> ApiResult<StreakDetail> {
    ok(state
        .streaks
        .get_streak(&user_id, &connection_id, unix_timestamp())
        .await?)
}

/// `POST /connections/{id}/streak/check-in`
pub async fn check_in(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(connection_id): Path<String>,
    OptionalJson(req): OptionalJson<CheckInRequest>,
) -> ApiResult<CheckInOutcome> {
    ok(state
        .streaks
        .check_in(
            &user_id,
            &connection_id,
            req.activity.as_ref(),
            unix_timestamp(),
        )
        .await?)
}

/// `GET /streaks/today`
pub async fn today(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<TodayOverview> {
    ok(state.streaks.today(&user_id, unix_timestamp()).await?)
}

/// `GET /streaks/{id}/recovery-options`
pub async fn recovery_options(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(streak_id): Path<String>,
) -> ApiResult<RecoveryOptions> {
    ok(state
        .streaks
        .recovery_options(&user_id, &streak_id, unix_timestamp())
        .await?)
}

/// `POST /streaks/{id}/recover`
pub async fn recover(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(streak_id): Path<String>,
    OptionalJson(req): OptionalJson<RecoverRequest>,
) -> ApiResult<RecoverOutcome> {
    ok(state
        .streaks
        .recover(&user_id, &streak_id, req.pay_with_credits, unix_timestamp())
        .await?)
}

/// `POST /connections/{id}/nudge`
pub async fn send_nudge(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(connection_id): Path<String>,
    OptionalJson(req): OptionalJson<NudgeRequest>,
) -> ApiResult<Nudge> {
    ok(state
        .nudges
        .send(&user_id, &connection_id, req.message.as_deref(), unix_timestamp())
        .await?)
}

/// `GET /nudges/received`
pub async fn received_nudges(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<Nudge>> {
    ok(state.nudges.list_received(&user_id).await?)
}

/// `POST /nudges/{id}/seen`
pub async fn nudge_seen(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(nudge_id): Path<String>,
) -> ApiResult<Nudge> {
    ok(state
        .nudges
        .mark_seen(&user_id, &nudge_id, unix_timestamp())
        .await?)
}
