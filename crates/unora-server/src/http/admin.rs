//! Operator routes, guarded by the admin key.

use axum::extract::{Path, State};
use serde::Deserialize;
use unora_core::db::unix_timestamp;

use super::AppState;
use super::error::{ApiResult, ok};
use super::extract::{AdminGuard, ApiJson};
use crate::matching::SeverReport;
use crate::storage::{CreditTransaction, Streak};
use crate::streak::SweepReport;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustCreditsRequest {
    pub amount: i64,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStreakRequest {
    pub new_day: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverPairRequest {
    pub user_a: String,
    pub user_b: String,
}

/// `POST /admin/users/{id}/credits`
pub async fn adjust_credits(
    _: AdminGuard,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<AdjustCreditsRequest>,
) -> ApiResult<CreditTransaction> {
    let description = req.description.as_deref().unwrap_or("admin adjustment");
    ok(state
        .credits
        .admin_adjust(&user_id, req.amount, description, unix_timestamp())
        .await?)
}

/// `POST /admin/streaks/{id}/reset`
pub async fn reset_streak(
    _: AdminGuard,
    State(state): State<AppState>,
    Path(streak_id): Path<String>,
) -> ApiResult<Streak> {
    ok(state
        .streaks
        .admin_reset(&streak_id, unix_timestamp())
        .await?)
}

/// `POST /admin/streaks/{id}/adjust`
pub async fn adjust_streak(
    _: AdminGuard,
    State(state): State<AppState>,
    Path(streak_id): Path<String>,
    ApiJson(req): ApiJson<AdjustStreakRequest>,
) -> ApiResult<Streak> {
    ok(state
        .streaks
        .admin_adjust(&streak_id, req.new_day, unix_timestamp())
        .await?)
}

/// `POST /admin/streaks/sweep`
pub async fn sweep(_: AdminGuard, State(state): State<AppState>) -> ApiResult<SweepReport> {
    ok(state.streaks.sweep(unix_timestamp()).await?)
}

/// `POST /admin/pairs/sever`
pub async fn sever_pair(
    _: AdminGuard,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SeverPairRequest>,
) -> ApiResult<SeverReport> {
    ok(state
        .matching
        .sever_pair(&req.user_a, &req.user_b, unix_timestamp())
        .await?)
}
