//! Reveal and credit routes.

use axum::extract::{Path, State};
use serde::Deserialize;
use unora_core::db::unix_timestamp;

use super::AppState;
use super::error::{ApiResult, ok};
use super::extract::{AuthUser, OptionalJson};
use crate::credits::CreditSummary;
use crate::reveal::{ConnectionReveals, UnlockOutcome};
use crate::storage::{Reveal, RevealMilestone};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequest {
    #[serde(default)]
    pub use_credits: bool,
}

/// `GET /reveal-milestones`
pub async fn milestones(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> ApiResult<Vec<RevealMilestone>> {
    ok(state.reveals.list_milestones().await?)
}

/// `GET /connections/{id}/reveals`
pub async fn connection_reveals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(connection_id): Path<String>,
) -> ApiResult<ConnectionReveals> {
    ok(state
        .reveals
        .connection_reveals(&user_id, &connection_id)
        .await?)
}

/// `POST /connections/{id}/reveals/{milestone_id}/unlock`
pub async fn unlock(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((connection_id, milestone_id)): Path<(String, String)>,
    OptionalJson(req): OptionalJson<UnlockRequest>,
) -> ApiResult<UnlockOutcome> {
    ok(state
        .reveals
        .unlock(
            &user_id,
            &connection_id,
            &milestone_id,
            req.use_credits,
            unix_timestamp(),
        )
        .await?)
}

/// `POST /reveals/{id}/viewed`
pub async fn mark_viewed(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(reveal_id): Path<String>,
) -> ApiResult<Reveal> {
    ok(state
        .reveals
        .mark_viewed(&user_id, &reveal_id, unix_timestamp())
        .await?)
}

/// `GET /credits`
pub async fn credits(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<CreditSummary> {
    ok(state.credits.summary(&user_id).await?)
}
