//! Interest and connection routes.

use axum::extract::{Path, State};
use serde::Deserialize;
use unora_core::db::unix_timestamp;

use super::AppState;
use super::error::{ApiResult, ok};
use super::extract::{ApiJson, AuthUser};
use crate::matching::{ConnectionSummary, ExpressOutcome};
use crate::storage::Connection;
use crate::storage::queries_interests::InterestWithProfile;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressInterestRequest {
    pub discovery_card_id: String,
}

/// `POST /interests`
pub async fn express_interest(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(req): ApiJson<ExpressInterestRequest>,
) -> ApiResult<ExpressOutcome> {
    let outcome = state
        .matching
        .express_interest(&user_id, &req.discovery_card_id, unix_timestamp())
        .await?;
    ok(outcome)
}

/// `GET /interests/sent`
pub async fn sent_interests(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<InterestWithProfile>> {
    ok(state.matching.list_sent(&user_id).await?)
}

/// `GET /interests/received`
pub async fn received_interests(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<InterestWithProfile>> {
    ok(state.matching.list_received(&user_id).await?)
}

/// `GET /connections`
pub async fn list_connections(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<ConnectionSummary>> {
    ok(state
        .matching
        .list_connections(&user_id, unix_timestamp())
        .await?)
}

/// `GET /connections/{id}`
pub async fn get_connection(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(connection_id): Path<String>,
) -> ApiResult<ConnectionSummary> {
    ok(state
        .matching
        .get_connection(&user_id, &connection_id, unix_timestamp())
        .await?)
}

/// `DELETE /connections/{id}`
pub async fn terminate_connection(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(connection_id): Path<String>,
) -> ApiResult<Connection> {
    ok(state
        .matching
        .terminate_connection(&user_id, &connection_id, unix_timestamp())
        .await?)
}
