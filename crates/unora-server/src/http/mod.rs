//! JSON HTTP surface of the engine.
//!
//! Every response uses the `{ success, data, error }` envelope from
//! [`error`]. Participant routes authenticate with a bearer access token;
//! `/admin` routes require the `x-admin-key` header.

pub mod admin;
pub mod error;
pub mod extract;
pub mod matching;
pub mod reveals;
pub mod streaks;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use unora_core::config::Config;

use crate::auth::JwtManager;
use crate::credits::CreditLedger;
use crate::matching::MatchingService;
use crate::reveal::{ContentGenerator, ContentWorker, RevealService};
use crate::storage::EngineDatabase;
use crate::streak::{NudgeService, StreakService};

pub use error::{ApiError, ApiResult, Envelope};
pub use extract::{ADMIN_KEY_HEADER, AdminGuard, AuthUser};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub matching: MatchingService,
    pub streaks: StreakService,
    pub nudges: NudgeService,
    pub reveals: RevealService,
    pub credits: CreditLedger,
    pub jwt: JwtManager,
    /// Admin routes are disabled when unset.
    pub admin_key: Option<Arc<str>>,
}

impl AppState {
    /// Wire every engine onto one database.
    pub fn new(
        db: &EngineDatabase,
        config: &Config,
        generator: Arc<dyn ContentGenerator>,
        jwt: JwtManager,
        admin_key: Option<String>,
    ) -> Self {
        let tiers = config.tier_policy();
        let worker = ContentWorker::new(
            db.clone(),
            generator,
            config.reveal.max_content_attempts,
        );
        Self {
            matching: MatchingService::new(db.clone(), tiers.clone()),
            streaks: StreakService::new(db.clone(), tiers.clone(), config.streak.clone()),
            nudges: NudgeService::new(db.clone(), tiers),
            reveals: RevealService::new(db.clone(), worker),
            credits: CreditLedger::new(db.clone()),
            jwt,
            admin_key: admin_key.filter(|k| !k.is_empty()).map(Arc::from),
        }
    }
}

/// Build the router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let admin_routes = Router::new()
        .route("/users/{id}/credits", post(admin::adjust_credits))
        .route("/streaks/sweep", post(admin::sweep))
        .route("/streaks/{id}/reset", post(admin::reset_streak))
        .route("/streaks/{id}/adjust", post(admin::adjust_streak))
        .route("/pairs/sever", post(admin::sever_pair));

    Router::new()
        .route("/health", get(health))
        .route("/interests", post(matching::express_interest))
        .route("/interests/sent", get(matching::sent_interests))
        .route("/interests/received", get(matching::received_interests))
        .route("/connections", get(matching::list_connections))
        .route(
            "/connections/{id}",
            get(matching::get_connection).delete(matching::terminate_connection),
        )
        .route("/connections/{id}/streak", get(streaks::get_streak))
        .route("/connections/{id}/streak/check-in", post(streaks::check_in))
        .route("/connections/{id}/nudge", post(streaks::send_nudge))
        .route("/connections/{id}/reveals", get(reveals::connection_reveals))
        .route(
            "/connections/{id}/reveals/{milestone_id}/unlock",
            post(reveals::unlock),
        )
        .route("/streaks/today", get(streaks::today))
        .route(
            "/streaks/{id}/recovery-options",
            get(streaks::recovery_options),
        )
        .route("/streaks/{id}/recover", post(streaks::recover))
        .route("/nudges/received", get(streaks::received_nudges))
        .route("/nudges/{id}/seen", post(streaks::nudge_seen))
        .route("/reveal-milestones", get(reveals::milestones))
        .route("/reveals/{id}/viewed", post(reveals::mark_viewed))
        .route("/credits", get(reveals::credits))
        .nest("/admin", admin_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /health`
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
