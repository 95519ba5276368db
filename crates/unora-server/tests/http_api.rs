#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use unora_core::{Config, Tier};
use unora_server::auth::JwtManager;
use unora_server::http::{ADMIN_KEY_HEADER, AppState, build_router};
use unora_server::reveal::TemplateContentGenerator;
use unora_server::storage::queries_users::NewUser;
use unora_server::storage::{EngineDatabase, ServerType};

const SECRET: &[u8] = b"integration-test-secret";
const ADMIN_KEY: &str = "let-me-in";

struct TestApp {
    db: EngineDatabase,
    router: axum::Router,
    jwt: JwtManager,
}

impl TestApp {
    async fn new(admin_key: Option<&str>) -> Self {
        let db = EngineDatabase::open_in_memory().await.unwrap();
        for id in ["alice", "bob"] {
            db.create_user(&NewUser {
                id,
                display_name: id,
                tier: Tier::Plus,
                credit_balance: 200,
                ..NewUser::default()
            })
            .await
            .unwrap();
        }

        let jwt = JwtManager::new(SECRET, 3600);
        let state = AppState::new(
            &db,
            &Config::default(),
            Arc::new(TemplateContentGenerator),
            jwt.clone(),
            admin_key.map(str::to_string),
        );
        Self {
            db,
            router: build_router(state),
            jwt,
        }
    }

    fn token(&self, user_id: &str) -> String {
        self.jwt.issue_access_token(user_id).unwrap().0
    }

    /// Send a request and return (status, parsed JSON body).
    async fn send(
        &self,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for &(name, value) in headers {
            builder = builder.header(name, value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn as_user(
        &self,
        user_id: &str,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let auth = format!("Bearer {}", self.token(user_id));
        self.send(method, uri, &[("authorization", auth.as_str())], body)
            .await
    }

    /// Connect alice and bob through the interest endpoints; returns the connection ID.
    async fn connect(&self) -> String {
        let to_bob = self
            .db
            .create_discovery_card("alice", "bob", ServerType::Partner)
            .await
            .unwrap();
        let to_alice = self
            .db
            .create_discovery_card("bob", "alice", ServerType::Partner)
            .await
            .unwrap();

        let (status, body) = self
            .as_user(
                "alice",
                "POST",
                "/interests",
                Some(json!({ "discoveryCardId": to_bob.id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["matched"], false);

        let (status, body) = self
            .as_user(
                "bob",
                "POST",
                "/interests",
                Some(json!({ "discoveryCardId": to_alice.id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["matched"], true);
        body["data"]["connection"]["id"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

#[tokio::test]
async fn health_reports_version() {
    let app = TestApp::new(None).await;
    let (status, body) = app.send("GET", "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = TestApp::new(None).await;
    let (status, body) = app.send("GET", "/connections", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn token_signed_with_other_secret_is_rejected() {
    let app = TestApp::new(None).await;
    let foreign = JwtManager::new(b"some-other-secret", 3600)
        .issue_access_token("alice")
        .unwrap()
        .0;
    let auth = format!("Bearer {foreign}");
    let (status, _) = app
        .send("GET", "/connections", &[("authorization", auth.as_str())], None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn mutual_interest_creates_connection_visible_to_both() {
    let app = TestApp::new(None).await;
    let connection_id = app.connect().await;

    for user in ["alice", "bob"] {
        let (status, body) = app.as_user(user, "GET", "/connections", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let list = body["data"].as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["connection"]["id"], connection_id.as_str());
        assert_eq!(list[0]["streak"]["currentDay"], 1);
    }

    let (status, body) = app.as_user("alice", "GET", "/interests/sent", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["status"], "matched");
    assert_eq!(body["data"][0]["counterpartName"], "bob");

    let (status, body) = app.as_user("bob", "GET", "/interests/received", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = TestApp::new(None).await;
    let (status, body) = app
        .as_user("alice", "POST", "/interests", Some(json!({ "card": 1 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn check_in_accepts_empty_body_and_rejects_second_attempt() {
    let app = TestApp::new(None).await;
    let connection_id = app.connect().await;
    let uri = format!("/connections/{connection_id}/streak/check-in");

    let (status, body) = app.as_user("alice", "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["dayAdvanced"], false);

    let (status, body) = app.as_user("alice", "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, body) = app
        .as_user(
            "bob",
            "POST",
            &uri,
            Some(json!({ "activity": { "kind": "call" } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["dayAdvanced"], true);
    assert_eq!(body["data"]["streak"]["currentDay"], 2);
}

#[tokio::test]
async fn outsiders_get_not_found() {
    let app = TestApp::new(None).await;
    let connection_id = app.connect().await;
    app.db
        .create_user(&NewUser {
            id: "mallory",
            display_name: "mallory",
            ..NewUser::default()
        })
        .await
        .unwrap();

    let (status, _) = app
        .as_user(
            "mallory",
            "GET",
            &format!("/connections/{connection_id}/streak"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn early_reveal_needs_credits_flag_then_charges() {
    let app = TestApp::new(None).await;
    let connection_id = app.connect().await;
    let uri = format!("/connections/{connection_id}/reveals/milestone-personality/unlock");

    let (status, body) = app.as_user("alice", "POST", &uri, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_STATE");

    let (status, body) = app
        .as_user("alice", "POST", &uri, Some(json!({ "useCredits": true })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["creditsUsed"], 50);
    assert_eq!(body["data"]["remainingCredits"], 150);

    let (status, body) = app.as_user("alice", "GET", "/credits", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balance"], 150);
}

#[tokio::test]
async fn admin_routes_need_matching_key() {
    let app = TestApp::new(Some(ADMIN_KEY)).await;

    let (status, _) = app.send("POST", "/admin/streaks/sweep", &[], None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            "POST",
            "/admin/streaks/sweep",
            &[(ADMIN_KEY_HEADER, "wrong-key")],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            "POST",
            "/admin/streaks/sweep",
            &[(ADMIN_KEY_HEADER, ADMIN_KEY)],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn admin_credit_adjustment_updates_balance() {
    let app = TestApp::new(Some(ADMIN_KEY)).await;

    let (status, body) = app
        .send(
            "POST",
            "/admin/users/bob/credits",
            &[(ADMIN_KEY_HEADER, ADMIN_KEY)],
            Some(json!({ "amount": -30, "description": "chargeback" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["amount"], -30);

    let (_, body) = app.as_user("bob", "GET", "/credits", None).await;
    assert_eq!(body["data"]["balance"], 170);
}

#[tokio::test]
async fn admin_routes_are_disabled_without_key() {
    let app = TestApp::new(None).await;
    let (status, body) = app
        .send(
            "POST",
            "/admin/streaks/sweep",
            &[(ADMIN_KEY_HEADER, "anything")],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn admin_adjust_then_reset_restarts_the_streak() {
    let app = TestApp::new(Some(ADMIN_KEY)).await;
    app.connect().await;
    let (_, body) = app.as_user("alice", "GET", "/connections", None).await;
    let streak_id = body["data"][0]["streak"]["id"].as_str().unwrap().to_string();
    let admin = [(ADMIN_KEY_HEADER, ADMIN_KEY)];

    let (status, body) = app
        .send(
            "POST",
            &format!("/admin/streaks/{streak_id}/adjust"),
            &admin,
            Some(json!({ "newDay": 7 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["currentDay"], 7);

    let (status, body) = app
        .send(
            "POST",
            &format!("/admin/streaks/{streak_id}/reset"),
            &admin,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["currentDay"], 1);
    assert_eq!(body["data"]["resetCount"], 1);
    assert_eq!(body["data"]["state"], "active");
}
