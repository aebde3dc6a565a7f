//! End-to-end tests against a running server backed by in-memory stores

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use authgate::auth::AuthService;
use authgate::configuration::{ApplicationSettings, JwtSettings, PasswordSettings};
use authgate::rate_limiter::RateLimiter;
use authgate::startup::run;
use authgate::store::{InMemoryAccountStore, InMemorySessionStore};
use serde_json::{json, Value};

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

impl TestApp {
    async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn post_with_token(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", self.address, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn register(&self, username: &str, email: &str, password: &str) -> reqwest::Response {
        self.post(
            "/api/auth/register",
            &json!({ "username": username, "email": email, "password": password }),
        )
        .await
    }

    async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.post(
            "/api/auth/login",
            &json!({ "username": username, "password": password }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> reqwest::Response {
        self.post("/api/auth/refresh", &json!({ "refresh_token": refresh_token }))
            .await
    }
}

fn test_settings() -> ApplicationSettings {
    ApplicationSettings {
        host: "127.0.0.1".to_string(),
        port: 0,
        version: "test".to_string(),
        request_timeout_milliseconds: 5000,
        store_timeout_milliseconds: 1000,
        sweep_interval_seconds: 3600,
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with_capacity(10_000).await
}

async fn spawn_app_with_capacity(capacity: u32) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let jwt = JwtSettings {
        secret: "integration-test-secret-at-least-32-chars".to_string(),
        issuer: "authgate-test".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 3600,
    };
    let password = PasswordSettings {
        hash_cost: 4,
        min_length: 3,
        require_mixed_case_and_digit: false,
    };
    let auth = AuthService::new(
        Arc::new(InMemoryAccountStore::new()),
        Arc::new(InMemorySessionStore::new()),
        &jwt,
        &password,
        Duration::from_secs(1),
    )
    .expect("Failed to build auth service");
    let limiter = Arc::new(RateLimiter::new(capacity, Duration::from_secs(3600)));

    let server = run(listener, auth, limiter, test_settings()).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        client: reqwest::Client::new(),
    }
}

async fn json_body(response: reqwest::Response) -> Value {
    response.json().await.expect("Failed to parse response")
}

// --- Registration Tests ---

#[tokio::test]
async fn register_returns_201_with_tokens_and_account() {
    let app = spawn_app().await;

    let response = app.register("alice", "alice@x.com", "pw1").await;
    assert_eq!(201, response.status().as_u16());

    let body = json_body(response).await;
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["email"], "alice@x.com");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn register_returns_400_for_invalid_input() {
    let app = spawn_app().await;

    let cases = [
        ("alice", "notanemail"),
        ("alice", "user@"),
        ("al", "alice@x.com"),
        ("alice smith", "alice@x.com"),
    ];

    for (username, email) in cases {
        let response = app.register(username, email, "pw1").await;
        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject {:?} / {:?}",
            username,
            email
        );
        assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn register_returns_400_for_taken_username_or_email() {
    let app = spawn_app().await;
    assert_eq!(201, app.register("alice", "alice@x.com", "pw1").await.status().as_u16());

    let response = app.register("alice", "other@x.com", "pw1").await;
    assert_eq!(400, response.status().as_u16());
    assert_eq!(json_body(response).await["code"], "USERNAME_TAKEN");

    let response = app.register("alice2", "alice@x.com", "pw1").await;
    assert_eq!(400, response.status().as_u16());
    assert_eq!(json_body(response).await["code"], "EMAIL_TAKEN");
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(&format!("{}/api/auth/register", app.address))
        .header("Content-Type", "application/json")
        .body("{\"username\": \"alice\"")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(400, response.status().as_u16());
    assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");
}

// --- Login Tests ---

#[tokio::test]
async fn login_failures_do_not_reveal_which_part_was_wrong() {
    let app = spawn_app().await;
    app.register("alice", "alice@x.com", "pw1").await;

    let unknown = app.login("mallory", "pw1").await;
    assert_eq!(401, unknown.status().as_u16());
    let unknown = json_body(unknown).await;

    let wrong = app.login("alice", "wrong").await;
    assert_eq!(401, wrong.status().as_u16());
    let wrong = json_body(wrong).await;

    assert_eq!(unknown["code"], "INVALID_CREDENTIALS");
    assert_eq!(unknown["code"], wrong["code"]);
    assert_eq!(unknown["message"], wrong["message"]);
}

// --- Token Lifecycle Tests ---

#[tokio::test]
async fn register_login_refresh_logout_all_scenario() {
    let app = spawn_app().await;
    assert_eq!(201, app.register("alice", "alice@x.com", "pw1").await.status().as_u16());

    let login = app.login("alice", "pw1").await;
    assert_eq!(200, login.status().as_u16());
    let pair_a = json_body(login).await;
    let refresh_a = pair_a["refresh_token"].as_str().unwrap().to_string();

    let refreshed = app.refresh(&refresh_a).await;
    assert_eq!(200, refreshed.status().as_u16());
    let pair_b = json_body(refreshed).await;
    let refresh_b = pair_b["refresh_token"].as_str().unwrap().to_string();
    let access_b = pair_b["access_token"].as_str().unwrap().to_string();
    assert_ne!(refresh_a, refresh_b);

    let reused = app.refresh(&refresh_a).await;
    assert_eq!(401, reused.status().as_u16());
    assert_eq!(json_body(reused).await["code"], "TOKEN_REVOKED");

    let logout_all = app
        .post_with_token("/api/auth/logout-all", &access_b, &json!({}))
        .await;
    assert_eq!(200, logout_all.status().as_u16());
    assert_eq!(json_body(logout_all).await["revoked_sessions"], 2);

    let after = app.refresh(&refresh_b).await;
    assert_eq!(401, after.status().as_u16());
    assert_eq!(json_body(after).await["code"], "TOKEN_REVOKED");
}

#[tokio::test]
async fn logout_revokes_only_the_presented_token() {
    let app = spawn_app().await;
    app.register("alice", "alice@x.com", "pw1").await;
    let phone = json_body(app.login("alice", "pw1").await).await;
    let laptop = json_body(app.login("alice", "pw1").await).await;

    let response = app
        .post(
            "/api/auth/logout",
            &json!({ "refresh_token": phone["refresh_token"] }),
        )
        .await;
    assert_eq!(200, response.status().as_u16());

    let phone_refresh = app.refresh(phone["refresh_token"].as_str().unwrap()).await;
    assert_eq!(401, phone_refresh.status().as_u16());

    let laptop_refresh = app.refresh(laptop["refresh_token"].as_str().unwrap()).await;
    assert_eq!(200, laptop_refresh.status().as_u16());
}

#[tokio::test]
async fn refresh_rejects_garbage_tokens() {
    let app = spawn_app().await;

    let response = app.refresh("not-a-token").await;
    assert_eq!(401, response.status().as_u16());
    assert_eq!(json_body(response).await["code"], "TOKEN_INVALID");
}

// --- Protected Route Tests ---

#[tokio::test]
async fn userinfo_requires_bearer_token() {
    let app = spawn_app().await;
    let session = json_body(app.register("alice", "alice@x.com", "pw1").await).await;
    let access = session["access_token"].as_str().unwrap();

    let anonymous = app
        .client
        .get(&format!("{}/api/auth/userinfo", app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, anonymous.status().as_u16());
    assert_eq!(json_body(anonymous).await["code"], "UNAUTHORIZED");

    let garbage = app
        .client
        .get(&format!("{}/api/auth/userinfo", app.address))
        .bearer_auth("not-a-token")
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, garbage.status().as_u16());
    assert_eq!(json_body(garbage).await["code"], "TOKEN_MALFORMED");

    let response = app
        .client
        .get(&format!("{}/api/auth/userinfo", app.address))
        .bearer_auth(access)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let info = json_body(response).await;
    assert_eq!(info["username"], "alice");
    assert_eq!(info["id"], session["user"]["id"]);
}

#[tokio::test]
async fn refresh_token_is_not_a_bearer_credential() {
    let app = spawn_app().await;
    let session = json_body(app.register("alice", "alice@x.com", "pw1").await).await;
    let access = session["access_token"].as_str().unwrap();
    let refresh = session["refresh_token"].as_str().unwrap();

    let userinfo = app
        .client
        .get(&format!("{}/api/auth/userinfo", app.address))
        .bearer_auth(refresh)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, userinfo.status().as_u16());
    assert_eq!(json_body(userinfo).await["code"], "TOKEN_INVALID");

    let logout_all = app
        .post_with_token("/api/auth/logout-all", access, &json!({}))
        .await;
    assert_eq!(200, logout_all.status().as_u16());
    assert_eq!(401, app.refresh(refresh).await.status().as_u16());

    // Revoked refresh token cannot drive protected routes either
    let change = app
        .post_with_token(
            "/api/auth/change-password",
            refresh,
            &json!({ "old_password": "pw1", "new_password": "pw2" }),
        )
        .await;
    assert_eq!(401, change.status().as_u16());
    assert_eq!(200, app.login("alice", "pw1").await.status().as_u16());
}

#[tokio::test]
async fn access_token_cannot_be_refreshed_or_logged_out() {
    let app = spawn_app().await;
    let session = json_body(app.register("alice", "alice@x.com", "pw1").await).await;
    let access = session["access_token"].as_str().unwrap();

    let refreshed = app.refresh(access).await;
    assert_eq!(401, refreshed.status().as_u16());
    assert_eq!(json_body(refreshed).await["code"], "TOKEN_INVALID");

    let logout = app
        .post("/api/auth/logout", &json!({ "refresh_token": access }))
        .await;
    assert_eq!(401, logout.status().as_u16());
}

#[tokio::test]
async fn change_password_revokes_sessions_and_swaps_credentials() {
    let app = spawn_app().await;
    let session = json_body(app.register("alice", "alice@x.com", "pw1").await).await;
    let access = session["access_token"].as_str().unwrap();
    let refresh = session["refresh_token"].as_str().unwrap();

    let wrong_old = app
        .post_with_token(
            "/api/auth/change-password",
            access,
            &json!({ "old_password": "nope", "new_password": "pw2" }),
        )
        .await;
    assert_eq!(400, wrong_old.status().as_u16());
    assert_eq!(json_body(wrong_old).await["code"], "INVALID_OLD_PASSWORD");

    let changed = app
        .post_with_token(
            "/api/auth/change-password",
            access,
            &json!({ "old_password": "pw1", "new_password": "pw2" }),
        )
        .await;
    assert_eq!(200, changed.status().as_u16());

    assert_eq!(401, app.refresh(refresh).await.status().as_u16());
    assert_eq!(401, app.login("alice", "pw1").await.status().as_u16());
    assert_eq!(200, app.login("alice", "pw2").await.status().as_u16());
}

#[tokio::test]
async fn admin_sweep_requires_admin_role() {
    let app = spawn_app().await;
    let session = json_body(app.register("alice", "alice@x.com", "pw1").await).await;
    let access = session["access_token"].as_str().unwrap();

    let response = app
        .post_with_token("/api/admin/sessions/sweep", access, &json!({}))
        .await;
    assert_eq!(403, response.status().as_u16());
    assert_eq!(json_body(response).await["code"], "FORBIDDEN");
}

// --- Pipeline Tests ---

#[tokio::test]
async fn requests_beyond_capacity_are_rate_limited() {
    let app = spawn_app_with_capacity(3).await;

    for _ in 0..3 {
        let response = app
            .client
            .get(&format!("{}/health_check", app.address))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(200, response.status().as_u16());
    }

    let response = app
        .client
        .get(&format!("{}/health_check", app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(429, response.status().as_u16());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    assert_eq!(json_body(response).await["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn preflight_is_answered_without_consuming_rate_limit() {
    let app = spawn_app_with_capacity(1).await;

    for _ in 0..3 {
        let response = app
            .client
            .request(
                reqwest::Method::OPTIONS,
                &format!("{}/api/auth/login", app.address),
            )
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(204, response.status().as_u16());
        assert_eq!(
            response
                .headers()
                .get("x-service-version")
                .and_then(|v| v.to_str().ok()),
            Some("test")
        );
    }

    let response = app
        .client
        .get(&format!("{}/health_check", app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
}
