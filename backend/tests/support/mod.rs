#![allow(dead_code)]
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use backoffice_backend::{
    config::Config,
    models::user::{User, UserRole},
    router::build_router,
    services::{session_registry::InMemorySessionRegistry, user_directory::InMemoryUserDirectory},
    state::AppState,
    utils::{password::hash_password, time::ManualClock},
};
use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;

pub const TELLER_PASSWORD: &str = "teller-password";

pub fn test_config() -> Config {
    Config {
        jwt_secret: "integration-secret".to_string(),
        ..Config::default()
    }
}

fn teller_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(TELLER_PASSWORD).expect("hash password"))
}

pub fn teller() -> User {
    User {
        id: "user-teller".to_string(),
        username: "teller".to_string(),
        email: "teller@bank.test".to_string(),
        password_hash: teller_hash().to_string(),
        role: UserRole::Teller,
    }
}

pub fn test_state() -> (AppState, Arc<ManualClock>) {
    test_state_with(test_config())
}

pub fn test_state_with(config: Config) -> (AppState, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let sessions = Arc::new(InMemorySessionRegistry::new(
        clock.clone(),
        config.session_ttl(),
    ));
    let users = Arc::new(InMemoryUserDirectory::new().with_user(teller()));
    (AppState::new(config, sessions, users, clock.clone()), clock)
}

pub fn test_app() -> (Router, AppState, Arc<ManualClock>) {
    let (state, clock) = test_state();
    (build_router(state.clone()), state, clock)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("route request")
}

pub fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("build request")
}

pub fn post_empty(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("build request")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

pub fn find_cookie<'a>(cookies: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .find(|cookie| cookie.starts_with(&prefix))
        .map(String::as_str)
}

pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    find_cookie(cookies, name)
        .and_then(|cookie| cookie.split(';').next())
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.to_string())
}

/// Logs the seeded teller in and returns the response body plus the session id.
pub async fn login_teller(app: &Router) -> (Value, String) {
    let response = send(
        app,
        post_json(
            "/auth/login",
            serde_json::json!({ "username": "teller", "password": TELLER_PASSWORD }),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), 200);
    let cookies = set_cookies(&response);
    let session_id = cookie_value(&cookies, "sessionId").expect("session cookie");
    (body_json(response).await, session_id)
}
