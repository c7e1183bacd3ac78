use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::{header::USER_AGENT, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use chrono::SecondsFormat;
use serde_json::{json, Map, Value};
use std::time::Duration;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        session::{HeartbeatResponse, NewSession, SessionRecord, SessionResponse},
        user::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, UserResponse},
    },
    state::AppState,
    utils::{
        cookies::{
            append_set_cookie, build_auth_cookie, build_clear_cookie, session_id_from_headers,
            set_session_cookie, CookieOptions, AUTH_TOKEN_COOKIE_NAME, COOKIE_PATH,
            LEGACY_SESSION_COOKIE_NAME, SESSION_COOKIE_NAME,
        },
        jwt::{create_access_token, refresh_token_for, session_id_from_refresh_token},
        password::verify_password,
        time::short_id,
    },
};

const INVALID_CREDENTIALS: &str = "Invalid username or password";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

/// Freshly minted token pair for a session.
struct IssuedTokens {
    token: String,
    refresh_token: String,
    expires_at: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(payload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    payload.validate()?;

    let user = state
        .users
        .find_by_username(&payload.username)
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;
    ensure_password_matches(&payload.password, &user.password_hash)?;

    let created = state
        .sessions
        .create_session(NewSession {
            user_id: user.id.clone(),
            user_email: user.email.clone(),
            user_role: user.role.as_str().to_string(),
            permissions: user.permissions(),
            client_ip: extract_ip(&headers),
            user_agent: extract_user_agent(&headers),
        })
        .await?;
    let session = state
        .sessions
        .get_session(&created.session_id)
        .await
        .ok_or_else(|| anyhow::anyhow!("Session vanished right after creation"))?;

    let issued = issue_tokens(&state, &session)?;
    tracing::info!(
        user_id = %session.user_id,
        session_id = %short_id(&session.session_id),
        "User logged in"
    );

    let body = LoginResponse {
        token: issued.token.clone(),
        refresh_token: issued.refresh_token,
        expires_at: issued.expires_at,
        user: user_response(&session),
        permissions: session.permissions.iter().cloned().collect(),
    };
    let response = set_session_cookie(Json(body).into_response(), &session.session_id)?;
    with_auth_cookie(&state, response, &issued.token)
}

pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(payload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let refresh_token = payload
        .refresh_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Refresh token is required".into()))?;

    let session_id = session_id_from_refresh_token(refresh_token.trim())
        .ok_or_else(|| AppError::Unauthorized(INVALID_REFRESH_TOKEN.into()))?;
    let session = state
        .sessions
        .get_session(session_id)
        .await
        .ok_or_else(|| AppError::Unauthorized(INVALID_REFRESH_TOKEN.into()))?;

    let issued = issue_tokens(&state, &session)?;
    state
        .sessions
        .update_session_metadata(
            &session.session_id,
            metadata_patch("lastTokenRefresh", &state),
        )
        .await;
    tracing::debug!(
        session_id = %short_id(&session.session_id),
        "Access token refreshed"
    );

    let body = RefreshResponse {
        token: issued.token.clone(),
        refresh_token: issued.refresh_token,
        expires_at: issued.expires_at,
        user: user_response(&session),
    };
    with_auth_cookie(&state, Json(body).into_response(), &issued.token)
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    if let Some(session_id) = session_id_from_headers(&headers) {
        state.sessions.destroy_session(&session_id).await;
        tracing::info!(session_id = %short_id(&session_id), "User logged out");
    }

    let mut response = Json(json!({ "message": "Logged out" })).into_response();
    let plain = CookieOptions { secure: false };
    append_set_cookie(
        &mut response,
        &build_clear_cookie(SESSION_COOKIE_NAME, COOKIE_PATH, plain),
    )?;
    append_set_cookie(
        &mut response,
        &build_clear_cookie(LEGACY_SESSION_COOKIE_NAME, COOKIE_PATH, plain),
    )?;
    append_set_cookie(
        &mut response,
        &build_clear_cookie(AUTH_TOKEN_COOKIE_NAME, COOKIE_PATH, state.auth_cookie_options()),
    )?;
    Ok(response)
}

pub async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<HeartbeatResponse>, AppError> {
    let session_id = session_id_from_headers(&headers)
        .ok_or_else(|| AppError::BadRequest("Session cookie missing".into()))?;
    if state.sessions.get_session(&session_id).await.is_none() {
        return Err(AppError::Unauthorized("Session not found".into()));
    }

    state
        .sessions
        .update_session_metadata(&session_id, metadata_patch("lastHeartbeat", &state))
        .await;
    let session = state
        .sessions
        .get_session(&session_id)
        .await
        .ok_or_else(|| AppError::Unauthorized("Session not found".into()))?;

    Ok(Json(HeartbeatResponse {
        success: true,
        session_active: true,
        expires_at: session.expires_at,
        last_activity: session.last_activity,
    }))
}

pub async fn current_session(
    Extension(session): Extension<SessionRecord>,
) -> Json<SessionResponse> {
    Json(SessionResponse::from(session))
}

pub async fn extend_session(
    State(state): State<AppState>,
    Extension(session): Extension<SessionRecord>,
) -> Result<Json<Value>, AppError> {
    let expires_at = state
        .sessions
        .extend_session(&session.session_id)
        .await
        .ok_or_else(|| AppError::Unauthorized("Session not found".into()))?;
    tracing::info!(
        session_id = %short_id(&session.session_id),
        %expires_at,
        "Session extended"
    );
    Ok(Json(json!({ "sessionId": session.session_id, "expiresAt": expires_at })))
}

pub fn ensure_password_matches(candidate: &str, expected_hash: &str) -> Result<(), AppError> {
    let matches = verify_password(candidate, expected_hash)?;
    if matches {
        Ok(())
    } else {
        Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()))
    }
}

fn issue_tokens(state: &AppState, session: &SessionRecord) -> Result<IssuedTokens, AppError> {
    let (token, claims) = create_access_token(
        session,
        &state.config.jwt_secret,
        state.clock.now(),
        state.config.access_token_ttl(),
    )?;
    Ok(IssuedTokens {
        token,
        refresh_token: refresh_token_for(&session.session_id),
        expires_at: claims
            .expires_at()
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

fn with_auth_cookie(state: &AppState, mut response: Response, token: &str) -> Result<Response, AppError> {
    let max_age = Duration::from_secs(state.config.access_token_ttl().num_seconds().max(0) as u64);
    let cookie = build_auth_cookie(
        AUTH_TOKEN_COOKIE_NAME,
        token,
        max_age,
        COOKIE_PATH,
        state.auth_cookie_options(),
    );
    append_set_cookie(&mut response, &cookie)?;
    Ok(response)
}

fn metadata_patch(key: &str, state: &AppState) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert(
        key.to_string(),
        Value::String(state.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    patch
}

fn user_response(session: &SessionRecord) -> UserResponse {
    UserResponse {
        id: session.user_id.clone(),
        email: session.user_email.clone(),
        role: session.user_role.clone(),
    }
}

fn extract_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        return value
            .split(',')
            .next()
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|agent| agent.trim().to_string())
        .filter(|agent| !agent.is_empty())
}
