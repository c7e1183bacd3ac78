use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{
    error::AppError,
    models::session::SessionRecord,
    state::AppState,
    utils::{
        cookies::{extract_cookie_value, AUTH_TOKEN_COOKIE_NAME},
        jwt::{verify_access_token, Claims},
    },
};

/// Requires a valid bearer token whose session is still registered.
/// Inserts [`Claims`] and [`SessionRecord`] as request extensions.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (claims, session) = authenticate_request(request.headers(), &state).await?;
    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

pub fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(rest.trim()).filter(|token| !token.is_empty())
    } else {
        None
    }
}

async fn authenticate_request(
    headers: &HeaderMap,
    state: &AppState,
) -> Result<(Claims, SessionRecord), AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .map(str::to_string)
        .or_else(|| {
            headers
                .get(header::COOKIE)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| extract_cookie_value(raw, AUTH_TOKEN_COOKIE_NAME))
        })
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    let claims = verify_access_token(&token, &state.config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    let session = state
        .sessions
        .get_session(&claims.sid)
        .await
        .ok_or_else(|| AppError::Unauthorized("Session not found".into()))?;

    Ok((claims, session))
}
