use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header::CONTENT_LENGTH, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::utils::cookies::session_id_from_headers;

const MAX_BUFFERED_BODY_BYTES: usize = 16 * 1024;
const MAX_LOGGED_BODY_BYTES: usize = 512;

/// Logs every 4xx/5xx response together with the error body the client saw.
/// Session identifiers are never logged, only whether a cookie was sent.
pub async fn log_error_responses(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let has_session_cookie = session_id_from_headers(req.headers()).is_some();
    let start = Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }
    let latency_ms = start.elapsed().as_millis() as u64;

    let (mut parts, body) = response.into_parts();
    let (body, preview) = match to_bytes(body, MAX_BUFFERED_BODY_BYTES).await {
        Ok(bytes) => {
            let preview = body_preview(&bytes);
            (Body::from(bytes), preview)
        }
        Err(err) => {
            parts.headers.remove(CONTENT_LENGTH);
            tracing::warn!(error = ?err, %path, "Failed to buffer error response body");
            (Body::empty(), String::new())
        }
    };

    if status.is_server_error() {
        tracing::error!(
            status = status.as_u16(),
            %method,
            %path,
            latency_ms,
            has_session_cookie,
            body = %preview,
            "Request failed"
        );
    } else if status == StatusCode::UNAUTHORIZED {
        tracing::info!(
            status = status.as_u16(),
            %method,
            %path,
            latency_ms,
            has_session_cookie,
            body = %preview,
            "Request rejected as unauthenticated"
        );
    } else {
        tracing::warn!(
            status = status.as_u16(),
            %method,
            %path,
            latency_ms,
            has_session_cookie,
            body = %preview,
            "Request completed with client error"
        );
    }

    Response::from_parts(parts, body)
}

fn body_preview(bytes: &Bytes) -> String {
    if bytes.len() > MAX_LOGGED_BODY_BYTES {
        format!(
            "{}... (truncated, {} bytes total)",
            String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY_BYTES]),
            bytes.len()
        )
    } else {
        String::from_utf8_lossy(bytes).to_string()
    }
}
