use axum::{
    http::{header, HeaderMap, HeaderValue},
    response::Response,
};
use std::time::Duration;

/// Every cookie is HttpOnly and SameSite=Strict; only `Secure` varies.
#[derive(Debug, Clone, Copy)]
pub struct CookieOptions {
    pub secure: bool,
}

pub const SESSION_COOKIE_NAME: &str = "sessionId";
pub const LEGACY_SESSION_COOKIE_NAME: &str = "session_id";
pub const AUTH_TOKEN_COOKIE_NAME: &str = "AUTH_TOKEN";
pub const COOKIE_PATH: &str = "/";

pub fn build_auth_cookie(
    name: &str,
    value: &str,
    max_age: Duration,
    path: &str,
    options: CookieOptions,
) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite=Strict",
        name,
        value,
        path,
        max_age.as_secs()
    );
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Session cookie: lives as long as the browser session, the server side
/// record decides expiry.
pub fn build_session_cookie(session_id: &str) -> String {
    format!(
        "{}={}; Path={}; HttpOnly; SameSite=Strict",
        SESSION_COOKIE_NAME, session_id, COOKIE_PATH
    )
}

pub fn build_clear_cookie(name: &str, path: &str, options: CookieOptions) -> String {
    let mut cookie = format!(
        "{}=; Path={}; Max-Age=0; HttpOnly; SameSite=Strict",
        name, path
    );
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn extract_cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if key == name && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}

/// Reads the session id from `sessionId`, falling back to `session_id`.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|raw| {
            extract_cookie_value(raw, SESSION_COOKIE_NAME)
                .or_else(|| extract_cookie_value(raw, LEGACY_SESSION_COOKIE_NAME))
        })
}

pub fn append_set_cookie(response: &mut Response, cookie: &str) -> anyhow::Result<()> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| anyhow::anyhow!("Invalid cookie header: {}", e))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(())
}

/// Attaches the http-only, same-site strict session cookie to `response`.
pub fn set_session_cookie(mut response: Response, session_id: &str) -> anyhow::Result<Response> {
    append_set_cookie(&mut response, &build_session_cookie(session_id))?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn build_auth_cookie_includes_security_attributes() {
        let opts = CookieOptions { secure: true };
        let cookie = build_auth_cookie("AUTH_TOKEN", "abc", Duration::from_secs(1800), "/", opts);
        assert!(cookie.contains("AUTH_TOKEN=abc"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=1800"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn build_clear_cookie_sets_max_age_zero() {
        let opts = CookieOptions { secure: false };
        let cookie = build_clear_cookie("session_id", "/", opts);
        assert!(cookie.starts_with("session_id=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn session_cookie_is_http_only_and_strict() {
        let response = set_session_cookie(().into_response(), "sid-1").expect("set cookie");
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("set-cookie header");
        assert_eq!(cookie, "sessionId=sid-1; Path=/; HttpOnly; SameSite=Strict");
    }

    #[test]
    fn session_id_prefers_primary_cookie_name() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("session_id=legacy; sessionId=primary"),
        );
        assert_eq!(session_id_from_headers(&headers).as_deref(), Some("primary"));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("a=1; session_id=legacy"));
        assert_eq!(session_id_from_headers(&headers).as_deref(), Some("legacy"));

        assert!(session_id_from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn extract_cookie_value_ignores_empty_values() {
        let header = "a=1; AUTH_TOKEN=token-value; sessionId=";
        assert_eq!(
            extract_cookie_value(header, "AUTH_TOKEN").as_deref(),
            Some("token-value")
        );
        assert!(extract_cookie_value(header, "sessionId").is_none());
        assert!(extract_cookie_value(header, "missing").is_none());
    }
}
