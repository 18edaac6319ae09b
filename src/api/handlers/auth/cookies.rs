//! Session, state, and error cookie construction.
//!
//! `token` and `state` are HttpOnly so browser scripts can never read them;
//! `error` is readable so the SPA can surface the failure. `state` rides the
//! provider redirect and therefore needs `SameSite=Lax`; everything else is
//! first-party and stays `Strict`.

use axum::http::{header::InvalidHeaderValue, HeaderMap, HeaderValue};

use crate::jwt::SIGNED_TOKEN_KEY;

pub const STATE_COOKIE_KEY: &str = "state";
pub const ERROR_COOKIE_KEY: &str = "error";

pub const DEFAULT_TOKEN_COOKIE_MAX_AGE: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_STATE_COOKIE_MAX_AGE: i64 = 30 * 60;
pub const DEFAULT_ERROR_COOKIE_MAX_AGE: i64 = 10 * 60;

fn build_cookie(
    name: &str,
    value: &str,
    max_age: i64,
    secure: bool,
    http_only: bool,
    same_site: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    // Values containing spaces (error messages) must be quoted to stay a
    // single cookie-value.
    let value = if value.contains(' ') {
        format!("\"{value}\"")
    } else {
        value.to_string()
    };
    let mut cookie = format!("{name}={value}; Path=/; Max-Age={max_age}; SameSite={same_site}");
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn token_cookie(value: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        SIGNED_TOKEN_KEY,
        value,
        DEFAULT_TOKEN_COOKIE_MAX_AGE,
        secure,
        true,
        "Strict",
    )
}

pub fn expired_token_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(SIGNED_TOKEN_KEY, "", -1, secure, true, "Strict")
}

pub fn state_cookie(value: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        STATE_COOKIE_KEY,
        value,
        DEFAULT_STATE_COOKIE_MAX_AGE,
        secure,
        true,
        "Lax",
    )
}

pub fn expired_state_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(STATE_COOKIE_KEY, "", -1, secure, true, "Lax")
}

pub fn error_cookie(value: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        ERROR_COOKIE_KEY,
        value,
        DEFAULT_ERROR_COOKIE_MAX_AGE,
        secure,
        false,
        "Strict",
    )
}

/// Read a cookie value from the request headers.
pub fn request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}
