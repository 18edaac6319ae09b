//! Session teardown.

use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::Response;

use super::{cookies, redirect_home, AuthHandler};

/// Expire the session and state cookies and send the user agent home.
#[utoipa::path(
    get,
    path = "/auth/logout",
    responses(
        (status = 302, description = "Cookies cleared; redirect to /")
    ),
    tag = "auth"
)]
pub async fn handle_logout(Extension(handler): Extension<Arc<AuthHandler>>) -> Response {
    let secure = handler.secure_cookie();
    let mut response_cookies = Vec::new();
    if let Ok(cookie) = cookies::expired_token_cookie(secure) {
        response_cookies.push(cookie);
    }
    if let Ok(cookie) = cookies::expired_state_cookie(secure) {
        response_cookies.push(cookie);
    }
    redirect_home(StatusCode::FOUND, &response_cookies)
}
