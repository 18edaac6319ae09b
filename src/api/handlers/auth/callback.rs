//! SSO login completion.

use std::sync::Arc;

use axum::extract::{Extension, RawQuery};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;

use super::{
    cookies, parse_form, redirect_home, state_lifetime, with_deadline, xsrf, AuthHandler,
    AUTH_CODE_FORM_KEY, PROJECT_FORM_KEY, STATE_FORM_KEY,
};
use crate::crypto;
use crate::jwt::SessionClaims;
use crate::oauth::ProviderClient;

/// Complete an SSO login: validate the CSRF state against the state cookie,
/// exchange the authorization code, map the identity onto a project role,
/// and set the session token cookie.
#[utoipa::path(
    get,
    path = "/auth/callback",
    responses(
        (status = 302, description = "Login succeeded; session cookie set; redirect to /"),
        (status = 303, description = "Redirect to / with an error cookie")
    ),
    tag = "auth"
)]
pub async fn handle_callback(
    Extension(handler): Extension<Arc<AuthHandler>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let params = parse_form(query.unwrap_or_default().as_bytes());
    let Some(raw_state) = params.get(STATE_FORM_KEY).filter(|s| !s.is_empty()) else {
        return handler.error_response("Missing state", None);
    };

    // The state is either bare hex or a `state:project` composite.
    let (state_value, project_in_state) = match raw_state.split_once(':') {
        Some((state, project)) => (state, Some(project)),
        None => (raw_state.as_str(), None),
    };
    let project_id = params
        .get(PROJECT_FORM_KEY)
        .map(String::as_str)
        .filter(|id| !id.is_empty())
        .or(project_in_state.filter(|id| !id.is_empty()));
    let Some(project_id) = project_id else {
        return handler.error_response("Missing project id", None);
    };

    let Some(code) = params.get(AUTH_CODE_FORM_KEY).filter(|c| !c.is_empty()) else {
        return handler.error_response("Missing auth code", None);
    };

    // The token must decode, carry a MAC from this process's state key, and
    // match the cookie set at login byte for byte.
    let state_token = hex::decode(state_value)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    let Some(state_token) = state_token else {
        return handler.error_response("Unauthorized access", None);
    };
    if !xsrf::validate(&state_token, handler.state_key(), state_lifetime()) {
        return handler.error_response("Unauthorized access", None);
    }
    let Some(cookie_state) = cookies::request_cookie(&headers, cookies::STATE_COOKIE_KEY) else {
        return handler.error_response("Unauthorized access", None);
    };
    if !crypto::constant_time_equal(cookie_state.as_bytes(), raw_state.as_bytes()) {
        return handler.error_response("Unauthorized access", None);
    }

    let mut project = match handler.load_project(project_id).await {
        Ok(project) => project,
        Err(err) => return handler.error_response("Unable to find project", Some(&err)),
    };
    // Legacy three-slot deployments keep authenticating through the
    // converted bindings.
    project.set_legacy_user_groups();
    if project.user_groups.is_empty() {
        return handler.error_response("Missing User Group configuration", None);
    }

    let (mut sso, shared) = match handler.find_sso_config(&project) {
        Ok(found) => found,
        Err(err) => {
            return handler.error_response(&format!("Invalid SSO configuration: {err}"), None);
        }
    };
    if !shared {
        if let Err(err) = sso.decrypt(handler.decrypter()).await {
            return handler.error_response(
                "Invalid SSO configuration: unable to decrypt credentials",
                Some(&err),
            );
        }
    }

    let mut client = match ProviderClient::new(&sso, &project) {
        Ok(client) => client,
        Err(err) => {
            return handler.error_response(
                &format!("Invalid SSO configuration: {err}"),
                None,
            );
        }
    };
    if let Err(err) =
        with_deadline(async { client.exchange_code(code).await.map_err(anyhow::Error::from) })
            .await
    {
        return handler.error_response("Unable to find user", Some(&err));
    }
    let user = match with_deadline(async {
        client.get_user().await.map_err(anyhow::Error::from)
    })
    .await
    {
        Ok(user) => user,
        Err(err) => return handler.error_response("Unable to find user", Some(&err)),
    };

    let claims = SessionClaims::new(
        &user.username,
        &user.avatar_url,
        user.role,
        sso.session_ttl_duration(),
    );
    let token = match handler.signer().sign(&claims) {
        Ok(token) => token,
        Err(err) => return handler.error_response("Internal error", Some(&err.into())),
    };

    let secure = handler.secure_cookie();
    let (Ok(token_cookie), Ok(state_cookie)) = (
        cookies::token_cookie(&token, secure),
        cookies::expired_state_cookie(secure),
    ) else {
        return handler.error_response("Internal error", None);
    };
    redirect_home(StatusCode::FOUND, &[token_cookie, state_cookie])
}
