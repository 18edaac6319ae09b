//! SSO login initiation.

use std::sync::Arc;

use axum::extract::{Extension, RawForm};
use axum::http::Method;
use axum::response::Response;
use url::Url;

use super::{cookies, parse_form, with_deadline, xsrf, AuthHandler, PROJECT_FORM_KEY};
use crate::model::ProjectSSOProvider;
use crate::oauth::{github, oidc};

/// Begin an SSO login: validate the request, generate the CSRF state, and
/// redirect the user agent to the provider authorization URL.
#[utoipa::path(
    post,
    path = "/auth/login",
    responses(
        (status = 302, description = "Redirect to the provider authorization URL"),
        (status = 303, description = "Redirect to / with an error cookie")
    ),
    tag = "auth"
)]
pub async fn handle_login(
    Extension(handler): Extension<Arc<AuthHandler>>,
    method: Method,
    RawForm(body): RawForm,
) -> Response {
    if method != Method::POST {
        return handler.error_response("Method not allowed", None);
    }

    let form = parse_form(&body);
    let Some(project_id) = form.get(PROJECT_FORM_KEY).filter(|id| !id.is_empty()) else {
        return handler.error_response("Missing project id", None);
    };

    let project = match handler.load_project(project_id).await {
        Ok(project) => project,
        Err(err) => return handler.error_response("Unable to find project", Some(&err)),
    };

    let (mut sso, shared) = match handler.find_sso_config(&project) {
        Ok(found) => found,
        Err(err) => {
            return handler.error_response(&format!("Invalid SSO configuration: {err}"), None);
        }
    };
    // Shared process-wide configurations are stored decrypted; only
    // project-owned ones carry encrypted secrets.
    if !shared {
        if let Err(err) = sso.decrypt(handler.decrypter()).await {
            return handler.error_response(
                "Invalid SSO configuration: unable to decrypt credentials",
                Some(&err),
            );
        }
    }

    let state_token = xsrf::generate(handler.state_key());
    let hex_state = hex::encode(state_token.as_bytes());

    let (auth_url, state_value) = match sso.provider {
        ProjectSSOProvider::Github => {
            let Some(config) = sso.github.as_ref() else {
                return handler.error_response(
                    "Invalid SSO configuration: missing github settings",
                    None,
                );
            };
            // The project id rides the callback query; the state stays bare.
            let callback = match Url::parse(handler.callback_url()) {
                Ok(mut url) => {
                    url.query_pairs_mut().append_pair(PROJECT_FORM_KEY, project_id);
                    url.to_string()
                }
                Err(err) => {
                    return handler.error_response("Internal error", Some(&err.into()));
                }
            };
            match github::auth_code_url(config, &hex_state, &callback) {
                Ok(url) => (url, hex_state),
                Err(err) => {
                    return handler.error_response(
                        &format!("Invalid SSO configuration: {err}"),
                        None,
                    );
                }
            }
        }
        ProjectSSOProvider::Oidc => {
            let Some(config) = sso.oidc.as_ref() else {
                return handler
                    .error_response("Invalid SSO configuration: missing oidc settings", None);
            };
            // OIDC redirect URIs are registered statically, so the project
            // id rides the composite state instead.
            let state_value = format!("{hex_state}:{project_id}");
            let mut client = match oidc::OAuthClient::new(config, &project) {
                Ok(client) => client,
                Err(err) => {
                    return handler.error_response(
                        &format!("Invalid SSO configuration: {err}"),
                        None,
                    );
                }
            };
            let url = with_deadline(async {
                client
                    .auth_code_url(&state_value)
                    .await
                    .map_err(anyhow::Error::from)
            })
            .await;
            match url {
                Ok(url) => (url, state_value),
                Err(err) => {
                    return handler
                        .error_response("Invalid SSO configuration: discovery failed", Some(&err));
                }
            }
        }
    };

    let Ok(state_cookie) = cookies::state_cookie(&state_value, handler.secure_cookie()) else {
        return handler.error_response("Internal error", None);
    };
    match super::redirect_to(&auth_url, &[state_cookie]) {
        Ok(response) => response,
        Err(err) => handler.error_response("Internal error", Some(&err)),
    }
}
