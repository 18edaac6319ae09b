//! Static-admin login: the escape hatch when SSO is unavailable.

use std::sync::Arc;

use axum::extract::{Extension, RawForm};
use axum::http::{Method, StatusCode};
use axum::response::Response;

use super::{
    cookies, parse_form, redirect_home, AuthHandler, DEFAULT_TOKEN_TTL, PASSWORD_FORM_KEY,
    PROJECT_FORM_KEY, USERNAME_FORM_KEY,
};
use crate::jwt::SessionClaims;
use crate::model::{ProjectStaticAdmin, Role, BUILTIN_ROLE_ADMIN};

/// Authenticate a static admin and issue a full-access session for the
/// project.
#[utoipa::path(
    post,
    path = "/auth/login/static",
    responses(
        (status = 302, description = "Login succeeded; session cookie set; redirect to /"),
        (status = 303, description = "Redirect to / with an error cookie")
    ),
    tag = "auth"
)]
pub async fn handle_static_login(
    Extension(handler): Extension<Arc<AuthHandler>>,
    method: Method,
    RawForm(body): RawForm,
) -> Response {
    if method != Method::POST {
        return handler.error_response("Method not allowed", None);
    }

    let form = parse_form(&body);
    let Some(project_id) = form.get(PROJECT_FORM_KEY).filter(|v| !v.is_empty()) else {
        return handler.error_response("Missing project id", None);
    };
    let Some(username) = form.get(USERNAME_FORM_KEY).filter(|v| !v.is_empty()) else {
        return handler.error_response("Missing username", None);
    };
    let Some(password) = form.get(PASSWORD_FORM_KEY).filter(|v| !v.is_empty()) else {
        return handler.error_response("Missing password", None);
    };

    // Credentials baked into process configuration take precedence over the
    // stored project entity.
    let admin: ProjectStaticAdmin = if let Some(configured) = handler.project_in_config(project_id)
    {
        match &configured.static_admin {
            Some(admin) => admin.clone(),
            None => return handler.error_response("Unable to login", None),
        }
    } else {
        let project = match handler.load_project(project_id).await {
            Ok(project) => project,
            Err(err) => return handler.error_response("Unable to find project", Some(&err)),
        };
        if project.static_admin_disabled {
            return handler.error_response("Static admin is disabling", None);
        }
        match project.static_admin {
            Some(admin) => admin,
            None => return handler.error_response("Unable to login", None),
        }
    };

    if let Err(err) = admin.auth(username, password) {
        return handler.error_response("Unable to login", Some(&err.into()));
    }

    let claims = SessionClaims::new(
        username,
        "",
        Role {
            project_id: project_id.clone(),
            project_rbac_roles: vec![BUILTIN_ROLE_ADMIN.to_string()],
        },
        DEFAULT_TOKEN_TTL,
    );
    let token = match handler.signer().sign(&claims) {
        Ok(token) => token,
        Err(err) => return handler.error_response("Internal error", Some(&err.into())),
    };

    let Ok(token_cookie) = cookies::token_cookie(&token, handler.secure_cookie()) else {
        return handler.error_response("Internal error", None);
    };
    redirect_home(StatusCode::FOUND, &[token_cookie])
}
