//! HTTP entry points for project sign-in and sign-out.
//!
//! The login protocol is redirect-based: every endpoint answers with an
//! empty `text/html` body and communicates with the SPA through the cookies
//! described in [`cookies`].

pub mod callback;
pub mod cookies;
pub mod login;
pub mod login_static;
pub mod logout;
pub mod xsrf;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, info};

use crate::config::ControlPlaneProject;
use crate::jwt::Signer;
use crate::model::{Decrypter, Project, ProjectSSOConfig};

pub const ROOT_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/auth/login";
pub const STATIC_LOGIN_PATH: &str = "/auth/login/static";
pub const CALLBACK_PATH: &str = "/auth/callback";
pub const LOGOUT_PATH: &str = "/auth/logout";

pub(crate) const PROJECT_FORM_KEY: &str = "project";
pub(crate) const USERNAME_FORM_KEY: &str = "username";
pub(crate) const PASSWORD_FORM_KEY: &str = "password";
pub(crate) const AUTH_CODE_FORM_KEY: &str = "code";
pub(crate) const STATE_FORM_KEY: &str = "state";

/// Token lifetime when the SSO configuration does not override it, and for
/// static-admin sessions.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// Deadline for each collaborator round-trip: project load, code exchange,
// user fetch.
const COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(10);

const STATE_LIFETIME: Duration =
    Duration::from_secs(cookies::DEFAULT_STATE_COOKIE_MAX_AGE as u64);

/// Resolves a project id to its stored entity. Returned projects are
/// read-only snapshots; reloading is the store's concern.
#[async_trait]
pub trait ProjectGetter: Send + Sync {
    async fn get(&self, id: &str) -> Result<Project>;
}

/// Shared state for all authentication endpoints.
pub struct AuthHandler {
    signer: Signer,
    decrypter: Arc<dyn Decrypter>,
    callback_url: String,
    state_key: String,
    projects_in_config: HashMap<String, ControlPlaneProject>,
    shared_sso_configs: HashMap<String, ProjectSSOConfig>,
    project_getter: Arc<dyn ProjectGetter>,
    secure_cookie: bool,
}

impl AuthHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signer: Signer,
        decrypter: Arc<dyn Decrypter>,
        address: &str,
        state_key: String,
        projects_in_config: HashMap<String, ControlPlaneProject>,
        shared_sso_configs: HashMap<String, ProjectSSOConfig>,
        project_getter: Arc<dyn ProjectGetter>,
        secure_cookie: bool,
    ) -> Self {
        Self {
            signer,
            decrypter,
            callback_url: format!("{}{}", address.trim_end_matches('/'), CALLBACK_PATH),
            state_key,
            projects_in_config,
            shared_sso_configs,
            project_getter,
            secure_cookie,
        }
    }

    pub(super) fn signer(&self) -> &Signer {
        &self.signer
    }

    pub(super) fn decrypter(&self) -> &dyn Decrypter {
        self.decrypter.as_ref()
    }

    pub(super) fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub(super) fn state_key(&self) -> &str {
        &self.state_key
    }

    pub(super) fn secure_cookie(&self) -> bool {
        self.secure_cookie
    }

    pub(super) fn project_in_config(&self, id: &str) -> Option<&ControlPlaneProject> {
        self.projects_in_config.get(id)
    }

    /// Resolve the effective SSO configuration for a project. Returns the
    /// configuration and whether it came from the shared process-wide map
    /// (shared entries are already decrypted).
    pub(super) fn find_sso_config(&self, project: &Project) -> Result<(ProjectSSOConfig, bool)> {
        if project.shared_sso_name.is_empty() {
            return project
                .sso
                .clone()
                .map(|sso| (sso, false))
                .ok_or_else(|| anyhow!("missing SSO configuration in project data"));
        }
        self.shared_sso_configs
            .get(&project.shared_sso_name)
            .cloned()
            .map(|sso| (sso, true))
            .ok_or_else(|| {
                anyhow!(
                    "not found shared sso configuration {}",
                    project.shared_sso_name
                )
            })
    }

    /// Load a project within the collaborator deadline.
    pub(super) async fn load_project(&self, id: &str) -> Result<Project> {
        with_deadline(self.project_getter.get(id)).await
    }

    /// Log the failure and redirect to `/` with an error cookie. The
    /// user-visible message stays short and free of secret material.
    pub(super) fn error_response(&self, message: &str, err: Option<&anyhow::Error>) -> Response {
        match err {
            Some(err) => error!(error = %err, "auth-handler: {message}"),
            None => info!("auth-handler: {message}"),
        }
        let mut response_cookies = Vec::new();
        if let Ok(cookie) = cookies::error_cookie(message, self.secure_cookie) {
            response_cookies.push(cookie);
        }
        redirect_home(StatusCode::SEE_OTHER, &response_cookies)
    }
}

/// Run a collaborator call under the shared 10-second deadline. The timer
/// is dropped on every exit path.
pub(super) async fn with_deadline<T>(
    future: impl Future<Output = Result<T>> + Send,
) -> Result<T> {
    match tokio::time::timeout(COLLABORATOR_TIMEOUT, future).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "operation timed out after {}s",
            COLLABORATOR_TIMEOUT.as_secs()
        )),
    }
}

pub(super) fn state_lifetime() -> Duration {
    STATE_LIFETIME
}

/// Empty `text/html` redirect to `/` carrying the given cookies.
pub(super) fn redirect_home(status: StatusCode, response_cookies: &[HeaderValue]) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    headers.insert(LOCATION, HeaderValue::from_static(ROOT_PATH));
    for cookie in response_cookies {
        headers.append(SET_COOKIE, cookie.clone());
    }
    (status, headers).into_response()
}

/// `302 Found` to an absolute provider URL carrying the given cookies.
pub(super) fn redirect_to(location: &str, response_cookies: &[HeaderValue]) -> Result<Response> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    headers.insert(
        LOCATION,
        HeaderValue::from_str(location).map_err(|_| anyhow!("invalid redirect location"))?,
    );
    for cookie in response_cookies {
        headers.append(SET_COOKIE, cookie.clone());
    }
    Ok((StatusCode::FOUND, headers).into_response())
}

/// Parse an `application/x-www-form-urlencoded` body.
pub(super) fn parse_form(body: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(body)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NoopCrypter;
    use crate::jwt::SigningMethod;
    use crate::model::ProjectSSOProvider;

    struct EmptyGetter;

    #[async_trait]
    impl ProjectGetter for EmptyGetter {
        async fn get(&self, id: &str) -> Result<Project> {
            Err(anyhow!("project {id} not found"))
        }
    }

    fn handler(shared: HashMap<String, ProjectSSOConfig>) -> AuthHandler {
        AuthHandler::new(
            Signer::from_key_data(SigningMethod::HS256, b"test-key").expect("signer"),
            Arc::new(NoopCrypter),
            "https://pipecd.example.com/",
            "state-key".to_string(),
            HashMap::new(),
            shared,
            Arc::new(EmptyGetter),
            true,
        )
    }

    #[test]
    fn callback_url_is_derived_from_the_address() {
        let handler = handler(HashMap::new());
        assert_eq!(
            handler.callback_url(),
            "https://pipecd.example.com/auth/callback"
        );
    }

    #[test]
    fn find_sso_config_prefers_the_project_embedded_config() {
        let handler = handler(HashMap::new());
        let project = Project {
            sso: Some(ProjectSSOConfig {
                provider: ProjectSSOProvider::Github,
                ..ProjectSSOConfig::default()
            }),
            ..Project::default()
        };
        let (_, shared) = handler.find_sso_config(&project).expect("sso");
        assert!(!shared);
    }

    #[test]
    fn find_sso_config_resolves_shared_entries() {
        let mut shared = HashMap::new();
        shared.insert("corp-sso".to_string(), ProjectSSOConfig::default());
        let handler = handler(shared);

        let project = Project {
            shared_sso_name: "corp-sso".to_string(),
            ..Project::default()
        };
        let (_, shared) = handler.find_sso_config(&project).expect("sso");
        assert!(shared);

        let missing = Project {
            shared_sso_name: "other".to_string(),
            ..Project::default()
        };
        let err = handler.find_sso_config(&missing).expect_err("missing");
        assert_eq!(
            err.to_string(),
            "not found shared sso configuration other"
        );
    }

    #[test]
    fn find_sso_config_fails_without_any_config() {
        let handler = handler(HashMap::new());
        let err = handler
            .find_sso_config(&Project::default())
            .expect_err("missing");
        assert_eq!(err.to_string(), "missing SSO configuration in project data");
    }

    #[test]
    fn parse_form_decodes_url_encoding() {
        let form = parse_form(b"project=p1&username=root&password=a%20b");
        assert_eq!(form.get("project").map(String::as_str), Some("p1"));
        assert_eq!(form.get("password").map(String::as_str), Some("a b"));
    }

    #[tokio::test]
    async fn with_deadline_propagates_the_inner_result() {
        let ok: Result<u32> = with_deadline(async { Ok(7) }).await;
        assert_eq!(ok.expect("ok"), 7);

        let err: Result<u32> = with_deadline(async { Err(anyhow!("boom")) }).await;
        assert_eq!(err.expect_err("err").to_string(), "boom");
    }
}
