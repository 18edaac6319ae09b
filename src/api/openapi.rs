//! OpenAPI document for the auth surface.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "pipecd-auth",
        description = "Authentication endpoints for the PipeCD control plane"
    ),
    paths(
        crate::api::handlers::health::health,
        crate::api::handlers::auth::login::handle_login,
        crate::api::handlers::auth::login_static::handle_static_login,
        crate::api::handlers::auth::callback::handle_callback,
        crate::api::handlers::auth::logout::handle_logout,
    ),
    tags(
        (name = "auth", description = "Redirect-based login protocol"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_auth_endpoint() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/health",
            "/auth/login",
            "/auth/login/static",
            "/auth/callback",
            "/auth/logout",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected} in {paths:?}"
            );
        }
    }
}
