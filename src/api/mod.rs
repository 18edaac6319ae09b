//! HTTP surface: router assembly and the server loop.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{any, get},
    Extension, Router,
};
use tokio::{net::TcpListener, sync::mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use handlers::auth::AuthHandler;

use handlers::auth;

/// Assemble the application router around a shared [`AuthHandler`].
///
/// The login endpoints are registered for any method so a wrong verb still
/// produces the redirect-with-error-cookie contract instead of a bare 405.
#[must_use]
pub fn router(handler: Arc<AuthHandler>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(auth::LOGIN_PATH, any(auth::login::handle_login))
        .route(
            auth::STATIC_LOGIN_PATH,
            any(auth::login_static::handle_static_login),
        )
        .route(auth::CALLBACK_PATH, get(auth::callback::handle_callback))
        .route(auth::LOGOUT_PATH, any(auth::logout::handle_logout))
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(Extension(handler))
}

/// Start the server.
///
/// Shutdown is driven by the provided channel; the Vault token renewal loop
/// signals it when credentials can no longer be refreshed.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn new(
    port: u16,
    handler: Arc<AuthHandler>,
    mut shutdown: mpsc::UnboundedReceiver<()>,
) -> Result<()> {
    let app = router(handler).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown.recv().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
