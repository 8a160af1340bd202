use crate::adapters::auth_service::AuthServiceClient;
use crate::adapters::upstream::UpstreamProxy;
use crate::config::Config;
use crate::domain::route::RouteTable;
use crate::services::refresh::RefreshCoordinator;
use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod health;
pub mod middleware;
pub mod proxy;
pub mod schemas;
pub mod tokens;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub routes: Arc<RouteTable>,
    pub coordinator: RefreshCoordinator,
    pub auth_service: AuthServiceClient,
    pub upstream: UpstreamProxy,
}

/// Configures and returns the primary application router.
///
/// Session endpoints under `/api/auth` bypass the gate; every other request is gated and
/// then forwarded to the page renderer.
pub fn app_router(state: AppState) -> Router {
    let session_routes = Router::new()
        .route("/token", get(tokens::get_tokens).post(tokens::store_tokens).delete(tokens::clear_tokens))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout));

    let gated = Router::new()
        .fallback(proxy::forward)
        .layer(from_fn_with_state(state.clone(), middleware::session_gate))
        .with_state(state.clone());

    Router::new()
        .nest("/api/auth", session_routes)
        .fallback_service(gated)
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .and_then(|id| id.header_value().to_str().ok())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .with_state(state)
}

pub fn mgmt_router() -> Router {
    Router::new().route("/livez", get(health::livez))
}
