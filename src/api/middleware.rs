use crate::adapters::cookies::{RequestCookies, TokenStore};
use crate::api::AppState;
use crate::config::RouteConfig;
use crate::services::gate::{ClearCookies, GateDecision, GateSignals, decide};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use time::OffsetDateTime;

/// Edge gate: decides per request between pass-through, refresh and redirect.
///
/// Cookie writes made while deciding (refreshed pair, cleared session) are attached to
/// whatever response ends up being sent, so both cookies always change together.
pub async fn session_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let jar = RequestCookies::from_headers(request.headers(), state.config.auth.secure_cookies());
    let route_class = state.routes.classify(request.uri().path());
    let signals =
        GateSignals::evaluate(route_class, &jar, OffsetDateTime::now_utc(), state.config.auth.refresh_lookahead());

    let mut response = match decide(&signals) {
        GateDecision::PassThrough => next.run(request).await,
        GateDecision::RedirectLanding => Redirect::temporary(&state.config.routes.landing_path).into_response(),
        GateDecision::RedirectLogin { clear, with_notice } => {
            match clear {
                ClearCookies::Access => jar.clear_access(),
                ClearCookies::Both => jar.clear(),
            }
            login_redirect(&state.config.routes, with_notice)
        }
        GateDecision::Refresh => match state.coordinator.refresh_into(&jar).await {
            Ok(_) => {
                jar.rewrite_request_cookies(request.headers_mut());
                next.run(request).await
            }
            Err(e) => {
                tracing::info!(error = %e, "Session refresh failed, redirecting to login");
                // refresh_into already cleared both cookies.
                login_redirect(&state.config.routes, true)
            }
        },
    };

    jar.apply_to(response.headers_mut());
    response
}

/// Redirect to the login page, optionally carrying the expiry notice as `msg`.
#[must_use]
pub fn login_redirect(routes: &RouteConfig, with_notice: bool) -> Response {
    if !with_notice || routes.expired_notice.is_empty() {
        return Redirect::temporary(&routes.login_path).into_response();
    }

    let query = url::form_urlencoded::Serializer::new(String::new()).append_pair("msg", &routes.expired_notice).finish();
    Redirect::temporary(&format!("{}?{query}", routes.login_path)).into_response()
}
