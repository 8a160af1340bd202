use crate::adapters::auth_service::{Credentials, LoginError};
use crate::adapters::cookies::{RequestCookies, TokenStore};
use crate::api::AppState;
use crate::api::schemas::auth::StatusMessage;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::IntoResponse,
};

/// Exchanges credentials with the auth service and stores the issued pair as cookies.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(credentials) = payload?;
    let pair = state.auth_service.login(&credentials).await.map_err(|e| match e {
        LoginError::Rejected { .. } => AppError::AuthError,
        LoginError::Transport(e) => AppError::Upstream(e.to_string()),
    })?;

    pair.expiries().map_err(|e| AppError::Upstream(e.to_string()))?;

    let jar = RequestCookies::from_headers(&headers, state.config.auth.secure_cookies());
    jar.store(&pair);

    let mut response_headers = HeaderMap::new();
    jar.apply_to(&mut response_headers);
    Ok((response_headers, Json(StatusMessage::new("Logged in"))))
}

/// Clears both session cookies, revoking the refresh token upstream when one is present.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let jar = RequestCookies::from_headers(&headers, state.config.auth.secure_cookies());
    if let Some(refresh_token) = jar.refresh_token() {
        state.auth_service.logout(&refresh_token).await;
    }
    jar.clear();

    let mut response_headers = HeaderMap::new();
    jar.apply_to(&mut response_headers);
    (response_headers, Json(StatusMessage::new("Logged out")))
}
