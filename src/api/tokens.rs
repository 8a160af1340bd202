//! Token relay: lets client-rendered code read and replace the HTTP-only session cookies.

use crate::adapters::cookies::{RequestCookies, TokenStore};
use crate::api::AppState;
use crate::api::schemas::auth::{SessionTokens, StatusMessage};
use crate::domain::token::TokenPair;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::IntoResponse,
};

pub async fn get_tokens(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let jar = RequestCookies::from_headers(&headers, state.config.auth.secure_cookies());
    Json(SessionTokens { access_token: jar.access_token(), refresh_token: jar.refresh_token() })
}

/// Persists a new pair. Both tokens must be compact JWTs that decode and carry an expiry.
pub async fn store_tokens(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<TokenPair>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(pair) = payload?;
    pair.expiries().map_err(|e| AppError::BadRequest(e.to_string()))?;

    let jar = RequestCookies::from_headers(&headers, state.config.auth.secure_cookies());
    jar.store(&pair);

    let mut response_headers = HeaderMap::new();
    jar.apply_to(&mut response_headers);
    Ok((response_headers, Json(StatusMessage::new("Tokens stored"))))
}

pub async fn clear_tokens(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let jar = RequestCookies::from_headers(&headers, state.config.auth.secure_cookies());
    jar.clear();

    let mut response_headers = HeaderMap::new();
    jar.apply_to(&mut response_headers);
    (response_headers, Json(StatusMessage::new("Tokens cleared")))
}
