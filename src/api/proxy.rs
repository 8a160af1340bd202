use crate::api::AppState;
use crate::error::Result;
use axum::{extract::Request, extract::State, response::Response};

/// Fallback handler: everything that is not a gateway endpoint goes to the page renderer.
pub async fn forward(State(state): State<AppState>, request: Request) -> Result<Response> {
    state.upstream.forward(request).await
}
