//! Outgoing API client that carries the session bearer token.
//!
//! Every request gets the current access token. An unauthorized answer triggers one
//! refresh through the shared [`RefreshCoordinator`] and one resend of the original
//! request; whatever the resend returns goes back to the caller untouched.

use crate::adapters::cookies::TokenStore;
use crate::services::refresh::{RefreshCoordinator, RefreshError};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The session could not be refreshed; the user must sign in again.
    #[error("session expired")]
    SessionExpired(#[source] RefreshError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    coordinator: RefreshCoordinator,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl ApiClient {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        store: Arc<dyn TokenStore>,
        coordinator: RefreshCoordinator,
    ) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/').to_string(), store, coordinator }
    }

    /// # Errors
    /// See [`ApiClient::execute`].
    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        let request = self.http.request(Method::GET, self.url(path)).build()?;
        self.execute(request).await
    }

    /// # Errors
    /// See [`ApiClient::execute`].
    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response, ApiError> {
        let request = self.http.request(Method::POST, self.url(path)).json(body).build()?;
        self.execute(request).await
    }

    /// # Errors
    /// See [`ApiClient::execute`].
    pub async fn delete(&self, path: &str) -> Result<Response, ApiError> {
        let request = self.http.request(Method::DELETE, self.url(path)).build()?;
        self.execute(request).await
    }

    /// Sends `request` with the current bearer token, refreshing and resending once on 401.
    ///
    /// Requests whose body cannot be cloned are sent without the retry.
    ///
    /// # Errors
    /// [`ApiError::SessionExpired`] when the refresh fails (the token store is cleared),
    /// [`ApiError::Http`] on transport failures.
    #[tracing::instrument(skip_all, fields(method = %request.method(), path = %request.url().path()))]
    pub async fn execute(&self, mut request: Request) -> Result<Response, ApiError> {
        authorize(&mut request, self.store.access_token().as_deref());
        let retry = request.try_clone();

        let resp = self.http.execute(request).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        let Some(mut retry) = retry else {
            tracing::debug!("Unauthorized response for a streaming request, not retrying");
            return Ok(resp);
        };

        tracing::debug!("Unauthorized response, refreshing session");
        let access_token =
            self.coordinator.refresh_into(self.store.as_ref()).await.map_err(ApiError::SessionExpired)?;

        authorize(&mut retry, Some(&access_token));
        Ok(self.http.execute(retry).await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn authorize(request: &mut Request, access_token: Option<&str>) {
    let headers = request.headers_mut();
    match access_token.and_then(|token| HeaderValue::from_str(&format!("Bearer {token}")).ok()) {
        Some(mut value) => {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        None => {
            headers.remove(AUTHORIZATION);
        }
    }
}
