use crate::config::AuthConfig;
use crate::domain::token::TokenPair;
use crate::services::refresh::{RefreshClient, RefreshError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("email", &self.email).finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("auth service rejected the credentials with status {status}")]
    Rejected { status: u16 },
    #[error("auth service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// HTTP client for the external auth service.
#[derive(Clone, Debug)]
pub struct AuthServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthServiceClient {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &AuthConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(http, &config.auth_service_url))
    }

    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Exchanges credentials for a token pair.
    ///
    /// # Errors
    /// [`LoginError::Rejected`] for any non-2xx answer, [`LoginError::Transport`] otherwise.
    #[tracing::instrument(err(level = "warn"), skip(self, credentials))]
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair, LoginError> {
        let resp = self.http.post(self.url("/auth/login")).json(credentials).send().await?;
        if !resp.status().is_success() {
            return Err(LoginError::Rejected { status: resp.status().as_u16() });
        }
        Ok(resp.json().await?)
    }

    /// Revokes a refresh token. Best effort: failures are logged, never surfaced.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) {
        let result = self.http.post(self.url("/auth/logout")).json(&RefreshRequest { refresh_token }).send().await;

        match result {
            Ok(resp) if resp.status().is_success() => tracing::debug!("Refresh token revoked upstream"),
            Ok(resp) => tracing::warn!(status = %resp.status(), "Auth service refused logout"),
            Err(e) => tracing::warn!(error = %e, "Auth service unreachable during logout"),
        }
    }
}

#[async_trait]
impl RefreshClient for AuthServiceClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let resp = self
            .http
            .post(self.url("/auth/refresh"))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected { status: status.as_u16() });
        }

        resp.json::<TokenPair>().await.map_err(|e| RefreshError::Transport(e.to_string()))
    }
}
