use crate::adapters::cookies::TokenStore;
use crate::domain::token::{TokenError, TokenPair, fingerprint};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a refresh attempt. Cloneable so every joined caller observes the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no refresh token available")]
    MissingRefreshToken,
    #[error("auth service rejected the refresh with status {status}")]
    Rejected { status: u16 },
    #[error("auth service unreachable: {0}")]
    Transport(String),
    #[error("auth service returned an unusable token pair: {0}")]
    InvalidPair(#[from] TokenError),
    #[error("refresh task aborted")]
    Aborted,
}

impl RefreshError {
    const fn outcome(&self) -> &'static str {
        match self {
            Self::MissingRefreshToken => "missing_refresh_token",
            Self::Rejected { .. } => "rejected",
            Self::Transport(_) => "transport",
            Self::InvalidPair(_) => "invalid_pair",
            Self::Aborted => "aborted",
        }
    }
}

/// Exchanges a refresh token for a new token pair.
#[async_trait]
pub trait RefreshClient: Send + Sync + fmt::Debug {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError>;
}

type RefreshTicket = Shared<BoxFuture<'static, Result<TokenPair, RefreshError>>>;

#[derive(Clone, Debug)]
struct Metrics {
    refresh_total: Counter<u64>,
    joined_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("session-gate");
        Self {
            refresh_total: meter
                .u64_counter("session_refresh_total")
                .with_description("Refresh calls issued to the auth service, by outcome")
                .build(),
            joined_total: meter
                .u64_counter("session_refresh_joined_total")
                .with_description("Refresh requests that joined an in-flight refresh")
                .build(),
        }
    }
}

/// Coalesces concurrent refreshes of the same session into a single auth-service call.
///
/// Each in-flight refresh is a ticket keyed by the refresh token's fingerprint. The first
/// caller spawns the call; later callers await the same ticket. The ticket is removed once
/// the call settles, so the next trigger starts a fresh call. The call runs on its own task
/// and completes even if every waiter goes away.
#[derive(Clone)]
pub struct RefreshCoordinator {
    client: Arc<dyn RefreshClient>,
    in_flight: Arc<DashMap<String, RefreshTicket>>,
    metrics: Metrics,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("client", &self.client)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(client: Arc<dyn RefreshClient>) -> Self {
        Self { client, in_flight: Arc::new(DashMap::new()), metrics: Metrics::new() }
    }

    /// Number of refreshes currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Refreshes the session identified by `refresh_token`, joining an in-flight refresh if any.
    ///
    /// # Errors
    /// Returns the shared failure of the underlying call. Failures are terminal: nothing is retried.
    #[tracing::instrument(skip_all, fields(session = %fingerprint(refresh_token)))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let ticket = self.ticket(refresh_token);
        ticket.await
    }

    /// Refreshes the session held by `store` and writes the outcome back to it.
    ///
    /// On success both tokens are replaced together and the new access token is returned.
    /// On failure the store is cleared; the caller should send the user to the login page.
    ///
    /// # Errors
    /// [`RefreshError::MissingRefreshToken`] without any network call when the store holds
    /// no refresh token, otherwise the failure of the refresh call.
    pub async fn refresh_into(&self, store: &dyn TokenStore) -> Result<String, RefreshError> {
        let Some(refresh_token) = store.refresh_token() else {
            store.clear();
            return Err(RefreshError::MissingRefreshToken);
        };

        match self.refresh(&refresh_token).await {
            Ok(pair) => {
                store.store(&pair);
                Ok(pair.access_token)
            }
            Err(e) => {
                store.clear();
                Err(e)
            }
        }
    }

    fn ticket(&self, refresh_token: &str) -> RefreshTicket {
        let key = fingerprint(refresh_token);

        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!("Joining in-flight refresh");
                self.metrics.joined_total.add(1, &[]);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                tracing::debug!("Starting refresh");
                let client = Arc::clone(&self.client);
                let in_flight = Arc::clone(&self.in_flight);
                let metrics = self.metrics.clone();
                let refresh_token = refresh_token.to_string();

                let task = tokio::spawn(async move {
                    let result = client.refresh(&refresh_token).await.and_then(|pair| {
                        pair.expiries()?;
                        Ok(pair)
                    });

                    let outcome = result.as_ref().map_or_else(RefreshError::outcome, |_| "success");
                    metrics.refresh_total.add(1, &[KeyValue::new("outcome", outcome)]);
                    match &result {
                        Ok(_) => tracing::info!("Session refreshed"),
                        Err(e) => tracing::warn!(error = %e, "Session refresh failed"),
                    }

                    in_flight.remove(&key);
                    result
                });

                let ticket = async move {
                    task.await.unwrap_or_else(|e| {
                        tracing::error!(error = %e, "Refresh task failed to complete");
                        Err(RefreshError::Aborted)
                    })
                }
                .boxed()
                .shared();

                entry.insert(ticket.clone());
                ticket
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MockRefreshClient;
    use super::*;
    use crate::adapters::cookies::MemoryTokenStore;
    use crate::domain::token::test_tokens::token_expiring_in;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_call() {
        let client = Arc::new(MockRefreshClient::succeeding(Duration::from_millis(50)));
        let coordinator = RefreshCoordinator::new(client.clone());

        let results = futures::future::join_all((0..16).map(|_| coordinator.refresh("refresh-1"))).await;

        assert_eq!(client.calls(), 1);
        let first = results[0].clone().unwrap();
        assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_outcome() {
        let client = Arc::new(MockRefreshClient::failing(RefreshError::Rejected { status: 401 }));
        let coordinator = RefreshCoordinator::new(client.clone());

        let results = futures::future::join_all((0..8).map(|_| coordinator.refresh("refresh-1"))).await;

        assert_eq!(client.calls(), 1);
        assert!(results.iter().all(|r| r == &Err(RefreshError::Rejected { status: 401 })));
    }

    #[tokio::test]
    async fn test_settled_ticket_is_cleared() {
        let client = Arc::new(MockRefreshClient::succeeding(Duration::from_millis(5)));
        let coordinator = RefreshCoordinator::new(client.clone());

        let first = coordinator.refresh("refresh-1").await.unwrap();
        let second = coordinator.refresh("refresh-1").await.unwrap();

        assert_eq!(client.calls(), 2);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_distinct_sessions_refresh_independently() {
        let client = Arc::new(MockRefreshClient::succeeding(Duration::from_millis(30)));
        let coordinator = RefreshCoordinator::new(client.clone());

        let (a, b) = tokio::join!(coordinator.refresh("session-a"), coordinator.refresh("session-b"));

        assert_eq!(client.calls(), 2);
        assert_ne!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_survives_cancelled_waiters() {
        let client = Arc::new(MockRefreshClient::succeeding(Duration::from_millis(50)));
        let coordinator = RefreshCoordinator::new(client.clone());

        let abandoned = tokio::time::timeout(Duration::from_millis(5), coordinator.refresh("refresh-1")).await;
        assert!(abandoned.is_err());

        // The late caller joins the refresh the abandoned caller started.
        let pair = coordinator.refresh("refresh-1").await;
        assert!(pair.is_ok());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_pair_without_expiry_is_rejected() {
        #[derive(Debug)]
        struct OpaqueClient;

        #[async_trait]
        impl RefreshClient for OpaqueClient {
            async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, RefreshError> {
                Ok(TokenPair::new("opaque", "opaque"))
            }
        }

        let coordinator = RefreshCoordinator::new(Arc::new(OpaqueClient));
        let result = coordinator.refresh("refresh-1").await;

        assert_eq!(result, Err(RefreshError::InvalidPair(TokenError::InvalidAccessToken)));
    }

    #[tokio::test]
    async fn test_refresh_into_stores_new_pair() {
        let client = Arc::new(MockRefreshClient::succeeding(Duration::from_millis(1)));
        let coordinator = RefreshCoordinator::new(client);
        let store = MemoryTokenStore::with_pair(TokenPair::new(token_expiring_in(10), "refresh-1"));

        let access = coordinator.refresh_into(&store).await.unwrap();

        assert_eq!(store.access_token(), Some(access));
        assert_ne!(store.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_refresh_into_clears_store_on_failure() {
        let client = Arc::new(MockRefreshClient::failing(RefreshError::Transport("connection refused".into())));
        let coordinator = RefreshCoordinator::new(client);
        let store = MemoryTokenStore::with_pair(TokenPair::new("access", "refresh-1"));

        let result = coordinator.refresh_into(&store).await;

        assert!(matches!(result, Err(RefreshError::Transport(_))));
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
    }

    #[tokio::test]
    async fn test_refresh_into_without_refresh_token_skips_network() {
        let client = Arc::new(MockRefreshClient::succeeding(Duration::from_millis(1)));
        let coordinator = RefreshCoordinator::new(client.clone());
        let store = MemoryTokenStore::new();

        let result = coordinator.refresh_into(&store).await;

        assert_eq!(result, Err(RefreshError::MissingRefreshToken));
        assert_eq!(client.calls(), 0);
    }
}
