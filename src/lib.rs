#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::auth_service::AuthServiceClient;
use crate::adapters::upstream::UpstreamProxy;
use crate::api::AppState;
use crate::config::Config;
use crate::domain::route::RouteTable;
use crate::services::refresh::{RefreshClient, RefreshCoordinator};
use std::sync::Arc;
use tokio::sync::watch;

/// Wires the gateway components from configuration.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    refresh_client: Option<Arc<dyn RefreshClient>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, refresh_client: None }
    }

    /// Overrides the refresh client; defaults to the configured auth service.
    #[must_use]
    pub fn with_refresh_client(mut self, client: Arc<dyn RefreshClient>) -> Self {
        self.refresh_client = Some(client);
        self
    }

    /// # Errors
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn build(self) -> anyhow::Result<AppState> {
        let auth_service = AuthServiceClient::new(&self.config.auth)?;
        let refresh_client: Arc<dyn RefreshClient> = match self.refresh_client {
            Some(client) => client,
            None => Arc::new(auth_service.clone()),
        };

        Ok(AppState {
            routes: Arc::new(RouteTable::from_config(&self.config.routes)),
            coordinator: RefreshCoordinator::new(refresh_client),
            upstream: UpstreamProxy::new(&self.config.upstream)?,
            auth_service,
            config: self.config,
        })
    }
}

/// Flips `shutdown_tx` to `true` on Ctrl-C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
            () = terminate => tracing::info!("Received SIGTERM, shutting down"),
        }

        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through `tracing` so they reach structured logs.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        tracing::error!(panic = %info, location = %location, "Panic occurred");
    }));
}
