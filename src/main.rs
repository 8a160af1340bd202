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

use session_gate::config::Config;
use session_gate::{AppBuilder, api, telemetry};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    session_gate::setup_panic_hook();

    let boot_span = tracing::info_span!("boot_server");
    let (api_listener, mgmt_listener, app_router, mgmt_app, shutdown_rx) = async {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        session_gate::spawn_signal_handler(shutdown_tx);

        let state = AppBuilder::new(config.clone()).build()?;
        let app_router = api::app_router(state);
        let mgmt_app = api::mgmt_router();

        let api_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;

        tracing::info!(
            address = %api_addr,
            auth_service = %config.auth.auth_service_url,
            upstream = %config.upstream.upstream_url,
            "listening"
        );
        tracing::info!(address = %mgmt_addr, "management server listening");

        let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;

        Ok::<_, anyhow::Error>((api_listener, mgmt_listener, app_router, mgmt_app, shutdown_rx))
    }
    .instrument(boot_span)
    .await?;

    let mut api_rx = shutdown_rx.clone();
    let api_server = axum::serve(api_listener, app_router).with_graceful_shutdown(async move {
        let _ = api_rx.wait_for(|&s| s).await;
    });

    let mut mgmt_rx = shutdown_rx.clone();
    let mgmt_server = axum::serve(mgmt_listener, mgmt_app).with_graceful_shutdown(async move {
        let _ = mgmt_rx.wait_for(|&s| s).await;
    });

    let servers = async { tokio::try_join!(api_server.into_future(), mgmt_server.into_future()) };
    let mut drain_rx = shutdown_rx.clone();
    let deadline = async move {
        let _ = drain_rx.wait_for(|&s| s).await;
        tokio::time::sleep(Duration::from_secs(config.server.shutdown_timeout_secs)).await;
    };

    tokio::select! {
        result = servers => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Server error");
            }
        }
        () = deadline => {
            tracing::warn!("Timeout waiting for connections to drain.");
        }
    }

    telemetry_guard.shutdown();
    Ok(())
}
