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

use parley_server::api::MgmtState;
use parley_server::config::Config;
use parley_server::{AppBuilder, adapters, telemetry};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    parley_server::setup_panic_hook();

    let boot_span = tracing::info_span!("boot_server");
    let (api_listener, mgmt_listener, app_router, mgmt_app, shutdown_tx, shutdown_rx) = async {
        // Resources
        let pool = adapters::database::init_pool(&config.database).await?;
        parley_server::run_migrations(&pool).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        parley_server::spawn_signal_handler(shutdown_tx.clone());

        let mut builder = AppBuilder::new(config.clone()).with_database(pool).with_shutdown_rx(shutdown_rx.clone());
        if let Some(url) = &config.pubsub.url {
            let pubsub = adapters::redis::RedisClient::connect(
                url,
                &config.pubsub,
                config.broadcast.channel_capacity,
                shutdown_rx.clone(),
            )
            .await?;
            builder = builder.with_pubsub(pubsub);
        }

        // Wiring
        let app = builder.build().await?;
        let app_router = parley_server::api::app_router(config.clone(), app.services, shutdown_rx.clone());
        let mgmt_app = parley_server::api::mgmt_router(MgmtState { health_service: app.health_service });

        // Listeners
        let api_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;

        tracing::info!(address = %api_addr, "listening");
        tracing::info!(address = %mgmt_addr, "management server listening");

        let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;

        Ok::<_, anyhow::Error>((api_listener, mgmt_listener, app_router, mgmt_app, shutdown_tx, shutdown_rx))
    }
    .instrument(boot_span)
    .await?;

    let mut api_rx = shutdown_rx.clone();
    let api_server = axum::serve(api_listener, app_router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = api_rx.wait_for(|&s| s).await;
        });

    let mut mgmt_rx = shutdown_rx.clone();
    let mgmt_server = axum::serve(mgmt_listener, mgmt_app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = mgmt_rx.wait_for(|&s| s).await;
        });

    let servers = async { tokio::try_join!(api_server, mgmt_server) };
    let mut drain_rx = shutdown_rx.clone();
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);

    // Open WebSocket sessions keep the API server alive until they close, so bound the drain.
    tokio::select! {
        result = servers => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Server error");
            }
        }
        () = async {
            let _ = drain_rx.wait_for(|&s| s).await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            tracing::warn!("Timeout waiting for connections to drain");
        }
    }

    let _ = shutdown_tx.send(true);
    telemetry_guard.shutdown();
    Ok(())
}
