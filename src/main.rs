use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use cortex_gateway::{config::GatewayConfig, observability, state::AppState};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

#[derive(Parser, Debug)]
#[command(name = "cortex-gateway", version, about = "OpenAI-compatible HTTP inference gateway", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long, env = "CORTEX_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match GatewayConfig::load(args.config.as_deref()).await {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {err:#}");
            std::process::exit(1);
        }
    };

    observability::init_tracing(&config.logging);

    let bind_addr = config.server.bind;
    let idle_sweep_interval = config.engines.idle_sweep_interval();

    let state = AppState::new(config);
    if let Err(err) = state.preload_engines().await {
        tracing::error!(error = %err, "failed to preload engines");
        std::process::exit(1);
    }

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("failed to bind {bind_addr}: {err}");
            std::process::exit(1);
        }
    };

    let tracker = TaskTracker::new();
    let shutdown = CancellationToken::new();
    state
        .node_manager
        .spawn_idle_eviction(&tracker, shutdown.clone(), idle_sweep_interval);
    tracker.close();

    let app = cortex_gateway::build_app(state);

    tracing::info!(addr = %bind_addr, "cortex-gateway listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown, tracker))
    .await
    .expect("server failed");
}

/// Waits for SIGINT/SIGTERM, then fires `shutdown` so background tasks (the
/// idle-eviction sweep) observe cancellation, and drains `tracker` before the
/// process exits.
async fn shutdown_signal(shutdown: CancellationToken, tracker: TaskTracker) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining background tasks");
    shutdown.cancel();
    tracker.wait().await;
}
