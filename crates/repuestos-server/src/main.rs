use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use repuestos_core::SearchCache;
use repuestos_server::{build_router, Args};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.default_log_filter())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = args
        .build_state()
        .context("failed to initialize search service")?;
    for (source, enabled) in state.service.aggregator().sources() {
        info!(%source, enabled, "registered source");
    }

    tokio::spawn(sweep_expired(
        state.service.cache().clone(),
        args.cache_config().local_ttl,
    ));

    let app = build_router(state);
    let addr = args.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "repuestos listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("server shutdown complete");
    Ok(())
}

async fn sweep_expired(cache: SearchCache, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every.max(std::time::Duration::from_secs(1)));
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match cache.clear_expired().await {
            Ok(removed) => debug!(removed, "swept expired cache entries"),
            Err(error) => warn!("cache sweep failed: {error}"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!("failed to listen for SIGTERM: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received terminate signal, shutting down"),
    }
}
