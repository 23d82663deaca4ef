use tracing::info;
use weather_aggregator::{config, server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "weather aggregator starting");

    let config = config::load_config();
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let handle = server::spawn(config, ready_tx);

    match ready_rx.await {
        Ok(addr) => info!(%addr, "ready"),
        Err(_) => {
            eprintln!("FATAL: aggregator failed to start");
            std::process::exit(1);
        }
    }

    shutdown_signal().await;
    info!("shutdown signal received");
    handle.shutdown().await;
}

/// Waits for SIGTERM or Ctrl-C (SIGINT).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
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
}
