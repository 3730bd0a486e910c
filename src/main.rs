use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gratitude_limiter::config::AppConfig;
use gratitude_limiter::http::{HttpServer, RateLimitState};
use gratitude_limiter::ratelimit::{RateLimiterRegistry, Sweeper};

/// Per-client rate limited HTTP service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Gratitude Jar rate limiter");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    let limits = &config.rate_limiting;
    info!(
        http_addr = %config.server.http_addr,
        rate = limits.rate,
        capacity = limits.capacity,
        cleanup_interval_secs = limits.cleanup_interval_secs,
        max_age_secs = limits.max_age_secs,
        "Configuration loaded"
    );

    // Initialize the registry
    let registry = Arc::new(RateLimiterRegistry::from_config(limits)?);
    info!("Rate limiter registry initialized");

    // Shutdown fans out to the sweeper and the server
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let sweeper = Sweeper::from_config(Arc::clone(&registry), limits)?
        .spawn(wait_for_shutdown(shutdown_rx.clone()));

    let state = RateLimitState::new(registry)
        .with_exempt_prefixes(config.server.exempt_prefixes.iter().cloned());
    let server = HttpServer::new(config.server.http_addr, state);

    server
        .serve_with_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    let evicted = sweeper.await?;
    info!(evicted = evicted, "Gratitude Jar rate limiter stopped");
    Ok(())
}

/// Resolve once the shutdown flag has been raised.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    // An error means the sender is gone, which only happens after shutdown
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
