use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use floodgate::config::FloodgateConfig;
use floodgate::limiter::{RedisTokenBucket, Strategy, TokenBucket};
use floodgate::middleware::{rate_limit_middleware, LimitFn, RateLimitState};

#[derive(Parser, Debug)]
#[command(name = "floodgate", about = "Per-identity rate limiting demo server")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Listen address override
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Redis URL override; enables the distributed strategy
    #[arg(long)]
    redis_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting Floodgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => FloodgateConfig::from_file(path)?,
        None => FloodgateConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(url) = args.redis_url {
        config.server.redis_url = Some(url);
    }

    let strategy: Arc<dyn Strategy> = match &config.server.redis_url {
        Some(url) => {
            info!(url = %url, "Using distributed token bucket strategy");
            Arc::new(
                RedisTokenBucket::connect(url)
                    .await?
                    .with_call_timeout(Duration::from_secs(1)),
            )
        }
        None => {
            info!("Using local token bucket strategy");
            Arc::new(TokenBucket::new())
        }
    };

    let limits = config.limits.clone();
    let limit_fn: LimitFn =
        Arc::new(move |_request: &axum::extract::Request, key: &str| limits.find_limit(key));
    let state = RateLimitState::new(strategy).with_limit_fn(limit_fn);

    let app = axum::Router::new()
        .route("/", axum::routing::get(|| async { "Request allowed\n" }))
        .layer(axum::middleware::from_fn_with_state(
            state,
            rate_limit_middleware,
        ));

    info!(addr = %config.server.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(config.server.listen_addr).await?;

    // Run the server with graceful shutdown on Ctrl+C
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Floodgate stopped");
    Ok(())
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
