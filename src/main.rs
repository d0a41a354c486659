//! chatfan - real-time chat fan-out engine
//!
//! Browser connections mediated over a shared pub/sub bus: one process-wide
//! bus, many Connection Supervisors, no in-process room routing.

use chatfan::auth::InMemorySessionStore;
use chatfan::bus::{Bus, InMemoryBus, RedisBus};
use chatfan::config::Config;
use chatfan::db::Database;
use chatfan::state::Matrix;
use chatfan::{http, metrics, network};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("no config file at {config_path} ({e}), using defaults");
            Config::default()
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.server.log_format {
        chatfan::config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        chatfan::config::LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "configuration validation failed");
        return Err(anyhow::anyhow!("invalid configuration: {e}"));
    }

    info!(listen = %config.listen.address, "starting chatfan");

    let db = Database::new(&config.database.path).await?;

    let bus: Arc<dyn Bus> = match &config.bus.redis_url {
        Some(url) => {
            info!(url, "connecting to redis bus");
            Arc::new(RedisBus::connect(url).await?)
        }
        None => {
            info!("no bus.redis_url configured, using in-memory bus");
            Arc::new(InMemoryBus::new())
        }
    };

    let session_store = Arc::new(InMemorySessionStore::new());

    let config = Arc::new(config);
    let matrix = Arc::new(Matrix::new(db, bus, config.clone(), session_store));

    metrics::init();

    if config.server.metrics_port != 0 {
        let metrics_port = config.server.metrics_port;
        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
    }

    {
        let shutdown_matrix = matrix.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
            drop(shutdown_matrix);
            std::process::exit(0);
        });
    }

    let addr: SocketAddr = config.listen.address.parse()?;
    let app = network::router(matrix.clone());

    info!(%addr, path = %config.listen.path, "websocket gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
