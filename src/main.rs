//! lease-elector -- runs one elector and serves its admin API.
//!
//! The leader-only work here is a heartbeat log line, which makes the
//! binary useful for watching an election fleet by hand.  SIGTERM/SIGINT
//! stop the elector first (releasing the lease) and then the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use lease_elector::{leader_callback, AppState, ElectionError, Elector};

/// Command-line arguments for the elector host.
#[derive(Parser, Debug)]
#[command(
    name = "lease-elector",
    version,
    about = "Lease-based leader election host"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "elector.example.yaml")]
    config: String,

    /// Override the elector ID. A random one is generated when neither
    /// this nor the config sets it.
    #[arg(long)]
    id: Option<String>,

    /// Override the admin bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = lease_elector::config::load_config(&cli.config)?;
    init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    if let Some(id) = cli.id {
        config.elector.id = id;
    }
    if config.elector.id.is_empty() {
        config.elector.id = uuid::Uuid::new_v4().to_string();
        info!("Generated elector id {}", config.elector.id);
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));
    if config.elector.address.is_empty() {
        config.elector.address = bind_addr.clone();
    }

    if config.observability.metrics {
        lease_elector::metrics::init_metrics();
        lease_elector::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let storage = lease_elector::storage::open_storage(&config.storage)?;
    let callback = leader_callback(|token: CancellationToken| async move {
        info!("Leader work started");
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => info!("Leader heartbeat"),
            }
        }
        info!("Leader work stopped");
        anyhow::Ok(())
    });
    let elector = Elector::new(config.elector.clone(), storage, callback)?;
    info!(
        id = %elector.id(),
        lease = ?elector.config().lease_duration,
        renew_interval = ?elector.config().renew_interval,
        "Elector configured"
    );

    let shutdown = CancellationToken::new();
    let run = tokio::spawn({
        let elector = elector.clone();
        let shutdown = shutdown.clone();
        async move { elector.run(shutdown).await }
    });

    let state = Arc::new(AppState {
        elector,
        metrics_enabled: config.observability.metrics,
    });
    let app = lease_elector::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Admin API listening on {}", bind_addr);

    let elector_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = elector_shutdown.cancelled() => {}
            }
        })
        .await?;

    shutdown.cancel();
    match run.await? {
        Err(ElectionError::Cancelled) | Ok(()) => {}
        Err(err) => return Err(err.into()),
    }
    info!("Elector shut down");
    Ok(())
}

fn init_tracing(logging: &lease_elector::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
