use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use turnstile::config::{Environment, LogFormat, LoggingConfig, TurnstileConfig};
use turnstile::http::{HttpServer, RequestGate};
use turnstile::ratelimit::{AdmissionController, CounterStores};

/// Strike-based admission control in front of an HTTP service.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind, overriding the configuration
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Log output format, overriding the configuration
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    init_tracing(&config.logging);

    info!("Starting Turnstile admission control");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        bind_addr = %config.server.bind_addr,
        window_ms = config.admission.window_ms,
        max_requests = config.admission.max_requests,
        burst_allowance = config.admission.burst_allowance,
        max_strikes = config.admission.max_strikes,
        blacklist_duration_ms = config.admission.blacklist_duration_ms,
        key_source = %config.gate.key_source,
        "Configuration loaded"
    );

    let controller = Arc::new(AdmissionController::new(
        config.admission.clone(),
        CounterStores::in_memory(),
    )?);
    info!("Admission controller initialized");

    let gate = RequestGate::new(controller, config.gate.clone())?
        .with_error_details(config.server.environment == Environment::Development);

    let server = HttpServer::new(config.server.clone(), Arc::new(gate));

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Turnstile stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .init(),
    }
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
