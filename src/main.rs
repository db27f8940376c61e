use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use onasty_mailer::api;
use onasty_mailer::bus::RedisBus;
use onasty_mailer::config::{Config, LogFormat};
use onasty_mailer::context::SharedContext;
use onasty_mailer::dispatch::{self, Registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting Onasty mailer...");
    tracing::info!(
        bus_url = %config.bus_url,
        app_url = %config.app_url,
        dry_run = config.mail_dry_run(),
        "Configuration loaded"
    );

    // Connect to the bus; losing it is fatal
    let bus = RedisBus::connect(&config.bus_url)?;
    match bus.health_check().await {
        Ok(true) => tracing::info!("Redis bus connection established"),
        Ok(false) => tracing::warn!("Redis health check returned false"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to Redis bus");
            return Err(e.into());
        }
    }

    let ctx = Arc::new(SharedContext::from_config(&config)?);
    let registry = Registry::new(Arc::clone(&ctx));
    let mut loops = dispatch::spawn_all(&bus, &registry).await?;

    let subjects: Vec<&str> = registry.bindings().iter().map(|b| b.route.subject()).collect();
    tracing::info!(subjects = ?subjects, "The service is listening");

    if config.metrics_enabled {
        let addr: SocketAddr = config.metrics_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;
        let app = api::create_router(Arc::clone(&ctx));

        tracing::info!(address = %addr, "Metrics server listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Metrics server failed");
            }
        });
    }

    let ended = tokio::select! {
        _ = shutdown_signal() => None,
        ended = loops.join_next() => Some(ended),
    };

    loops.abort_all();

    match ended {
        None => {
            tracing::info!("Mailer shutdown complete");
            Ok(())
        }
        Some(Some(Ok(subject))) => {
            anyhow::bail!("subscription on {} ended unexpectedly", subject)
        }
        Some(Some(Err(e))) => anyhow::bail!("dispatch task failed: {}", e),
        Some(None) => anyhow::bail!("no subjects were registered"),
    }
}

/// Handle shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
