use std::sync::Arc;
use anyhow::Context;
use kale_tracker::api::rest::{create_router, ApiState};
use kale_tracker::config::AppConfig;
use kale_tracker::observability::{metrics, tracing::init_tracing};
use kale_tracker::{PriceMonitor, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;

    init_tracing(&config.logging).context("initialising tracing")?;
    metrics::register_metrics().context("registering metrics")?;
    tracing::info!("Starting KALE price tracker ({})", env);

    let monitor = Arc::new(PriceMonitor::from_config(&config).context("building price monitor")?);
    if let Err(e) = monitor.restore().await {
        tracing::warn!("Could not restore price history: {}", e);
    }

    let scheduler = Arc::new(Scheduler::new(monitor.clone()));
    scheduler.start().await;

    let state = Arc::new(ApiState { monitor, scheduler: scheduler.clone() });
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    tracing::info!("Listening on {}", config.server.bind_addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    scheduler.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
