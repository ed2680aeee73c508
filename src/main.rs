//! jobrunner server — wires the worker pool and scheduled runner together.
//!
//! Loads configuration, starts one [`WorkerPool`] and one
//! [`ScheduledRunner`], registers the periodic pool report, and shuts both
//! down on Ctrl+C or SIGTERM.

use std::sync::Arc;

use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use jobrunner_core::config::AppConfig;
use jobrunner_core::error::AppError;
use jobrunner_worker::jobs::PoolReportJob;
use jobrunner_worker::{ScheduledRunner, WorkerPool};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("JOBRUNNER_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Start the pool and scheduler, then wait for a shutdown signal
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting jobrunner v{}", env!("CARGO_PKG_VERSION"));

    let pool = Arc::new(WorkerPool::new(config.pool.clone())?);
    let scheduler = ScheduledRunner::new(config.scheduler.clone())?;

    if config.reporter.enabled {
        scheduler.submit(
            PoolReportJob::new(Arc::clone(&pool)),
            config.reporter.initial_delay(),
            config.reporter.period(),
        )?;
    } else {
        tracing::info!("Pool report disabled");
    }

    shutdown_signal().await?;
    tracing::info!("Shutdown signal received, stopping scheduled jobs...");

    let scheduler_report = scheduler.shutdown().await;
    let pool_report = pool.shutdown().await;

    tracing::info!(
        "jobrunner stopped (scheduler graceful={}, pool graceful={})",
        scheduler_report.graceful,
        pool_report.graceful
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() -> Result<(), AppError> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
