pub mod analytics;
pub mod cache;
pub mod completion;
pub mod config;
pub mod context;
pub mod credentials;
pub mod crypto;
pub mod db;
pub mod errors;
pub mod hooks;
pub mod jobs;
pub mod mail;
pub mod models;
pub mod notifier;
pub mod outline;
pub mod processor;
pub mod sanitize;
pub mod scheduler;
pub mod settings;
pub mod storage;
pub mod store;

pub use crate::config::AppConfig;
pub use crate::context::{AppContext, Collaborators};
pub use crate::errors::{AppError, AppResult};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Loads configuration, starts the pipeline and blocks until Ctrl-C.
pub async fn run(config_path: Option<&Path>) -> AppResult<()> {
    let config = AppConfig::load(config_path)?;
    std::fs::create_dir_all(&config.data_dir)?;
    init_tracing(&config.log_dir())?;

    let jobs = config.jobs.ids.len();
    let context = AppContext::new(config)?;
    context.start();
    tracing::info!(jobs, components = ?context.hooks.component_names(), "keyword insight started");

    tokio::signal::ctrl_c().await?;
    context.shutdown().await;
    tracing::info!("keyword insight stopped");
    Ok(())
}

pub fn init_tracing(log_dir: &Path) -> AppResult<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "keyword-insight.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
