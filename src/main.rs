//! Kitspace processor
//!
//! Main entry point: loads configuration, sets up logging and runs the
//! HTTP server, scheduler and repository watcher.

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt};

use kitspace_core::config::AppConfig;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %format!("{e:#}"), "Processor error");
        std::process::exit(1);
    }
}

/// Load `config/default`, the `KITSPACE_ENV` overlay and `KITSPACE__*` variables.
fn load_configuration() -> anyhow::Result<AppConfig> {
    let env = std::env::var("KITSPACE_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env).with_context(|| format!("loading configuration for '{env}'"))
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

async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = %config.storage.provider,
        concurrency = config.scheduler.concurrency,
        watcher = config.watcher.enabled,
        "Starting Kitspace processor"
    );

    create_data_directories(&config).await?;
    kitspace_api::run_server(config)
        .await
        .context("running processor")
}

async fn create_data_directories(config: &AppConfig) -> anyhow::Result<()> {
    let mut dirs = vec![config.converters.effective_temp_root()];
    if config.storage.provider == "local" {
        dirs.push(config.storage.local.root_path.clone().into());
    }

    for dir in &dirs {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating directory '{}'", dir.display()))?;
    }

    Ok(())
}
