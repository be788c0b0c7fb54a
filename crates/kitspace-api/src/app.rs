//! Application builder: wires the store, scheduler, pipeline and router
//! together and runs the server.

use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use kitspace_core::config::AppConfig;
use kitspace_core::error::AppError;
use kitspace_core::result::AppResult;
use kitspace_core::shell::SystemShell;
use kitspace_core::traits::CommandRunner;
use kitspace_storage::AssetStore;
use kitspace_worker::retry::RetryPolicy;
use kitspace_worker::{
    GiteaClient, ProcessingPipeline, RepoSync, RepoWatcher, StatusTracker, TaskScheduler,
};

use crate::middleware::cors::build_cors_layer;
use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors);
    let body_limit = RequestBodyLimitLayer::new(state.config.server.max_body_bytes);
    build_router(state)
        .layer(body_limit)
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Builds the pipeline: store, shell, converters, scheduler and repo sync.
pub async fn build_pipeline(config: &AppConfig) -> AppResult<ProcessingPipeline> {
    tracing::info!(provider = %config.storage.provider, "Initializing asset store...");
    let store = AssetStore::from_config(&config.storage).await?;
    if !store.health_check().await? {
        tracing::warn!(provider = %store.provider_type(), "Asset store health check failed");
    }

    let shell: Arc<dyn CommandRunner> = Arc::new(SystemShell::new());
    let registry =
        kitspace_converter::default_registry(&config.converters, config.gitea.public_url());
    let scheduler = TaskScheduler::new(
        registry,
        store,
        Arc::clone(&shell),
        Arc::new(StatusTracker::new()),
        &config.scheduler,
    );

    tokio::fs::create_dir_all(&config.gitea.checkout_dir)
        .await
        .map_err(|e| {
            AppError::configuration(format!(
                "Failed to create checkout dir '{}': {e}",
                config.gitea.checkout_dir
            ))
        })?;
    let sync = RepoSync::new(
        shell,
        config.gitea.checkout_dir.clone(),
        RetryPolicy::new(config.scheduler.retry.clone()),
    );
    let gitea = GiteaClient::new(&config.gitea)?;

    Ok(ProcessingPipeline::new(
        scheduler,
        sync,
        Some(gitea),
        config.gitea.repositories_dir.clone(),
    ))
}

/// Runs the processor until a shutdown signal arrives.
///
/// Shutdown stops the HTTP server first, then the watcher, then waits
/// (bounded) for running converters.
pub async fn run_server(config: AppConfig) -> AppResult<()> {
    tracing::info!("Starting Kitspace processor...");
    let config = Arc::new(config);
    let pipeline = Arc::new(build_pipeline(&config).await?);

    let mut watcher = if config.watcher.enabled {
        let watcher = RepoWatcher::new(Arc::clone(&pipeline), &config.watcher).await?;
        watcher.start().await?;
        Some(watcher)
    } else {
        None
    };

    let state = AppState::new(Arc::clone(&config), Arc::clone(&pipeline));
    let app = build_app(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(%addr, "Kitspace processor listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    if let Some(watcher) = watcher.as_mut() {
        if let Err(e) = watcher.shutdown().await {
            tracing::warn!(error = %e, "Repository watcher did not stop cleanly");
        }
    }
    pipeline.scheduler().shutdown().await;

    tracing::info!("Kitspace processor stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
