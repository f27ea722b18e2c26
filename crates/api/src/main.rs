use std::net::SocketAddr;
use std::sync::Arc;

use genjob_engine::{JobOrchestrator, JobService};
use genjob_providers::credentials::ConfiguredCredentials;
use genjob_providers::ProvidersConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genjob_api::config::ServerConfig;
use genjob_api::router::build_app_router;
use genjob_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "genjob_api=debug,genjob_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let providers = ProvidersConfig::from_env();
    tracing::info!(
        request_timeout_secs = providers.request_timeout.as_secs(),
        "Loaded provider configuration",
    );

    // --- Providers ---
    let adapters = providers
        .build_adapters()
        .expect("Failed to build provider HTTP client");
    let credentials = Arc::new(ConfiguredCredentials::from_config(&providers));

    // --- Job engine ---
    let orchestrator = JobOrchestrator::new(adapters, credentials, providers.poll_configs())
        .expect("Invalid provider poll configuration")
        .with_minimum_total_duration(config.minimum_total_duration());
    let jobs = Arc::new(
        JobService::new(Arc::new(orchestrator))
            .with_retention(config.job_retention())
            .with_submit_wait(config.submit_wait()),
    );
    tracing::info!("Job service started");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        jobs: Arc::clone(&jobs),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    jobs.shutdown().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
