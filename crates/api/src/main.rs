use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use modporter_core::assumptions::RuleTable;
use modporter_db::{MemoryArtifactRepo, MemoryJobRepo};
use modporter_events::ProgressBus;
use modporter_pipeline::ConversionPipeline;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modporter_api::config::ServerConfig;
use modporter_api::engine::JobManager;
use modporter_api::router::build_app_router;
use modporter_api::state::AppState;

/// Per-job live buffer of the progress bus.
const PROGRESS_BUFFER: usize = 256;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "modporter_api=debug,modporter_pipeline=debug,modporter_events=info,tower_http=debug"
            .into()
    });
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Rule table ---
    let rules = match &config.assumption_rules_path {
        Some(path) => RuleTable::load_from_path(path),
        None => RuleTable::builtin(),
    }
    .expect("Failed to load assumption rule table");
    tracing::info!(
        version = %rules.version,
        direct_mappings = rules.direct_mappings.len(),
        rules = rules.rules.len(),
        "Assumption rule table loaded",
    );

    // --- Job engine ---
    let bus = Arc::new(ProgressBus::new(PROGRESS_BUFFER));
    let pipeline = ConversionPipeline::standard(Duration::from_secs(config.stage_timeout_secs));
    let jobs = Arc::new(JobManager::new(
        Arc::new(MemoryJobRepo::new()),
        Arc::new(MemoryArtifactRepo::new()),
        bus,
        pipeline,
        Arc::new(rules),
    ));
    tracing::info!(stage_timeout_secs = config.stage_timeout_secs, "Job manager started");

    // --- App state ---
    let shutdown = CancellationToken::new();
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let state = AppState {
        config: Arc::new(config.clone()),
        jobs: Arc::clone(&jobs),
        shutdown: shutdown.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Serve ---
    let addr = SocketAddr::new(config.host.parse().expect("Invalid HOST"), config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Progress sockets watch this token; cancelling it again is a no-op.
    shutdown.cancel();

    if jobs.shutdown(shutdown_timeout).await {
        tracing::info!("All conversion runs stopped");
    } else {
        tracing::warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Conversion runs still active at shutdown deadline",
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix). Cancels `sockets`
/// as soon as the signal arrives so open progress streams close while the
/// server drains.
async fn shutdown_signal(sockets: CancellationToken) {
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

    sockets.cancel();
}
