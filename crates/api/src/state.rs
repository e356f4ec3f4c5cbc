use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::engine::JobManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Conversion job manager (submission, control, progress).
    pub jobs: Arc<JobManager>,
    /// Cancelled on server shutdown; closes open progress sockets.
    pub shutdown: CancellationToken,
}
