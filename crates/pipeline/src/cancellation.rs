//! Cooperative, per-job cancellation signals.
//!
//! A job is registered when its run is dispatched and cleared when it
//! reaches a terminal state. The pipeline only looks at the signal at stage
//! boundaries, so a running stage always finishes (or fails) on its own.

use std::collections::HashMap;

use modporter_core::types::JobId;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct CancellationController {
    tokens: RwLock<HashMap<JobId, CancellationToken>>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a job. Re-registering keeps the existing token.
    pub async fn register(&self, job_id: JobId) -> CancellationToken {
        self.tokens
            .write()
            .await
            .entry(job_id)
            .or_default()
            .clone()
    }

    /// Signal cancellation. Idempotent; returns `false` when the job is not
    /// tracked (unknown or already terminal).
    pub async fn request_cancel(&self, job_id: JobId) -> bool {
        match self.tokens.read().await.get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_cancel_requested(&self, job_id: JobId) -> bool {
        self.tokens
            .read()
            .await
            .get(&job_id)
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Forget a job once it is terminal.
    pub async fn clear(&self, job_id: JobId) {
        self.tokens.write().await.remove(&job_id);
    }

    /// Signal every tracked job. Used on shutdown.
    pub async fn cancel_all(&self) -> usize {
        let tokens = self.tokens.read().await;
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Number of tracked jobs.
    pub async fn tracked(&self) -> usize {
        self.tokens.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_idempotent_and_observable() {
        let controller = CancellationController::new();
        let job = JobId::new_v4();
        let token = controller.register(job).await;

        assert!(!controller.is_cancel_requested(job).await);
        assert!(controller.request_cancel(job).await);
        assert!(controller.request_cancel(job).await);
        assert!(controller.is_cancel_requested(job).await);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn unknown_and_cleared_jobs_are_noops() {
        let controller = CancellationController::new();
        let job = JobId::new_v4();
        assert!(!controller.request_cancel(job).await);
        assert!(!controller.is_cancel_requested(job).await);

        controller.register(job).await;
        controller.request_cancel(job).await;
        controller.clear(job).await;
        assert!(!controller.is_cancel_requested(job).await);
        assert_eq!(controller.tracked().await, 0);
    }

    #[tokio::test]
    async fn register_twice_shares_the_signal() {
        let controller = CancellationController::new();
        let job = JobId::new_v4();
        let first = controller.register(job).await;
        let second = controller.register(job).await;
        controller.request_cancel(job).await;
        assert!(first.is_cancelled() && second.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_all_signals_every_job() {
        let controller = CancellationController::new();
        let a = JobId::new_v4();
        let b = JobId::new_v4();
        controller.register(a).await;
        controller.register(b).await;
        assert_eq!(controller.cancel_all().await, 2);
        assert!(controller.is_cancel_requested(a).await);
        assert!(controller.is_cancel_requested(b).await);
    }
}
