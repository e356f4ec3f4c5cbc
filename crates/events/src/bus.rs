//! Per-job progress channels.
//!
//! Every job gets a [`JobChannel`]: an append-only log of
//! [`ProgressEvent`]s (indexed by `sequence_number - 1`), the latest job
//! snapshot, and a `tokio::sync::broadcast` sender for live fan-out.
//! Appending to the log, updating the snapshot and sending happen under
//! one write lock, so a subscriber that snapshots the log and subscribes
//! under the read lock sees every event exactly once.
//!
//! Publishing a terminal event seals the channel: later publishes fail with
//! [`BroadcastError::AlreadyTerminal`] and the broadcast sender is dropped,
//! which ends every live [`Subscription`] after it has delivered the
//! terminal event. The log itself stays readable until [`ProgressBus::remove`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use modporter_core::types::{JobId, SequenceNumber};
use modporter_db::models::job::Job;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::event::{EventType, ProgressEvent, ProgressUpdate};
use crate::subscription::Subscription;

/// Default per-job buffer capacity for live fan-out.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("No progress channel for job {0}")]
    UnknownJob(JobId),

    #[error("Progress channel for job {0} already exists")]
    ChannelExists(JobId),

    #[error("Job {0} already published its terminal event")]
    AlreadyTerminal(JobId),

    #[error("connection_established is generated per subscriber and cannot be published")]
    NotPublishable,
}

/// Latest state of a job as seen by the broadcast service.
#[derive(Debug, Clone, Serialize)]
pub struct PollSnapshot {
    pub job: Job,
    /// Sequence number of the newest logged event (0 when none yet).
    pub latest_sequence: SequenceNumber,
    /// Whether anything was published after the caller's `since`.
    pub has_updates: bool,
    pub terminal: bool,
}

pub(crate) struct ChannelState {
    pub(crate) log: Vec<ProgressEvent>,
    pub(crate) snapshot: Job,
    pub(crate) sender: Option<broadcast::Sender<ProgressEvent>>,
}

impl ChannelState {
    fn is_terminal(&self) -> bool {
        self.log.last().is_some_and(|e| e.event_type.is_terminal())
    }

    pub(crate) fn events_after(&self, since: SequenceNumber) -> Vec<ProgressEvent> {
        // Sequence numbers start at 1, so event `n` sits at index `n - 1`.
        let start = usize::try_from(since).unwrap_or(usize::MAX).min(self.log.len());
        self.log[start..].to_vec()
    }
}

/// One job's log, snapshot and live sender.
pub(crate) struct JobChannel {
    pub(crate) job_id: JobId,
    pub(crate) state: RwLock<ChannelState>,
}

/// Registry of per-job progress channels.
///
/// Shared as `Arc<ProgressBus>`; channels are opened by the job manager on
/// submission and removed when the job record is deleted.
pub struct ProgressBus {
    channels: RwLock<HashMap<JobId, Arc<JobChannel>>>,
    capacity: usize,
}

impl ProgressBus {
    /// Create a bus whose per-job live buffers hold `capacity` events.
    ///
    /// A subscriber that falls further behind than that recovers the
    /// missed events from the log.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Open the channel for a newly created job.
    pub async fn open(&self, job: &Job) -> Result<(), BroadcastError> {
        let mut channels = self.channels.write().await;
        if channels.contains_key(&job.job_id) {
            return Err(BroadcastError::ChannelExists(job.job_id));
        }
        let (sender, _) = broadcast::channel(self.capacity);
        channels.insert(
            job.job_id,
            Arc::new(JobChannel {
                job_id: job.job_id,
                state: RwLock::new(ChannelState {
                    log: Vec::new(),
                    snapshot: job.clone(),
                    sender: Some(sender),
                }),
            }),
        );
        Ok(())
    }

    async fn channel(&self, job_id: JobId) -> Result<Arc<JobChannel>, BroadcastError> {
        self.channels
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(BroadcastError::UnknownJob(job_id))
    }

    /// Append an event for `job` and deliver it to live subscribers.
    ///
    /// `job` is the record after the mutation this event reports; it becomes
    /// the snapshot returned by [`ProgressBus::poll`].
    pub async fn publish(
        &self,
        job: &Job,
        event_type: EventType,
        update: ProgressUpdate,
    ) -> Result<ProgressEvent, BroadcastError> {
        if event_type == EventType::ConnectionEstablished {
            return Err(BroadcastError::NotPublishable);
        }

        let channel = self.channel(job.job_id).await?;
        let mut state = channel.state.write().await;
        if state.is_terminal() {
            return Err(BroadcastError::AlreadyTerminal(job.job_id));
        }

        let event = ProgressEvent {
            job_id: job.job_id,
            sequence_number: state.log.len() as SequenceNumber + 1,
            event_type,
            payload: update,
            timestamp: Utc::now(),
        };
        state.log.push(event.clone());
        state.snapshot = job.clone();

        if let Some(sender) = &state.sender {
            // A send error only means nobody is listening right now.
            let _ = sender.send(event.clone());
        }

        if event_type.is_terminal() {
            // Dropping the sender ends live subscriptions once drained.
            state.sender = None;
            tracing::debug!(
                job_id = %job.job_id,
                sequence = event.sequence_number,
                event_type = event_type.as_str(),
                "Progress channel sealed",
            );
        }

        Ok(event)
    }

    /// Subscribe to a job's events.
    ///
    /// The subscription first yields `connection_established`, then every
    /// logged event after `since` (all of them when `None`), then live
    /// events until the terminal one.
    pub async fn subscribe(
        &self,
        job_id: JobId,
        since: Option<SequenceNumber>,
    ) -> Result<Subscription, BroadcastError> {
        let channel = self.channel(job_id).await?;
        let since = since.unwrap_or(0);

        let state = channel.state.read().await;
        let backlog = state.events_after(since);
        let receiver = state.sender.as_ref().map(broadcast::Sender::subscribe);
        let handshake = ProgressEvent {
            job_id,
            sequence_number: state.log.len() as SequenceNumber,
            event_type: EventType::ConnectionEstablished,
            payload: ProgressUpdate::new()
                .with_status(state.snapshot.status.as_str())
                .with_progress(state.snapshot.progress)
                .with_message("Connected to conversion progress stream"),
            timestamp: Utc::now(),
        };
        drop(state);

        Ok(Subscription::new(
            Arc::clone(&channel),
            handshake,
            backlog,
            receiver,
            since,
        ))
    }

    /// Logged events after `since`, for replay without a live subscription.
    pub async fn events_since(
        &self,
        job_id: JobId,
        since: SequenceNumber,
    ) -> Result<Vec<ProgressEvent>, BroadcastError> {
        let channel = self.channel(job_id).await?;
        let state = channel.state.read().await;
        Ok(state.events_after(since))
    }

    /// Pull-based status: the latest job snapshot.
    ///
    /// The snapshot is updated together with the log, so it is at least as
    /// recent as any event a subscriber has already received.
    pub async fn poll(
        &self,
        job_id: JobId,
        since: SequenceNumber,
    ) -> Result<PollSnapshot, BroadcastError> {
        let channel = self.channel(job_id).await?;
        let state = channel.state.read().await;
        let latest_sequence = state.log.len() as SequenceNumber;
        Ok(PollSnapshot {
            job: state.snapshot.clone(),
            latest_sequence,
            has_updates: latest_sequence > since,
            terminal: state.is_terminal(),
        })
    }

    /// Number of live receivers on a job's channel.
    pub async fn subscriber_count(&self, job_id: JobId) -> usize {
        match self.channel(job_id).await {
            Ok(channel) => channel
                .state
                .read()
                .await
                .sender
                .as_ref()
                .map_or(0, broadcast::Sender::receiver_count),
            Err(_) => 0,
        }
    }

    /// Drop a job's channel and log. Returns `false` if there was none.
    pub async fn remove(&self, job_id: JobId) -> bool {
        let removed = self.channels.write().await.remove(&job_id);
        match removed {
            Some(channel) => {
                // Outstanding subscriptions end instead of waiting forever.
                channel.state.write().await.sender = None;
                true
            }
            None => false,
        }
    }

    /// Number of open channels.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
