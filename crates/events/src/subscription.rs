//! Live subscription to one job's progress events.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use modporter_core::types::{JobId, SequenceNumber};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::bus::JobChannel;
use crate::event::ProgressEvent;

/// Ordered, gap-free view of a job's events for one consumer.
///
/// Yields `connection_established`, then the replayed backlog, then live
/// events. Events are delivered in strictly increasing sequence order with
/// no duplicates; if the live buffer overflows the subscription re-reads
/// the missed range from the log. The subscription ends right after the
/// terminal event.
pub struct Subscription {
    channel: Arc<JobChannel>,
    handshake: Option<ProgressEvent>,
    backlog: VecDeque<ProgressEvent>,
    receiver: Option<broadcast::Receiver<ProgressEvent>>,
    last_seen: SequenceNumber,
    finished: bool,
}

impl Subscription {
    pub(crate) fn new(
        channel: Arc<JobChannel>,
        handshake: ProgressEvent,
        backlog: Vec<ProgressEvent>,
        receiver: Option<broadcast::Receiver<ProgressEvent>>,
        since: SequenceNumber,
    ) -> Self {
        Self {
            channel,
            handshake: Some(handshake),
            backlog: backlog.into(),
            receiver,
            last_seen: since,
            finished: false,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.channel.job_id
    }

    /// Sequence number of the last logged event handed out.
    pub fn last_seen(&self) -> SequenceNumber {
        self.last_seen
    }

    /// Next event, or `None` once the terminal event has been delivered
    /// (or the channel was removed).
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if let Some(handshake) = self.handshake.take() {
            return Some(handshake);
        }

        loop {
            if self.finished {
                return None;
            }

            if let Some(event) = self.backlog.pop_front() {
                if event.sequence_number <= self.last_seen {
                    continue;
                }
                self.last_seen = event.sequence_number;
                if event.event_type.is_terminal() {
                    self.finished = true;
                    self.receiver = None;
                }
                return Some(event);
            }

            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(event) => self.backlog.push_back(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        job_id = %self.channel.job_id,
                        skipped,
                        "Progress subscriber lagged, replaying from log",
                    );
                    self.refill_from_log().await;
                }
                Err(RecvError::Closed) => {
                    // Sealed or removed: whatever remains is in the log.
                    self.receiver = None;
                    self.refill_from_log().await;
                }
            }
        }
    }

    async fn refill_from_log(&mut self) {
        let state = self.channel.state.read().await;
        self.backlog = state.events_after(self.last_seen).into();
    }

    /// Adapt into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|event| (event, sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use modporter_core::conversion::ConversionOptions;
    use modporter_db::models::job::Job;

    use super::*;
    use crate::bus::ProgressBus;
    use crate::event::{EventType, ProgressUpdate};

    fn job() -> Job {
        Job::new("file-1", ConversionOptions::default())
    }

    fn step(p: u8) -> ProgressUpdate {
        ProgressUpdate::new().with_progress(p)
    }

    async fn collect(sub: Subscription) -> Vec<ProgressEvent> {
        tokio::time::timeout(Duration::from_secs(5), sub.into_stream().collect::<Vec<_>>())
            .await
            .expect("subscription should end after the terminal event")
    }

    #[tokio::test]
    async fn handshake_comes_first_then_live_events_until_terminal() {
        let bus = ProgressBus::default();
        let j = job();
        bus.open(&j).await.unwrap();

        let sub = bus.subscribe(j.job_id, None).await.unwrap();
        bus.publish(&j, EventType::AgentProgress, step(10)).await.unwrap();
        bus.publish(&j, EventType::AgentProgress, step(20)).await.unwrap();
        bus.publish(&j, EventType::ConversionComplete, step(100)).await.unwrap();

        let events = collect(sub).await;
        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::ConnectionEstablished,
                EventType::AgentProgress,
                EventType::AgentProgress,
                EventType::ConversionComplete,
            ]
        );
        assert_eq!(events[0].sequence_number, 0);
        assert_eq!(
            events[1..].iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn late_subscriber_replays_from_since() {
        let bus = ProgressBus::default();
        let j = job();
        bus.open(&j).await.unwrap();
        for p in [10, 20, 30] {
            bus.publish(&j, EventType::AgentProgress, step(p)).await.unwrap();
        }

        let mut sub = bus.subscribe(j.job_id, Some(2)).await.unwrap();
        let handshake = sub.next().await.unwrap();
        assert_eq!(handshake.event_type, EventType::ConnectionEstablished);
        assert_eq!(handshake.sequence_number, 3);

        let replayed = sub.next().await.unwrap();
        assert_eq!(replayed.sequence_number, 3);

        bus.publish(&j, EventType::ConversionFailed, ProgressUpdate::new())
            .await
            .unwrap();
        let terminal = sub.next().await.unwrap();
        assert_eq!(terminal.event_type, EventType::ConversionFailed);
        assert!(sub.next().await.is_none());
        assert_eq!(sub.last_seen(), 4);
    }

    #[tokio::test]
    async fn subscribing_after_terminal_replays_and_ends() {
        let bus = ProgressBus::default();
        let j = job();
        bus.open(&j).await.unwrap();
        bus.publish(&j, EventType::AgentProgress, step(10)).await.unwrap();
        bus.publish(&j, EventType::ConversionCancelled, ProgressUpdate::new())
            .await
            .unwrap();

        let events = collect(bus.subscribe(j.job_id, None).await.unwrap()).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events.last().unwrap().event_type, EventType::ConversionCancelled);
    }

    #[tokio::test]
    async fn concurrent_subscribers_see_identical_sequences() {
        let bus = Arc::new(ProgressBus::default());
        let j = job();
        bus.open(&j).await.unwrap();

        let subs: Vec<_> = futures::future::join_all(
            (0..4).map(|_| bus.subscribe(j.job_id, None)),
        )
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

        let publisher = {
            let bus = Arc::clone(&bus);
            let j = j.clone();
            tokio::spawn(async move {
                for p in 1..=50u8 {
                    bus.publish(&j, EventType::AgentProgress, step(p)).await.unwrap();
                    tokio::task::yield_now().await;
                }
                bus.publish(&j, EventType::ConversionComplete, step(100)).await.unwrap();
            })
        };

        let handles: Vec<_> = subs
            .into_iter()
            .map(|s| tokio::spawn(collect(s)))
            .collect();
        publisher.await.unwrap();

        let mut sequences = Vec::new();
        for h in handles {
            let events = h.await.unwrap();
            sequences.push(
                events
                    .iter()
                    .skip(1)
                    .map(|e| (e.sequence_number, e.event_type))
                    .collect::<Vec<_>>(),
            );
        }
        assert_eq!(sequences[0].len(), 51);
        assert!(sequences.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn lagging_subscriber_recovers_from_log() {
        let bus = ProgressBus::new(2);
        let j = job();
        bus.open(&j).await.unwrap();

        let sub = bus.subscribe(j.job_id, None).await.unwrap();
        for p in 1..=20u8 {
            bus.publish(&j, EventType::AgentProgress, step(p)).await.unwrap();
        }
        bus.publish(&j, EventType::ConversionComplete, step(100)).await.unwrap();

        let events = collect(sub).await;
        let seqs: Vec<_> = events.iter().skip(1).map(|e| e.sequence_number).collect();
        assert_eq!(seqs, (1..=21).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn removed_channel_ends_subscription() {
        let bus = ProgressBus::default();
        let j = job();
        bus.open(&j).await.unwrap();
        let mut sub = bus.subscribe(j.job_id, None).await.unwrap();
        assert!(sub.next().await.is_some());

        bus.publish(&j, EventType::ConversionComplete, ProgressUpdate::new())
            .await
            .unwrap();
        bus.remove(j.job_id).await;

        // The subscription holds the channel, so the terminal event still arrives.
        assert_eq!(
            sub.next().await.unwrap().event_type,
            EventType::ConversionComplete
        );
        assert!(sub.next().await.is_none());
    }
}
