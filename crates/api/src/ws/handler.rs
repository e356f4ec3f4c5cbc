use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use modporter_core::job_events::MSG_TYPE_PONG;
use modporter_core::types::JobId;
use modporter_events::{wire, Subscription};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;
use crate::handlers::conversions::SinceQuery;
use crate::state::AppState;

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Outbound frames buffered per connection.
const OUTBOUND_BUFFER: usize = 64;

/// GET /api/v1/conversions/{id}/ws?since=N
///
/// Subscribes before upgrading so an unknown job is a plain 404 rather
/// than a socket that closes immediately.
pub async fn progress_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Query(query): Query<SinceQuery>,
) -> AppResult<impl IntoResponse> {
    let subscription = state.jobs.subscribe(job_id, query.since).await?;
    let subscribers = state.jobs.subscriber_count(job_id).await;
    tracing::debug!(
        %job_id,
        subscribers,
        "Progress subscription opened",
    );
    let shutdown = state.shutdown.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, subscription, shutdown)))
}

/// Manage a single progress socket after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Spawns a sender task that drains the outbound channel into the sink.
///   2. Spawns the event forwarder (events, heartbeat, shutdown).
///   3. Spawns the inbound reader (client pings, close).
///   4. Tears everything down once the forwarder or the reader finishes.
async fn handle_socket(socket: WebSocket, subscription: Subscription, shutdown: CancellationToken) {
    let job_id = subscription.job_id();
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, %job_id, "Progress socket connected");

    let (mut sink, stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Progress socket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut forward = tokio::spawn(forward_events(subscription, tx.clone(), shutdown));
    let mut receive = tokio::spawn(read_inbound(stream, tx, conn_id.clone()));

    tokio::select! {
        _ = &mut forward => receive.abort(),
        _ = &mut receive => forward.abort(),
    }

    // Both producers are gone; the sender flushes what is queued and exits.
    if tokio::time::timeout(Duration::from_secs(5), send_task).await.is_err() {
        tracing::debug!(conn_id = %conn_id, "Progress socket sender did not drain in time");
    }
    tracing::info!(conn_id = %conn_id, %job_id, "Progress socket disconnected");
}

/// Push events in wire format until the terminal event, then close.
async fn forward_events(
    mut subscription: Subscription,
    tx: mpsc::Sender<Message>,
    shutdown: CancellationToken,
) {
    let job_id = subscription.job_id();
    let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::debug!(%job_id, "Closing progress socket for shutdown");
                break;
            }
            _ = heartbeat.tick() => {
                if tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    return;
                }
            }
            event = subscription.next() => {
                let Some(event) = event else { break };
                let text = wire::to_wire_text(&event);
                if tx.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
                if event.event_type.is_terminal() {
                    break;
                }
            }
        }
    }

    let _ = tx.send(Message::Close(None)).await;
}

/// Answer client pings; everything else inbound is ignored.
async fn read_inbound(
    mut stream: SplitStream<WebSocket>,
    tx: mpsc::Sender<Message>,
    conn_id: String,
) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) if text.as_str().trim() == "ping" => {
                let pong = serde_json::json!({ "type": MSG_TYPE_PONG }).to_string();
                if tx.send(Message::Text(pong.into())).await.is_err() {
                    break;
                }
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Progress socket receive error");
                break;
            }
        }
    }
}
