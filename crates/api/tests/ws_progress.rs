//! Progress WebSocket tests against a real listener.
//!
//! The router is served on an ephemeral port and driven with a
//! `tokio-tungstenite` client, so upgrade, framing and close behaviour are
//! exercised end to end.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use modporter_core::artifact::ModArtifact;
use modporter_core::conversion::ConversionOptions;
use modporter_core::types::JobId;
use modporter_db::models::job::SubmitConversion;
use modporter_db::models::status::JobStatus;
use modporter_pipeline::{ConversionPipeline, Stage, StageContext, StageError, StageResult};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use modporter_api::engine::JobManager;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(jobs: Arc<JobManager>) -> SocketAddr {
    let app = common::build_test_app_with(jobs);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn ws_url(addr: SocketAddr, job_id: JobId, query: &str) -> String {
    format!("ws://{addr}/api/v1/conversions/{job_id}/ws{query}")
}

async fn connect(addr: SocketAddr, job_id: JobId, query: &str) -> Socket {
    let (socket, _) = connect_async(ws_url(addr, job_id, query)).await.unwrap();
    socket
}

/// Next text frame as JSON; `None` once the server has closed the socket.
async fn next_json(socket: &mut Socket) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(10), socket.next())
            .await
            .expect("no frame in time")?;
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

async fn drain(socket: &mut Socket) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Some(frame) = next_json(socket).await {
        frames.push(frame);
    }
    frames
}

async fn submitted(jobs: &Arc<JobManager>, artifact: ModArtifact) -> JobId {
    let file_id = jobs.register_artifact(artifact).await.unwrap();
    let job = jobs
        .submit(SubmitConversion {
            file_id: Some(file_id),
            options: ConversionOptions::default(),
        })
        .await
        .unwrap();
    job.job_id
}

/// Holds its stage open until released.
struct HoldStage {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Stage for HoldStage {
    fn name(&self) -> &'static str {
        "Hold"
    }

    fn status(&self) -> JobStatus {
        JobStatus::Analyzing
    }

    fn progress_start(&self) -> u8 {
        0
    }

    async fn execute(&self, _ctx: &mut StageContext) -> Result<StageResult, StageError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(StageResult::new(40, "Released"))
    }
}

// ---------------------------------------------------------------------------
// Replay and close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replays_history_and_closes_after_the_terminal_event() {
    let jobs = common::manager();
    let job_id = submitted(&jobs, common::gem_mod()).await;
    common::wait_terminal(&jobs, job_id).await;
    let addr = serve(Arc::clone(&jobs)).await;

    let mut socket = connect(addr, job_id, "").await;
    let frames = drain(&mut socket).await;

    assert_eq!(frames[0]["type"], "connection_established");
    assert_eq!(frames[0]["data"]["status"], "COMPLETED");

    let sequences: Vec<u64> = frames[1..]
        .iter()
        .map(|f| f["data"]["sequence"].as_u64().unwrap())
        .collect();
    assert_eq!(sequences, (1..=sequences.len() as u64).collect::<Vec<_>>());
    assert!(frames
        .iter()
        .all(|f| f["data"]["job_id"] == job_id.to_string()));

    let last = frames.last().unwrap();
    assert_eq!(last["type"], "conversion_complete");
    assert_eq!(last["data"]["progress"], 100);
}

#[tokio::test]
async fn resumes_after_the_last_seen_sequence() {
    let jobs = common::manager();
    let job_id = submitted(&jobs, common::gem_mod()).await;
    common::wait_terminal(&jobs, job_id).await;
    let addr = serve(Arc::clone(&jobs)).await;

    let mut socket = connect(addr, job_id, "?since=5").await;
    let frames = drain(&mut socket).await;

    assert_eq!(frames[0]["type"], "connection_established");
    assert_eq!(frames[1]["data"]["sequence"], 6);
    assert_eq!(frames.last().unwrap()["type"], "conversion_complete");
}

// ---------------------------------------------------------------------------
// Live run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn live_socket_answers_pings_and_follows_the_run_to_its_end() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let jobs = common::manager_with(ConversionPipeline::new(
        vec![Arc::new(HoldStage {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        })],
        Duration::from_secs(5),
    ));
    let job_id = submitted(&jobs, common::gem_mod()).await;
    entered.notified().await;
    let addr = serve(Arc::clone(&jobs)).await;

    let mut socket = connect(addr, job_id, "").await;
    let first = next_json(&mut socket).await.unwrap();
    assert_eq!(first["type"], "connection_established");
    assert_eq!(first["data"]["status"], "ANALYZING");

    socket.send(Message::Text("ping".into())).await.unwrap();
    let mut before_pong = Vec::new();
    loop {
        let frame = next_json(&mut socket).await.expect("socket still open");
        if frame["type"] == "pong" {
            break;
        }
        before_pong.push(frame);
    }
    assert!(before_pong
        .iter()
        .all(|f| f["type"] == "agent_progress" && f["data"]["agent"] == "Hold"));

    release.notify_one();
    let rest = drain(&mut socket).await;
    let last = rest.last().unwrap();
    // The stage never produced a package.
    assert_eq!(last["type"], "conversion_failed");
    assert_eq!(last["data"]["details"]["stage"], "PackagingAgent");
}

#[tokio::test]
async fn unknown_job_is_rejected_before_upgrade() {
    let addr = serve(common::manager()).await;

    let result = connect_async(ws_url(addr, JobId::new_v4(), "")).await;
    assert_matches!(result, Err(WsError::Http(response)) if response.status().as_u16() == 404);
}
