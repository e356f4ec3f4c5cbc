#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use modporter_core::artifact::{AssetEntry, AssetKind, JavaClass, ModArtifact};
use modporter_core::assumptions::RuleTable;
use modporter_core::types::JobId;
use modporter_db::models::job::Job;
use modporter_db::{JobRepo, MemoryArtifactRepo, MemoryJobRepo};
use modporter_events::ProgressBus;
use modporter_pipeline::ConversionPipeline;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use modporter_api::config::ServerConfig;
use modporter_api::engine::JobManager;
use modporter_api::router::build_app_router;
use modporter_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        stage_timeout_secs: 5,
        assumption_rules_path: None,
        status_poll_interval_ms: 2000,
        shutdown_timeout_secs: 5,
    }
}

/// A job manager over in-memory stores running the given pipeline.
pub fn manager_with(pipeline: ConversionPipeline) -> Arc<JobManager> {
    manager_with_repo(Arc::new(MemoryJobRepo::new()), pipeline)
}

/// A job manager storing job records in `jobs`.
pub fn manager_with_repo(jobs: Arc<dyn JobRepo>, pipeline: ConversionPipeline) -> Arc<JobManager> {
    Arc::new(JobManager::new(
        jobs,
        Arc::new(MemoryArtifactRepo::new()),
        Arc::new(ProgressBus::new(64)),
        pipeline,
        Arc::new(RuleTable::builtin().expect("builtin rule table")),
    ))
}

/// A job manager running the production stages.
pub fn manager() -> Arc<JobManager> {
    manager_with(ConversionPipeline::standard(Duration::from_secs(5)))
}

/// Build the full application router around `jobs`, using the same
/// middleware stack as production.
pub fn build_test_app_with(jobs: Arc<JobManager>) -> Router {
    let config = test_config();
    let state = AppState {
        config: Arc::new(config.clone()),
        jobs,
        shutdown: CancellationToken::new(),
    };
    build_app_router(state, &config)
}

pub fn build_test_app() -> Router {
    build_test_app_with(manager())
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: Router, uri: &str) -> Response {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response {
    send(app, Method::POST, uri, Body::from(json.to_string())).await
}

/// POST an arbitrary (possibly malformed) JSON body.
pub async fn post_raw(app: Router, uri: &str, body: &'static str) -> Response {
    send(app, Method::POST, uri, Body::from(body)).await
}

async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn class(name: &str, superclass: &str) -> JavaClass {
    JavaClass {
        name: name.into(),
        superclass: Some(superclass.into()),
        interfaces: vec![],
    }
}

fn asset(path: &str, kind: AssetKind) -> AssetEntry {
    AssetEntry {
        path: path.into(),
        kind,
    }
}

/// A block with a texture plus a custom dimension.
pub fn gem_mod() -> ModArtifact {
    ModArtifact {
        mod_id: "gems".into(),
        name: "Gems".into(),
        version: "1.2.0".into(),
        loader: Some("forge".into()),
        java_classes: vec![
            class("com.ex.gems.RubyBlock", "net.minecraft.world.level.block.Block"),
            class("com.ex.gems.CrystalDimension", "com.ex.gems.BaseChunkGenerator"),
        ],
        assets: vec![
            asset("assets/gems/textures/block/ruby_block.png", AssetKind::Texture),
            asset("assets/gems/lang/en_us.json", AssetKind::Lang),
        ],
        dependencies: vec![],
    }
}

/// Nothing but client-side rendering: every feature is excluded.
pub fn renderer_only_mod() -> ModArtifact {
    ModArtifact {
        mod_id: "shiny".into(),
        name: "Shiny".into(),
        version: "0.3.0".into(),
        loader: Some("fabric".into()),
        java_classes: vec![class(
            "com.ex.shiny.GlowRenderer",
            "net.minecraft.client.BlockEntityRenderer",
        )],
        assets: vec![],
        dependencies: vec![],
    }
}

/// Wait until the job reaches a terminal state.
pub async fn wait_terminal(jobs: &JobManager, job_id: JobId) -> Job {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let job = jobs.get_status(job_id).await.unwrap();
            if job.status.is_terminal() && !jobs.is_running(job_id) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}
