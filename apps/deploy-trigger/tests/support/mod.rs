#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use deploy_trigger::DeployConfig;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const APP_MANIFEST: &str = r#"
manifesto:
  kind: application
  spec:
    id: abc
versionTag: "1.0"
isApi: false
envId: e1
workspaceId: w1
"#;

#[derive(Debug, Clone)]
pub struct DeployCall {
    pub kind: String,
    pub body: Value,
    pub bearer: Option<String>,
}

/// Scripted identity provider and runtime manager.
#[derive(Debug)]
pub struct StubState {
    pub token_status: StatusCode,
    pub tokens_issued: u32,
    pub deploy_status: StatusCode,
    pub deploy_calls: Vec<DeployCall>,
    pub skip_status: StatusCode,
    pub skip_calls: Vec<String>,
    /// Served in order; once drained every query answers RUNNING.
    pub statuses: VecDeque<(StatusCode, Value)>,
    pub status_calls: Vec<(String, Option<String>)>,
}

impl Default for StubState {
    fn default() -> Self {
        Self {
            token_status: StatusCode::OK,
            tokens_issued: 0,
            deploy_status: StatusCode::CREATED,
            deploy_calls: Vec::new(),
            skip_status: StatusCode::NO_CONTENT,
            skip_calls: Vec::new(),
            statuses: VecDeque::new(),
            status_calls: Vec::new(),
        }
    }
}

pub type SharedStub = Arc<Mutex<StubState>>;

pub fn status_body(status: &str) -> (StatusCode, Value) {
    (StatusCode::OK, json!({ "status": status, "tasks": [] }))
}

pub fn forbidden() -> (StatusCode, Value) {
    (StatusCode::FORBIDDEN, json!({ "error": "token expired" }))
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

async fn issue_token(State(stub): State<SharedStub>) -> (StatusCode, Json<Value>) {
    let mut guard = stub.lock().unwrap();
    if guard.token_status != StatusCode::OK {
        return (guard.token_status, Json(json!({ "error": "invalid_client" })));
    }
    guard.tokens_issued += 1;
    (
        StatusCode::OK,
        Json(json!({ "access_token": format!("tok-{}", guard.tokens_issued) })),
    )
}

async fn deploy(
    State(stub): State<SharedStub>,
    UrlPath(kind): UrlPath<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut guard = stub.lock().unwrap();
    guard.deploy_calls.push(DeployCall {
        kind,
        body,
        bearer: bearer(&headers),
    });
    if guard.deploy_status != StatusCode::CREATED {
        return (guard.deploy_status, Json(json!({ "message": "rejected" })));
    }
    (
        StatusCode::CREATED,
        Json(json!({
            "runId": "r1",
            "runType": "DEPLOY",
            "tasks": [{ "id": "t1" }]
        })),
    )
}

async fn skip(State(stub): State<SharedStub>, UrlPath(run_id): UrlPath<String>) -> (StatusCode, String) {
    let mut guard = stub.lock().unwrap();
    guard.skip_calls.push(run_id);
    let status = guard.skip_status;
    let body = if status.is_server_error() {
        json!({ "status": "ERROR", "details": "skip evaluation crashed" }).to_string()
    } else {
        String::new()
    };
    (status, body)
}

async fn run_status(
    State(stub): State<SharedStub>,
    UrlPath(run_id): UrlPath<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let mut guard = stub.lock().unwrap();
    guard.status_calls.push((run_id, bearer(&headers)));
    let (status, body) = guard
        .statuses
        .pop_front()
        .unwrap_or_else(|| status_body("RUNNING"));
    (status, Json(body))
}

/// Serves the identity provider under `/iam` and the runtime manager under
/// `/v2`. Returns the server origin.
pub async fn spawn_stub(stub: SharedStub) -> String {
    let router = Router::new()
        .route("/iam/:realm/oidc/oauth/token", post(issue_token))
        .route("/v2/run/self-hosted/deploy/:kind", post(deploy))
        .route("/v2/run/self-hosted/skip-deploy/:run_id", patch(skip))
        .route("/v2/run/run-status/:run_id", get(run_status))
        .with_state(stub);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{addr}")
}

pub fn write_manifest(dir: &Path, text: &str) {
    std::fs::write(dir.join("manifest.yaml"), text).expect("write manifest");
}

/// Step configuration pointing at the stub, with a fast poll interval.
pub fn test_config(origin: &str, action_path: &Path, extra: &[(&str, &str)]) -> DeployConfig {
    let mut vars: HashMap<String, String> = [
        ("ACTION_PATH", action_path.to_string_lossy().into_owned()),
        ("CLIENT_ID", "client".into()),
        ("CLIENT_KEY", "secret".into()),
        ("CLIENT_REALM", "acme".into()),
        ("TF_STATE_BUCKET_NAME", "state-bucket".into()),
        ("TF_STATE_REGION", "us-east-1".into()),
        ("IAC_BUCKET_NAME", "iac-bucket".into()),
        ("IAC_REGION", "us-east-1".into()),
        ("GITHUB_SERVER_URL", "https://github.com".into()),
        ("GITHUB_REPOSITORY", "acme/payments".into()),
        ("GITHUB_RUN_ID", "42".into()),
        ("IAM_BASE_URL", format!("{origin}/iam")),
        ("RUNTIME_MANAGER_URL", format!("{origin}/v2")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }
    let mut config = DeployConfig::from_lookup(|name| vars.get(name).cloned()).expect("config");
    config.poll.interval = Duration::from_millis(10);
    config
}
