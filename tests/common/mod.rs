//! Common test utilities and helpers
#![allow(dead_code)]

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use claude_pipe::events::PipeEvent;
use claude_pipe::process::WorkerProgram;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// One request seen by the [`Receiver`].
#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

/// In-process HTTP endpoint recording everything posted to it.
///
/// `POST /hook` answers 200, `POST /fail` answers 500.
pub struct Receiver {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl Receiver {
    pub async fn start() -> Self {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/hook", post(accept))
            .route("/fail", post(reject))
            .with_state(Arc::clone(&captured));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, captured }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn captured(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }

    /// Wait until at least `count` requests arrived.
    pub async fn wait_for(&self, count: usize) -> Vec<Captured> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let captured = self.captured();
                if captured.len() >= count {
                    return captured;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("receiver did not get the expected requests")
    }
}

type Shared = State<Arc<Mutex<Vec<Captured>>>>;

fn capture(state: &Shared, path: &str, headers: &HeaderMap, body: serde_json::Value) {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.lock().unwrap().push(Captured {
        path: path.to_string(),
        authorization,
        body,
    });
}

async fn accept(state: Shared, headers: HeaderMap, Json(body): Json<serde_json::Value>) -> StatusCode {
    capture(&state, "/hook", &headers, body);
    StatusCode::OK
}

async fn reject(state: Shared, headers: HeaderMap, Json(body): Json<serde_json::Value>) -> StatusCode {
    capture(&state, "/fail", &headers, body);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Worker that runs `script` under `sh -c`; generated worker arguments become `$1...`.
pub fn fake_worker(script: &str) -> WorkerProgram {
    WorkerProgram::new("sh").with_args(["-c", script, "fake-worker"])
}

/// Receive events until `matches` accepts one, or panic after five seconds.
pub async fn next_matching<F>(rx: &mut broadcast::Receiver<PipeEvent>, mut matches: F) -> PipeEvent
where
    F: FnMut(&PipeEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event was not published")
}

/// One session log line.
pub fn log_line(uuid: &str, role: &str, text: &str) -> String {
    serde_json::json!({
        "uuid": uuid,
        "timestamp": "2025-01-01T00:00:00.000Z",
        "message": {"role": role, "content": [{"type": "text", "text": text}]}
    })
    .to_string()
        + "\n"
}
