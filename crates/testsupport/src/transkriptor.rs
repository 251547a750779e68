use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub accept: Option<String>,
    pub body: Value,
}

#[derive(Default)]
struct TranskriptorState {
    requests: Mutex<Vec<RecordedRequest>>,
    create_response: Mutex<Option<(u16, String)>>,
    exports: Mutex<HashMap<String, VecDeque<(u16, String)>>>,
    next_order: Mutex<u32>,
}

/// Transkriptor developer API stand-in. Orders get ids `order-1`,
/// `order-2`, ... unless a create response is forced.
pub struct FakeTranskriptor {
    pub base_url: String,
    state: Arc<TranskriptorState>,
}

impl FakeTranskriptor {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(TranskriptorState::default());
        let app = Router::new()
            .route("/developer/transcription/url", post(create))
            .route("/developer/files/:order_id/content/export", post(export))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { base_url, state })
    }

    /// Every create call answers `status` with `body`.
    pub fn reject_create(&self, status: u16, body: &str) {
        *self.state.create_response.lock().unwrap() = Some((status, body.to_string()));
    }

    /// Export responses for `order_id`, served in order. The last one
    /// repeats once the others are used up.
    pub fn script_export(&self, order_id: &str, responses: Vec<(u16, Value)>) {
        let queue = responses
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();
        self.state
            .exports
            .lock()
            .unwrap()
            .insert(order_id.to_string(), queue);
    }

    /// Like `script_export` with a raw body, e.g. an empty one.
    pub fn script_export_raw(&self, order_id: &str, status: u16, body: &str) {
        self.state
            .exports
            .lock()
            .unwrap()
            .insert(order_id.to_string(), VecDeque::from([(status, body.to_string())]));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn export_calls(&self, order_id: &str) -> usize {
        let path = format!("/developer/files/{order_id}/content/export");
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

fn record(state: &TranskriptorState, path: String, headers: &HeaderMap, body: Value) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.requests.lock().unwrap().push(RecordedRequest {
        path,
        authorization: header("authorization"),
        accept: header("accept"),
        body,
    });
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn create(
    State(state): State<Arc<TranskriptorState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    record(&state, "/developer/transcription/url".to_string(), &headers, body);

    if let Some((code, body)) = state.create_response.lock().unwrap().clone() {
        return (status(code), body);
    }
    let mut next = state.next_order.lock().unwrap();
    *next += 1;
    (StatusCode::OK, json!({ "order_id": format!("order-{}", *next) }).to_string())
}

async fn export(
    State(state): State<Arc<TranskriptorState>>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    record(
        &state,
        format!("/developer/files/{order_id}/content/export"),
        &headers,
        body,
    );

    let mut exports = state.exports.lock().unwrap();
    match exports.get_mut(&order_id) {
        Some(queue) if queue.len() > 1 => {
            let (code, body) = queue.pop_front().unwrap_or_default();
            (status(code), body)
        }
        Some(queue) => match queue.front() {
            Some((code, body)) => (status(*code), body.clone()),
            None => (StatusCode::ACCEPTED, String::new()),
        },
        None => (StatusCode::NOT_FOUND, json!({"error": "unknown order"}).to_string()),
    }
}
