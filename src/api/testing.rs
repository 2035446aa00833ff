//! In-process mock backend for client tests.
//!
//! Serves canned replies keyed by method and path from an axum server bound to
//! an ephemeral port, and records every call it receives.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, Response, StatusCode, Uri};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::client::{ApiClient, ClientConfig};
use super::retry::RetryPolicy;
use crate::auth::testing::RecordingNavigator;
use crate::session::MemorySessionStore;

#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    body: String,
    headers: Vec<(String, String)>,
    delay: Option<Duration>,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self::raw(status, &body.to_string())
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            delay: None,
        }
    }

    /// Binary file answer with an optional `Content-Disposition`
    pub fn file(content_type: &str, disposition: Option<&str>, body: &str) -> Self {
        let mut headers = vec![("content-type".to_string(), content_type.to_string())];
        if let Some(disposition) = disposition {
            headers.push(("content-disposition".to_string(), disposition.to_string()));
        }
        Self {
            status: 200,
            body: body.to_string(),
            headers,
            delay: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A call as the backend saw it
#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    /// JSON body, `Null` when empty or not JSON
    pub body: Value,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<(String, String), VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer every `method path` call with `reply`
    pub fn on(&self, method: &str, path: &str, reply: Reply) {
        self.on_sequence(method, path, vec![reply]);
    }

    /// Answer successive calls in order; the last reply repeats
    pub fn on_sequence(&self, method: &str, path: &str, replies: Vec<Reply>) {
        self.state
            .routes
            .lock()
            .insert((method.to_string(), path.to_string()), replies.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().clone()
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Body> {
    state.calls.lock().push(Call {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let reply = {
        let mut routes = state.routes.lock();
        routes
            .get_mut(&(method.to_string(), uri.path().to_string()))
            .and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
    };

    let reply = reply.unwrap_or_else(|| Reply::json(404, serde_json::json!({"detail": "Not Found"})));

    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }

    let mut builder = Response::builder().status(StatusCode::from_u16(reply.status).unwrap());
    for (name, value) in &reply.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Body::from(reply.body)).unwrap()
}

/// Client wired to `backend` with an in-memory store and a navigator parked at
/// `location`. Reads retry three times with a short base delay.
pub fn harness(
    backend: &MockBackend,
    location: &str,
) -> (ApiClient, Arc<MemorySessionStore>, Arc<RecordingNavigator>) {
    harness_at(&backend.url(), location)
}

/// Same as [`harness`] for an arbitrary base URL
pub fn harness_at(
    base_url: &str,
    location: &str,
) -> (ApiClient, Arc<MemorySessionStore>, Arc<RecordingNavigator>) {
    let store = Arc::new(MemorySessionStore::new());
    let navigator = Arc::new(RecordingNavigator::at(location));
    let config = ClientConfig::new(base_url)
        .with_timeout(Duration::from_secs(10))
        .with_retry(RetryPolicy::new(3, Duration::from_millis(10)));

    let client = ApiClient::new(config, store.clone(), navigator.clone()).unwrap();
    (client, store, navigator)
}

/// One-shot raw HTTP server that announces `declared_len` body bytes but
/// sends only `partial` before closing the connection.
pub async fn truncated_reply(status_line: &str, declared_len: usize, partial: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let head = format!(
        "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {declared_len}\r\n\r\n{partial}"
    );

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{}", addr)
}

pub const ADMIN_USER: &str =
    r#"{"id":"u1","email":"admin@example.com","name":"管理者","role":"admin"}"#;
pub const PLAIN_USER: &str =
    r#"{"id":"u2","email":"staff@example.com","name":"山田","role":"user"}"#;
