//! A scripted local exchange for client tests.
//!
//! Serves canned responses per request path and records every request it
//! receives. For each path, responses are replayed in the order they were
//! scripted; the last one keeps being served once the queue runs dry.

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One canned HTTP response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub content_type: &'static str,
}

impl MockResponse {
    /// 200 with a JSON body.
    pub fn json(value: serde_json::Value) -> Self {
        Self::json_status(200, value)
    }

    pub fn json_status(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            body: value.to_string(),
            content_type: "application/json",
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type: "text/plain",
        }
    }
}

/// A request as seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub path: String,
    pub query: HashMap<String, String>,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

#[derive(Default)]
struct MockState {
    scripts: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Local HTTP server bound to an ephemeral port. Stops when dropped.
pub struct MockExchange {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockExchange {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(MockState::default());

        let app = Router::new().fallback(respond).with_state(state.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Mock exchange stopped");
            }
        });

        Ok(Self { addr, state, server })
    }

    /// Base URL to point a client at.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue a response for `path`.
    pub fn on(&self, path: &str, response: MockResponse) -> &Self {
        if let Ok(mut scripts) = self.state.scripts.lock() {
            scripts.entry(path.to_string()).or_default().push_back(response);
        }
        self
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// How many requests hit `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    /// The most recent request to `path`.
    pub fn last_request(&self, path: &str) -> Option<RecordedRequest> {
        self.requests().into_iter().rev().find(|r| r.path == path)
    }
}

impl Drop for MockExchange {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn respond(State(state): State<Arc<MockState>>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let query = uri.query().map(parse_query).unwrap_or_default();
    if let Ok(mut requests) = state.requests.lock() {
        requests.push(RecordedRequest {
            path: path.clone(),
            query,
        });
    }

    let scripted = state.scripts.lock().ok().and_then(|mut scripts| {
        let queue = scripts.get_mut(&path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    });

    match scripted {
        Some(mock) => {
            let status =
                StatusCode::from_u16(mock.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, [(header::CONTENT_TYPE, mock.content_type)], mock.body).into_response()
        }
        None => (StatusCode::NOT_FOUND, format!("no mock scripted for {}", path)).into_response(),
    }
}

fn parse_query(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}
