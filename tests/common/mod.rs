//! 测试用的进程内 webhook：记录收到的请求，返回可配置的状态码和延迟

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// 一次捕获的请求
#[derive(Debug, Clone)]
pub struct Captured {
    pub content_type: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    received: Arc<Mutex<Vec<Captured>>>,
    status: StatusCode,
    delay: Duration,
}

pub struct MockWebhook {
    pub url: String,
    received: Arc<Mutex<Vec<Captured>>>,
    server: JoinHandle<()>,
}

impl MockWebhook {
    /// 返回 204（与 Teams 一致）
    pub async fn start() -> Self {
        Self::start_with(StatusCode::NO_CONTENT, Duration::ZERO).await
    }

    pub async fn start_with(status: StatusCode, delay: Duration) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            received: received.clone(),
            status,
            delay,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/webhook", post(capture)).with_state(state);
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: format!("http://{}/webhook", addr),
            received,
            server,
        }
    }

    pub fn received(&self) -> Vec<Captured> {
        self.received.lock().unwrap().clone()
    }

    /// 等待至少 `count` 个请求，超时 panic
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Captured> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let received = self.received();
            if received.len() >= count {
                return received;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("expected {} requests, got {} after {:?}", count, received.len(), timeout);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for MockWebhook {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn capture(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> (StatusCode, &'static str) {
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.received.lock().unwrap().push(Captured { content_type, body });

    let reply = if state.status.is_success() { "" } else { "card rejected" };
    (state.status, reply)
}

/// 一个当前没人监听的地址
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/webhook", addr)
}
