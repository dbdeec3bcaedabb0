//! Webhook 投递
//!
//! `DeliveryClient::send` 只做一次 POST：2xx 成功，其他状态、超时、网络错误都返回
//! `DeliveryError`。重试由 scheduler 决定。取消信号会立刻中止进行中的请求。

use crate::error::{ConfigError, DeliveryError};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 卡片发送通道（scheduler 通过它投递，测试可替换）
#[async_trait]
pub trait CardTransport: Send + Sync {
    /// 通道名称（用于日志）
    fn name(&self) -> &str;

    /// 投递一张已序列化的卡片
    async fn deliver(&self, payload: &[u8], cancel: &CancellationToken) -> Result<(), DeliveryError>;
}

/// HTTP 客户端
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: Client,
}

impl DeliveryClient {
    pub fn new() -> Result<Self, ConfigError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }

    /// 发送一次 POST
    ///
    /// # Arguments
    /// * `payload` - 卡片 JSON
    /// * `url` - webhook 地址
    /// * `timeout` - 本次请求的 deadline
    /// * `cancel` - 取消信号
    pub async fn send(
        &self,
        payload: &[u8],
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        if cancel.is_cancelled() {
            return Err(DeliveryError::Cancelled);
        }

        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(payload.to_vec());

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| classify_error(&e, timeout))?;

            let status = response.status();
            if status.is_success() {
                debug!(status = status.as_u16(), bytes = payload.len(), "Card delivered");
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::status(status.as_u16(), &body))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DeliveryError::Cancelled),
            result = exchange => result,
        }
    }
}

/// reqwest 错误分类：超时单独处理，其余视为网络层失败
fn classify_error(error: &reqwest::Error, timeout: Duration) -> DeliveryError {
    if error.is_timeout() {
        return DeliveryError::Timeout { after: timeout };
    }

    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    DeliveryError::Transport(message)
}

/// 固定 URL + 超时的 webhook 通道
#[derive(Debug, Clone)]
pub struct WebhookTransport {
    client: DeliveryClient,
    url: String,
    timeout: Duration,
}

impl WebhookTransport {
    pub fn new(client: DeliveryClient, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CardTransport for WebhookTransport {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, payload: &[u8], cancel: &CancellationToken) -> Result<(), DeliveryError> {
        self.client.send(payload, &self.url, self.timeout, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    /// 拿一个当前没人监听的端口
    async fn refused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/webhook", addr)
    }

    /// 接受连接但从不响应
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (format!("http://{}/webhook", addr), handle)
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = DeliveryClient::new().unwrap();
        let url = refused_url().await;

        let result = client
            .send(b"{}", &url, Duration::from_secs(2), &CancellationToken::new())
            .await;

        match result {
            Err(DeliveryError::Transport(msg)) => assert!(!msg.is_empty()),
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let client = DeliveryClient::new().unwrap();
        let (url, server) = silent_server().await;

        let result = client
            .send(b"{}", &url, Duration::from_millis(200), &CancellationToken::new())
            .await;

        assert_eq!(result, Err(DeliveryError::Timeout { after: Duration::from_millis(200) }));
        server.abort();
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_request() {
        let client = DeliveryClient::new().unwrap();
        let (url, server) = silent_server().await;
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = client.send(b"{}", &url, Duration::from_secs(30), &cancel).await;

        assert_eq!(result, Err(DeliveryError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        server.abort();
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_request() {
        let client = DeliveryClient::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client
            .send(b"{}", "http://127.0.0.1:9/webhook", Duration::from_secs(1), &cancel)
            .await;
        assert_eq!(result, Err(DeliveryError::Cancelled));
    }
}
