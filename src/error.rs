//! 错误类型
//!
//! - `ConfigError`: 配置阶段失败，同步返回给调用方
//! - `DeliveryError`: 单次投递失败，只通过 diagnostics 上报，不会抛回日志调用点

use std::time::Duration;
use thiserror::Error;

/// 响应体摘录的最大字节数
pub const BODY_EXCERPT_LIMIT: usize = 512;

/// 配置错误（构建 sink 时立即失败）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("webhook URL is required")]
    MissingWebhookUrl,

    #[error("invalid webhook URL '{url}': {reason}")]
    InvalidWebhookUrl { url: String, reason: String },

    #[error("button #{index} is invalid: {reason}")]
    InvalidButton { index: usize, reason: String },

    #[error("color override for {level} must be 6 hex digits, got '{value}'")]
    InvalidColor { level: String, value: String },

    #[error("invalid option `{name}`: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),

    #[error("no tokio runtime available to spawn the delivery worker")]
    NoRuntime,
}

/// 投递错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// 非 2xx 响应
    #[error("webhook responded with HTTP {status}: {body_excerpt}")]
    Status { status: u16, body_excerpt: String },

    /// 超过单次请求的 deadline
    #[error("webhook request timed out after {after:?}")]
    Timeout { after: Duration },

    /// DNS / 连接拒绝 / TLS 等网络层失败
    #[error("transport failure: {0}")]
    Transport(String),

    /// 外部取消信号中止了请求
    #[error("delivery cancelled")]
    Cancelled,

    #[error("failed to serialize card: {0}")]
    Serialize(String),
}

impl DeliveryError {
    /// 是否值得重试（超时、网络错误、5xx、429）
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Timeout { .. } | DeliveryError::Transport(_) => true,
            DeliveryError::Status { status, .. } => *status >= 500 || *status == 429,
            DeliveryError::Cancelled | DeliveryError::Serialize(_) => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeliveryError::Cancelled)
    }

    /// 构造 Status 错误，截断响应体
    pub fn status(status: u16, body: &str) -> Self {
        DeliveryError::Status {
            status,
            body_excerpt: excerpt(body, BODY_EXCERPT_LIMIT),
        }
    }
}

/// 截断到 `limit` 字节以内，保证落在 char 边界
fn excerpt(body: &str, limit: usize) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= limit {
        return trimmed.to_string();
    }
    let mut end = limit;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DeliveryError::Timeout { after: Duration::from_secs(1) }.is_transient());
        assert!(DeliveryError::Transport("connection refused".into()).is_transient());
        assert!(DeliveryError::status(503, "").is_transient());
        assert!(DeliveryError::status(429, "slow down").is_transient());

        assert!(!DeliveryError::status(400, "bad card").is_transient());
        assert!(!DeliveryError::status(404, "").is_transient());
        assert!(!DeliveryError::Cancelled.is_transient());
    }

    #[test]
    fn test_status_body_is_truncated() {
        let body = "x".repeat(2000);
        match DeliveryError::status(500, &body) {
            DeliveryError::Status { body_excerpt, .. } => {
                assert_eq!(body_excerpt.len(), BODY_EXCERPT_LIMIT + 3);
                assert!(body_excerpt.ends_with("..."));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_excerpt_respects_char_boundary() {
        // 每个汉字 3 字节，limit=4 时必须回退到 3
        let out = excerpt("错误信息", 4);
        assert_eq!(out, "错...");
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(ConfigError::MissingWebhookUrl.to_string(), "webhook URL is required");
        let err = ConfigError::InvalidColor { level: "Warning".into(), value: "zz".into() };
        assert!(err.to_string().contains("Warning"));
    }
}
