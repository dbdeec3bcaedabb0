//! 投递重试（指数退避）
//!
//! 只重试临时性失败（超时、网络错误、5xx、429）；取消信号会打断退避等待。

use crate::delivery::CardTransport;
use crate::error::DeliveryError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 重试配置
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次）
    pub max_retries: u32,
    /// 初始退避（毫秒）
    pub initial_backoff_ms: u64,
    /// 最大退避（毫秒）
    pub max_backoff_ms: u64,
    /// 退避倍数
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 100,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 不重试
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// 第 `retry` 次重试前的等待时间（从 0 开始），不超过 max_backoff
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry as i32);
        let ms = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// 带重试的投递，返回结果和实际尝试次数
pub async fn deliver_with_retry(
    transport: &dyn CardTransport,
    payload: &[u8],
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> (Result<(), DeliveryError>, u32) {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let error = match transport.deliver(payload, cancel).await {
            Ok(()) => return (Ok(()), attempts),
            Err(e) => e,
        };

        let retry = attempts - 1;
        if !error.is_transient() || retry >= policy.max_retries {
            return (Err(error), attempts);
        }

        let wait = policy.backoff(retry);
        debug!(
            channel = transport.name(),
            attempt = attempts,
            wait_ms = wait.as_millis() as u64,
            error = %error,
            "Transient delivery failure, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return (Err(DeliveryError::Cancelled), attempts),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
