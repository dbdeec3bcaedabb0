//! 投递结果上报（side-channel）
//!
//! 投递失败不会传回日志调用点，只通过 `Diagnostics` 回调报告。

use crate::error::DeliveryError;
use crate::event::LogLevel;
use std::sync::Arc;
use tracing::{debug, warn};

/// 默认 diagnostics 使用的 tracing target（`TeamsLayer` 会忽略它）
pub const DIAGNOSTICS_TARGET: &str = "teams_log_sink::diagnostics";

/// 单个事件的投递结果
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// 发送成功
    Delivered,
    /// 发送失败（已用尽重试或不可重试）
    Failed(DeliveryError),
    /// 关闭时超出宽限期，未送达
    Lost,
    /// 入队失败（队列满或 sink 已关闭）
    Dropped(String),
}

/// 投递报告
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    /// 分配的序号（未入队的事件没有）
    pub counter: Option<u64>,
    pub level: LogLevel,
    /// 渲染后的消息
    pub text: String,
    /// 尝试次数
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
}

/// 诊断回调
pub type Diagnostics = Arc<dyn Fn(&DeliveryReport) + Send + Sync>;

/// 默认诊断：写入 tracing
pub fn tracing_diagnostics() -> Diagnostics {
    Arc::new(|report: &DeliveryReport| match &report.outcome {
        DeliveryOutcome::Delivered => {
            debug!(target: DIAGNOSTICS_TARGET, counter = ?report.counter, attempts = report.attempts, "Card delivered");
        }
        DeliveryOutcome::Failed(error) => {
            warn!(
                target: DIAGNOSTICS_TARGET,
                counter = ?report.counter,
                level = %report.level,
                attempts = report.attempts,
                error = %error,
                "Failed to deliver card"
            );
        }
        DeliveryOutcome::Lost => {
            warn!(target: DIAGNOSTICS_TARGET, counter = ?report.counter, level = %report.level, "Card lost at shutdown");
        }
        DeliveryOutcome::Dropped(reason) => {
            warn!(target: DIAGNOSTICS_TARGET, level = %report.level, reason = %reason, "Log event dropped");
        }
    })
}

/// 不做任何事的诊断
pub fn silent_diagnostics() -> Diagnostics {
    Arc::new(|_: &DeliveryReport| {})
}

/// 一次 flush 的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub delivered: usize,
    pub failed: usize,
    pub lost: usize,
}

impl FlushSummary {
    pub fn record(&mut self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::Failed(_) => self.failed += 1,
            DeliveryOutcome::Lost => self.lost += 1,
            DeliveryOutcome::Dropped(_) => {}
        }
    }

    pub fn total(&self) -> usize {
        self.delivered + self.failed + self.lost
    }
}

/// 关闭结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub delivered: usize,
    pub failed: usize,
    pub lost: usize,
    /// 宽限期是否耗尽
    pub timed_out: bool,
}

impl ShutdownReport {
    pub fn from_summary(summary: FlushSummary, timed_out: bool) -> Self {
        Self {
            delivered: summary.delivered,
            failed: summary.failed,
            lost: summary.lost,
            timed_out,
        }
    }
}
