//! `tracing` 接入层
//!
//! `TeamsLayer` 把每个 tracing 事件转换为 `LogEvent` 并非阻塞地交给 `SinkHandle`。
//!
//! 字段约定：
//! - `message`：渲染后的文本
//! - `template`：可选，原始消息模板；缺省时使用 message
//! - `error`：通过 `record_error` 记录的错误会成为 exception
//! - `fatal = true`：ERROR 级别提升为 Fatal
//! - 其余字段进入 properties
//!
//! sink 自身以及 HTTP 栈产生的事件会被忽略，避免投递日志再次进入投递队列。

use crate::error::ConfigError;
use crate::event::{ExceptionInfo, LogEvent, LogLevel};
use crate::options::SinkOptions;
use crate::scheduler::{BatchScheduler, SinkHandle};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// 不转发的 target 前缀
const IGNORED_TARGETS: &[&str] = &[
    "teams_log_sink",
    "reqwest",
    "hyper",
    "h2",
    "rustls",
    "tokio_util",
];

/// 把 tracing 事件投递到 Teams 的 layer
#[derive(Debug, Clone)]
pub struct TeamsLayer {
    handle: SinkHandle,
}

impl TeamsLayer {
    pub fn new(handle: SinkHandle) -> Self {
        Self { handle }
    }

    /// 启动 worker 并返回 layer 和句柄（句柄用于 flush / shutdown）
    pub fn start(options: SinkOptions) -> Result<(Self, SinkHandle), ConfigError> {
        let handle = BatchScheduler::start(options)?;
        Ok((Self::new(handle.clone()), handle))
    }

    pub fn handle(&self) -> &SinkHandle {
        &self.handle
    }
}

/// 是否是需要忽略的 target
fn is_ignored_target(target: &str) -> bool {
    IGNORED_TARGETS.iter().any(|prefix| {
        target == *prefix
            || target
                .strip_prefix(prefix)
                .map(|rest| rest.starts_with("::"))
                .unwrap_or(false)
    })
}

impl<S> Layer<S> for TeamsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_ignored_target(metadata.target()) {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        self.handle.enqueue(visitor.into_event(*metadata.level()));
    }
}

/// 提取 message / template / error / 其余字段
#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    template: Option<String>,
    fatal: bool,
    exception: Option<ExceptionInfo>,
    properties: BTreeMap<String, Value>,
}

impl EventVisitor {
    fn into_event(self, level: tracing::Level) -> LogEvent {
        let mut log_level = LogLevel::from(level);
        if self.fatal && log_level == LogLevel::Error {
            log_level = LogLevel::Fatal;
        }

        let rendered = self.message.unwrap_or_default();
        LogEvent {
            timestamp: Utc::now(),
            level: log_level,
            message_template: self.template.unwrap_or_else(|| rendered.clone()),
            rendered_message: Some(rendered),
            properties: self.properties,
            exception: self.exception,
        }
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{:?}", value)),
            "template" => self.template = Some(format!("{:?}", value).trim_matches('"').to_string()),
            name => {
                self.properties
                    .insert(name.to_string(), Value::String(format!("{:?}", value)));
            }
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "template" => self.template = Some(value.to_string()),
            name => {
                self.properties.insert(name.to_string(), Value::String(value.to_string()));
            }
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.properties.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.properties.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.properties.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "fatal" {
            self.fatal = value;
        }
        self.properties.insert(field.name().to_string(), Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.exception = Some(ExceptionInfo::from_error(field.name(), value));
    }
}
