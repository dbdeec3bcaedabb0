//! 日志事件结构
//!
//! sink 消费的只读事件：级别、渲染后的文本、原始模板、时间戳、属性、可选异常。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// 日志级别（有序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Verbose,
    Debug,
    Information,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    /// 全部级别，按从低到高排列
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Verbose,
        LogLevel::Debug,
        LogLevel::Information,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Verbose => "Verbose",
            LogLevel::Debug => "Debug",
            LogLevel::Information => "Information",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Fatal => "Fatal",
        }
    }

    /// 在 `ALL` 中的下标
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// 从序号构造，超出范围时夹到最近的已知级别
    pub fn from_ordinal(ordinal: i64) -> Self {
        let clamped = ordinal.clamp(0, (Self::ALL.len() - 1) as i64);
        Self::ALL[clamped as usize]
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    /// 大小写不敏感，支持常见缩写
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "verbose" | "trace" => Ok(LogLevel::Verbose),
            "debug" => Ok(LogLevel::Debug),
            "information" | "info" => Ok(LogLevel::Information),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" | "err" => Ok(LogLevel::Error),
            "fatal" | "critical" => Ok(LogLevel::Fatal),
            other => match other.parse::<i64>() {
                Ok(n) => Ok(LogLevel::from_ordinal(n)),
                Err(_) => Err(format!("unknown log level: {}", s)),
            },
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => LogLevel::Verbose,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Information,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// 捕获的异常信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// 异常类型名
    pub type_name: String,
    /// 异常消息
    pub message: String,
    /// 堆栈 / source 链文本
    pub stack: Option<String>,
}

impl ExceptionInfo {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// 从 `std::error::Error` 捕获，source 链作为堆栈文本
    pub fn from_error(type_name: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        let info = Self::new(type_name, error.to_string());
        if chain.is_empty() {
            info
        } else {
            info.with_stack(chain.join("\n"))
        }
    }
}

/// 日志事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// 发生时间
    pub timestamp: DateTime<Utc>,
    /// 级别
    pub level: LogLevel,
    /// 原始消息模板（未展开）
    pub message_template: String,
    /// 已渲染的消息；缺失时按空串处理
    #[serde(default)]
    pub rendered_message: Option<String>,
    /// 结构化属性（标量、序列或嵌套 map）
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// 可选异常
    #[serde(default)]
    pub exception: Option<ExceptionInfo>,
}

impl LogEvent {
    /// 创建事件，时间戳为当前时间
    pub fn new(level: LogLevel, message_template: impl Into<String>, rendered_message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message_template: message_template.into(),
            rendered_message: Some(rendered_message.into()),
            properties: BTreeMap::new(),
            exception: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    /// 渲染后的文本，缺失时为空串
    pub fn text(&self) -> &str {
        self.rendered_message.as_deref().unwrap_or("")
    }
}
