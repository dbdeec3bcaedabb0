//! Sink 配置
//!
//! 配置读取优先级（`SinkOptions::auto_load`）：
//! 1. 配置文件 `~/.config/teams-log-sink/config.json`（JSON，字段见 `SinkConfigFile`）
//! 2. 环境变量 `TEAMS_WEBHOOK_URL`（可选 `TEAMS_TITLE`）
//!
//! 所有校验都在构建阶段完成，发送阶段不会再出现配置错误。

use crate::card::color::{normalize_color, ColorPalette};
use crate::error::ConfigError;
use crate::event::LogLevel;
use crate::scheduler::retry::RetryPolicy;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 默认 flush 周期（毫秒）
pub const DEFAULT_BATCH_PERIOD_MS: u64 = 1000;

/// 默认单批最大事件数
pub const DEFAULT_BATCH_SIZE_LIMIT: usize = 100;

/// 默认单次请求超时（秒）
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// 默认队列上限
pub const DEFAULT_QUEUE_LIMIT: usize = 10_000;

/// 配置文件相对 home 的路径
pub const CONFIG_FILE: &str = ".config/teams-log-sink/config.json";

/// 卡片上的链接按钮
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// 显示名称
    pub name: String,
    /// 链接 URI
    pub uri: String,
}

impl Button {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
        }
    }
}

/// Sink 配置
#[derive(Debug, Clone)]
pub struct SinkOptions {
    /// Incoming webhook URL
    pub webhook_url: String,
    /// 卡片标题
    pub title: String,
    /// 不输出 Properties section
    pub omit_properties_section: bool,
    /// 按钮（保持顺序）
    pub buttons: Vec<Button>,
    /// 级别颜色表
    pub palette: ColorPalette,
    /// flush 周期
    pub batch_period: Duration,
    /// 缓冲区达到此数量时立即 flush
    pub batch_size_limit: usize,
    /// 单次 HTTP 请求超时
    pub request_timeout: Duration,
    /// 单个 flush 周期内的并发投递数（1 = 顺序）
    pub max_concurrency: usize,
    /// 待投递事件上限，超出直接丢弃
    pub queue_limit: usize,
    /// 重试策略
    pub retry: RetryPolicy,
}

impl SinkOptions {
    /// 创建构建器
    pub fn builder(webhook_url: impl Into<String>) -> SinkOptionsBuilder {
        SinkOptionsBuilder::new(webhook_url)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_webhook_url(&self.webhook_url)?;

        for (index, button) in self.buttons.iter().enumerate() {
            if button.name.trim().is_empty() {
                return Err(ConfigError::InvalidButton {
                    index,
                    reason: "name is empty".to_string(),
                });
            }
            if button.uri.trim().is_empty() {
                return Err(ConfigError::InvalidButton {
                    index,
                    reason: "uri is empty".to_string(),
                });
            }
        }

        if self.batch_size_limit == 0 {
            return Err(invalid("batch_size_limit", "must be at least 1"));
        }
        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency", "must be at least 1"));
        }
        if self.batch_period.is_zero() {
            return Err(invalid("batch_period", "must be non-zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout", "must be non-zero"));
        }
        if self.queue_limit < self.batch_size_limit {
            return Err(invalid(
                "queue_limit",
                &format!("must be >= batch_size_limit ({})", self.batch_size_limit),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier", "must be >= 1.0"));
        }

        Ok(())
    }

    /// 从 JSON 配置文件加载
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: SinkConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(file.into_options()?)
    }

    /// 按优先级自动加载配置
    pub fn auto_load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(CONFIG_FILE);
            if config_path.exists() {
                debug!(path = %config_path.display(), "Loading sink config file");
                return Self::from_file(&config_path);
            }
        }

        if let Ok(url) = std::env::var("TEAMS_WEBHOOK_URL") {
            if !url.is_empty() {
                debug!("Using TEAMS_WEBHOOK_URL from environment");
                let title = std::env::var("TEAMS_TITLE").unwrap_or_default();
                return Ok(Self::builder(url).title(title).build()?);
            }
        }

        Err(anyhow!(
            "No webhook configured. Create ~/{} with webhook_url \
             or set the TEAMS_WEBHOOK_URL env var",
            CONFIG_FILE
        ))
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidOption {
        name,
        reason: reason.to_string(),
    }
}

/// 校验 webhook URL：非空、可解析、http(s)
fn validate_webhook_url(url: &str) -> Result<(), ConfigError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingWebhookUrl);
    }

    let parsed = reqwest::Url::parse(trimmed).map_err(|e| ConfigError::InvalidWebhookUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidWebhookUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// SinkOptions 构建器
#[derive(Debug, Clone)]
pub struct SinkOptionsBuilder {
    webhook_url: String,
    title: String,
    omit_properties_section: bool,
    buttons: Vec<Button>,
    color_overrides: Vec<(LogLevel, String)>,
    batch_period: Duration,
    batch_size_limit: usize,
    request_timeout: Duration,
    max_concurrency: usize,
    queue_limit: usize,
    retry: RetryPolicy,
}

impl SinkOptionsBuilder {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            title: String::new(),
            omit_properties_section: false,
            buttons: Vec::new(),
            color_overrides: Vec::new(),
            batch_period: Duration::from_millis(DEFAULT_BATCH_PERIOD_MS),
            batch_size_limit: DEFAULT_BATCH_SIZE_LIMIT,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_concurrency: 1,
            queue_limit: DEFAULT_QUEUE_LIMIT,
            retry: RetryPolicy::default(),
        }
    }

    /// 设置卡片标题
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// 是否省略 Properties section
    pub fn omit_properties_section(mut self, omit: bool) -> Self {
        self.omit_properties_section = omit;
        self
    }

    /// 追加按钮
    pub fn button(mut self, name: impl Into<String>, uri: impl Into<String>) -> Self {
        self.buttons.push(Button::new(name, uri));
        self
    }

    pub fn buttons(mut self, buttons: impl IntoIterator<Item = Button>) -> Self {
        self.buttons.extend(buttons);
        self
    }

    /// 覆盖某个级别的颜色
    pub fn color(mut self, level: LogLevel, hex: impl Into<String>) -> Self {
        self.color_overrides.push((level, hex.into()));
        self
    }

    pub fn batch_period(mut self, period: Duration) -> Self {
        self.batch_period = period;
        self
    }

    pub fn batch_size_limit(mut self, limit: usize) -> Self {
        self.batch_size_limit = limit;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn max_concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = concurrency;
        self
    }

    pub fn queue_limit(mut self, limit: usize) -> Self {
        self.queue_limit = limit;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 构建并校验
    pub fn build(self) -> Result<SinkOptions, ConfigError> {
        let mut palette = ColorPalette::default();
        for (level, hex) in &self.color_overrides {
            let color = normalize_color(hex).ok_or_else(|| ConfigError::InvalidColor {
                level: level.to_string(),
                value: hex.clone(),
            })?;
            palette.set(*level, color);
        }

        let options = SinkOptions {
            webhook_url: self.webhook_url.trim().to_string(),
            title: self.title,
            omit_properties_section: self.omit_properties_section,
            buttons: self.buttons,
            palette,
            batch_period: self.batch_period,
            batch_size_limit: self.batch_size_limit,
            request_timeout: self.request_timeout,
            max_concurrency: self.max_concurrency,
            queue_limit: self.queue_limit,
            retry: self.retry,
        };
        options.validate()?;
        Ok(options)
    }
}

/// 配置文件格式
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfigFile {
    pub webhook_url: String,
    pub title: String,
    pub omit_properties_section: bool,
    pub buttons: Vec<Button>,
    /// 级别名 -> hex 颜色，如 `{"warning": "ff8800"}`
    pub colors: BTreeMap<String, String>,
    pub batch_period_ms: u64,
    pub batch_size_limit: usize,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
    pub queue_limit: usize,
    pub max_retries: u32,
}

impl Default for SinkConfigFile {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            title: String::new(),
            omit_properties_section: false,
            buttons: Vec::new(),
            colors: BTreeMap::new(),
            batch_period_ms: DEFAULT_BATCH_PERIOD_MS,
            batch_size_limit: DEFAULT_BATCH_SIZE_LIMIT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_concurrency: 1,
            queue_limit: DEFAULT_QUEUE_LIMIT,
            max_retries: RetryPolicy::default().max_retries,
        }
    }
}

impl SinkConfigFile {
    pub fn into_options(self) -> Result<SinkOptions, ConfigError> {
        let mut builder = SinkOptions::builder(self.webhook_url)
            .title(self.title)
            .omit_properties_section(self.omit_properties_section)
            .buttons(self.buttons)
            .batch_period(Duration::from_millis(self.batch_period_ms))
            .batch_size_limit(self.batch_size_limit)
            .request_timeout(Duration::from_secs(self.timeout_secs))
            .max_concurrency(self.max_concurrency)
            .queue_limit(self.queue_limit)
            .retry(RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            });

        for (name, hex) in self.colors {
            let level = name.parse::<LogLevel>().map_err(|reason| ConfigError::InvalidOption {
                name: "colors",
                reason,
            })?;
            builder = builder.color(level, hex);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.webhook.office.com/webhookb2/abc";

    #[test]
    fn test_builder_defaults() {
        let options = SinkOptions::builder(URL).build().unwrap();
        assert_eq!(options.webhook_url, URL);
        assert!(options.title.is_empty());
        assert!(!options.omit_properties_section);
        assert!(options.buttons.is_empty());
        assert_eq!(options.batch_period, Duration::from_millis(DEFAULT_BATCH_PERIOD_MS));
        assert_eq!(options.batch_size_limit, DEFAULT_BATCH_SIZE_LIMIT);
        assert_eq!(options.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(options.max_concurrency, 1);
    }

    #[test]
    fn test_builder_chain() {
        let options = SinkOptions::builder(URL)
            .title("Integration Tests")
            .omit_properties_section(true)
            .button("Docs", "https://docs.example.com")
            .button("Status", "https://status.example.com")
            .color(LogLevel::Warning, "#FF8800")
            .build()
            .unwrap();

        assert_eq!(options.title, "Integration Tests");
        assert!(options.omit_properties_section);
        assert_eq!(options.buttons.len(), 2);
        assert_eq!(options.buttons[1].name, "Status");
        assert_eq!(options.palette.color_for(LogLevel::Warning), "ff8800");
    }

    #[test]
    fn test_empty_url_fails_fast() {
        let err = SinkOptions::builder("  ").build().unwrap_err();
        assert_eq!(err, ConfigError::MissingWebhookUrl);
    }

    #[test]
    fn test_invalid_url_fails_fast() {
        let err = SinkOptions::builder("not a url").build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWebhookUrl { .. }));

        let err = SinkOptions::builder("ftp://example.com/hook").build().unwrap_err();
        match err {
            ConfigError::InvalidWebhookUrl { reason, .. } => assert!(reason.contains("ftp")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_button_rejected() {
        let err = SinkOptions::builder(URL)
            .button("ok", "https://a")
            .button("", "https://b")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidButton { index: 1, reason: "name is empty".to_string() }
        );
    }

    #[test]
    fn test_invalid_color_rejected() {
        let err = SinkOptions::builder(URL)
            .color(LogLevel::Error, "red")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidColor { .. }));
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(SinkOptions::builder(URL).batch_size_limit(0).build().is_err());
        assert!(SinkOptions::builder(URL).max_concurrency(0).build().is_err());
        assert!(SinkOptions::builder(URL).batch_period(Duration::ZERO).build().is_err());
        assert!(SinkOptions::builder(URL).request_timeout(Duration::ZERO).build().is_err());
        assert!(SinkOptions::builder(URL)
            .batch_size_limit(50)
            .queue_limit(10)
            .build()
            .is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "webhook_url": "https://example.com/hook",
                "title": "Prod",
                "buttons": [{"name": "Runbook", "uri": "https://wiki/runbook"}],
                "colors": {"warn": "112233"},
                "batch_size_limit": 5,
                "timeout_secs": 3
            }"#,
        )
        .unwrap();

        let options = SinkOptions::from_file(&path).unwrap();
        assert_eq!(options.title, "Prod");
        assert_eq!(options.buttons, vec![Button::new("Runbook", "https://wiki/runbook")]);
        assert_eq!(options.palette.color_for(LogLevel::Warning), "112233");
        assert_eq!(options.batch_size_limit, 5);
        assert_eq!(options.request_timeout, Duration::from_secs(3));
        // 未配置的字段使用默认值
        assert_eq!(options.batch_period, Duration::from_millis(DEFAULT_BATCH_PERIOD_MS));
    }

    #[test]
    fn test_from_file_without_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"title": "x"}"#).unwrap();

        let err = SinkOptions::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("webhook URL is required"));
    }

    #[test]
    fn test_from_file_unknown_color_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"webhook_url": "https://example.com/hook", "colors": {"loud": "112233"}}"#,
        )
        .unwrap();

        assert!(SinkOptions::from_file(&path).is_err());
    }
}
