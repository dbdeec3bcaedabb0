//! Teams Log Sink CLI
//!
//! 预览或发送单张 MessageCard，用于验证 webhook 配置

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use teams_log_sink::{
    Button, CardBuilder, DeliveryClient, LogEvent, LogLevel, SinkOptions, SinkOptionsBuilder,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "teams-sink")]
#[command(about = "Teams Log Sink - 把日志事件发送为 Teams 卡片")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 打印卡片 JSON，不发送
    Preview(CardArgs),
    /// 构建并发送一张卡片
    Send {
        #[command(flatten)]
        card: CardArgs,
        /// Webhook URL（默认读取配置文件或 TEAMS_WEBHOOK_URL）
        #[arg(long)]
        webhook: Option<String>,
        /// 请求超时（秒，默认取配置或 10）
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Args)]
struct CardArgs {
    /// 渲染后的消息
    #[arg(long, short)]
    message: String,
    /// 消息模板（默认与 message 相同）
    #[arg(long)]
    template: Option<String>,
    /// 级别：verbose/debug/information/warning/error/fatal
    #[arg(long, short, default_value = "information")]
    level: String,
    /// 卡片标题（覆盖配置）
    #[arg(long)]
    title: Option<String>,
    /// 按钮，格式 name=uri，可重复
    #[arg(long = "button")]
    buttons: Vec<String>,
    /// 不输出 Properties section
    #[arg(long)]
    omit_properties: bool,
    /// 配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,
}

impl CardArgs {
    fn event(&self) -> Result<LogEvent> {
        let level: LogLevel = self.level.parse().map_err(|e: String| anyhow!(e))?;
        let template = self.template.clone().unwrap_or_else(|| self.message.clone());
        Ok(LogEvent::new(level, template, self.message.clone()))
    }

    fn buttons(&self) -> Result<Vec<Button>> {
        self.buttons
            .iter()
            .map(|raw| {
                raw.split_once('=')
                    .map(|(name, uri)| Button::new(name.trim(), uri.trim()))
                    .ok_or_else(|| anyhow!("Invalid button '{}', expected name=uri", raw))
            })
            .collect()
    }

    /// 合并配置文件和命令行参数
    ///
    /// `require_webhook` 为 true 时，没有 `--webhook` / `--config` 且自动加载失败会返回错误。
    fn options(
        &self,
        webhook: Option<&str>,
        timeout_secs: Option<u64>,
        require_webhook: bool,
    ) -> Result<SinkOptions> {
        let base = match (&self.config, webhook) {
            (Some(path), _) => Some(SinkOptions::from_file(path)?),
            (None, Some(_)) => None,
            (None, None) if require_webhook => Some(SinkOptions::auto_load()?),
            (None, None) => SinkOptions::auto_load().ok(),
        };

        let url = webhook
            .map(|u| u.to_string())
            .or_else(|| base.as_ref().map(|b| b.webhook_url.clone()))
            // preview 不需要真实地址
            .unwrap_or_else(|| "http://localhost/webhook".to_string());

        let mut builder: SinkOptionsBuilder = SinkOptions::builder(url);
        if let Some(base) = &base {
            builder = builder
                .title(base.title.clone())
                .omit_properties_section(base.omit_properties_section)
                .buttons(base.buttons.clone())
                .request_timeout(base.request_timeout);
            for level in LogLevel::ALL {
                builder = builder.color(level, base.palette.color_for(level));
            }
        }
        if let Some(title) = &self.title {
            builder = builder.title(title.clone());
        }
        if self.omit_properties {
            builder = builder.omit_properties_section(true);
        }
        builder = builder.buttons(self.buttons()?);
        if let Some(secs) = timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }

        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("teams_log_sink=info,teams_sink=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Preview(args) => {
            let options = args.options(None, None, false)?;
            let card = CardBuilder::build(&args.event()?, &options, 1);
            println!("{}", serde_json::to_string_pretty(&card)?);
        }
        Commands::Send { card, webhook, timeout } => {
            let options = card.options(webhook.as_deref(), timeout, true)?;
            let payload = CardBuilder::build(&card.event()?, &options, 1).to_json()?;

            let client = DeliveryClient::new()?;
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            match client
                .send(&payload, &options.webhook_url, options.request_timeout, &cancel)
                .await
            {
                Ok(()) => info!("Card sent"),
                Err(e) => {
                    error!(error = %e, "Failed to send card");
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_args(args: &[&str]) -> (CardArgs, Option<String>, Option<u64>) {
        let mut argv = vec!["teams-sink", "send"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Send { card, webhook, timeout } => (card, webhook, timeout),
            Commands::Preview(_) => panic!("expected send"),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let (card, webhook, timeout) =
            send_args(&["-m", "hi", "--webhook", "http://localhost/hook", "--timeout", "0"]);
        let err = card.options(webhook.as_deref(), timeout, true).unwrap_err();
        assert!(err.to_string().contains("request_timeout"), "{}", err);
    }

    #[test]
    fn test_timeout_flag_sets_request_timeout() {
        let (card, webhook, timeout) =
            send_args(&["-m", "hi", "--webhook", "http://localhost/hook", "--timeout", "3"]);
        let options = card.options(webhook.as_deref(), timeout, true).unwrap();
        assert_eq!(options.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_send_uses_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"webhook_url": "https://example.com/hook", "title": "Prod", "timeout_secs": 4}"#,
        )
        .unwrap();

        let (card, webhook, timeout) = send_args(&["-m", "hi", "--config", path.to_str().unwrap()]);
        let options = card.options(webhook.as_deref(), timeout, true).unwrap();
        assert_eq!(options.webhook_url, "https://example.com/hook");
        assert_eq!(options.title, "Prod");
        assert_eq!(options.request_timeout, Duration::from_secs(4));

        // 命令行覆盖配置
        let (card, webhook, _) =
            send_args(&["-m", "hi", "--config", path.to_str().unwrap(), "--title", "Staging"]);
        let options = card.options(webhook.as_deref(), Some(7), true).unwrap();
        assert_eq!(options.title, "Staging");
        assert_eq!(options.request_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_preview_does_not_need_webhook() {
        let cli = Cli::try_parse_from(["teams-sink", "preview", "-m", "hello", "-l", "warn"]).unwrap();
        let Commands::Preview(args) = cli.command else {
            panic!("expected preview");
        };
        assert!(args.options(None, None, false).is_ok());
        assert_eq!(args.event().unwrap().level, LogLevel::Warning);
    }
}
