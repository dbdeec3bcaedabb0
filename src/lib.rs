//! Teams Log Sink - 把结构化日志事件投递为 Microsoft Teams MessageCard
//!
//! # 使用示例
//! ```ignore
//! use teams_log_sink::{SinkOptions, TeamsLayer};
//! use tracing_subscriber::prelude::*;
//!
//! let options = SinkOptions::builder("https://example.webhook.office.com/webhookb2/...")
//!     .title("Production")
//!     .button("Runbook", "https://wiki.example.com/runbook")
//!     .build()?;
//!
//! let (layer, handle) = TeamsLayer::start(options)?;
//! tracing_subscriber::registry()
//!     .with(layer.with_filter(tracing_subscriber::filter::LevelFilter::WARN))
//!     .init();
//!
//! tracing::warn!(template = "User {id} failed", id = 42, "User 42 failed");
//! handle.shutdown(std::time::Duration::from_secs(5)).await;
//! ```

pub mod card;
pub mod delivery;
pub mod error;
pub mod event;
pub mod layer;
pub mod options;
pub mod scheduler;

pub use card::{CardBuilder, ColorPalette, MessageCard};
pub use delivery::{CardTransport, DeliveryClient, WebhookTransport};
pub use error::{ConfigError, DeliveryError};
pub use event::{ExceptionInfo, LogEvent, LogLevel};
pub use layer::TeamsLayer;
pub use options::{Button, SinkOptions, SinkOptionsBuilder};
pub use scheduler::{
    BatchScheduler, DeliveryOutcome, DeliveryReport, Diagnostics, FlushSummary, RetryPolicy,
    SchedulerState, ShutdownReport, SinkHandle,
};
