//! 批量调度器 - 缓冲日志事件并在后台投递
//!
//! 状态机：Idle -> Buffering -> Flushing -> (Idle | Buffering)
//!
//! - 调用方只通过 `SinkHandle::enqueue` 非阻塞入队，从不做网络 I/O
//! - 后台 worker 独占缓冲区和定时器
//! - 周期到达或缓冲区达到上限时 flush：每个事件一张卡片、一次 HTTP 请求
//! - 单个事件失败只上报，不影响同批其他事件
//! - 关闭时在宽限期内尽量投递，剩余事件记为 lost

pub mod report;
pub mod retry;

pub use report::{
    silent_diagnostics, tracing_diagnostics, DeliveryOutcome, DeliveryReport, Diagnostics,
    FlushSummary, ShutdownReport,
};
pub use retry::RetryPolicy;

use crate::card::CardBuilder;
use crate::delivery::{CardTransport, DeliveryClient, WebhookTransport};
use crate::error::{ConfigError, DeliveryError};
use crate::event::LogEvent;
use crate::options::SinkOptions;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 所有 handle 被 drop 时使用的宽限期
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// worker 回复 shutdown 的额外余量
const SHUTDOWN_SLACK: Duration = Duration::from_millis(500);

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// 没有待处理事件
    Idle,
    /// 有事件在缓冲区，等待触发
    Buffering,
    /// 正在投递
    Flushing,
    /// worker 已退出
    Stopped,
}

/// 控制命令
enum Control {
    Flush(oneshot::Sender<FlushSummary>),
    Shutdown(oneshot::Sender<ShutdownReport>),
}

/// worker 每轮的唤醒原因
enum Wake {
    Control(Option<Control>),
    Event(Option<LogEvent>),
    Timer,
}

/// Sink 句柄（可 clone，线程安全）
#[derive(Clone)]
pub struct SinkHandle {
    events: mpsc::Sender<LogEvent>,
    control: mpsc::Sender<Control>,
    state: watch::Receiver<SchedulerState>,
    closed: Arc<AtomicBool>,
    /// 宽限期耗尽时取消 worker 上所有进行中的投递
    cancel: CancellationToken,
    diagnostics: Diagnostics,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("state", &self.state())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl SinkHandle {
    /// 非阻塞入队；队列满或已关闭时丢弃并上报，返回是否入队成功
    pub fn enqueue(&self, event: LogEvent) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            self.report_dropped(&event, "sink is shut down");
            return false;
        }

        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.report_dropped(&event, "queue limit reached");
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.report_dropped(&event, "delivery worker stopped");
                false
            }
        }
    }

    /// 立即 flush 当前所有待处理事件
    pub async fn flush(&self) -> FlushSummary {
        let (reply, rx) = oneshot::channel();
        if self.control.send(Control::Flush(reply)).await.is_err() {
            return FlushSummary::default();
        }
        rx.await.unwrap_or_default()
    }

    /// 关闭：在 `grace` 内投递剩余事件，之后释放 worker
    ///
    /// 宽限期从调用时开始计算，对正在进行的 flush 同样生效。
    /// 重复调用返回空报告。
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        if self.closed.swap(true, Ordering::SeqCst) {
            return ShutdownReport::default();
        }

        let grace_timer = arm_grace(self.cancel.clone(), grace);
        let (reply, rx) = oneshot::channel();
        let mut replied = false;
        let mut report = ShutdownReport::default();
        if self.control.send(Control::Shutdown(reply)).await.is_ok() {
            match tokio::time::timeout(grace + SHUTDOWN_SLACK, rx).await {
                Ok(Ok(r)) => {
                    report = r;
                    replied = true;
                }
                Ok(Err(_)) => {}
                Err(_) => report.timed_out = true,
            }
        }
        grace_timer.abort();

        let worker = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(worker) = worker {
            if !replied && !worker.is_finished() {
                warn!("Log sink worker did not stop within grace period, aborting");
                worker.abort();
            }
            // 回复之后 worker 不再等待；abort 后在下一个 await 点结束
            let _ = worker.await;
        }

        report
    }

    /// 当前状态
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn report_dropped(&self, event: &LogEvent, reason: &str) {
        (self.diagnostics)(&DeliveryReport {
            counter: None,
            level: event.level,
            text: event.text().to_string(),
            attempts: 0,
            outcome: DeliveryOutcome::Dropped(reason.to_string()),
        });
    }
}

/// 批量调度器（运行在后台 worker 上）
pub struct BatchScheduler {
    options: Arc<SinkOptions>,
    transport: Arc<dyn CardTransport>,
    diagnostics: Diagnostics,
    events: mpsc::Receiver<LogEvent>,
    control: mpsc::Receiver<Control>,
    state: watch::Sender<SchedulerState>,
    buffer: Vec<LogEvent>,
    deadline: Option<Instant>,
    counter: u64,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
    /// shutdown 发出之后上报的结果
    closing: FlushSummary,
}

impl Drop for BatchScheduler {
    /// worker 正常退出或被 abort 都会发布 Stopped
    fn drop(&mut self) {
        let _ = self.state.send(SchedulerState::Stopped);
    }
}

impl BatchScheduler {
    /// 用默认 webhook 通道和 tracing diagnostics 启动
    pub fn start(options: SinkOptions) -> Result<SinkHandle, ConfigError> {
        options.validate()?;
        let transport = WebhookTransport::new(
            DeliveryClient::new()?,
            options.webhook_url.clone(),
            options.request_timeout,
        );
        Self::spawn(options, Arc::new(transport), tracing_diagnostics())
    }

    /// 启动后台 worker，需要在 tokio runtime 内调用
    pub fn spawn(
        options: SinkOptions,
        transport: Arc<dyn CardTransport>,
        diagnostics: Diagnostics,
    ) -> Result<SinkHandle, ConfigError> {
        options.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let (events_tx, events_rx) = mpsc::channel(options.queue_limit);
        let (control_tx, control_rx) = mpsc::channel(8);
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);

        info!(
            channel = transport.name(),
            batch_size_limit = options.batch_size_limit,
            batch_period_ms = options.batch_period.as_millis() as u64,
            max_concurrency = options.max_concurrency,
            "Starting log sink worker"
        );

        let closed = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let scheduler = BatchScheduler {
            options: Arc::new(options),
            transport,
            diagnostics: diagnostics.clone(),
            events: events_rx,
            control: control_rx,
            state: state_tx,
            buffer: Vec::new(),
            deadline: None,
            counter: 0,
            cancel: cancel.clone(),
            closed: closed.clone(),
            closing: FlushSummary::default(),
        };
        let worker = runtime.spawn(scheduler.run());

        Ok(SinkHandle {
            events: events_tx,
            control: control_tx,
            state: state_rx,
            closed,
            cancel,
            diagnostics,
            worker: Arc::new(Mutex::new(Some(worker))),
        })
    }

    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let wake = tokio::select! {
                biased;
                control = self.control.recv() => Wake::Control(control),
                event = self.events.recv() => Wake::Event(event),
                _ = timer => Wake::Timer,
            };

            match wake {
                Wake::Event(Some(event)) => {
                    self.push(event);
                    if self.buffer.len() >= self.options.batch_size_limit {
                        debug!(buffered = self.buffer.len(), "Batch size limit reached");
                        self.flush_and_refill().await;
                    }
                }
                Wake::Timer => {
                    self.flush_and_refill().await;
                }
                Wake::Control(Some(Control::Flush(reply))) => {
                    self.pull_pending();
                    let cancel = self.cancel.clone();
                    let summary = self.flush_buffer(&cancel).await;
                    self.deadline = None;
                    self.settle_state();
                    let _ = reply.send(summary);
                }
                Wake::Control(Some(Control::Shutdown(reply))) => {
                    let report = self.drain().await;
                    let _ = reply.send(report);
                    break;
                }
                Wake::Control(None) | Wake::Event(None) => {
                    debug!("All sink handles dropped, draining");
                    self.closed.store(true, Ordering::SeqCst);
                    let grace_timer = arm_grace(self.cancel.clone(), DEFAULT_DRAIN_GRACE);
                    self.drain().await;
                    grace_timer.abort();
                    break;
                }
            }
        }

        info!(cards_total = self.counter, "Log sink worker stopped");
    }

    fn push(&mut self, event: LogEvent) {
        if self.buffer.is_empty() {
            self.deadline = Some(Instant::now() + self.options.batch_period);
        }
        self.buffer.push(event);
        let _ = self.state.send(SchedulerState::Buffering);
    }

    /// 把 channel 中已到达的事件全部移入缓冲区
    fn pull_pending(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.buffer.push(event);
        }
    }

    /// flush 当前缓冲区，然后接收 flush 期间到达的事件
    ///
    /// shutdown 发出后立即返回，剩余事件交给 `drain`。
    async fn flush_and_refill(&mut self) {
        loop {
            let cancel = self.cancel.clone();
            self.flush_buffer(&cancel).await;
            self.deadline = None;

            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            while self.buffer.len() < self.options.batch_size_limit {
                match self.events.try_recv() {
                    Ok(event) => self.push(event),
                    Err(_) => break,
                }
            }

            if self.buffer.len() < self.options.batch_size_limit {
                break;
            }
        }
        self.settle_state();
    }

    fn settle_state(&mut self) {
        let state = if self.buffer.is_empty() {
            SchedulerState::Idle
        } else {
            SchedulerState::Buffering
        };
        let _ = self.state.send(state);
    }

    /// 投递缓冲区中的全部事件（按入队顺序启动，最多 max_concurrency 个并行）
    async fn flush_buffer(&mut self, cancel: &CancellationToken) -> FlushSummary {
        let batch = std::mem::take(&mut self.buffer);
        let mut summary = FlushSummary::default();
        if batch.is_empty() {
            return summary;
        }

        let _ = self.state.send(SchedulerState::Flushing);
        debug!(events = batch.len(), "Flushing batch");

        let mut jobs = Vec::with_capacity(batch.len());
        for event in batch {
            self.counter += 1;
            jobs.push((self.counter, event));
        }

        let options = self.options.clone();
        let transport = self.transport.clone();
        let mut deliveries = stream::iter(jobs)
            .map(|(counter, event)| {
                let options = options.clone();
                let transport = transport.clone();
                let cancel = cancel.clone();
                async move { deliver_event(event, counter, &options, transport.as_ref(), &cancel).await }
            })
            .buffered(self.options.max_concurrency);

        while let Some(report) = deliveries.next().await {
            summary.record(&report.outcome);
            if self.closed.load(Ordering::SeqCst) {
                self.closing.record(&report.outcome);
            }
            (self.diagnostics)(&report);
        }

        summary
    }

    /// 关闭流程：收完剩余事件并投递，宽限期由调用方通过 `arm_grace` 设定
    ///
    /// 报告包含 shutdown 发出之后的所有结果，其中也有被打断的那次 flush。
    async fn drain(&mut self) -> ShutdownReport {
        self.events.close();
        self.pull_pending();
        self.deadline = None;

        info!(pending = self.buffer.len(), "Draining log sink");

        let cancel = self.cancel.clone();
        self.flush_buffer(&cancel).await;
        let timed_out = cancel.is_cancelled();
        cancel.cancel();

        ShutdownReport::from_summary(self.closing, timed_out)
    }
}

/// `grace` 之后取消 token
fn arm_grace(cancel: CancellationToken, grace: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        cancel.cancel();
    })
}

/// 构建、序列化并投递单个事件
async fn deliver_event(
    event: LogEvent,
    counter: u64,
    options: &SinkOptions,
    transport: &dyn CardTransport,
    cancel: &CancellationToken,
) -> DeliveryReport {
    let mut report = DeliveryReport {
        counter: Some(counter),
        level: event.level,
        text: event.text().to_string(),
        attempts: 0,
        outcome: DeliveryOutcome::Lost,
    };

    if cancel.is_cancelled() {
        return report;
    }

    let card = CardBuilder::build(&event, options, counter);
    let payload = match card.to_json() {
        Ok(payload) => payload,
        Err(e) => {
            report.outcome = DeliveryOutcome::Failed(DeliveryError::Serialize(e.to_string()));
            return report;
        }
    };

    let (result, attempts) = retry::deliver_with_retry(transport, &payload, &options.retry, cancel).await;
    report.attempts = attempts;
    report.outcome = match result {
        Ok(()) => DeliveryOutcome::Delivered,
        Err(DeliveryError::Cancelled) => DeliveryOutcome::Lost,
        Err(e) => DeliveryOutcome::Failed(e),
    };
    report
}
