//! Auto-responder controller and its poll loop.
//!
//! `AutoResponder` owns one background task at a time. Each cycle it:
//! 1. Fetches messages newer than the watermark from the message source
//! 2. Skips ids already handled and messages sent by the local account
//! 3. Asks the rule engine for a response and hands it to the sink
//! 4. Marks every examined message as handled
//! 5. Moves the watermark to the instant the cycle started
//!
//! The watermark moves on failure too: a broken fetch or send loses the
//! affected messages instead of retrying them forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dedup::DedupMemory;
use super::state::{PollStats, SchedulerState, SchedulerStatus};
use crate::channels::{FetchQuery, InboundMessage, MessageSink, MessageSource, SendOutcome};
use crate::config::ResponderConfig;
use crate::error::ChannelError;
use crate::rules::RuleEngine;

/// Longest message excerpt written to the log.
const LOG_PREVIEW_CHARS: usize = 50;

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    /// Messages evaluated and marked handled.
    pub processed: usize,
    pub skipped_seen: usize,
    pub skipped_own: usize,
    pub responses_sent: usize,
    pub send_failures: usize,
    pub template_errors: usize,
    /// Fetch failure that ended the cycle early.
    pub error: Option<String>,
}

/// Collaborators shared by every cycle.
struct PollContext {
    engine: Arc<RuleEngine>,
    source: Arc<dyn MessageSource>,
    sink: Arc<dyn MessageSink>,
    page_size: usize,
    send_timeout: Duration,
}

/// State carried from one cycle to the next. Only cycles lock it.
struct CycleState {
    dedup: DedupMemory,
    last_check_time: DateTime<Utc>,
    stats: PollStats,
}

/// The task spawned by `start`, with the handles needed to stop it.
struct RunningTask {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

/// Start/stop controller for the poll loop.
pub struct AutoResponder {
    ctx: Arc<PollContext>,
    state: Arc<Mutex<CycleState>>,
    lifecycle: Mutex<Option<RunningTask>>,
    stats_tx: Arc<watch::Sender<PollStats>>,
    stats_rx: watch::Receiver<PollStats>,
    check_interval: Duration,
    stop_grace: Duration,
}

impl AutoResponder {
    /// Build a stopped responder. The watermark starts at the current instant.
    pub fn new(
        config: &ResponderConfig,
        engine: Arc<RuleEngine>,
        source: Arc<dyn MessageSource>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        let now = Utc::now();
        let stats = PollStats {
            last_check_time: Some(now),
            ..Default::default()
        };
        let (stats_tx, stats_rx) = watch::channel(stats.clone());

        Self {
            ctx: Arc::new(PollContext {
                engine,
                source,
                sink,
                page_size: config.page_size,
                send_timeout: config.send_timeout,
            }),
            state: Arc::new(Mutex::new(CycleState {
                dedup: DedupMemory::new(config.dedup_ceiling, config.dedup_target),
                last_check_time: now,
                stats,
            })),
            lifecycle: Mutex::new(None),
            stats_tx: Arc::new(stats_tx),
            stats_rx,
            check_interval: config.check_interval,
            stop_grace: config.stop_grace,
        }
    }

    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.ctx.engine
    }

    /// Spawn the poll loop. Returns `false` if it was already running.
    ///
    /// The first cycle runs immediately.
    pub async fn start(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        if !current_state(&lifecycle).can_transition_to(SchedulerState::Running) {
            warn!("Auto responder is already running");
            return false;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.ctx),
            Arc::clone(&self.state),
            Arc::clone(&self.stats_tx),
            Arc::clone(&shutdown),
            Arc::clone(&wake),
            self.check_interval,
        ));

        *lifecycle = Some(RunningTask {
            handle,
            shutdown,
            wake,
        });
        info!(
            interval_secs = self.check_interval.as_secs(),
            "Auto responder started"
        );
        true
    }

    /// Signal the poll loop to stop and wait up to the grace period for it.
    ///
    /// Returns `false` if it was not running. A task still busy when the
    /// grace period ends is left to finish its cycle and exit on its own.
    pub async fn stop(&self) -> bool {
        let Some(task) = self.lifecycle.lock().await.take() else {
            debug!("Auto responder is not running");
            return false;
        };

        task.shutdown.store(true, Ordering::SeqCst);
        task.wake.notify_one();

        match tokio::time::timeout(self.stop_grace, task.handle).await {
            Ok(Ok(())) => info!("Auto responder stopped"),
            Ok(Err(e)) => error!("Auto responder task ended abnormally: {e}"),
            Err(_) => warn!(
                grace_secs = self.stop_grace.as_secs(),
                "Auto responder task did not exit in time, it will stop after its current cycle"
            ),
        }
        true
    }

    pub async fn is_running(&self) -> bool {
        current_state(&*self.lifecycle.lock().await) == SchedulerState::Running
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: current_state(&*self.lifecycle.lock().await),
            check_interval_secs: self.check_interval.as_secs(),
            stats: self.stats_rx.borrow().clone(),
        }
    }

    /// Run one cycle on the caller's task, waiting for any cycle in flight.
    pub async fn poll_once(&self) -> CycleReport {
        let report = run_cycle(&self.ctx, &self.state).await;
        publish(&self.state, &self.stats_tx).await;
        report
    }
}

fn current_state(lifecycle: &Option<RunningTask>) -> SchedulerState {
    match lifecycle {
        Some(task) if !task.handle.is_finished() => SchedulerState::Running,
        _ => SchedulerState::Stopped,
    }
}

async fn poll_loop(
    ctx: Arc<PollContext>,
    state: Arc<Mutex<CycleState>>,
    stats_tx: Arc<watch::Sender<PollStats>>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
    interval: Duration,
) {
    info!(
        "Auto responder poll loop started, checking every {}s",
        interval.as_secs()
    );

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let spawned_at = Utc::now();
        let cycle = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            let state = Arc::clone(&state);
            async move { run_cycle(&ctx, &state).await }
        });

        if let Err(e) = cycle.await {
            error!("Poll cycle panicked: {e}");
            let mut state = state.lock().await;
            let watermark = state.last_check_time.max(spawned_at);
            state.last_check_time = watermark;
            state.stats.last_check_time = Some(watermark);
            state.stats.cycles_completed += 1;
            state.stats.last_error = Some(format!("cycle panicked: {e}"));
        }
        publish(&state, &stats_tx).await;

        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wake.notified() => {}
        }
    }

    info!("Auto responder poll loop stopped");
}

async fn publish(state: &Mutex<CycleState>, stats_tx: &watch::Sender<PollStats>) {
    let stats = state.lock().await.stats.clone();
    stats_tx.send_replace(stats);
}

/// One fetch → evaluate → send pass. Always advances the watermark to the
/// instant the cycle took the state lock.
async fn run_cycle(ctx: &PollContext, state: &Mutex<CycleState>) -> CycleReport {
    let mut state = state.lock().await;
    let cycle_start = Utc::now();
    let mut report = CycleReport::default();

    let query = FetchQuery {
        after: state.last_check_time,
        limit: ctx.page_size,
        include_context: false,
    };

    match ctx.source.fetch(&query).await {
        Ok(messages) => {
            report.fetched = messages.len();
            if !messages.is_empty() {
                debug!(count = messages.len(), after = %query.after, "Fetched messages");
            }
            for message in &messages {
                handle_message(ctx, &mut state.dedup, message, &mut report).await;
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to fetch messages");
            report.error = Some(e.to_string());
        }
    }

    state.last_check_time = cycle_start;

    let stats = &mut state.stats;
    stats.last_check_time = Some(cycle_start);
    stats.cycles_completed += 1;
    stats.messages_processed += report.processed as u64;
    stats.responses_sent += report.responses_sent as u64;
    stats.send_failures += report.send_failures as u64;
    stats.last_error = report.error.clone();

    report
}

async fn handle_message(
    ctx: &PollContext,
    dedup: &mut DedupMemory,
    message: &InboundMessage,
    report: &mut CycleReport,
) {
    if dedup.contains(&message.id) {
        report.skipped_seen += 1;
        return;
    }
    if message.is_from_me {
        report.skipped_own += 1;
        return;
    }

    debug!(
        message_id = %message.id,
        sender = message.sender().unwrap_or("?"),
        "Processing message: {}",
        preview(&message.content)
    );

    match ctx
        .engine
        .evaluate(&message.content, message.sender(), message.chat_id())
        .await
    {
        Ok(Some(hit)) => {
            info!(message_id = %message.id, rule = %hit.rule_name, "Rule matched");
            match deliver(ctx, &message.chat_id, &hit.response).await {
                Ok(outcome) if outcome.success => {
                    report.responses_sent += 1;
                    info!(chat_id = %message.chat_id, "Sent auto-response");
                }
                Ok(outcome) => {
                    report.send_failures += 1;
                    error!(chat_id = %message.chat_id, detail = %outcome.detail, "Failed to send auto-response");
                }
                Err(e) => {
                    report.send_failures += 1;
                    error!(chat_id = %message.chat_id, error = %e, "Failed to send auto-response");
                }
            }
        }
        Ok(None) => {}
        Err(e) => {
            report.template_errors += 1;
            error!(message_id = %message.id, error = %e, "Skipping message");
        }
    }

    let evicted = dedup.insert(&message.id);
    if evicted > 0 {
        debug!(evicted, remaining = dedup.len(), "Pruned handled message ids");
    }
    report.processed += 1;
}

async fn deliver(
    ctx: &PollContext,
    chat_id: &str,
    text: &str,
) -> Result<SendOutcome, ChannelError> {
    tokio::time::timeout(ctx.send_timeout, ctx.sink.send(chat_id, text))
        .await
        .map_err(|_| ChannelError::Timeout {
            chat_id: chat_id.to_string(),
            timeout: ctx.send_timeout,
        })?
}

fn preview(text: &str) -> String {
    if text.chars().count() <= LOG_PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
    format!("{cut}...")
}
