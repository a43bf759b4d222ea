use std::io::{self, Write};

use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::aggregate::EntryAggregator;
use crate::allow_list::ProcessAllowList;
use crate::filter::{FilterConfig, accept};
use crate::parser::LogParser;
use crate::sink::Sink;
use crate::stream::read_lines;
use crate::watcher::PidWatcher;
use adbscope_adb::{AdbError, ProcessLister};
use adbscope_types::LogEntry;

/// Fatal pipeline failures
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("log source process has no stdout pipe")]
    NoStdout,

    #[error("failed to read log source output")]
    Read(#[source] io::Error),

    #[error("failed to resolve package pid")]
    Resolution(#[source] AdbError),

    #[error("failed to write log output")]
    Sink(#[source] io::Error),

    #[error("pipeline task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// What to do when the PID watcher cannot resolve a package
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Stop the run with [`PipelineError::Resolution`]
    FailFast,
    /// Log a warning and let the watcher retry with backoff
    #[default]
    Retry,
}

/// Counters reported when a run ends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Raw lines read from the source
    pub lines_read: u64,
    /// Entries produced by aggregation
    pub entries: u64,
    /// Entries that passed the filter
    pub accepted: u64,
    /// Entries written by the sink
    pub dispatched: u64,
    /// Whether the run ended because it was cancelled
    pub interrupted: bool,
}

/// One logcat run: reader, aggregator, filter and sink stages plus the
/// optional PID watcher, all governed by one cancellation token.
pub struct LogcatPipeline {
    filter: FilterConfig,
    allow_list: ProcessAllowList,
    policy: ResolutionPolicy,
    cancel: CancellationToken,
}

impl LogcatPipeline {
    pub fn new(filter: FilterConfig, allow_list: ProcessAllowList) -> Self {
        Self {
            filter,
            allow_list,
            policy: ResolutionPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Token that stops the run when cancelled.
    ///
    /// Hand it to the [`Sink`] as its live flag so output stops at once.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run against a spawned `adb logcat` child, killing it when the run ends
    pub async fn run_child<W, L>(
        self,
        mut child: Child,
        sink: Sink<W>,
        watcher: Option<PidWatcher<L>>,
    ) -> Result<RunSummary, PipelineError>
    where
        W: Write + Send + 'static,
        L: ProcessLister,
    {
        let stdout = child.stdout.take().ok_or(PipelineError::NoStdout)?;
        let result = self.run(stdout, sink, watcher).await;

        if let Err(e) = child.start_kill() {
            tracing::debug!(error = %e, "log source already exited");
        }
        match child.wait().await {
            Ok(status) => tracing::debug!(%status, "log source exited"),
            Err(e) => tracing::debug!(error = %e, "failed to reap log source"),
        }

        result
    }

    /// Stream `source` through the pipeline until it ends or the run is cancelled
    pub async fn run<R, W, L>(
        self,
        source: R,
        sink: Sink<W>,
        watcher: Option<PidWatcher<L>>,
    ) -> Result<RunSummary, PipelineError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: Write + Send + 'static,
        L: ProcessLister,
    {
        let cancel = self.cancel;

        // Single-slot handoffs between stages
        let (line_tx, line_rx) = mpsc::channel::<String>(1);
        let (entry_tx, entry_rx) = mpsc::channel::<LogEntry>(1);
        let (accepted_tx, accepted_rx) = mpsc::channel::<LogEntry>(1);
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<AdbError>();

        let watch_cancel = cancel.child_token();
        let watcher_task = watcher.map(|w| tokio::spawn(w.run(watch_cancel.clone(), error_tx)));

        let reader = tokio::spawn(read_lines(source, line_tx, cancel.clone()));
        let aggregator = tokio::spawn(aggregate_lines(line_rx, entry_tx));
        let filter = tokio::spawn(filter_entries(
            entry_rx,
            accepted_tx,
            self.allow_list,
            self.filter,
        ));
        let mut dispatcher = tokio::task::spawn_blocking(move || dispatch_entries(accepted_rx, sink));

        let mut fatal = None;
        let dispatched = loop {
            tokio::select! {
                result = &mut dispatcher => break result,
                Some(err) = error_rx.recv() => match self.policy {
                    ResolutionPolicy::FailFast => {
                        if fatal.is_none() {
                            fatal = Some(err);
                            cancel.cancel();
                        }
                    }
                    ResolutionPolicy::Retry => {
                        tracing::warn!(error = %err, "pid resolution failed, retrying");
                    }
                },
            }
        };

        // A failed sink ends the run; upstream stages may be idle on the source
        if !matches!(dispatched, Ok(Ok(_))) {
            cancel.cancel();
        }

        watch_cancel.cancel();
        if let Some(task) = watcher_task {
            task.await?;
        }

        let lines_read = reader.await?;
        let entries = aggregator.await?;
        let accepted = filter.await?;
        let dispatched = dispatched?;

        if let Some(err) = fatal {
            return Err(PipelineError::Resolution(err));
        }

        let summary = RunSummary {
            lines_read: lines_read?,
            entries,
            accepted,
            dispatched: dispatched?,
            interrupted: cancel.is_cancelled(),
        };
        tracing::debug!(?summary, "pipeline finished");
        Ok(summary)
    }
}

/// Parse and aggregate lines, flushing the pending entry when the input closes
async fn aggregate_lines(
    mut lines: mpsc::Receiver<String>,
    entries: mpsc::Sender<LogEntry>,
) -> u64 {
    let mut aggregator = EntryAggregator::new();
    let mut emitted = 0u64;

    while let Some(raw) = lines.recv().await {
        let Some(parsed) = LogParser::parse(&raw) else {
            continue;
        };
        if let Some(entry) = aggregator.push(parsed) {
            if entries.send(entry).await.is_err() {
                return emitted;
            }
            emitted += 1;
        }
    }

    if let Some(entry) = aggregator.flush() {
        if entries.send(entry).await.is_ok() {
            emitted += 1;
        }
    }

    emitted
}

async fn filter_entries(
    mut entries: mpsc::Receiver<LogEntry>,
    accepted: mpsc::Sender<LogEntry>,
    allow_list: ProcessAllowList,
    config: FilterConfig,
) -> u64 {
    let mut passed = 0u64;

    while let Some(entry) = entries.recv().await {
        if !accept(&entry, &allow_list.snapshot(), &config) {
            continue;
        }
        if accepted.send(entry).await.is_err() {
            break;
        }
        passed += 1;
    }

    passed
}

fn dispatch_entries<W: Write>(
    mut entries: mpsc::Receiver<LogEntry>,
    mut sink: Sink<W>,
) -> Result<u64, PipelineError> {
    while let Some(entry) = entries.blocking_recv() {
        sink.dispatch(&entry).map_err(PipelineError::Sink)?;
    }
    sink.flush().map_err(PipelineError::Sink)?;
    Ok(sink.dispatched())
}
