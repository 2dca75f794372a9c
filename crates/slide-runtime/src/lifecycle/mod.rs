mod signal;

use std::path::Path;
use std::sync::Arc;

use orion_error::op_context;
use orion_error::prelude::*;
use orion_error::ErrorOweBase;
use serde_json::Value;
use slide_config::EngineConfig;
use slide_core::function::{ExecutorStats, WindowFunctionExecutor};
use slide_core::window::SystemClock;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::builtins::builtin_registry;
use crate::error::{RuntimeReason, RuntimeResult};
use crate::sink::JsonlPublisher;
use crate::source::{AckLedger, SourceReport, run_source};

pub use signal::wait_for_signal;

type InputReader = Box<dyn AsyncBufRead + Unpin + Send>;
type Executor = WindowFunctionExecutor<Value, Value>;

/// Totals of one engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub lines: u64,
    pub records: u64,
    pub malformed: u64,
    pub extraction_failed: u64,
    pub dispatched: u64,
    pub acked: u64,
    pub admitted: u64,
    pub late_forwarded: u64,
    pub late_dropped: u64,
    pub activations: u64,
    pub published: u64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A running window pipeline: JSON Lines in, window results out.
///
/// The source task reads the input to its end (or until cancelled), then
/// keeps the timers alive for the configured linger so trailing windows
/// can still fire. [`wait`](Self::wait) stops the executor afterwards.
pub struct Engine {
    cancel: CancellationToken,
    executor: Arc<Executor>,
    ledger: Arc<AckLedger>,
    source: JoinHandle<RuntimeResult<SourceReport>>,
}

impl Engine {
    /// Open input and output, resolve the window function and start the
    /// timers. Relative paths resolve against `base_dir`.
    #[tracing::instrument(name = "engine.start", skip_all, fields(function = %config.plan.function))]
    pub async fn start(config: EngineConfig, base_dir: &Path) -> RuntimeResult<Self> {
        let mut op = op_context!("engine-bootstrap").with_auto_log();
        op.record("function", config.plan.function.as_str());
        op.record("base_dir", base_dir.display().to_string().as_str());

        let publisher =
            Arc::new(JsonlPublisher::open(&config.output, base_dir).owe(RuntimeReason::Bootstrap)?);
        sw_debug!(io, output = %publisher.output_path().display(), "output opened");

        let registry = builtin_registry();
        let executor = Executor::from_plan(
            config.plan.clone(),
            &registry,
            publisher,
            config.input.partitions.clone(),
            Arc::new(SystemClock),
        )
        .err_conv()?;
        let executor = Arc::new(executor);

        let reader = open_input(&config, base_dir).await?;
        executor.start().err_conv()?;
        sw_info!(
            sys,
            partitions = config.input.partitions.len(),
            event_time = config.plan.is_event_time(),
            "window engine started"
        );

        let cancel = CancellationToken::new();
        let ledger = Arc::new(AckLedger::default());
        let source = tokio::spawn(source_task(
            reader,
            executor.clone(),
            ledger.clone(),
            config.input.default_partition.clone(),
            config.input.linger.as_duration(),
            cancel.clone(),
        ));

        op.mark_suc();
        Ok(Self {
            cancel,
            executor,
            ledger,
            source,
        })
    }

    /// Stop reading input and cut the linger short.
    pub fn shutdown(&self) {
        sw_info!(sys, "initiating graceful shutdown");
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the source to finish, stop the window timers and report.
    ///
    /// A failure raised by a background firing is returned even when the
    /// source itself ended cleanly.
    pub async fn wait(self) -> RuntimeResult<RunReport> {
        let joined = self.source.await;
        self.executor.shutdown();
        let source = joined.map_err(|e| {
            StructError::from(RuntimeReason::Shutdown).with_detail(format!("source task join error: {e}"))
        })??;
        self.executor.check_failure().err_conv()?;

        let stats = self.executor.stats();
        let report = RunReport {
            lines: source.lines,
            records: source.records,
            malformed: source.malformed,
            extraction_failed: source.extraction_failed,
            dispatched: self.ledger.dispatched(),
            acked: self.ledger.acked(),
            admitted: ExecutorStats::get(&stats.admitted),
            late_forwarded: ExecutorStats::get(&stats.late_forwarded),
            late_dropped: ExecutorStats::get(&stats.late_dropped),
            activations: ExecutorStats::get(&stats.activations),
            published: ExecutorStats::get(&stats.published),
        };
        sw_info!(
            sys,
            records = report.records,
            activations = report.activations,
            published = report.published,
            unacked = self.ledger.outstanding(),
            "window engine stopped"
        );
        Ok(report)
    }
}

async fn open_input(config: &EngineConfig, base_dir: &Path) -> RuntimeResult<InputReader> {
    match &config.input.path {
        Some(path) => {
            let path = base_dir.join(path);
            let file = tokio::fs::File::open(&path)
                .await
                .owe(RuntimeReason::Bootstrap)
                .position(path.display().to_string())?;
            sw_debug!(io, input = %path.display(), "input opened");
            Ok(Box::new(BufReader::new(file)))
        }
        None => {
            sw_debug!(io, "reading input from stdin");
            Ok(Box::new(BufReader::new(tokio::io::stdin())))
        }
    }
}

async fn source_task(
    reader: InputReader,
    executor: Arc<Executor>,
    ledger: Arc<AckLedger>,
    default_partition: String,
    linger: std::time::Duration,
    cancel: CancellationToken,
) -> RuntimeResult<SourceReport> {
    let report = run_source(reader, &executor, &ledger, &default_partition, cancel.clone()).await?;
    sw_info!(
        io,
        lines = report.lines,
        records = report.records,
        malformed = report.malformed,
        "input drained"
    );
    if !linger.is_zero() && !cancel.is_cancelled() {
        sw_debug!(sys, linger_ms = linger.as_millis() as u64, "lingering for trailing windows");
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(linger) => {}
        }
    }
    Ok(report)
}
