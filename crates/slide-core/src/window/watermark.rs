use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use orion_error::prelude::*;
use slide_config::EventTimePlan;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreReason, CoreResult, FailureSlot};

/// Receives every newly emitted watermark.
pub trait WatermarkHandler: Send + Sync {
    fn on_watermark(&self, watermark: i64) -> CoreResult<()>;
}

/// No watermark emitted yet.
const NO_WATERMARK: i64 = i64::MIN;

// ---------------------------------------------------------------------------
// Tracker: state shared with the ticker task
// ---------------------------------------------------------------------------

struct Tracker {
    /// Highest timestamp seen per partition.
    partitions: Mutex<HashMap<String, i64>>,
    /// Partitions that must report before a watermark is emitted.
    expected: HashSet<String>,
    max_lag_ms: i64,
    watermark: AtomicI64,
    /// Serialises recomputation so emitted values stay ordered.
    emit: Mutex<()>,
    handler: Arc<dyn WatermarkHandler>,
    failure: FailureSlot,
}

impl Tracker {
    fn compute(&self) -> Option<i64> {
        let partitions = self.partitions.lock().expect("watermark lock poisoned");
        if self.expected.iter().any(|p| !partitions.contains_key(p)) {
            return None;
        }
        partitions
            .values()
            .min()
            .map(|min| min.saturating_sub(self.max_lag_ms))
    }

    fn tick(&self) -> CoreResult<Option<i64>> {
        let _emit = self.emit.lock().expect("watermark emit lock poisoned");
        let Some(candidate) = self.compute() else {
            return Ok(None);
        };
        if candidate <= self.watermark.load(Ordering::Acquire) {
            return Ok(None);
        }
        self.watermark.store(candidate, Ordering::Release);
        log::debug!("watermark advanced to {candidate}");
        if let Err(e) = self.handler.on_watermark(candidate) {
            self.failure.record(&e);
            return Err(e);
        }
        Ok(Some(candidate))
    }
}

// ---------------------------------------------------------------------------
// WatermarkGenerator
// ---------------------------------------------------------------------------

enum Phase {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

/// Derives event-time progress from per-partition maximum timestamps.
///
/// The watermark is `min(partition max) - max_lag` over the partitions that
/// have reported, held back until every declared partition has reported. It
/// never decreases. Lifecycle is Idle, then Running after
/// [`start`](Self::start), then Stopped after [`shutdown`](Self::shutdown).
pub struct WatermarkGenerator {
    tracker: Arc<Tracker>,
    interval: Duration,
    cancel: CancellationToken,
    phase: Mutex<Phase>,
}

impl WatermarkGenerator {
    /// `cancel` should be a child of the window manager's token so that
    /// shutting the manager down also stops the ticker.
    pub fn new(
        handler: Arc<dyn WatermarkHandler>,
        plan: &EventTimePlan,
        partitions: impl IntoIterator<Item = String>,
        cancel: CancellationToken,
    ) -> Self {
        let tracker = Tracker {
            partitions: Mutex::new(HashMap::new()),
            expected: partitions.into_iter().collect(),
            max_lag_ms: i64::try_from(plan.max_lag.as_millis()).unwrap_or(i64::MAX),
            watermark: AtomicI64::new(NO_WATERMARK),
            emit: Mutex::new(()),
            handler,
            failure: FailureSlot::default(),
        };
        Self {
            tracker: Arc::new(tracker),
            interval: plan.watermark_interval,
            cancel,
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// Record a timestamp for `partition` and classify it.
    ///
    /// Returns `Ok(true)` when the event is on time (`timestamp >=` current
    /// watermark) and `Ok(false)` when it is late. A failure raised by an
    /// earlier background tick is returned instead.
    pub fn track(&self, partition: &str, timestamp: i64) -> CoreResult<bool> {
        self.tracker.failure.check()?;
        {
            let mut partitions = self
                .tracker
                .partitions
                .lock()
                .expect("watermark lock poisoned");
            match partitions.get_mut(partition) {
                Some(max) => *max = (*max).max(timestamp),
                None => {
                    partitions.insert(partition.to_owned(), timestamp);
                }
            }
        }
        Ok(timestamp >= self.tracker.watermark.load(Ordering::Acquire))
    }

    /// Recompute the watermark and emit it when it advanced.
    pub fn tick(&self) -> CoreResult<Option<i64>> {
        self.tracker.tick()
    }

    /// Watermark as it would be computed now, ignoring monotonicity.
    pub fn compute_watermark(&self) -> Option<i64> {
        self.tracker.compute()
    }

    /// Last emitted watermark.
    pub fn current_watermark(&self) -> Option<i64> {
        match self.tracker.watermark.load(Ordering::Acquire) {
            NO_WATERMARK => None,
            wm => Some(wm),
        }
    }

    /// Return the failure recorded by a background tick, if any.
    pub fn check_failure(&self) -> CoreResult<()> {
        self.tracker.failure.check()
    }

    /// Start the periodic ticker on the current tokio runtime.
    pub fn start(&self) -> CoreResult<()> {
        let mut phase = self.phase.lock().expect("watermark phase lock poisoned");
        match *phase {
            Phase::Running(_) => return Ok(()),
            Phase::Stopped => {
                return StructError::from(CoreReason::Lifecycle)
                    .with_detail("watermark generator already stopped")
                    .err();
            }
            Phase::Idle => {}
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(rt) => rt,
            Err(e) => {
                return StructError::from(CoreReason::Lifecycle)
                    .with_detail(format!("watermark ticker needs a tokio runtime: {e}"))
                    .err();
            }
        };
        let handle = runtime.spawn(run_ticker(
            Arc::downgrade(&self.tracker),
            self.interval,
            self.cancel.clone(),
        ));
        *phase = Phase::Running(handle);
        log::debug!("watermark ticker started, interval {:?}", self.interval);
        Ok(())
    }

    /// Stop the ticker. Idempotent.
    pub fn shutdown(&self) {
        let mut phase = self.phase.lock().expect("watermark phase lock poisoned");
        self.cancel.cancel();
        *phase = Phase::Stopped;
    }

    pub fn is_running(&self) -> bool {
        let phase = self.phase.lock().expect("watermark phase lock poisoned");
        matches!(&*phase, Phase::Running(h) if !h.is_finished() && !self.cancel.is_cancelled())
    }
}

async fn run_ticker(tracker: Weak<Tracker>, interval: Duration, cancel: CancellationToken) {
    let mut tick = tokio::time::interval_at(Instant::now() + interval, interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                let Some(tracker) = tracker.upgrade() else {
                    break;
                };
                if let Err(e) = tracker.tick() {
                    log::error!("watermark emission failed: {e}");
                    break;
                }
            }
        }
    }
    log::debug!("watermark ticker stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
