use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use orion_error::prelude::*;
use orion_error::ErrorOweBase;
use slide_config::EventTimePlan;
use tokio_util::sync::CancellationToken;

use super::buffer::EventBuffer;
use super::clock::Clock;
use super::event::{AckHandle, Event};
use super::eviction::EvictionPolicy;
use super::trigger::{TriggerHandler, TriggerPolicy};
use super::view::Activation;
use super::watermark::{WatermarkGenerator, WatermarkHandler};
use crate::error::{CoreError, CoreReason, CoreResult, FailureSlot};

/// Host callbacks invoked synchronously from window evaluation.
pub trait WindowLifecycleListener<T>: Send + Sync {
    /// Events that left the buffer. Each event is passed here exactly once.
    fn on_expiry(&self, expired: &[Arc<Event<T>>]);

    /// One firing of the window. An error aborts the firing; eviction has
    /// already been committed by then.
    fn on_activation(&self, activation: &Activation<T>) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

// Lock order: trigger -> activation -> buffer. The admission path never holds
// the buffer lock while taking another one.
struct Shared<T> {
    buffer: Mutex<EventBuffer<T>>,
    trigger: Mutex<TriggerPolicy>,
    /// Sequence numbers of the previous activation's `current`. Holding this
    /// lock serialises evaluation.
    previous: Mutex<HashSet<u64>>,
    listener: Arc<dyn WindowLifecycleListener<T>>,
    clock: Arc<dyn Clock>,
    failure: FailureSlot,
    stopped: AtomicBool,
    cancel: CancellationToken,
}

impl<T> Shared<T> {
    fn evaluate(&self, reference_time: i64) -> CoreResult<bool> {
        if self.stopped.load(Ordering::Acquire) {
            return Ok(false);
        }
        let mut previous = self.previous.lock().expect("activation lock poisoned");

        let (scan, mut expired) = {
            let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
            let scan = buffer.evict(reference_time);
            (scan, buffer.take_pending_expired())
        };

        // Expiry is signalled before aggregation so a failing activation
        // cannot hold back acknowledgements.
        if !scan.expired.is_empty() {
            self.listener.on_expiry(&scan.expired);
        }
        expired.extend(scan.expired);

        let added: Vec<_> = scan
            .window
            .iter()
            .filter(|e| !previous.contains(&e.seq()))
            .cloned()
            .collect();
        *previous = scan.window.iter().map(|e| e.seq()).collect();

        if scan.window.is_empty() {
            log::debug!(
                "window empty at {reference_time}, {} expired, activation skipped",
                expired.len()
            );
            return Ok(false);
        }

        let activation = Activation {
            current: scan.window,
            added,
            expired,
            reference_time,
        };
        log::debug!(
            "window activation at {reference_time}: current={} added={} expired={}",
            activation.current.len(),
            activation.added.len(),
            activation.expired.len()
        );
        self.listener
            .on_activation(&activation)
            .owe(CoreReason::Aggregation)?;
        Ok(true)
    }
}

impl<T: Send + Sync + 'static> TriggerHandler for Shared<T> {
    fn on_trigger(&self, reference_time: i64) -> CoreResult<bool> {
        self.evaluate(reference_time)
    }

    fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    fn record_failure(&self, err: &CoreError) {
        self.failure.record(err);
    }
}

impl<T: Send + Sync + 'static> WatermarkHandler for Shared<T> {
    fn on_watermark(&self, watermark: i64) -> CoreResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }
        let refs = {
            let mut trigger = self.trigger.lock().expect("trigger lock poisoned");
            trigger.on_watermark(watermark, |after, upto| {
                self.buffer
                    .lock()
                    .expect("buffer lock poisoned")
                    .timestamps_between(after, upto)
            })
        };
        for reference_time in refs {
            if let Err(e) = self.evaluate(reference_time) {
                self.failure.record(&e);
                return Err(e);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WindowManager
// ---------------------------------------------------------------------------

/// Owns the event buffer and turns trigger firings into listener callbacks.
///
/// Cloning yields another handle to the same window.
pub struct WindowManager<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for WindowManager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + Sync + 'static> WindowManager<T> {
    pub fn new(
        eviction: EvictionPolicy,
        trigger: TriggerPolicy,
        listener: Arc<dyn WindowLifecycleListener<T>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(EventBuffer::new(eviction)),
                trigger: Mutex::new(trigger),
                previous: Mutex::new(HashSet::new()),
                listener,
                clock,
                failure: FailureSlot::default(),
                stopped: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Start the trigger's background scheduling, if it has any.
    pub fn start(&self) -> CoreResult<()> {
        if self.is_stopped() {
            return StructError::from(CoreReason::Lifecycle)
                .with_detail("window manager already shut down")
                .err();
        }
        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        let handler: Weak<dyn TriggerHandler> = weak;
        self.shared
            .trigger
            .lock()
            .expect("trigger lock poisoned")
            .start(handler, self.shared.cancel.child_token())
    }

    /// Admit one event.
    ///
    /// Runs a compaction scan every
    /// [`COMPACTION_THRESHOLD`](super::buffer::COMPACTION_THRESHOLD)
    /// admissions and evaluates the window when a count trigger is due. A
    /// failure recorded by a background firing is returned here.
    pub fn add(&self, value: T, timestamp: i64, ack: AckHandle) -> CoreResult<()> {
        self.shared.failure.check()?;
        if self.is_stopped() {
            return StructError::from(CoreReason::Lifecycle)
                .with_detail("window manager already shut down")
                .err();
        }

        let compacted = {
            let mut buffer = self.shared.buffer.lock().expect("buffer lock poisoned");
            buffer.push(value, timestamp, ack);
            buffer.maybe_compact()
        };
        if !compacted.is_empty() {
            log::debug!("compaction expired {} events", compacted.len());
            // An activation only reports expiries already passed to on_expiry.
            self.shared.listener.on_expiry(&compacted);
            self.shared
                .buffer
                .lock()
                .expect("buffer lock poisoned")
                .defer_expired(compacted);
        }

        let due = self
            .shared
            .trigger
            .lock()
            .expect("trigger lock poisoned")
            .on_event();
        if due {
            self.shared.evaluate(self.shared.clock.now_millis())?;
        }
        Ok(())
    }

    /// Evaluate the window at `reference_time`. Returns `true` when an
    /// activation was delivered. Calls are serialised.
    pub fn evaluate(&self, reference_time: i64) -> CoreResult<bool> {
        self.shared.evaluate(reference_time)
    }

    /// Feed a watermark directly, bypassing a generator.
    pub fn on_watermark(&self, watermark: i64) -> CoreResult<()> {
        WatermarkHandler::on_watermark(&*self.shared, watermark)
    }

    /// Handler that routes emitted watermarks into this window.
    pub fn watermark_handler(&self) -> Arc<dyn WatermarkHandler> {
        self.shared.clone()
    }

    /// Build a watermark generator bound to this window. Its ticker stops
    /// when the manager shuts down.
    pub fn watermark_generator(
        &self,
        plan: &EventTimePlan,
        partitions: impl IntoIterator<Item = String>,
    ) -> WatermarkGenerator {
        WatermarkGenerator::new(
            self.watermark_handler(),
            plan,
            partitions,
            self.shared.cancel.child_token(),
        )
    }

    /// Stop all background scheduling. Buffered events are dropped with the
    /// manager; a firing already in progress completes.
    pub fn shutdown(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.cancel.cancel();
        self.shared
            .trigger
            .lock()
            .expect("trigger lock poisoned")
            .shutdown();
        log::debug!("window manager shut down with {} buffered events", self.len());
    }

    /// Return the failure recorded by a background firing, if any.
    pub fn check_failure(&self) -> CoreResult<()> {
        self.shared.failure.check()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Snapshot of the buffered events in arrival order.
    pub fn buffered(&self) -> Vec<Arc<Event<T>>> {
        self.shared
            .buffer
            .lock()
            .expect("buffer lock poisoned")
            .snapshot()
    }

    pub fn len(&self) -> usize {
        self.shared.buffer.lock().expect("buffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
