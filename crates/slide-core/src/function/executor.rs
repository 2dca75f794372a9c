use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use orion_error::ErrorOweBase;
use slide_config::{WindowConfig, WindowPlan};

use super::registry::FunctionRegistry;
use super::{TimestampExtractor, WindowFunction};
use crate::error::{CoreReason, CoreResult};
use crate::window::{
    AckHandle, Activation, Clock, Event, EvictionPolicy, TriggerPolicy, WatermarkGenerator,
    Window, WindowLifecycleListener, WindowManager,
};

/// Downstream side of the executor.
pub trait Publisher<T, O>: Send + Sync {
    /// Deliver one aggregation result.
    fn publish(&self, output: O) -> anyhow::Result<()>;

    /// Forward a late input value to the named late-data route.
    fn publish_late(&self, target: &str, value: &T) -> anyhow::Result<()>;
}

/// One input element as delivered by the host.
#[derive(Debug, Clone)]
pub struct Record<T> {
    pub value: T,
    pub partition: String,
    pub ack: AckHandle,
}

impl<T> Record<T> {
    pub fn new(value: T, partition: impl Into<String>, ack: AckHandle) -> Self {
        Self {
            value,
            partition: partition.into(),
            ack,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutorStats
// ---------------------------------------------------------------------------

/// Counters kept by [`WindowFunctionExecutor`].
#[derive(Debug, Default)]
pub struct ExecutorStats {
    pub admitted: AtomicU64,
    pub late_forwarded: AtomicU64,
    pub late_dropped: AtomicU64,
    pub expired: AtomicU64,
    pub activations: AtomicU64,
    pub published: AtomicU64,
}

impl ExecutorStats {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Listener adapter
// ---------------------------------------------------------------------------

/// Acknowledges expired records and runs the window function per activation.
struct FunctionListener<T, O> {
    function: Arc<dyn WindowFunction<T, O>>,
    publisher: Arc<dyn Publisher<T, O>>,
    length_ms: Option<i64>,
    stats: Arc<ExecutorStats>,
}

impl<T: Clone, O> WindowLifecycleListener<T> for FunctionListener<T, O> {
    fn on_expiry(&self, expired: &[Arc<Event<T>>]) {
        for event in expired {
            event.ack();
        }
        ExecutorStats::bump(&self.stats.expired, expired.len() as u64);
    }

    fn on_activation(&self, activation: &Activation<T>) -> anyhow::Result<()> {
        ExecutorStats::bump(&self.stats.activations, 1);
        let window = Window::from_activation(activation, self.length_ms);
        if let Some(output) = self.function.process(&window)? {
            self.publisher.publish(output)?;
            ExecutorStats::bump(&self.stats.published, 1);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WindowFunctionExecutor
// ---------------------------------------------------------------------------

/// Runs a configured window function over a stream of [`Record`]s.
///
/// Processing-time windows stamp each record with the clock on admission.
/// Event-time windows read the timestamp with the configured extractor and
/// let the watermark generator decide whether the record is on time; late
/// records are forwarded to the late-data route or dropped, and acknowledged
/// once either way.
pub struct WindowFunctionExecutor<T, O> {
    plan: WindowPlan,
    manager: WindowManager<T>,
    watermark: Option<WatermarkGenerator>,
    extractor: Option<Arc<dyn TimestampExtractor<T>>>,
    publisher: Arc<dyn Publisher<T, O>>,
    clock: Arc<dyn Clock>,
    stats: Arc<ExecutorStats>,
}

impl<T, O> WindowFunctionExecutor<T, O>
where
    T: Clone + Send + Sync + 'static,
    O: 'static,
{
    /// Resolve the window definition and the named functions.
    ///
    /// `partitions` lists input partitions the watermark waits for; it may be
    /// empty.
    pub fn new(
        config: &WindowConfig,
        registry: &FunctionRegistry,
        publisher: Arc<dyn Publisher<T, O>>,
        partitions: impl IntoIterator<Item = String>,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        let plan = config.resolve().owe(CoreReason::Configuration)?;
        Self::from_plan(plan, registry, publisher, partitions, clock)
    }

    pub fn from_plan(
        plan: WindowPlan,
        registry: &FunctionRegistry,
        publisher: Arc<dyn Publisher<T, O>>,
        partitions: impl IntoIterator<Item = String>,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        let function = registry.resolve_function::<T, O>(&plan.function)?;
        let extractor = match &plan.event_time {
            Some(et) => Some(registry.resolve_extractor::<T>(&et.extractor)?),
            None => None,
        };

        let stats = Arc::new(ExecutorStats::default());
        let listener = Arc::new(FunctionListener {
            function,
            publisher: publisher.clone(),
            length_ms: plan.length_millis(),
            stats: stats.clone(),
        });
        let manager = WindowManager::new(
            EvictionPolicy::for_plan(&plan),
            TriggerPolicy::for_plan(&plan),
            listener,
            clock.clone(),
        );
        let watermark = plan
            .event_time
            .as_ref()
            .map(|et| manager.watermark_generator(et, partitions));

        log::info!(
            "window executor ready: function={} length={:?} slide={:?} event_time={}",
            plan.function,
            plan.length,
            plan.slide,
            plan.is_event_time()
        );

        Ok(Self {
            plan,
            manager,
            watermark,
            extractor,
            publisher,
            clock,
            stats,
        })
    }

    /// Start the trigger timer and the watermark ticker.
    pub fn start(&self) -> CoreResult<()> {
        self.manager.start()?;
        if let Some(watermark) = &self.watermark {
            watermark.start()?;
        }
        Ok(())
    }

    /// Route one record into the window.
    pub fn process(&self, record: Record<T>) -> CoreResult<()> {
        let (Some(extractor), Some(watermark)) = (&self.extractor, &self.watermark) else {
            let timestamp = self.clock.now_millis();
            self.manager.add(record.value, timestamp, record.ack)?;
            ExecutorStats::bump(&self.stats.admitted, 1);
            return Ok(());
        };

        let timestamp = extractor
            .extract_timestamp(&record.value)
            .owe(CoreReason::Extraction)?;
        if watermark.track(&record.partition, timestamp)? {
            self.manager.add(record.value, timestamp, record.ack)?;
            ExecutorStats::bump(&self.stats.admitted, 1);
        } else {
            self.handle_late(record, timestamp)?;
        }
        Ok(())
    }

    fn handle_late(&self, record: Record<T>, timestamp: i64) -> CoreResult<()> {
        let target = self
            .plan
            .event_time
            .as_ref()
            .and_then(|et| et.late_data_target.as_deref());
        match target {
            Some(target) => {
                self.publisher
                    .publish_late(target, &record.value)
                    .owe(CoreReason::Publish)?;
                ExecutorStats::bump(&self.stats.late_forwarded, 1);
                log::debug!("late event at {timestamp} forwarded to {target}");
            }
            None => {
                ExecutorStats::bump(&self.stats.late_dropped, 1);
                log::info!(
                    "dropping late event at {timestamp} from partition {}, watermark {:?}",
                    record.partition,
                    self.current_watermark()
                );
            }
        }
        record.ack.ack();
        Ok(())
    }

    /// Recompute and emit the watermark now. `Ok(None)` in processing-time
    /// mode or when it did not advance.
    pub fn emit_watermark(&self) -> CoreResult<Option<i64>> {
        match &self.watermark {
            Some(watermark) => watermark.tick(),
            None => Ok(None),
        }
    }

    pub fn current_watermark(&self) -> Option<i64> {
        self.watermark
            .as_ref()
            .and_then(|watermark| watermark.current_watermark())
    }

    /// Evaluate the window at the current processing time.
    pub fn evaluate_now(&self) -> CoreResult<bool> {
        self.manager.evaluate(self.clock.now_millis())
    }

    /// Return a failure raised by a background firing since the last record.
    pub fn check_failure(&self) -> CoreResult<()> {
        self.manager.check_failure()?;
        match &self.watermark {
            Some(watermark) => watermark.check_failure(),
            None => Ok(()),
        }
    }

    /// Stop timers. Buffered records are dropped without acknowledgement.
    pub fn shutdown(&self) {
        self.manager.shutdown();
        if let Some(watermark) = &self.watermark {
            watermark.shutdown();
        }
        log::info!(
            "window executor stopped: admitted={} activations={} published={}",
            ExecutorStats::get(&self.stats.admitted),
            ExecutorStats::get(&self.stats.activations),
            ExecutorStats::get(&self.stats.published)
        );
    }

    pub fn plan(&self) -> &WindowPlan {
        &self.plan
    }

    pub fn manager(&self) -> &WindowManager<T> {
        &self.manager
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }
}
