use std::sync::Weak;
use std::time::Duration;

use orion_error::prelude::*;
use slide_config::{SlidingInterval, WindowLength, WindowPlan};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreReason, CoreResult};

/// Callback surface a trigger fires into. Implemented by the window manager.
pub trait TriggerHandler: Send + Sync {
    /// Evaluate the window at `reference_time`. Returns `true` when an
    /// activation was emitted.
    fn on_trigger(&self, reference_time: i64) -> CoreResult<bool>;

    /// Current processing time in epoch milliseconds.
    fn now_millis(&self) -> i64;

    /// Keep a failure raised on a background task for the admission path.
    fn record_failure(&self, err: &CoreError);
}

// ---------------------------------------------------------------------------
// TriggerPolicy
// ---------------------------------------------------------------------------

/// Decides when the window is evaluated.
///
/// Count and WatermarkCount fire from the admission and watermark paths
/// respectively; Time owns a background timer task; WatermarkTime follows
/// watermark advancement.
#[derive(Debug)]
pub enum TriggerPolicy {
    Count {
        slide: usize,
        /// Admissions needed before the first firing.
        first: usize,
        count: usize,
        fired_once: bool,
    },
    Time {
        slide: Duration,
        timer: Option<TimerTask>,
    },
    WatermarkCount {
        slide: usize,
        /// Timestamp of the last firing's reference event.
        last_reference: i64,
    },
    WatermarkTime {
        slide_ms: i64,
        last_fired: Option<i64>,
    },
}

#[derive(Debug)]
pub struct TimerTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TriggerPolicy {
    pub fn count(slide: usize, first: usize) -> Self {
        Self::Count {
            slide: slide.max(1),
            first: first.max(slide).max(1),
            count: 0,
            fired_once: false,
        }
    }

    pub fn time(slide: Duration) -> Self {
        Self::Time { slide, timer: None }
    }

    pub fn watermark_count(slide: usize) -> Self {
        Self::WatermarkCount {
            slide: slide.max(1),
            last_reference: i64::MIN,
        }
    }

    pub fn watermark_time(slide_ms: i64) -> Self {
        Self::WatermarkTime {
            slide_ms,
            last_fired: None,
        }
    }

    /// Select the policy matching a resolved window definition.
    pub fn for_plan(plan: &WindowPlan) -> Self {
        match (plan.slide, plan.is_event_time()) {
            (SlidingInterval::Count(k), false) => {
                let first = match plan.length {
                    WindowLength::Count(n) => n.max(k),
                    WindowLength::Duration(_) => k,
                };
                Self::count(k, first)
            }
            (SlidingInterval::Count(k), true) => Self::watermark_count(k),
            (SlidingInterval::Duration(d), false) => Self::time(d),
            (SlidingInterval::Duration(d), true) => {
                Self::watermark_time(i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            }
        }
    }

    /// Begin background scheduling. Only the Time variant schedules anything;
    /// it needs a tokio runtime and stops when `cancel` fires.
    pub fn start(
        &mut self,
        handler: Weak<dyn TriggerHandler>,
        cancel: CancellationToken,
    ) -> CoreResult<()> {
        let Self::Time { slide, timer } = self else {
            return Ok(());
        };
        if timer.is_some() {
            return Ok(());
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(rt) => rt,
            Err(e) => {
                return StructError::from(CoreReason::Lifecycle)
                    .with_detail(format!("time trigger needs a tokio runtime: {e}"))
                    .err();
            }
        };
        let handle = runtime.spawn(run_timer(handler, *slide, cancel.clone()));
        *timer = Some(TimerTask { cancel, handle });
        Ok(())
    }

    /// Notify one admission. Returns `true` when the window must be evaluated.
    pub fn on_event(&mut self) -> bool {
        let Self::Count {
            slide,
            first,
            count,
            fired_once,
        } = self
        else {
            return false;
        };
        *count += 1;
        let threshold = if *fired_once { *slide } else { *first };
        if *count >= threshold {
            *count = 0;
            *fired_once = true;
            true
        } else {
            false
        }
    }

    /// Reference times to evaluate for a newly emitted watermark, in order.
    ///
    /// `timestamps(after, upto)` must return the buffered event timestamps in
    /// `(after, upto]` in arrival order.
    pub fn on_watermark<F>(&mut self, watermark: i64, timestamps: F) -> Vec<i64>
    where
        F: FnOnce(i64, i64) -> Vec<i64>,
    {
        match self {
            Self::WatermarkCount {
                slide,
                last_reference,
            } => {
                let mut refs = Vec::new();
                let mut seen = 0usize;
                let mut running_max = i64::MIN;
                for ts in timestamps(*last_reference, watermark) {
                    running_max = running_max.max(ts);
                    seen += 1;
                    if seen % *slide == 0 {
                        refs.push(running_max);
                    }
                }
                if let Some(last) = refs.last() {
                    *last_reference = *last;
                }
                refs
            }
            Self::WatermarkTime {
                slide_ms,
                last_fired,
            } => {
                let due = match *last_fired {
                    None => true,
                    Some(last) => watermark.saturating_sub(last) >= *slide_ms,
                };
                if due {
                    *last_fired = Some(watermark);
                    vec![watermark]
                } else {
                    Vec::new()
                }
            }
            Self::Count { .. } | Self::Time { .. } => Vec::new(),
        }
    }

    /// Stop background scheduling. A firing already in progress completes.
    pub fn shutdown(&mut self) {
        if let Self::Time { timer, .. } = self
            && let Some(task) = timer.take()
        {
            task.cancel.cancel();
            drop(task.handle);
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Self::Time { timer, .. } => timer.as_ref().is_some_and(|t| !t.handle.is_finished()),
            _ => false,
        }
    }
}

/// Periodic evaluation loop of the Time trigger.
async fn run_timer(handler: Weak<dyn TriggerHandler>, slide: Duration, cancel: CancellationToken) {
    let mut tick = tokio::time::interval_at(Instant::now() + slide, slide);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                let Some(handler) = handler.upgrade() else {
                    break;
                };
                let reference_time = handler.now_millis();
                if let Err(e) = handler.on_trigger(reference_time) {
                    log::error!("time trigger evaluation at {reference_time} failed: {e}");
                    handler.record_failure(&e);
                    break;
                }
            }
        }
    }
    log::debug!("time trigger stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use slide_config::WindowConfig;

    #[test]
    fn count_first_firing_waits_for_full_window() {
        let mut trigger = TriggerPolicy::count(2, 5);
        let fired: Vec<bool> = (0..9).map(|_| trigger.on_event()).collect();
        assert_eq!(
            fired,
            vec![false, false, false, false, true, false, true, false, true]
        );
    }

    #[test]
    fn watermark_count_fires_per_slide() {
        let mut trigger = TriggerPolicy::watermark_count(2);
        let refs = trigger.on_watermark(100, |after, upto| {
            assert_eq!((after, upto), (i64::MIN, 100));
            vec![10, 30, 20, 40, 50]
        });
        assert_eq!(refs, vec![30, 40]);

        // The next watermark only counts events after the last reference.
        let refs = trigger.on_watermark(200, |after, _| {
            assert_eq!(after, 40);
            vec![50, 60]
        });
        assert_eq!(refs, vec![60]);
    }

    #[test]
    fn watermark_time_fires_on_first_watermark_then_per_slide() {
        let mut trigger = TriggerPolicy::watermark_time(500);
        assert_eq!(trigger.on_watermark(1000, |_, _| Vec::new()), vec![1000]);
        assert!(trigger.on_watermark(1400, |_, _| Vec::new()).is_empty());
        assert_eq!(trigger.on_watermark(1500, |_, _| Vec::new()), vec![1500]);
    }

    #[test]
    fn processing_time_policies_ignore_watermarks() {
        let mut trigger = TriggerPolicy::count(1, 1);
        assert!(trigger.on_watermark(10, |_, _| vec![1, 2]).is_empty());
        let mut trigger = TriggerPolicy::time(Duration::from_secs(1));
        assert!(!trigger.on_event());
    }

    #[test]
    fn policy_selected_from_plan() {
        let cfg = WindowConfig {
            function: "count".into(),
            length_count: Some(5),
            slide_count: Some(2),
            ..Default::default()
        };
        match TriggerPolicy::for_plan(&cfg.resolve().unwrap()) {
            TriggerPolicy::Count { slide, first, .. } => assert_eq!((slide, first), (2, 5)),
            other => panic!("unexpected {other:?}"),
        }

        let cfg = WindowConfig {
            function: "count".into(),
            length_duration: Some("1s".parse().unwrap()),
            slide_duration: Some("250ms".parse().unwrap()),
            timestamp_extractor: Some("field:ts".into()),
            ..Default::default()
        };
        match TriggerPolicy::for_plan(&cfg.resolve().unwrap()) {
            TriggerPolicy::WatermarkTime { slide_ms, .. } => assert_eq!(slide_ms, 250),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn start_without_runtime_is_lifecycle_error() {
        struct Nop;
        impl TriggerHandler for Nop {
            fn on_trigger(&self, _: i64) -> CoreResult<bool> {
                Ok(false)
            }
            fn now_millis(&self) -> i64 {
                0
            }
            fn record_failure(&self, _: &CoreError) {}
        }
        let handler: std::sync::Arc<dyn TriggerHandler> = std::sync::Arc::new(Nop);
        let mut trigger = TriggerPolicy::time(Duration::from_millis(10));
        let err = trigger
            .start(std::sync::Arc::downgrade(&handler), CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.reason(), &CoreReason::Lifecycle);
    }
}
