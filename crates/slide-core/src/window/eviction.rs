use slide_config::{WindowLength, WindowPlan};

/// Per-event verdict of an [`EvictionPolicy`] scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictAction {
    /// Remove the event from the buffer and report it as expired.
    Expire,
    /// Keep the event and include it in the current window.
    Process,
    /// Keep the event but leave it out of the current window.
    Keep,
    /// End the scan; this and every later event stay untouched.
    Stop,
}

/// Reference point set before each evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionContext {
    pub reference_time: i64,
    /// Buffered events with `timestamp <= reference_time`, when known.
    pub current_count: Option<usize>,
}

/// Decides which buffered events have left the window.
///
/// The variant is chosen by the window definition: count or duration length,
/// processing or event time. Events are visited in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Retain the `threshold` most recently admitted events.
    Count { threshold: usize, current: usize },
    /// Expire events older than `reference_time - length_ms`.
    Time {
        length_ms: i64,
        context: Option<EvictionContext>,
    },
    /// Retain the last `threshold` events at or before the watermark.
    WatermarkCount {
        threshold: usize,
        current: usize,
        processed: usize,
        context: Option<EvictionContext>,
    },
    /// Expire events older than `watermark - length_ms`. The watermark already
    /// includes the configured lag. The scan stops at the first event later
    /// than `watermark + lag_ms`.
    WatermarkTime {
        length_ms: i64,
        lag_ms: i64,
        context: Option<EvictionContext>,
    },
}

impl EvictionPolicy {
    pub fn count(threshold: usize) -> Self {
        Self::Count {
            threshold,
            current: 0,
        }
    }

    pub fn time(length_ms: i64) -> Self {
        Self::Time {
            length_ms,
            context: None,
        }
    }

    pub fn watermark_count(threshold: usize) -> Self {
        Self::WatermarkCount {
            threshold,
            current: 0,
            processed: 0,
            context: None,
        }
    }

    pub fn watermark_time(length_ms: i64, lag_ms: i64) -> Self {
        Self::WatermarkTime {
            length_ms,
            lag_ms,
            context: None,
        }
    }

    /// Select the policy matching a resolved window definition.
    pub fn for_plan(plan: &WindowPlan) -> Self {
        match (plan.length, plan.is_event_time()) {
            (WindowLength::Count(n), false) => Self::count(n),
            (WindowLength::Count(n), true) => Self::watermark_count(n),
            (WindowLength::Duration(_), _) => {
                let length_ms = plan.length_millis().unwrap_or(i64::MAX);
                match &plan.event_time {
                    Some(et) => Self::watermark_time(
                        length_ms,
                        i64::try_from(et.max_lag.as_millis()).unwrap_or(i64::MAX),
                    ),
                    None => Self::time(length_ms),
                }
            }
        }
    }

    pub fn needs_current_count(&self) -> bool {
        matches!(self, Self::WatermarkCount { .. })
    }

    /// Record an admitted event.
    pub fn track(&mut self, _timestamp: i64) {
        if let Self::Count { current, .. } = self {
            *current += 1;
        }
    }

    /// Install the reference point for the next scan.
    pub fn set_context(&mut self, ctx: EvictionContext) {
        match self {
            Self::Count { .. } => {}
            Self::Time { context, .. } | Self::WatermarkTime { context, .. } => {
                *context = Some(ctx);
            }
            Self::WatermarkCount {
                current,
                processed,
                context,
                ..
            } => {
                *current = ctx.current_count.unwrap_or(*processed);
                *processed = 0;
                *context = Some(ctx);
            }
        }
    }

    pub fn context(&self) -> Option<EvictionContext> {
        match self {
            Self::Count { .. } => None,
            Self::Time { context, .. }
            | Self::WatermarkTime { context, .. }
            | Self::WatermarkCount { context, .. } => *context,
        }
    }

    /// Verdict for one event, visited in arrival order.
    pub fn evict(&mut self, timestamp: i64) -> EvictAction {
        match self {
            Self::Count { threshold, current } => {
                if *current > *threshold {
                    *current -= 1;
                    EvictAction::Expire
                } else {
                    EvictAction::Process
                }
            }
            Self::WatermarkTime {
                length_ms,
                lag_ms,
                context,
            } => {
                let Some(ctx) = context else {
                    return EvictAction::Stop;
                };
                if timestamp > ctx.reference_time.saturating_add(*lag_ms) {
                    EvictAction::Stop
                } else if timestamp > ctx.reference_time {
                    EvictAction::Keep
                } else if timestamp < ctx.reference_time.saturating_sub(*length_ms) {
                    EvictAction::Expire
                } else {
                    EvictAction::Process
                }
            }
            Self::Time { length_ms, context } => {
                let Some(ctx) = context else {
                    return EvictAction::Stop;
                };
                let boundary = ctx.reference_time.saturating_sub(*length_ms);
                if timestamp < boundary {
                    EvictAction::Expire
                } else if timestamp > ctx.reference_time {
                    EvictAction::Keep
                } else {
                    EvictAction::Process
                }
            }
            Self::WatermarkCount {
                threshold,
                current,
                processed,
                context,
            } => {
                let Some(ctx) = context else {
                    return EvictAction::Stop;
                };
                if timestamp <= ctx.reference_time && *processed < *current {
                    if *current > *threshold {
                        *current -= 1;
                        EvictAction::Expire
                    } else {
                        *processed += 1;
                        EvictAction::Process
                    }
                } else {
                    EvictAction::Keep
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
