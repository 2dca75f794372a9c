use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

/// Watermark lag applied when `max_lag` is omitted.
pub const DEFAULT_MAX_LAG: Duration = Duration::ZERO;
/// Watermark emit interval applied when `watermark_interval` is omitted.
pub const DEFAULT_WATERMARK_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// WindowConfig, deserialized from [window]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WindowConfig {
    /// Registry key of the aggregation, optionally `name:argument`.
    pub function: String,
    pub length_count: Option<usize>,
    pub length_duration: Option<HumanDuration>,
    pub slide_count: Option<usize>,
    pub slide_duration: Option<HumanDuration>,
    /// Registry key of the timestamp extractor. Selects event-time mode.
    pub timestamp_extractor: Option<String>,
    pub max_lag: Option<HumanDuration>,
    pub watermark_interval: Option<HumanDuration>,
    /// Route name that receives late events instead of dropping them.
    pub late_data_target: Option<String>,
}

// ---------------------------------------------------------------------------
// WindowPlan, the resolved window definition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowLength {
    Count(usize),
    Duration(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlidingInterval {
    Count(usize),
    Duration(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTimePlan {
    pub extractor: String,
    pub max_lag: Duration,
    pub watermark_interval: Duration,
    pub late_data_target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    pub function: String,
    pub length: WindowLength,
    pub slide: SlidingInterval,
    /// `None` for processing-time windows.
    pub event_time: Option<EventTimePlan>,
}

impl WindowPlan {
    pub fn is_event_time(&self) -> bool {
        self.event_time.is_some()
    }

    /// Window length in milliseconds for duration windows.
    pub fn length_millis(&self) -> Option<i64> {
        match self.length {
            WindowLength::Duration(d) => Some(duration_millis(d)),
            WindowLength::Count(_) => None,
        }
    }
}

impl WindowConfig {
    /// Validate this section and resolve it into a [`WindowPlan`].
    ///
    /// A missing sliding interval makes the window tumbling: the slide takes
    /// the length's value and unit.
    pub fn resolve(&self) -> anyhow::Result<WindowPlan> {
        if self.function.trim().is_empty() {
            anyhow::bail!("window.function must name a registered window function");
        }

        let length = match (self.length_count, self.length_duration) {
            (None, None) => anyhow::bail!("window length is not specified"),
            (Some(_), Some(_)) => anyhow::bail!(
                "window length for time and count are both set, set one or the other"
            ),
            (Some(0), None) => anyhow::bail!("window.length_count must be positive"),
            (Some(n), None) => WindowLength::Count(n),
            (None, Some(d)) if d.is_zero() => {
                anyhow::bail!("window.length_duration must be positive")
            }
            (None, Some(d)) => WindowLength::Duration(d.as_duration()),
        };

        let slide = match (self.slide_count, self.slide_duration) {
            (Some(_), Some(_)) => anyhow::bail!(
                "sliding interval for time and count are both set, set one or the other"
            ),
            (Some(0), None) => anyhow::bail!("window.slide_count must be positive"),
            (Some(n), None) => SlidingInterval::Count(n),
            (None, Some(d)) if d.is_zero() => {
                anyhow::bail!("window.slide_duration must be positive")
            }
            (None, Some(d)) => SlidingInterval::Duration(d.as_duration()),
            (None, None) => match length {
                WindowLength::Count(n) => SlidingInterval::Count(n),
                WindowLength::Duration(d) => SlidingInterval::Duration(d),
            },
        };

        let event_time = match &self.timestamp_extractor {
            Some(extractor) => {
                let watermark_interval = self
                    .watermark_interval
                    .map(|d| d.as_duration())
                    .unwrap_or(DEFAULT_WATERMARK_INTERVAL);
                if watermark_interval.is_zero() {
                    anyhow::bail!("window.watermark_interval must be positive");
                }
                Some(EventTimePlan {
                    extractor: extractor.clone(),
                    max_lag: self
                        .max_lag
                        .map(|d| d.as_duration())
                        .unwrap_or(DEFAULT_MAX_LAG),
                    watermark_interval,
                    late_data_target: self.late_data_target.clone(),
                })
            }
            None => {
                if self.late_data_target.is_some() {
                    anyhow::bail!(
                        "window.late_data_target can be set only together with window.timestamp_extractor"
                    );
                }
                None
            }
        };

        Ok(WindowPlan {
            function: self.function.clone(),
            length,
            slide,
            event_time,
        })
    }
}

pub(crate) fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> WindowConfig {
        WindowConfig {
            function: "count".into(),
            ..Default::default()
        }
    }

    #[test]
    fn count_window_defaults_to_tumbling() {
        let cfg = WindowConfig {
            length_count: Some(10),
            ..base()
        };
        let plan = cfg.resolve().unwrap();
        assert_eq!(plan.length, WindowLength::Count(10));
        assert_eq!(plan.slide, SlidingInterval::Count(10));
        assert!(!plan.is_event_time());
        assert_eq!(plan.length_millis(), None);
    }

    #[test]
    fn duration_window_with_count_slide() {
        let cfg = WindowConfig {
            length_duration: Some("1s".parse().unwrap()),
            slide_count: Some(3),
            ..base()
        };
        let plan = cfg.resolve().unwrap();
        assert_eq!(plan.length, WindowLength::Duration(Duration::from_secs(1)));
        assert_eq!(plan.slide, SlidingInterval::Count(3));
        assert_eq!(plan.length_millis(), Some(1000));
    }

    #[test]
    fn event_time_applies_defaults() {
        let cfg = WindowConfig {
            length_duration: Some("10s".parse().unwrap()),
            slide_duration: Some("500ms".parse().unwrap()),
            timestamp_extractor: Some("field:ts".into()),
            ..base()
        };
        let plan = cfg.resolve().unwrap();
        let et = plan.event_time.unwrap();
        assert_eq!(et.extractor, "field:ts");
        assert_eq!(et.max_lag, DEFAULT_MAX_LAG);
        assert_eq!(et.watermark_interval, DEFAULT_WATERMARK_INTERVAL);
        assert_eq!(et.late_data_target, None);
    }

    #[test]
    fn reject_missing_length() {
        let err = base().resolve().unwrap_err();
        assert!(err.to_string().contains("not specified"), "got: {err}");
    }

    #[test]
    fn reject_both_lengths() {
        let cfg = WindowConfig {
            length_count: Some(5),
            length_duration: Some("5s".parse().unwrap()),
            ..base()
        };
        assert!(cfg.resolve().is_err());
    }

    #[test]
    fn reject_both_slides() {
        let cfg = WindowConfig {
            length_count: Some(5),
            slide_count: Some(2),
            slide_duration: Some("1s".parse().unwrap()),
            ..base()
        };
        assert!(cfg.resolve().is_err());
    }

    #[test]
    fn reject_non_positive_values() {
        let zero_len = WindowConfig {
            length_count: Some(0),
            ..base()
        };
        assert!(zero_len.resolve().is_err());

        let zero_slide = WindowConfig {
            length_duration: Some("1s".parse().unwrap()),
            slide_duration: Some("0s".parse().unwrap()),
            ..base()
        };
        assert!(zero_slide.resolve().is_err());

        let zero_interval = WindowConfig {
            length_count: Some(5),
            timestamp_extractor: Some("ts".into()),
            watermark_interval: Some("0ms".parse().unwrap()),
            ..base()
        };
        assert!(zero_interval.resolve().is_err());
    }

    #[test]
    fn reject_late_target_without_event_time() {
        let cfg = WindowConfig {
            length_count: Some(5),
            late_data_target: Some("late".into()),
            ..base()
        };
        let err = cfg.resolve().unwrap_err();
        assert!(err.to_string().contains("timestamp_extractor"), "got: {err}");
    }

    #[test]
    fn reject_empty_function() {
        let cfg = WindowConfig {
            function: " ".into(),
            length_count: Some(5),
            ..Default::default()
        };
        assert!(cfg.resolve().is_err());
    }
}
