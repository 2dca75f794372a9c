use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::io::{InputConfig, OutputConfig};
use crate::logging::LoggingConfig;
use crate::validate;
use crate::window::{WindowConfig, WindowPlan};

// ---------------------------------------------------------------------------
// Raw TOML structure (intermediate representation)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EngineConfigRaw {
    window: WindowConfig,
    #[serde(default)]
    input: InputConfig,
    output: OutputConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// EngineConfig (resolved, validated)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub window: WindowConfig,
    /// `window` resolved once at load time.
    pub plan: WindowPlan,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Read and parse a `slide.toml` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }
}

impl FromStr for EngineConfig {
    type Err = anyhow::Error;

    /// Parse a TOML string into a resolved, validated [`EngineConfig`].
    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let raw: EngineConfigRaw = toml::from_str(toml_str)?;
        let plan = raw
            .window
            .resolve()
            .map_err(|e| anyhow::anyhow!("[window]: {e}"))?;

        let config = EngineConfig {
            window: raw.window,
            plan,
            input: raw.input,
            output: raw.output,
            logging: raw.logging,
        };

        validate::validate(&config)?;

        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use crate::window::{SlidingInterval, WindowLength};
    use std::path::PathBuf;
    use std::time::Duration;

    const FULL_TOML: &str = r#"
[window]
function = "sum:amount"
length_duration = "10s"
slide_duration = "500ms"
timestamp_extractor = "field:ts"
max_lag = "100ms"
watermark_interval = "250ms"
late_data_target = "late"

[input]
path = "events.jsonl"
partitions = ["a", "b"]
linger = "2s"

[output]
path = "out/windows.jsonl"

[output.routes]
late = "out/late.jsonl"

[logging]
level = "debug"
format = "json"
"#;

    #[test]
    fn load_full_toml() {
        let cfg: EngineConfig = FULL_TOML.parse().unwrap();

        assert_eq!(cfg.plan.function, "sum:amount");
        assert_eq!(
            cfg.plan.length,
            WindowLength::Duration(Duration::from_secs(10))
        );
        assert_eq!(
            cfg.plan.slide,
            SlidingInterval::Duration(Duration::from_millis(500))
        );
        let et = cfg.plan.event_time.as_ref().unwrap();
        assert_eq!(et.max_lag, Duration::from_millis(100));
        assert_eq!(et.watermark_interval, Duration::from_millis(250));
        assert_eq!(et.late_data_target.as_deref(), Some("late"));

        assert_eq!(cfg.input.path, Some(PathBuf::from("events.jsonl")));
        assert_eq!(cfg.input.partitions, vec!["a", "b"]);
        assert_eq!(cfg.input.default_partition, "default");
        assert_eq!(cfg.input.linger.as_duration(), Duration::from_secs(2));

        assert_eq!(cfg.output.path, PathBuf::from("out/windows.jsonl"));
        assert_eq!(
            cfg.output.routes.get("late"),
            Some(&PathBuf::from("out/late.jsonl"))
        );

        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let cfg: EngineConfig = r#"
[window]
function = "count"
length_count = 5
slide_count = 2

[output]
path = "out.jsonl"
"#
        .parse()
        .unwrap();

        assert_eq!(cfg.plan.length, WindowLength::Count(5));
        assert_eq!(cfg.plan.slide, SlidingInterval::Count(2));
        assert!(cfg.input.path.is_none());
        assert!(cfg.input.linger.is_zero());
        assert!(cfg.output.routes.is_empty());
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn window_errors_are_prefixed() {
        let err = r#"
[window]
function = "count"

[output]
path = "out.jsonl"
"#
        .parse::<EngineConfig>()
        .unwrap_err();
        assert!(err.to_string().starts_with("[window]"), "got: {err}");
    }
}
