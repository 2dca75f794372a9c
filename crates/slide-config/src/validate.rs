use crate::engine::EngineConfig;

/// Cross-section validation, called automatically by `EngineConfig::from_str`.
pub(crate) fn validate(config: &EngineConfig) -> anyhow::Result<()> {
    if config.output.path.as_os_str().is_empty() {
        anyhow::bail!("output.path must not be empty");
    }

    if config.input.default_partition.is_empty() {
        anyhow::bail!("input.default_partition must not be empty");
    }

    for (i, partition) in config.input.partitions.iter().enumerate() {
        if partition.is_empty() {
            anyhow::bail!("input.partitions[{i}] must not be empty");
        }
    }

    // A late-data target must name a configured route.
    if let Some(target) = config
        .plan
        .event_time
        .as_ref()
        .and_then(|et| et.late_data_target.as_ref())
        && !config.output.routes.contains_key(target)
    {
        anyhow::bail!(
            "window.late_data_target {target:?} has no matching [output.routes] entry"
        );
    }

    for (name, path) in &config.output.routes {
        if path.as_os_str().is_empty() {
            anyhow::bail!("output.routes.{name} must not be empty");
        }
        if *path == config.output.path {
            anyhow::bail!("output.routes.{name} must differ from output.path");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::EngineConfig;

    /// Minimal valid event-time TOML for validation tests.
    const MINIMAL_TOML: &str = r#"
[window]
function = "count"
length_count = 5
timestamp_extractor = "field:ts"
late_data_target = "late"

[output]
path = "out.jsonl"

[output.routes]
late = "late.jsonl"
"#;

    #[test]
    fn accept_minimal() {
        assert!(MINIMAL_TOML.parse::<EngineConfig>().is_ok());
    }

    #[test]
    fn reject_unknown_late_route() {
        let toml = MINIMAL_TOML.replace(r#"late = "late.jsonl""#, r#"other = "o.jsonl""#);
        let err = toml.parse::<EngineConfig>().unwrap_err();
        assert!(
            err.to_string().contains("\"late\""),
            "expected missing-route error, got: {err}",
        );
    }

    #[test]
    fn reject_route_shadowing_output() {
        let toml = MINIMAL_TOML.replace(r#"late = "late.jsonl""#, r#"late = "out.jsonl""#);
        let err = toml.parse::<EngineConfig>().unwrap_err();
        assert!(err.to_string().contains("must differ"), "got: {err}");
    }

    #[test]
    fn reject_empty_partition_name() {
        let toml = format!("{MINIMAL_TOML}\n[input]\npartitions = [\"a\", \"\"]\n");
        let err = toml.parse::<EngineConfig>().unwrap_err();
        assert!(err.to_string().contains("partitions[1]"), "got: {err}");
    }
}
