//! End-to-end runs: JSON Lines file → window engine → JSON Lines results.

use std::path::Path;

use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use slide_config::EngineConfig;
use slide_runtime::lifecycle::Engine;
use slide_runtime::tracing_init::DomainFormat;

fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .event_format(DomainFormat::new())
                .with_test_writer()
                .with_filter(EnvFilter::try_new("debug").unwrap()),
        )
        .try_init();
}

fn read_jsonl(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn tumbling_count_window_sums_amounts() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let input: String = (1..=7)
        .map(|n| format!("{{\"amount\": {n}}}\n"))
        .collect();
    std::fs::write(dir.path().join("in.jsonl"), input).unwrap();

    let config: EngineConfig = r#"
[window]
function = "sum:amount"
length_count = 3

[input]
path = "in.jsonl"

[output]
path = "out/windows.jsonl"
"#
    .parse()
    .unwrap();

    let engine = Engine::start(config, dir.path()).await.unwrap();
    let report = engine.wait().await.unwrap();

    let results = read_jsonl(&dir.path().join("out/windows.jsonl"));
    let sums: Vec<f64> = results
        .iter()
        .map(|r| r["result"].as_f64().unwrap())
        .collect();
    assert_eq!(sums, vec![6.0, 15.0]);
    assert_eq!(results[1]["count"], 3);
    assert_eq!(results[1]["added"], 3);
    assert_eq!(results[1]["expired"], 3);
    assert!(results[0]["start"].is_null());

    assert_eq!(report.records, 7);
    assert_eq!(report.admitted, 7);
    assert_eq!(report.activations, 2);
    assert_eq!(report.published, 2);
    assert_eq!(report.dispatched, 7);
    // the first window's events were evicted by the second firing
    assert_eq!(report.acked, 3);
}

#[tokio::test]
async fn event_time_window_fires_on_watermark() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let input = [100, 400, 700, 1200, 1600]
        .iter()
        .map(|ts| format!("{{\"partition\": \"p0\", \"value\": {{\"ts\": {ts}}}}}\n"))
        .collect::<String>();
    std::fs::write(dir.path().join("in.jsonl"), input).unwrap();

    let config: EngineConfig = r#"
[window]
function = "count"
length_duration = "1s"
slide_duration = "500ms"
timestamp_extractor = "field:ts"
watermark_interval = "300ms"

[input]
path = "in.jsonl"
linger = "700ms"

[output]
path = "windows.jsonl"
"#
    .parse()
    .unwrap();

    let engine = Engine::start(config, dir.path()).await.unwrap();
    let report = engine.wait().await.unwrap();

    // The whole input is read before the first tick, so the first
    // watermark is 1600 and a single window [600, 1600] fires.
    let results = read_jsonl(&dir.path().join("windows.jsonl"));
    assert_eq!(results.len(), 1, "got {results:?}");
    assert_eq!(results[0]["start"], 600);
    assert_eq!(results[0]["end"], 1600);
    assert_eq!(results[0]["result"], 3);
    assert_eq!(results[0]["expired"], 2);

    assert_eq!(report.admitted, 5);
    assert_eq!(report.late_dropped, 0);
    assert_eq!(report.acked, 2);
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("in.jsonl"),
        "{\"ts\": 10}\nnot json\n\n{\"ts\": \"oops\"}\n{\"ts\": 20}\n",
    )
    .unwrap();

    let config: EngineConfig = r#"
[window]
function = "collect"
length_duration = "1s"
timestamp_extractor = "field:ts"
watermark_interval = "300ms"

[input]
path = "in.jsonl"
linger = "700ms"

[output]
path = "windows.jsonl"
"#
    .parse()
    .unwrap();

    let engine = Engine::start(config, dir.path()).await.unwrap();
    let report = engine.wait().await.unwrap();

    assert_eq!(report.lines, 5);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.extraction_failed, 1);
    assert_eq!(report.records, 2);

    let results = read_jsonl(&dir.path().join("windows.jsonl"));
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["result"], serde_json::json!([{"ts": 10}, {"ts": 20}]));
}

#[tokio::test]
async fn missing_input_file_fails_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let config: EngineConfig = r#"
[window]
function = "count"
length_count = 2

[input]
path = "absent.jsonl"

[output]
path = "windows.jsonl"
"#
    .parse()
    .unwrap();

    assert!(Engine::start(config, dir.path()).await.is_err());
}
