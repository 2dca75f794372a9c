use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use slide_config::WindowConfig;

use super::*;
use crate::error::{CoreReason, CoreResult};
use crate::window::{AckHandle, ManualClock, Window};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Input element: (event timestamp, amount).
type Item = (i64, i64);

#[derive(Default)]
struct Outbox {
    published: Mutex<Vec<Vec<i64>>>,
    late: Mutex<Vec<(String, Item)>>,
}

impl Publisher<Item, Vec<i64>> for Outbox {
    fn publish(&self, output: Vec<i64>) -> anyhow::Result<()> {
        self.published.lock().unwrap().push(output);
        Ok(())
    }

    fn publish_late(&self, target: &str, value: &Item) -> anyhow::Result<()> {
        self.late.lock().unwrap().push((target.to_string(), *value));
        Ok(())
    }
}

fn registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register_function::<Item, Vec<i64>, _>("amounts", |_| {
        Ok(Arc::new(|w: &Window<Item>| -> anyhow::Result<Option<Vec<i64>>> {
            Ok(Some(w.current().iter().map(|(_, v)| *v).collect()))
        }))
    });
    registry.register_function::<Item, Vec<i64>, _>("nothing", |_| {
        Ok(Arc::new(|_: &Window<Item>| -> anyhow::Result<Option<Vec<i64>>> { Ok(None) }))
    });
    registry.register_function::<Item, Vec<i64>, _>("scaled", |arg| {
        let factor: i64 = arg.unwrap_or("1").parse()?;
        Ok(Arc::new(move |w: &Window<Item>| -> anyhow::Result<Option<Vec<i64>>> {
            Ok(Some(w.current().iter().map(|(_, v)| v * factor).collect()))
        }))
    });
    registry.register_extractor::<Item, _>("first", |_| {
        Ok(Arc::new(|item: &Item| -> anyhow::Result<i64> { Ok(item.0) }))
    });
    registry.register_extractor::<Item, _>("negative_fails", |_| {
        Ok(Arc::new(|item: &Item| -> anyhow::Result<i64> {
            if item.0 < 0 {
                anyhow::bail!("negative timestamp");
            }
            Ok(item.0)
        }))
    });
    registry.register_extractor::<String, _>("text", |_| {
        Ok(Arc::new(|s: &String| -> anyhow::Result<i64> { Ok(s.len() as i64) }))
    });
    registry
}

fn counting_ack(counter: &Arc<AtomicUsize>) -> AckHandle {
    let counter = counter.clone();
    AckHandle::from_fn(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

fn executor(
    config: WindowConfig,
    outbox: &Arc<Outbox>,
) -> CoreResult<WindowFunctionExecutor<Item, Vec<i64>>> {
    WindowFunctionExecutor::new(
        &config,
        &registry(),
        outbox.clone(),
        ["a".to_string(), "b".to_string()],
        Arc::new(ManualClock::new(0)),
    )
}

fn event_time_config(late_data_target: Option<&str>) -> WindowConfig {
    WindowConfig {
        function: "amounts".into(),
        length_duration: Some("1s".parse().unwrap()),
        slide_duration: Some("500ms".parse().unwrap()),
        timestamp_extractor: Some("first".into()),
        max_lag: Some("100ms".parse().unwrap()),
        late_data_target: late_data_target.map(String::from),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[test]
fn registry_resolves_with_argument() {
    let registry = registry();
    let scaled = registry
        .resolve_function::<Item, Vec<i64>>("scaled:10")
        .unwrap();
    let window = Window::new(vec![(0, 1), (0, 2)], vec![], vec![]);
    assert_eq!(scaled.process(&window).unwrap(), Some(vec![10, 20]));
    assert_eq!(registry.function_names(), vec!["amounts", "nothing", "scaled"]);
}

#[test]
fn registry_unknown_key_is_configuration_error() {
    let err = registry()
        .resolve_function::<Item, Vec<i64>>("median")
        .err()
        .unwrap();
    assert_eq!(err.reason(), &CoreReason::Configuration);
}

#[test]
fn registry_factory_failure_is_configuration_error() {
    let err = registry()
        .resolve_function::<Item, Vec<i64>>("scaled:ten")
        .err()
        .unwrap();
    assert_eq!(err.reason(), &CoreReason::Configuration);
}

#[test]
fn registry_type_disagreement_is_type_mismatch() {
    let registry = registry();
    let err = registry.resolve_extractor::<Item>("text").err().unwrap();
    assert_eq!(err.reason(), &CoreReason::TypeMismatch);
    let err = registry
        .resolve_function::<Item, String>("amounts")
        .err()
        .unwrap();
    assert_eq!(err.reason(), &CoreReason::TypeMismatch);
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[test]
fn invalid_window_is_configuration_error() {
    let outbox = Arc::new(Outbox::default());
    let config = WindowConfig {
        function: "amounts".into(),
        length_count: Some(5),
        late_data_target: Some("late".into()),
        ..Default::default()
    };
    let err = executor(config, &outbox).err().unwrap();
    assert_eq!(err.reason(), &CoreReason::Configuration);
}

#[test]
fn processing_time_count_window_publishes_and_acks_expired() {
    let outbox = Arc::new(Outbox::default());
    let config = WindowConfig {
        function: "amounts".into(),
        length_count: Some(3),
        slide_count: Some(1),
        ..Default::default()
    };
    let exec = executor(config, &outbox).unwrap();
    let acks = Arc::new(AtomicUsize::new(0));
    for v in 1..=5 {
        exec.process(Record::new((0, v), "a", counting_ack(&acks)))
            .unwrap();
    }
    assert_eq!(
        *outbox.published.lock().unwrap(),
        vec![vec![1, 2, 3], vec![2, 3, 4], vec![3, 4, 5]]
    );
    assert_eq!(acks.load(Ordering::SeqCst), 2);
    assert_eq!(ExecutorStats::get(&exec.stats().admitted), 5);
}

#[test]
fn none_result_publishes_nothing() {
    let outbox = Arc::new(Outbox::default());
    let config = WindowConfig {
        function: "nothing".into(),
        length_count: Some(1),
        ..Default::default()
    };
    let exec = executor(config, &outbox).unwrap();
    exec.process(Record::new((0, 1), "a", AckHandle::noop()))
        .unwrap();
    assert!(outbox.published.lock().unwrap().is_empty());
    assert_eq!(ExecutorStats::get(&exec.stats().activations), 1);
}

#[test]
fn late_event_forwarded_once_and_acked() {
    let outbox = Arc::new(Outbox::default());
    let exec = executor(event_time_config(Some("late")), &outbox).unwrap();
    exec.process(Record::new((1000, 1), "a", AckHandle::noop()))
        .unwrap();
    exec.process(Record::new((1100, 2), "b", AckHandle::noop()))
        .unwrap();
    assert_eq!(exec.emit_watermark().unwrap(), Some(900));

    let acks = Arc::new(AtomicUsize::new(0));
    exec.process(Record::new((850, 3), "a", counting_ack(&acks)))
        .unwrap();

    assert_eq!(
        *outbox.late.lock().unwrap(),
        vec![("late".to_string(), (850, 3))]
    );
    assert_eq!(acks.load(Ordering::SeqCst), 1);
    assert_eq!(exec.manager().len(), 2);
    assert_eq!(ExecutorStats::get(&exec.stats().late_forwarded), 1);
}

#[test]
fn late_event_dropped_without_route_is_acked_once() {
    let outbox = Arc::new(Outbox::default());
    let exec = executor(event_time_config(None), &outbox).unwrap();
    exec.process(Record::new((1000, 1), "a", AckHandle::noop()))
        .unwrap();
    exec.process(Record::new((1100, 2), "b", AckHandle::noop()))
        .unwrap();
    exec.emit_watermark().unwrap();

    let acks = Arc::new(AtomicUsize::new(0));
    exec.process(Record::new((850, 3), "a", counting_ack(&acks)))
        .unwrap();

    assert!(outbox.late.lock().unwrap().is_empty());
    assert_eq!(acks.load(Ordering::SeqCst), 1);
    assert_eq!(ExecutorStats::get(&exec.stats().late_dropped), 1);

    // Advance far enough for the on-time events to be aggregated.
    exec.process(Record::new((2000, 4), "a", AckHandle::noop()))
        .unwrap();
    exec.process(Record::new((2000, 5), "b", AckHandle::noop()))
        .unwrap();
    assert_eq!(exec.emit_watermark().unwrap(), Some(1900));
    let published = outbox.published.lock().unwrap().clone();
    assert_eq!(published, vec![vec![1, 2]]);
}

#[test]
fn extraction_failure_aborts_record() {
    let outbox = Arc::new(Outbox::default());
    let mut config = event_time_config(None);
    config.timestamp_extractor = Some("negative_fails".into());
    let exec = executor(config, &outbox).unwrap();
    let acks = Arc::new(AtomicUsize::new(0));
    let err = exec
        .process(Record::new((-1, 1), "a", counting_ack(&acks)))
        .unwrap_err();
    assert_eq!(err.reason(), &CoreReason::Extraction);
    assert_eq!(acks.load(Ordering::SeqCst), 0);
    assert!(exec.manager().is_empty());
}

#[test]
fn watermark_waits_for_declared_partitions() {
    let outbox = Arc::new(Outbox::default());
    let exec = executor(event_time_config(None), &outbox).unwrap();
    exec.process(Record::new((1000, 1), "a", AckHandle::noop()))
        .unwrap();
    assert_eq!(exec.emit_watermark().unwrap(), None);
    assert_eq!(exec.current_watermark(), None);
}
