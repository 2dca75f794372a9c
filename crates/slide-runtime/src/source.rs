use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use orion_error::prelude::*;
use orion_error::ErrorOweBase;
use serde_json::Value;
use slide_core::error::CoreReason;
use slide_core::function::{Record, WindowFunctionExecutor};
use slide_core::window::AckHandle;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::{RuntimeReason, RuntimeResult};

// ---------------------------------------------------------------------------
// AckLedger
// ---------------------------------------------------------------------------

/// Counts acknowledgement handles handed out and acknowledgements received.
#[derive(Debug, Default)]
pub struct AckLedger {
    dispatched: AtomicU64,
    acked: AtomicU64,
}

impl AckLedger {
    /// A fresh handle for one input record.
    pub fn handle(self: &Arc<Self>) -> AckHandle {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let ledger = Arc::clone(self);
        AckHandle::from_fn(move || {
            ledger.acked.fetch_add(1, Ordering::Relaxed);
        })
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    /// Records handed to the window but not acknowledged yet.
    pub fn outstanding(&self) -> u64 {
        self.dispatched().saturating_sub(self.acked())
    }
}

// ---------------------------------------------------------------------------
// Line parsing
// ---------------------------------------------------------------------------

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub struct InputLine {
    pub partition: Option<String>,
    pub value: Value,
}

/// Parse a JSON Lines input line.
///
/// `{"partition": "p", "value": ...}` carries its partition; an object with a
/// `value` key but no partition, or any other JSON value, lands in the
/// default partition. Blank lines yield `None`.
pub fn parse_line(line: &str) -> anyhow::Result<Option<InputLine>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parsed: Value = serde_json::from_str(line)?;
    let Value::Object(mut map) = parsed else {
        return Ok(Some(InputLine {
            partition: None,
            value: parsed,
        }));
    };
    let Some(value) = map.remove("value") else {
        return Ok(Some(InputLine {
            partition: None,
            value: Value::Object(map),
        }));
    };
    let partition = match map.remove("partition") {
        None | Some(Value::Null) => None,
        Some(Value::String(p)) => Some(p),
        Some(other) => anyhow::bail!("partition must be a string, got {other}"),
    };
    Ok(Some(InputLine { partition, value }))
}

// ---------------------------------------------------------------------------
// run_source
// ---------------------------------------------------------------------------

/// Counters of one source run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SourceReport {
    pub lines: u64,
    pub records: u64,
    pub malformed: u64,
    pub extraction_failed: u64,
}

/// Feed every line of `reader` into `executor` until end of input or
/// cancellation.
///
/// Malformed lines and records whose timestamp cannot be extracted are logged
/// and skipped. Any other window error ends the run.
pub async fn run_source<R>(
    reader: R,
    executor: &WindowFunctionExecutor<Value, Value>,
    ledger: &Arc<AckLedger>,
    default_partition: &str,
    cancel: CancellationToken,
) -> RuntimeResult<SourceReport>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut report = SourceReport::default();
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                sw_debug!(io, lines = report.lines, "input cancelled");
                break;
            }
            line = lines.next_line() => line.owe(RuntimeReason::Source)?,
        };
        let Some(line) = line else {
            sw_debug!(io, lines = report.lines, "end of input");
            break;
        };
        report.lines += 1;

        let parsed = match parse_line(&line) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(e) => {
                report.malformed += 1;
                sw_warn!(io, line = report.lines, error = %e, "skipping malformed input line");
                continue;
            }
        };
        let partition = parsed
            .partition
            .unwrap_or_else(|| default_partition.to_string());
        let record = Record::new(parsed.value, partition, ledger.handle());

        match executor.process(record) {
            Ok(()) => report.records += 1,
            Err(e) if e.reason() == &CoreReason::Extraction => {
                report.extraction_failed += 1;
                sw_warn!(io, line = report.lines, error = %e, "skipping record without usable timestamp");
            }
            Err(e) => return Err(e).err_conv(),
        }
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_enveloped_line() {
        let parsed = parse_line(r#"{"partition": "a", "value": {"ts": 5}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(parsed.partition.as_deref(), Some("a"));
        assert_eq!(parsed.value, json!({"ts": 5}));
    }

    #[test]
    fn parse_bare_values() {
        let parsed = parse_line("42").unwrap().unwrap();
        assert_eq!(parsed, InputLine { partition: None, value: json!(42) });

        let parsed = parse_line(r#"{"ts": 1, "amount": 2}"#).unwrap().unwrap();
        assert_eq!(parsed.partition, None);
        assert_eq!(parsed.value, json!({"ts": 1, "amount": 2}));

        let parsed = parse_line(r#"{"value": 7}"#).unwrap().unwrap();
        assert_eq!(parsed, InputLine { partition: None, value: json!(7) });
    }

    #[test]
    fn parse_rejects_bad_lines() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("{not json").is_err());
        assert!(parse_line(r#"{"partition": 3, "value": 1}"#).is_err());
    }

    #[test]
    fn ledger_counts_acks() {
        let ledger = Arc::new(AckLedger::default());
        let a = ledger.handle();
        let _b = ledger.handle();
        a.ack();
        assert_eq!(ledger.dispatched(), 2);
        assert_eq!(ledger.acked(), 1);
        assert_eq!(ledger.outstanding(), 1);
    }
}
