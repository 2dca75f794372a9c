//! Built-in window functions and timestamp extractors over JSON values.
//!
//! | key           | result                                  |
//! |---------------|-----------------------------------------|
//! | `count`       | number of values in the window          |
//! | `collect`     | the window's values as an array         |
//! | `sum:<path>`  | sum of the numeric field at `<path>`    |
//! | `avg:<path>`  | mean of that field, `null` when empty   |
//! | `min:<path>`  | smallest value, `null` when empty       |
//! | `max:<path>`  | largest value, `null` when empty        |
//!
//! `<path>` is a dotted field path (`"order.amount"`). Every function
//! publishes `{"start", "end", "count", "added", "expired", "result"}`.
//!
//! The only extractor is `field:<path>`, reading an integer millisecond
//! timestamp (or a string holding one).

use std::sync::Arc;

use serde_json::{Value, json};
use slide_core::function::{FunctionRegistry, TimestampExtractor, WindowFunction};
use slide_core::window::Window;

type JsonFunction = Arc<dyn WindowFunction<Value, Value>>;

/// Registry holding every built-in function and extractor.
pub fn builtin_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();

    registry.register_function::<Value, Value, _>("count", |_| {
        Ok(output_fn(|window| json!(window.len())))
    });
    registry.register_function::<Value, Value, _>("collect", |_| {
        Ok(output_fn(|window| Value::Array(window.current().to_vec())))
    });
    registry.register_function::<Value, Value, _>("sum", |arg| {
        let path = require_path("sum", arg)?;
        Ok(output_fn(move |window| json!(numbers(window, &path).sum::<f64>())))
    });
    registry.register_function::<Value, Value, _>("avg", |arg| {
        let path = require_path("avg", arg)?;
        Ok(output_fn(move |window| {
            let (sum, n) = numbers(window, &path).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if n == 0 { Value::Null } else { json!(sum / n as f64) }
        }))
    });
    registry.register_function::<Value, Value, _>("min", |arg| {
        let path = require_path("min", arg)?;
        Ok(output_fn(move |window| {
            numbers(window, &path).reduce(f64::min).map_or(Value::Null, |v| json!(v))
        }))
    });
    registry.register_function::<Value, Value, _>("max", |arg| {
        let path = require_path("max", arg)?;
        Ok(output_fn(move |window| {
            numbers(window, &path).reduce(f64::max).map_or(Value::Null, |v| json!(v))
        }))
    });

    registry.register_extractor::<Value, _>("field", |arg| {
        let path = require_path("field", arg)?;
        let extractor: Arc<dyn TimestampExtractor<Value>> =
            Arc::new(move |value: &Value| -> anyhow::Result<i64> {
                let field = lookup(value, &path)
                    .ok_or_else(|| anyhow::anyhow!("timestamp field {path:?} is missing"))?;
                match field {
                    Value::Number(n) => n
                        .as_i64()
                        .ok_or_else(|| anyhow::anyhow!("timestamp {n} is not an integer")),
                    Value::String(s) => s
                        .parse()
                        .map_err(|e| anyhow::anyhow!("timestamp {s:?} is not an integer: {e}")),
                    other => anyhow::bail!("timestamp field {path:?} holds {other}"),
                }
            });
        Ok(extractor)
    });

    registry
}

/// Wrap a result computation into a function publishing the output object.
fn output_fn<F>(result: F) -> JsonFunction
where
    F: Fn(&Window<Value>) -> Value + Send + Sync + 'static,
{
    Arc::new(
        move |window: &Window<Value>| -> anyhow::Result<Option<Value>> {
            Ok(Some(window_output(window, result(window))))
        },
    )
}

/// Output object published for one window.
pub fn window_output(window: &Window<Value>, result: Value) -> Value {
    json!({
        "start": window.start_timestamp(),
        "end": window.end_timestamp(),
        "count": window.len(),
        "added": window.added().len(),
        "expired": window.expired().len(),
        "result": result,
    })
}

fn require_path(function: &str, arg: Option<&str>) -> anyhow::Result<String> {
    match arg {
        Some(path) if !path.is_empty() => Ok(path.to_string()),
        _ => anyhow::bail!("{function} needs a field path, e.g. \"{function}:amount\""),
    }
}

/// Dotted-path field lookup.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}

fn numbers<'a>(window: &'a Window<Value>, path: &'a str) -> impl Iterator<Item = f64> + 'a {
    window
        .current()
        .iter()
        .filter_map(move |v| lookup(v, path).and_then(Value::as_f64))
}
