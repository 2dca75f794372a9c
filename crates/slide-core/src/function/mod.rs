//! User-facing window functions, their registry, and the executor that wires
//! a configured window around them.

mod executor;
mod registry;

#[cfg(test)]
mod tests;

pub use executor::{ExecutorStats, Publisher, Record, WindowFunctionExecutor};
pub use registry::FunctionRegistry;

use crate::window::Window;

/// Aggregation invoked once per activation. `Ok(None)` publishes nothing.
pub trait WindowFunction<T, O>: Send + Sync {
    fn process(&self, window: &Window<T>) -> anyhow::Result<Option<O>>;
}

impl<T, O, F> WindowFunction<T, O> for F
where
    F: Fn(&Window<T>) -> anyhow::Result<Option<O>> + Send + Sync,
{
    fn process(&self, window: &Window<T>) -> anyhow::Result<Option<O>> {
        self(window)
    }
}

/// Reads the event-time timestamp, in epoch milliseconds, of an input value.
pub trait TimestampExtractor<T>: Send + Sync {
    fn extract_timestamp(&self, value: &T) -> anyhow::Result<i64>;
}

impl<T, F> TimestampExtractor<T> for F
where
    F: Fn(&T) -> anyhow::Result<i64> + Send + Sync,
{
    fn extract_timestamp(&self, value: &T) -> anyhow::Result<i64> {
        self(value)
    }
}
