#[macro_use]
mod log_macros;

pub mod builtins;
pub mod error;
pub mod lifecycle;
pub mod sink;
pub mod source;
pub mod tracing_init;
