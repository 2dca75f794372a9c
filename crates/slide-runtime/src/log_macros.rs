//! Logging macros that tag every event with a `domain` field.
//!
//! Domains:
//! - `sys`: engine lifecycle, signals, shutdown
//! - `win`: window activations, watermarks, late data
//! - `io`: input lines and output files
//! - `conf`: configuration and registry resolution
//!
//! ```ignore
//! sw_info!(sys, partitions = 2, "engine started");
//! sw_warn!(io, line = n, error = %e, "skipping malformed input line");
//! ```
//!
//! The domain is a bare identifier, turned into a string by the macro.

#[doc(hidden)]
macro_rules! sw_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

#[allow(unused_macros)]
macro_rules! sw_error {
    ($domain:ident, $($rest:tt)*) => {
        sw_log!(error, $domain, $($rest)*)
    };
}

macro_rules! sw_warn {
    ($domain:ident, $($rest:tt)*) => {
        sw_log!(warn, $domain, $($rest)*)
    };
}

macro_rules! sw_info {
    ($domain:ident, $($rest:tt)*) => {
        sw_log!(info, $domain, $($rest)*)
    };
}

macro_rules! sw_debug {
    ($domain:ident, $($rest:tt)*) => {
        sw_log!(debug, $domain, $($rest)*)
    };
}
