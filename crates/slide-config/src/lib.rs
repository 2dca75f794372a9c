pub mod engine;
pub mod io;
pub mod logging;
pub mod types;
mod validate;
pub mod window;

pub use engine::EngineConfig;
pub use io::{InputConfig, OutputConfig};
pub use logging::{LogFormat, LoggingConfig};
pub use types::HumanDuration;
pub use window::{EventTimePlan, SlidingInterval, WindowConfig, WindowLength, WindowPlan};
