mod buffer;
mod clock;
mod event;
mod eviction;
mod manager;
mod trigger;
mod view;
mod watermark;


pub use buffer::EventBuffer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{AckHandle, Acknowledge, Event};
pub use eviction::{EvictAction, EvictionContext, EvictionPolicy};
pub use manager::{WindowLifecycleListener, WindowManager};
pub use trigger::{TriggerHandler, TriggerPolicy};
pub use view::{Activation, Window};
pub use watermark::{WatermarkGenerator, WatermarkHandler};
