//! Controller cycle and the loop that drives it

mod clock;
mod cycle;
mod r#loop;


pub use clock::{Clock, FixedClock, SystemClock};
pub use cycle::{Controller, CycleReport};
pub use r#loop::{ControlLoop, ControlLoopBuilder, DEFAULT_POLL_INTERVAL};
