pub mod interval;
pub mod pacer;
pub mod timer;

pub use interval::RepeatingTimer;
pub use pacer::{FramePacer, DEFAULT_FPS, DEFAULT_TOLERANCE};
pub use timer::{precise_sleep, CallbackStats, HighPrecisionTimer, ManualTimer, Timer};

use chrono::{DateTime, Utc};

/// Wall-clock UTC read used to stamp response records and sync signals.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}
