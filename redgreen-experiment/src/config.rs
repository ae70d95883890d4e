use redgreen_timing::{DEFAULT_FPS, DEFAULT_TOLERANCE};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Playback rate for scenes that carry no `fps` of their own.
    pub default_fps: f32,
    pub frame_tolerance: f64,
    pub countdown_from: u32,
    pub countdown_interval_ms: u64,
    /// Pause between the end signal and the save request.
    pub settle_delay_ms: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            default_fps: DEFAULT_FPS,
            frame_tolerance: DEFAULT_TOLERANCE,
            countdown_from: 3,
            countdown_interval_ms: 750,
            settle_delay_ms: 500,
        }
    }
}

impl ExperimentConfig {
    pub fn countdown_interval(&self) -> Duration {
        Duration::from_millis(self.countdown_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
