use std::time::Duration;

/// Fraction of the frame interval that counts as "one interval elapsed".
/// Absorbs scheduler jitter without letting drift accumulate.
pub const DEFAULT_TOLERANCE: f64 = 0.98;
pub const DEFAULT_FPS: f32 = 30.0;

/// Decouples the logical frame rate from the display refresh rate.
///
/// Fed the timestamp of every display callback, it answers whether exactly one
/// logical frame should advance. Elapsed time beyond one interval is dropped,
/// so a late callback never produces a burst of catch-up frames.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    threshold: Duration,
    last_advance: Option<Duration>,
}

impl FramePacer {
    /// Rates whose interval is not a representable duration play at
    /// `DEFAULT_FPS`.
    pub fn new(fps: f32, tolerance: f64) -> Self {
        let interval = frame_interval(fps)
            .or_else(|| frame_interval(DEFAULT_FPS))
            .unwrap_or(Duration::from_millis(33));
        let tolerance = if tolerance.is_nan() {
            DEFAULT_TOLERANCE
        } else {
            tolerance.clamp(0.0, 1.0)
        };
        Self {
            interval,
            threshold: interval.mul_f64(tolerance),
            last_advance: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// The first callback after a reset only latches its timestamp.
    pub fn poll(&mut self, now: Duration) -> bool {
        match self.last_advance {
            None => {
                self.last_advance = Some(now);
                false
            }
            Some(last) if now.saturating_sub(last) >= self.threshold => {
                self.last_advance = Some(now);
                true
            }
            Some(_) => false,
        }
    }

    pub fn reset(&mut self) {
        self.last_advance = None;
    }
}

fn frame_interval(fps: f32) -> Option<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps as f64).ok()
}
