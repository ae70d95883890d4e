use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Trait for monotonic timers. Timestamps are offsets from the timer's origin.
pub trait Timer: Clone + Send + Sync {
    fn now(&self) -> Duration;
    fn elapsed(&self, since: Duration) -> Duration {
        self.now().saturating_sub(since)
    }
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn callback_stats(&self) -> CallbackStats;
}

/// Summary of recorded display-callback intervals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackStats {
    pub samples: usize,
    pub average_interval_ns: f64,
    pub jitter_ns: f64,
    pub min_interval_ns: f64,
    pub max_interval_ns: f64,
    pub effective_hz: f64,
}

impl CallbackStats {
    pub fn from_intervals<'a>(intervals: impl IntoIterator<Item = &'a Duration>) -> Self {
        let times: Vec<f64> = intervals
            .into_iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return Self::default();
        }
        let n = times.len() as f64;
        let avg = times.iter().sum::<f64>() / n;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            samples: times.len(),
            average_interval_ns: avg,
            jitter_ns: var.sqrt(),
            min_interval_ns: min,
            max_interval_ns: max,
            effective_hz: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    start: Instant,
    frame_times: VecDeque<Duration>,
    max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
    fn sleep(&self, d: Duration) {
        precise_sleep(d)
    }
    fn record_frame(&mut self, d: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(d);
    }
    fn callback_stats(&self) -> CallbackStats {
        CallbackStats::from_intervals(&self.frame_times)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frame_times: VecDeque::with_capacity(1000),
            max_samples: 1000,
        }
    }

    /// Wall-clock instant corresponding to a timestamp of this timer.
    pub fn instant_at(&self, at: Duration) -> Instant {
        self.start + at
    }

    pub fn clear_frames(&mut self) {
        self.frame_times.clear();
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleeps against the monotonic clock where the platform allows it.
pub fn precise_sleep(duration: Duration) {
    #[cfg(target_os = "linux")]
    linux_sleep(duration);
    #[cfg(not(target_os = "linux"))]
    std::thread::sleep(duration);
}

#[cfg(target_os = "linux")]
fn linux_sleep(duration: Duration) {
    use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR};

    let req = timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };
    let mut rem = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let mut req = req;

    loop {
        // clock_nanosleep returns the error number directly instead of setting errno
        let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
        if rc != EINTR {
            break;
        }
        req = rem;
    }
}

/// Hand-advanced timer for deterministic tests. Sleeping advances it.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now: Arc<Mutex<Duration>>,
    slept: Arc<Mutex<Vec<Duration>>>,
    frame_times: Vec<Duration>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += d;
        }
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Timer for ManualTimer {
    fn now(&self) -> Duration {
        self.now.lock().map(|n| *n).unwrap_or_default()
    }
    fn sleep(&self, d: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(d);
        }
        self.advance(d);
    }
    fn record_frame(&mut self, d: Duration) {
        self.frame_times.push(d);
    }
    fn callback_stats(&self) -> CallbackStats {
        CallbackStats::from_intervals(&self.frame_times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_of_steady_intervals_have_no_jitter() {
        let intervals = vec![Duration::from_millis(10); 4];
        let stats = CallbackStats::from_intervals(&intervals);
        assert_eq!(stats.samples, 4);
        assert_eq!(stats.jitter_ns, 0.0);
        assert!((stats.effective_hz - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = CallbackStats::from_intervals(&[]);
        assert_eq!(stats, CallbackStats::default());
    }

    #[test]
    fn high_precision_timer_keeps_a_bounded_window() {
        let mut timer = HighPrecisionTimer::new();
        for _ in 0..1500 {
            timer.record_frame(Duration::from_millis(16));
        }
        assert_eq!(timer.callback_stats().samples, 1000);
    }

    #[test]
    fn precise_sleep_waits_at_least_the_duration() {
        let timer = HighPrecisionTimer::new();
        let before = timer.now();
        timer.sleep(Duration::from_millis(5));
        assert!(timer.elapsed(before) >= Duration::from_millis(5));
    }

    #[test]
    fn manual_timer_advances_on_sleep() {
        let timer = ManualTimer::new();
        timer.sleep(Duration::from_millis(500));
        assert_eq!(timer.now(), Duration::from_millis(500));
        assert_eq!(timer.sleeps(), vec![Duration::from_millis(500)]);
    }
}
