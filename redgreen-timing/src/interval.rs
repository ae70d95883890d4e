use std::time::Duration;

/// Fixed-rate repeating deadline, polled from the event loop.
///
/// A late poll fires once and re-arms relative to the missed deadline; if that
/// is already in the past the next deadline moves to `now + interval`.
#[derive(Debug, Clone, Default)]
pub struct RepeatingTimer {
    interval: Duration,
    next_deadline: Option<Duration>,
}

impl RepeatingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, now: Duration, interval: Duration) {
        self.interval = interval;
        self.next_deadline = Some(now + interval);
    }

    pub fn cancel(&mut self) {
        self.next_deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.next_deadline
    }

    pub fn poll(&mut self, now: Duration) -> bool {
        let Some(deadline) = self.next_deadline else {
            return false;
        };
        if now < deadline {
            return false;
        }
        let mut next = deadline + self.interval;
        if next <= now {
            next = now + self.interval;
        }
        self.next_deadline = Some(next);
        true
    }
}
