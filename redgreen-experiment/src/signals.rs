use redgreen_core::SyncSignal;
use std::time::Duration;

/// Pure tone used to mark a sync signal on the audio line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency_hz: f32,
    pub duration: Duration,
}

pub const START_TONE: ToneSpec = ToneSpec {
    frequency_hz: 1000.0,
    duration: Duration::from_millis(50),
};

pub const END_TONE: ToneSpec = ToneSpec {
    frequency_hz: 500.0,
    duration: Duration::from_millis(50),
};

impl ToneSpec {
    pub fn for_signal(signal: SyncSignal) -> Self {
        match signal {
            SyncSignal::Start => START_TONE,
            SyncSignal::End => END_TONE,
        }
    }
}

/// Counts emitted signals for one trial; a well-formed trial ends at (1, 1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalCount {
    pub starts: u32,
    pub ends: u32,
}

impl SignalCount {
    pub fn record(&mut self, signal: SyncSignal) {
        match signal {
            SyncSignal::Start => self.starts += 1,
            SyncSignal::End => self.ends += 1,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.starts == 1 && self.ends == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_higher_than_end() {
        assert_eq!(ToneSpec::for_signal(SyncSignal::Start).frequency_hz, 1000.0);
        assert_eq!(ToneSpec::for_signal(SyncSignal::End).frequency_hz, 500.0);
        assert_eq!(START_TONE.duration, Duration::from_millis(50));
    }

    #[test]
    fn count_completes_after_one_of_each() {
        let mut count = SignalCount::default();
        count.record(SyncSignal::Start);
        assert!(!count.is_complete());
        count.record(SyncSignal::End);
        assert!(count.is_complete());
        count.record(SyncSignal::End);
        assert!(!count.is_complete());
    }
}
