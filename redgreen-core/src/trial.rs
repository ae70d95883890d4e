use crate::response::ResponseRecord;
use crate::scene::TrialInfo;
use chrono::{DateTime, Utc};

/// Trial driver states
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialState {
    /// Scene loaded, waiting for the acknowledge key.
    Idle,
    Countdown { remaining: u32 },
    Playing,
    /// Playback ended; the save request is settling or in flight.
    Submitting,
    AwaitingAck { score: f64 },
    Paused,
    TimedOut,
}

impl TrialState {
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    pub fn countdown_value(&self) -> Option<u32> {
        match self {
            Self::Countdown { remaining } => Some(*remaining),
            _ => None,
        }
    }

    pub fn finished_waiting_ack(&self) -> bool {
        matches!(self, Self::AwaitingAck { .. })
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            Self::AwaitingAck { score } => Some(*score),
            _ => None,
        }
    }
}

/// Everything the backend needs to score one finished trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    pub info: TrialInfo,
    pub counterbalance: bool,
    pub records: Vec<ResponseRecord>,
    pub first_frame_utc: Option<DateTime<Utc>>,
    pub last_frame_utc: Option<DateTime<Utc>>,
}
