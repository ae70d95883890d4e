use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKey {
    Red,
    Green,
}

/// Which response keys are physically held right now.
///
/// The legacy wire names `f`/`j` are still accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyStates {
    #[serde(alias = "f")]
    pub red: bool,
    #[serde(alias = "j")]
    pub green: bool,
}

impl KeyStates {
    pub fn is_held(&self, key: ResponseKey) -> bool {
        match key {
            ResponseKey::Red => self.red,
            ResponseKey::Green => self.green,
        }
    }

    /// The single key held, if any. Both held counts the same as neither.
    pub fn decisive(&self) -> Option<ResponseKey> {
        match (self.red, self.green) {
            (true, false) => Some(ResponseKey::Red),
            (false, true) => Some(ResponseKey::Green),
            _ => None,
        }
    }
}

/// One sample of held keys, taken when playback advanced past `frame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub frame: usize,
    pub keys: KeyStates,
    pub utc_timestamp: DateTime<Utc>,
}

/// Samples per decisive key, as shown in the running proportion bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub red: usize,
    pub green: usize,
    pub undecided: usize,
}

impl Tally {
    pub fn total(&self) -> usize {
        self.red + self.green + self.undecided
    }
}

/// Append-only record sequence for one trial. Frame numbers are assigned
/// here, so they always run 0, 1, 2, ... without gaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseLog {
    records: Vec<ResponseRecord>,
}

impl ResponseLog {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            records: Vec::with_capacity(n),
        }
    }

    /// Frame number the next record will carry.
    pub fn next_frame(&self) -> usize {
        self.records.len()
    }

    pub fn push_next(&mut self, keys: KeyStates, utc_timestamp: DateTime<Utc>) -> &ResponseRecord {
        let frame = self.records.len();
        self.records.push(ResponseRecord {
            frame,
            keys,
            utc_timestamp,
        });
        &self.records[frame]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ResponseRecord] {
        &self.records
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for record in &self.records {
            match record.keys.decisive() {
                Some(ResponseKey::Red) => tally.red += 1,
                Some(ResponseKey::Green) => tally.green += 1,
                None => tally.undecided += 1,
            }
        }
        tally
    }
}
