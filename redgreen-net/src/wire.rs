//! JSON bodies exchanged with the experiment backend.

use super::NetError;
use chrono::{DateTime, NaiveDateTime, Utc};
use redgreen_core::{KeyStates, LoadOutcome, ResponseRecord, Scene, TrialResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LOAD_ENDPOINT: &str = "load_next_scene";
pub const SAVE_ENDPOINT: &str = "save_data";
pub const TIMEOUT_ENDPOINT: &str = "check_timeout";

#[derive(Debug, Serialize)]
pub struct LoadRequest<'a> {
    pub session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_from_trial: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SessionRequest<'a> {
    pub session_id: &'a str,
}

/// Names used for the two keys inside `recordedKeyStates`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyNames {
    /// `{"red": .., "green": ..}`
    #[default]
    Color,
    /// `{"f": .., "j": ..}`, as older backends expect.
    Legacy,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum WireKeys {
    Color(KeyStates),
    Legacy { f: bool, j: bool },
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WireRecord {
    pub frame: usize,
    pub keys: WireKeys,
    pub utc_timestamp: DateTime<Utc>,
}

impl WireRecord {
    fn new(record: &ResponseRecord, names: KeyNames) -> Self {
        let keys = match names {
            KeyNames::Color => WireKeys::Color(record.keys),
            KeyNames::Legacy => WireKeys::Legacy {
                f: record.keys.red,
                j: record.keys.green,
            },
        };
        Self {
            frame: record.frame,
            keys,
            utc_timestamp: record.utc_timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaveRequest<'a> {
    pub session_id: &'a str,
    pub trial_i: u32,
    pub ftrial_i: u32,
    pub unique_trial_id: i64,
    pub is_ftrial: bool,
    pub is_trial: bool,
    #[serde(rename = "recordedKeyStates")]
    pub recorded_key_states: Vec<WireRecord>,
    pub counterbalance: bool,
    pub first_frame_utc: Option<DateTime<Utc>>,
    pub last_frame_utc: Option<DateTime<Utc>>,
}

impl<'a> SaveRequest<'a> {
    pub fn new(session_id: &'a str, result: &TrialResult, names: KeyNames) -> Self {
        Self {
            session_id,
            trial_i: result.info.trial_i,
            ftrial_i: result.info.ftrial_i,
            unique_trial_id: result.info.unique_trial_id,
            is_ftrial: result.info.is_ftrial,
            is_trial: result.info.is_trial,
            recorded_key_states: result
                .records
                .iter()
                .map(|r| WireRecord::new(r, names))
                .collect(),
            counterbalance: result.counterbalance,
            first_frame_utc: result.first_frame_utc,
            last_frame_utc: result.last_frame_utc,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveResponse {
    pub score: f64,
}

/// Body of a non-2xx reply.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub current_time_utc: Option<String>,
}

impl ErrorBody {
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self {
            error: body.trim().chars().take(200).collect(),
            current_time_utc: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeoutStatus {
    Active,
    TimedOut { at: DateTime<Utc> },
}

#[derive(Debug, Default, Deserialize)]
struct LoadFlags {
    #[serde(default)]
    finish: bool,
    #[serde(default)]
    fam_to_exp_page: bool,
    #[serde(default)]
    average_score: Option<f64>,
}

/// Interprets a successful `/load_next_scene` body. The backend sends both
/// flags on every reply; a scene is meant only when neither is set.
pub fn parse_load_response(body: &str) -> Result<LoadOutcome, NetError> {
    let decode = |e: serde_json::Error| NetError::Decode {
        endpoint: LOAD_ENDPOINT,
        reason: e.to_string(),
    };
    let value: Value = serde_json::from_str(body).map_err(decode)?;
    let flags: LoadFlags = LoadFlags::deserialize(&value).map_err(decode)?;
    if flags.finish {
        return Ok(LoadOutcome::Finished {
            average_score: flags.average_score.unwrap_or(0.0),
        });
    }
    if flags.fam_to_exp_page {
        return Ok(LoadOutcome::Transition);
    }
    let scene = Scene::deserialize(value).map_err(decode)?.validated()?;
    Ok(LoadOutcome::Scene(Box::new(scene)))
}

pub fn parse_save_response(body: &str) -> Result<f64, NetError> {
    serde_json::from_str::<SaveResponse>(body)
        .map(|r| r.score)
        .map_err(|e| NetError::Decode {
            endpoint: SAVE_ENDPOINT,
            reason: e.to_string(),
        })
}

pub fn parse_timeout_response(status: u16, body: &str) -> Result<TimeoutStatus, NetError> {
    if (200..300).contains(&status) {
        return Ok(TimeoutStatus::Active);
    }
    let err = ErrorBody::parse(body);
    if err.error == "timeout" {
        let at = err
            .current_time_utc
            .as_deref()
            .and_then(parse_backend_time)
            .unwrap_or_else(Utc::now);
        return Ok(TimeoutStatus::TimedOut { at });
    }
    Err(NetError::Status {
        endpoint: TIMEOUT_ENDPOINT,
        status,
        message: err.error,
    })
}

/// Accepts RFC 3339 and the zone-less ISO form the backend emits for UTC.
pub fn parse_backend_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| t.and_utc())
}
