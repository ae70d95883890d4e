use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Fallback world extent used when a scene omits `worldWidth`/`worldHeight`.
pub const DEFAULT_WORLD_EXTENT: f32 = 20.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    #[error("step_data is empty")]
    EmptyTrajectory,
    #[error("step_data key {0:?} is not a frame index")]
    BadFrameKey(String),
    #[error("step_data has no entry for frame {0}")]
    MissingFrame(usize),
    #[error("world extent {width}x{height} is not positive")]
    InvalidWorld { width: f32, height: f32 },
    #[error("object radius {0} is not positive")]
    InvalidRadius(f32),
    #[error("playback rate {0} fps is below 1 fps")]
    InvalidFps(f32),
}

/// Slowest playback rate a scene may request.
pub const MIN_FPS: f32 = 1.0;

/// Axis-aligned rectangle in world units, origin at its lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Per-frame object positions, indexed `0..len()` without gaps.
///
/// On the wire this is a JSON object keyed by decimal frame numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Position>",
    into = "BTreeMap<String, Position>"
)]
pub struct Trajectory(Vec<Position>);

impl Trajectory {
    pub fn from_positions(positions: Vec<Position>) -> Result<Self, SceneError> {
        if positions.is_empty() {
            return Err(SceneError::EmptyTrajectory);
        }
        Ok(Self(positions))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, frame: usize) -> Option<Position> {
        self.0.get(frame).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.0.iter()
    }
}

impl TryFrom<BTreeMap<String, Position>> for Trajectory {
    type Error = SceneError;

    fn try_from(raw: BTreeMap<String, Position>) -> Result<Self, Self::Error> {
        let mut indexed = BTreeMap::new();
        for (key, pos) in raw {
            let frame: usize = key
                .parse()
                .map_err(|_| SceneError::BadFrameKey(key.clone()))?;
            // "01" and "1" would both parse to frame 1
            if frame.to_string() != key {
                return Err(SceneError::BadFrameKey(key));
            }
            indexed.insert(frame, pos);
        }

        let mut positions = Vec::with_capacity(indexed.len());
        for (expected, (frame, pos)) in indexed.into_iter().enumerate() {
            if frame != expected {
                return Err(SceneError::MissingFrame(expected));
            }
            positions.push(pos);
        }
        Self::from_positions(positions)
    }
}

impl From<Trajectory> for BTreeMap<String, Position> {
    fn from(t: Trajectory) -> Self {
        t.0.into_iter()
            .enumerate()
            .map(|(i, p)| (i.to_string(), p))
            .collect()
    }
}

/// Where a trial sits in the session sequence. Carried unchanged to the save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrialInfo {
    #[serde(default)]
    pub trial_i: u32,
    #[serde(default)]
    pub ftrial_i: u32,
    #[serde(default)]
    pub unique_trial_id: i64,
    #[serde(default)]
    pub is_ftrial: bool,
    #[serde(default)]
    pub is_trial: bool,
    #[serde(default)]
    pub num_trials: u32,
    #[serde(default)]
    pub num_ftrials: u32,
}

impl TrialInfo {
    pub fn progress_label(&self) -> String {
        if self.is_ftrial {
            format!(
                "Familiarization Trial: {}/{}",
                self.ftrial_i, self.num_ftrials
            )
        } else {
            format!("Trial Number: {}/{}", self.trial_i, self.num_trials)
        }
    }

    pub fn is_last_main_trial(&self) -> bool {
        !self.is_ftrial && self.num_trials > 0 && self.trial_i == self.num_trials
    }
}

fn default_world_extent() -> f32 {
    DEFAULT_WORLD_EXTENT
}

/// Geometry and trajectory of one trial, replaced wholesale on every load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(rename = "worldWidth", default = "default_world_extent")]
    pub world_width: f32,
    #[serde(rename = "worldHeight", default = "default_world_extent")]
    pub world_height: f32,
    pub radius: f32,
    #[serde(default)]
    pub barriers: Vec<WorldRect>,
    #[serde(default)]
    pub occluders: Vec<WorldRect>,
    #[serde(default)]
    pub red_sensor: Option<WorldRect>,
    #[serde(default)]
    pub green_sensor: Option<WorldRect>,
    #[serde(default)]
    pub counterbalance: bool,
    pub step_data: Trajectory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f32>,
    #[serde(flatten)]
    pub info: TrialInfo,
}

/// Sensor rectangles keyed by the color they are painted with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaintedSensors {
    pub red: Option<WorldRect>,
    pub green: Option<WorldRect>,
}

impl Scene {
    /// Checks the invariants serde cannot express.
    pub fn validated(self) -> Result<Self, SceneError> {
        let world_ok = |v: f32| v.is_finite() && v > 0.0;
        if !world_ok(self.world_width) || !world_ok(self.world_height) {
            return Err(SceneError::InvalidWorld {
                width: self.world_width,
                height: self.world_height,
            });
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(SceneError::InvalidRadius(self.radius));
        }
        if let Some(fps) = self.fps {
            if !fps.is_finite() || fps < MIN_FPS {
                return Err(SceneError::InvalidFps(fps));
            }
        }
        Ok(self)
    }

    /// Trial length N.
    pub fn len(&self) -> usize {
        self.step_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.step_data.is_empty()
    }

    pub fn position(&self, frame: usize) -> Option<Position> {
        self.step_data.get(frame)
    }

    pub fn fps_or(&self, default_fps: f32) -> f32 {
        self.fps.unwrap_or(default_fps)
    }

    /// The semantic sensors stay fixed; counterbalancing only swaps their paint.
    pub fn painted_sensors(&self) -> PaintedSensors {
        if self.counterbalance {
            PaintedSensors {
                red: self.green_sensor,
                green: self.red_sensor,
            }
        } else {
            PaintedSensors {
                red: self.red_sensor,
                green: self.green_sensor,
            }
        }
    }
}

/// What a `/load_next_scene` response asks the client to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Scene(Box<Scene>),
    Transition,
    Finished { average_score: f64 },
}
