pub mod phase;
pub mod response;
pub mod scene;
pub mod session;
pub mod signal;
pub mod trial;

pub use phase::{Phase, SessionPhase};
pub use response::{KeyStates, ResponseKey, ResponseLog, ResponseRecord, Tally};
pub use scene::{
    LoadOutcome, PaintedSensors, Position, Scene, SceneError, TrialInfo, Trajectory, WorldRect,
};
pub use session::{SessionContext, SessionError};
pub use signal::{PhotodiodeState, SyncSignal};
pub use trial::{TrialResult, TrialState};
