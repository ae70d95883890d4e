use super::config::ExperimentConfig;
use super::driver::{DriverEffect, DriverEvent, FrameSample, TrialDriver};
use chrono::{DateTime, Utc};
use redgreen_core::{
    LoadOutcome, Phase, PhotodiodeState, SessionContext, SessionPhase, SyncSignal, TrialInfo,
    TrialResult, TrialState,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Two presses of a guarded action within this window confirm it.
pub const CONFIRM_WINDOW: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// The window is up; performs the initial load once.
    Start,
    Acknowledge,
    CountdownTick,
    Frame(FrameSample),
    SceneLoaded(LoadOutcome),
    SceneLoadFailed { reason: String },
    SaveCompleted { unique_trial_id: i64, score: f64 },
    SaveFailed { unique_trial_id: i64, reason: String },
    PauseRequested { at: Duration },
    CloseRequested { at: Duration },
    TimedOut { at: DateTime<Utc> },
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RequestFrame,
    CancelFrame,
    StartCountdown { interval: Duration },
    StopCountdown,
    Render(usize),
    /// Screen content changed outside of trial playback.
    Redraw,
    Signal { signal: SyncSignal, utc: DateTime<Utc> },
    Submit {
        delay: Duration,
        session_id: String,
        result: TrialResult,
    },
    LoadScene {
        session_id: String,
        resume_from_trial: Option<u32>,
    },
    Alert(String),
    Exit,
}

/// Session-level state machine: which screen is up, which trial is loaded,
/// and when to talk to the backend.
#[derive(Debug)]
pub struct LifecycleController<P: Phase = SessionPhase> {
    config: ExperimentConfig,
    session: SessionContext,
    phase: P,
    driver: Option<TrialDriver>,
    photodiode: PhotodiodeState,
    load_pending: bool,
    initialized: bool,
    alert: Option<String>,
    average_score: Option<f64>,
    last_info: Option<TrialInfo>,
    timed_out_at: Option<DateTime<Utc>>,
    pause_requested_at: Option<Duration>,
    close_requested_at: Option<Duration>,
}

impl LifecycleController<SessionPhase> {
    pub fn new(config: ExperimentConfig, session: SessionContext) -> Self {
        Self {
            config,
            session,
            phase: SessionPhase::default(),
            driver: None,
            photodiode: PhotodiodeState::default(),
            load_pending: false,
            initialized: false,
            alert: None,
            average_score: None,
            last_info: None,
            timed_out_at: None,
            pause_requested_at: None,
            close_requested_at: None,
        }
    }

    pub fn handle(&mut self, event: LifecycleEvent) -> Vec<Effect> {
        if self.phase.is_terminal() {
            return match event {
                LifecycleEvent::CloseRequested { .. } => vec![Effect::Exit],
                LifecycleEvent::Teardown => self.drive(DriverEvent::Teardown),
                _ => Vec::new(),
            };
        }
        match event {
            LifecycleEvent::Start => {
                if std::mem::replace(&mut self.initialized, true) {
                    return Vec::new();
                }
                self.request_load()
            }
            LifecycleEvent::Acknowledge => self.on_acknowledge(),
            LifecycleEvent::CountdownTick => self.drive(DriverEvent::CountdownTick),
            LifecycleEvent::Frame(sample) => self.drive(DriverEvent::Frame(sample)),
            LifecycleEvent::SceneLoaded(outcome) => self.on_loaded(outcome),
            LifecycleEvent::SceneLoadFailed { reason } => {
                self.load_pending = false;
                warn!("loading the next scene failed: {reason}");
                self.alert(format!(
                    "Could not load the next trial ({reason}). Press space to try again."
                ))
            }
            LifecycleEvent::SaveCompleted {
                unique_trial_id,
                score,
            } => self.on_save_reply(unique_trial_id, DriverEvent::SaveCompleted { score }),
            LifecycleEvent::SaveFailed {
                unique_trial_id,
                reason,
            } => self.on_save_reply(unique_trial_id, DriverEvent::SaveFailed { reason }),
            LifecycleEvent::PauseRequested { at } => self.on_pause_requested(at),
            LifecycleEvent::CloseRequested { at } => self.on_close_requested(at),
            LifecycleEvent::TimedOut { at } => {
                warn!("session timed out at {at}");
                self.phase = SessionPhase::TimedOut;
                self.timed_out_at = Some(at);
                self.load_pending = false;
                let mut effects = self.drive(DriverEvent::TimeOut);
                effects.push(Effect::Redraw);
                effects
            }
            LifecycleEvent::Teardown => self.drive(DriverEvent::Teardown),
        }
    }

    fn on_acknowledge(&mut self) -> Vec<Effect> {
        if self.load_pending {
            debug!("acknowledge ignored, load in flight");
            return Vec::new();
        }
        if self.phase == SessionPhase::Transition {
            return self.request_load();
        }
        let wants_next = self
            .driver
            .as_ref()
            .is_none_or(TrialDriver::finished_waiting_ack);
        if wants_next {
            self.request_load()
        } else {
            self.drive(DriverEvent::Acknowledge)
        }
    }

    fn on_loaded(&mut self, outcome: LoadOutcome) -> Vec<Effect> {
        self.load_pending = false;
        self.alert = None;
        self.session.resume_from_trial = None;
        match outcome {
            LoadOutcome::Scene(scene) => {
                self.phase = if scene.info.is_ftrial {
                    SessionPhase::Familiarization
                } else {
                    SessionPhase::Main
                };
                self.last_info = Some(scene.info);
                info!(
                    "loaded trial {} ({}), {} frames",
                    scene.info.unique_trial_id,
                    scene.info.progress_label(),
                    scene.len()
                );
                self.driver = Some(TrialDriver::new(*scene, &self.config));
                vec![Effect::Render(0)]
            }
            LoadOutcome::Transition => {
                info!("familiarization complete");
                self.phase = SessionPhase::Transition;
                vec![Effect::Redraw]
            }
            LoadOutcome::Finished { average_score } => {
                info!("experiment finished, average score {average_score:.1}");
                self.phase = SessionPhase::Finished;
                self.average_score = Some(average_score);
                vec![Effect::Redraw]
            }
        }
    }

    fn on_save_reply(&mut self, unique_trial_id: i64, event: DriverEvent) -> Vec<Effect> {
        let current = self.driver.as_ref().map(TrialDriver::unique_trial_id);
        if current != Some(unique_trial_id) {
            debug!("dropping save reply for stale trial {unique_trial_id}");
            return Vec::new();
        }
        self.drive(event)
    }

    fn on_pause_requested(&mut self, at: Duration) -> Vec<Effect> {
        if !confirmed(&mut self.pause_requested_at, at) {
            return self.alert("Press Escape again to pause the experiment.".to_string());
        }
        info!(
            "experiment paused by participant, resume from trial {:?}",
            self.resume_trial()
        );
        self.phase = SessionPhase::Paused;
        self.alert = None;
        let mut effects = self.drive(DriverEvent::Pause);
        effects.push(Effect::Redraw);
        effects
    }

    fn on_close_requested(&mut self, at: Duration) -> Vec<Effect> {
        if self.phase.guards_navigation() && !confirmed(&mut self.close_requested_at, at) {
            return self.alert(
                "A trial is in progress. Close the window again to leave the experiment."
                    .to_string(),
            );
        }
        if self.phase.guards_navigation() {
            warn!("participant left during {:?}", self.phase);
        }
        let mut effects = self.drive(DriverEvent::Teardown);
        effects.push(Effect::Exit);
        effects
    }

    fn request_load(&mut self) -> Vec<Effect> {
        match self.session.require_id().map(str::to_string) {
            Ok(session_id) => {
                let effect = Effect::LoadScene {
                    session_id,
                    resume_from_trial: self.session.resume_from_trial,
                };
                self.load_pending = true;
                self.alert = None;
                vec![effect, Effect::Redraw]
            }
            Err(e) => self.alert(e.to_string()),
        }
    }

    fn alert(&mut self, message: String) -> Vec<Effect> {
        self.alert = Some(message.clone());
        vec![Effect::Alert(message), Effect::Redraw]
    }

    /// Forwards an event to the current trial and lifts its effects.
    fn drive(&mut self, event: DriverEvent) -> Vec<Effect> {
        let Some(driver) = self.driver.as_mut() else {
            return Vec::new();
        };
        let driver_effects = driver.handle(event);
        let mut effects = Vec::with_capacity(driver_effects.len());
        for effect in driver_effects {
            match effect {
                DriverEffect::Signal { signal, utc } => {
                    self.photodiode = self.photodiode.toggled();
                    info!("sync signal {signal:?} at {}", utc.to_rfc3339());
                    effects.push(Effect::Signal { signal, utc });
                }
                DriverEffect::Submit { delay, result } => {
                    match self.session.require_id().map(str::to_string) {
                        Ok(session_id) => effects.push(Effect::Submit {
                            delay,
                            session_id,
                            result,
                        }),
                        Err(e) => {
                            let reason = e.to_string();
                            effects.extend(self.drive(DriverEvent::SaveFailed { reason }));
                        }
                    }
                }
                DriverEffect::Alert(message) => {
                    self.alert = Some(message.clone());
                    effects.push(Effect::Alert(message));
                }
                DriverEffect::RequestFrame => effects.push(Effect::RequestFrame),
                DriverEffect::CancelFrame => effects.push(Effect::CancelFrame),
                DriverEffect::StartCountdown { interval } => {
                    effects.push(Effect::StartCountdown { interval })
                }
                DriverEffect::StopCountdown => effects.push(Effect::StopCountdown),
                DriverEffect::Render(frame) => effects.push(Effect::Render(frame)),
            }
        }
        effects
    }
}

impl<P: Phase> LifecycleController<P> {
    pub fn phase(&self) -> P {
        self.phase
    }

    pub fn driver(&self) -> Option<&TrialDriver> {
        self.driver.as_ref()
    }

    pub fn trial_state(&self) -> Option<TrialState> {
        self.driver.as_ref().map(TrialDriver::state)
    }

    pub fn photodiode(&self) -> PhotodiodeState {
        self.photodiode
    }

    pub fn load_pending(&self) -> bool {
        self.load_pending
    }

    pub fn alert_message(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn average_score(&self) -> Option<f64> {
        self.average_score
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn timed_out_at(&self) -> Option<DateTime<Utc>> {
        self.timed_out_at
    }

    pub fn guards_navigation(&self) -> bool {
        self.phase.guards_navigation()
    }

    /// Trial number a resumed session should start from.
    pub fn resume_trial(&self) -> Option<u32> {
        let info = self.last_info?;
        if info.is_ftrial {
            Some(1)
        } else {
            Some(info.trial_i.max(1))
        }
    }

    /// Participant-facing instruction for the current screen.
    pub fn prompt(&self) -> Option<String> {
        if self.phase.is_terminal() {
            return None;
        }
        if self.phase.is_familiarization() || self.phase.is_main() {
            let driver = self.driver.as_ref()?;
            return match driver.state() {
                TrialState::Idle => Some("Press the Spacebar to begin the trial.".to_string()),
                TrialState::AwaitingAck { .. } if driver.scene().info.is_last_main_trial() => {
                    Some("Almost done! Press the Spacebar to finish the experiment.".to_string())
                }
                TrialState::AwaitingAck { .. } => {
                    Some("Press the Spacebar to move to the next trial.".to_string())
                }
                _ => None,
            };
        }
        Some(
            "Familiarization is complete. Press the Spacebar to begin the main experiment."
                .to_string(),
        )
    }
}

fn confirmed(first_at: &mut Option<Duration>, at: Duration) -> bool {
    match first_at.take() {
        Some(first) if at.saturating_sub(first) <= CONFIRM_WINDOW => true,
        _ => {
            *first_at = Some(at);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redgreen_core::{Position, Scene, Trajectory};

    fn scene(uid: i64, is_ftrial: bool, n: usize) -> Box<Scene> {
        Box::new(Scene {
            world_width: 20.0,
            world_height: 20.0,
            radius: 0.5,
            barriers: Vec::new(),
            occluders: Vec::new(),
            red_sensor: None,
            green_sensor: None,
            counterbalance: false,
            step_data: Trajectory::from_positions(vec![Position { x: 1.0, y: 1.0 }; n]).unwrap(),
            fps: None,
            info: TrialInfo {
                unique_trial_id: uid,
                is_ftrial,
                is_trial: !is_ftrial,
                trial_i: if is_ftrial { 0 } else { 1 },
                ftrial_i: 1,
                num_trials: 2,
                num_ftrials: 2,
            },
        })
    }

    fn controller() -> LifecycleController {
        LifecycleController::new(ExperimentConfig::default(), SessionContext::new("s-1"))
    }

    #[test]
    fn initial_load_happens_once() {
        let mut c = controller();
        let effects = c.handle(LifecycleEvent::Start);
        assert!(matches!(effects[0], Effect::LoadScene { .. }));
        assert!(c.load_pending());
        assert!(c.handle(LifecycleEvent::Start).is_empty());
    }

    #[test]
    fn missing_session_id_alerts_instead_of_loading() {
        let mut c =
            LifecycleController::new(ExperimentConfig::default(), SessionContext::default());
        let effects = c.handle(LifecycleEvent::Start);
        assert_eq!(
            effects[0],
            Effect::Alert("Session ID not found. Please start the experiment again.".into())
        );
        assert!(!c.load_pending());
    }

    #[test]
    fn acknowledge_is_ignored_while_loading() {
        let mut c = controller();
        c.handle(LifecycleEvent::Start);
        assert!(c.handle(LifecycleEvent::Acknowledge).is_empty());
    }

    #[test]
    fn resume_trial_is_sent_only_with_the_first_load() {
        let mut session = SessionContext::new("s-1");
        session.resume_from_trial = Some(4);
        let mut c = LifecycleController::new(ExperimentConfig::default(), session);
        let effects = c.handle(LifecycleEvent::Start);
        assert_eq!(
            effects[0],
            Effect::LoadScene {
                session_id: "s-1".into(),
                resume_from_trial: Some(4)
            }
        );
        c.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Scene(scene(1, false, 3))));
        assert_eq!(c.session().resume_from_trial, None);
    }

    #[test]
    fn failed_load_keeps_state_and_retries_on_acknowledge() {
        let mut c = controller();
        c.handle(LifecycleEvent::Start);
        let effects = c.handle(LifecycleEvent::SceneLoadFailed {
            reason: "timeout".into(),
        });
        assert!(matches!(effects[0], Effect::Alert(_)));
        assert!(c.driver().is_none());
        let effects = c.handle(LifecycleEvent::Acknowledge);
        assert!(matches!(effects[0], Effect::LoadScene { .. }));
    }

    #[test]
    fn stale_save_reply_is_dropped() {
        let mut c = controller();
        c.handle(LifecycleEvent::Start);
        c.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Scene(scene(7, true, 3))));
        let effects = c.handle(LifecycleEvent::SaveCompleted {
            unique_trial_id: 6,
            score: 90.0,
        });
        assert!(effects.is_empty());
        assert_eq!(c.trial_state(), Some(TrialState::Idle));
    }

    #[test]
    fn phase_follows_the_loaded_scene() {
        let mut c = controller();
        c.handle(LifecycleEvent::Start);
        c.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Scene(scene(1, true, 3))));
        assert_eq!(c.phase(), SessionPhase::Familiarization);
        assert_eq!(c.resume_trial(), Some(1));
        c.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Scene(scene(2, false, 3))));
        assert_eq!(c.phase(), SessionPhase::Main);
    }

    #[test]
    fn pause_needs_confirmation_within_the_window() {
        let mut c = controller();
        c.handle(LifecycleEvent::Start);
        c.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Scene(scene(1, false, 3))));
        let effects = c.handle(LifecycleEvent::PauseRequested {
            at: Duration::from_secs(1),
        });
        assert!(matches!(effects[0], Effect::Alert(_)));
        // too late, counts as a fresh first press
        c.handle(LifecycleEvent::PauseRequested {
            at: Duration::from_secs(5),
        });
        assert_eq!(c.phase(), SessionPhase::Main);
        c.handle(LifecycleEvent::PauseRequested {
            at: Duration::from_secs(6),
        });
        assert_eq!(c.phase(), SessionPhase::Paused);
        assert_eq!(c.trial_state(), Some(TrialState::Paused));
    }

    #[test]
    fn close_is_guarded_during_trials_only() {
        let mut c = controller();
        c.handle(LifecycleEvent::Start);
        let effects = c.handle(LifecycleEvent::CloseRequested {
            at: Duration::from_secs(1),
        });
        assert!(!effects.contains(&Effect::Exit));
        let effects = c.handle(LifecycleEvent::CloseRequested {
            at: Duration::from_secs(2),
        });
        assert!(effects.contains(&Effect::Exit));

        let mut done = controller();
        done.handle(LifecycleEvent::Start);
        done.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Finished {
            average_score: 55.0,
        }));
        let effects = done.handle(LifecycleEvent::CloseRequested {
            at: Duration::from_secs(1),
        });
        assert_eq!(effects, vec![Effect::Exit]);
    }

    #[test]
    fn timeout_preempts_everything() {
        let mut c = controller();
        c.handle(LifecycleEvent::Start);
        c.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Scene(scene(1, false, 3))));
        c.handle(LifecycleEvent::Acknowledge);
        let effects = c.handle(LifecycleEvent::TimedOut { at: Utc::now() });
        assert!(effects.contains(&Effect::CancelFrame));
        assert!(effects.contains(&Effect::StopCountdown));
        assert_eq!(c.phase(), SessionPhase::TimedOut);
        assert!(c.handle(LifecycleEvent::Acknowledge).is_empty());
        assert!(c.handle(LifecycleEvent::CountdownTick).is_empty());
    }
}
