use super::config::ExperimentConfig;
use super::signals::SignalCount;
use chrono::{DateTime, Utc};
use redgreen_core::{
    KeyStates, ResponseLog, ResponseRecord, Scene, SyncSignal, Tally, TrialResult, TrialState,
};
use redgreen_timing::FramePacer;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// One display callback: the monotonic timestamp plus the input and wall
/// clock read at the same instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub timestamp: Duration,
    pub keys: KeyStates,
    pub utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Acknowledge,
    CountdownTick,
    Frame(FrameSample),
    SaveCompleted { score: f64 },
    SaveFailed { reason: String },
    Pause,
    TimeOut,
    Teardown,
}

/// Side effects requested by the driver, executed by the event loop in order.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEffect {
    /// Schedule exactly one more display callback.
    RequestFrame,
    CancelFrame,
    StartCountdown { interval: Duration },
    StopCountdown,
    Render(usize),
    Signal { signal: SyncSignal, utc: DateTime<Utc> },
    Submit { delay: Duration, result: TrialResult },
    Alert(String),
}

/// Frame clock and playback state of a single trial.
///
/// A driver is built per loaded scene and dropped when the next one
/// arrives, so nothing trial-scoped survives into the next trial.
#[derive(Debug, Clone)]
pub struct TrialDriver {
    scene: Scene,
    log: ResponseLog,
    current_frame: usize,
    state: TrialState,
    pacer: FramePacer,
    countdown_from: u32,
    countdown_interval: Duration,
    settle_delay: Duration,
    first_frame_utc: Option<DateTime<Utc>>,
    last_frame_utc: Option<DateTime<Utc>>,
    signals: SignalCount,
    submitted: bool,
    disabled: bool,
}

impl TrialDriver {
    pub fn new(scene: Scene, config: &ExperimentConfig) -> Self {
        let fps = scene.fps_or(config.default_fps);
        let pacer = FramePacer::new(fps, config.frame_tolerance);
        debug!(
            "trial {} ready: {} frames at {:.1} fps ({:.3} ms threshold)",
            scene.info.unique_trial_id,
            scene.len(),
            fps,
            pacer.threshold().as_secs_f64() * 1000.0
        );
        Self {
            log: ResponseLog::with_capacity(scene.len()),
            scene,
            current_frame: 0,
            state: TrialState::Idle,
            pacer,
            countdown_from: config.countdown_from,
            countdown_interval: config.countdown_interval(),
            settle_delay: config.settle_delay(),
            first_frame_utc: None,
            last_frame_utc: None,
            signals: SignalCount::default(),
            submitted: false,
            disabled: false,
        }
    }

    pub fn handle(&mut self, event: DriverEvent) -> Vec<DriverEffect> {
        match event {
            DriverEvent::Acknowledge => self.on_acknowledge(),
            DriverEvent::CountdownTick => self.on_countdown_tick(),
            DriverEvent::Frame(sample) => self.on_frame(sample),
            DriverEvent::SaveCompleted { score } => self.on_save(Ok(score)),
            DriverEvent::SaveFailed { reason } => self.on_save(Err(reason)),
            DriverEvent::Pause => self.stop_into(TrialState::Paused),
            DriverEvent::TimeOut => self.stop_into(TrialState::TimedOut),
            DriverEvent::Teardown => {
                self.disabled = true;
                vec![DriverEffect::CancelFrame, DriverEffect::StopCountdown]
            }
        }
    }

    fn on_acknowledge(&mut self) -> Vec<DriverEffect> {
        if self.disabled || self.state != TrialState::Idle {
            return Vec::new();
        }
        if self.countdown_from == 0 {
            return self.begin_playback();
        }
        self.state = TrialState::Countdown {
            remaining: self.countdown_from,
        };
        info!(
            "trial {}: countdown from {}",
            self.scene.info.unique_trial_id, self.countdown_from
        );
        vec![
            DriverEffect::StartCountdown {
                interval: self.countdown_interval,
            },
            DriverEffect::Render(0),
        ]
    }

    fn on_countdown_tick(&mut self) -> Vec<DriverEffect> {
        let TrialState::Countdown { remaining } = self.state else {
            return Vec::new();
        };
        let remaining = remaining.saturating_sub(1);
        if remaining > 0 {
            self.state = TrialState::Countdown { remaining };
            return vec![DriverEffect::Render(0)];
        }
        let mut effects = vec![DriverEffect::StopCountdown];
        effects.extend(self.begin_playback());
        effects
    }

    fn begin_playback(&mut self) -> Vec<DriverEffect> {
        self.state = TrialState::Playing;
        self.current_frame = 0;
        self.pacer.reset();
        info!("trial {}: playback started", self.scene.info.unique_trial_id);
        vec![DriverEffect::Render(0), DriverEffect::RequestFrame]
    }

    fn on_frame(&mut self, sample: FrameSample) -> Vec<DriverEffect> {
        if self.disabled || !self.state.is_playing() {
            return Vec::new();
        }
        if !self.pacer.poll(sample.timestamp) {
            return vec![DriverEffect::RequestFrame];
        }

        let mut effects = Vec::with_capacity(3);
        let record = self.log.push_next(sample.keys, sample.utc);
        debug_assert_eq!(record.frame, self.current_frame);
        trace!(
            "frame {} red={} green={}",
            record.frame, record.keys.red, record.keys.green
        );

        if self.first_frame_utc.is_none() {
            self.first_frame_utc = Some(sample.utc);
            effects.push(self.signal(SyncSignal::Start, sample.utc));
        }

        let next = self.current_frame + 1;
        if next < self.scene.len() {
            self.current_frame = next;
            effects.push(DriverEffect::Render(next));
            effects.push(DriverEffect::RequestFrame);
            return effects;
        }

        self.last_frame_utc = Some(sample.utc);
        self.state = TrialState::Submitting;
        effects.push(self.signal(SyncSignal::End, sample.utc));
        if !self.submitted {
            self.submitted = true;
            info!(
                "trial {}: playback finished with {} records, saving in {:?}",
                self.scene.info.unique_trial_id,
                self.log.len(),
                self.settle_delay
            );
            effects.push(DriverEffect::Submit {
                delay: self.settle_delay,
                result: self.result(),
            });
        }
        effects
    }

    fn on_save(&mut self, outcome: Result<f64, String>) -> Vec<DriverEffect> {
        if self.state != TrialState::Submitting {
            debug!("ignoring save result in state {:?}", self.state);
            return Vec::new();
        }
        match outcome {
            Ok(score) => {
                info!("trial {}: scored {score}", self.scene.info.unique_trial_id);
                self.state = TrialState::AwaitingAck { score };
                vec![DriverEffect::Render(self.current_frame)]
            }
            Err(reason) => {
                error!(
                    "trial {}: saving failed: {reason}",
                    self.scene.info.unique_trial_id
                );
                self.state = TrialState::AwaitingAck { score: 0.0 };
                vec![
                    DriverEffect::Alert(format!("Could not save this trial: {reason}")),
                    DriverEffect::Render(self.current_frame),
                ]
            }
        }
    }

    fn stop_into(&mut self, state: TrialState) -> Vec<DriverEffect> {
        if matches!(self.state, TrialState::Paused | TrialState::TimedOut) {
            return Vec::new();
        }
        self.state = state;
        self.pacer.reset();
        vec![DriverEffect::CancelFrame, DriverEffect::StopCountdown]
    }

    fn signal(&mut self, signal: SyncSignal, utc: DateTime<Utc>) -> DriverEffect {
        self.signals.record(signal);
        DriverEffect::Signal { signal, utc }
    }

    pub fn result(&self) -> TrialResult {
        TrialResult {
            info: self.scene.info,
            counterbalance: self.scene.counterbalance,
            records: self.log.records().to_vec(),
            first_frame_utc: self.first_frame_utc,
            last_frame_utc: self.last_frame_utc,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn unique_trial_id(&self) -> i64 {
        self.scene.info.unique_trial_id
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn countdown_value(&self) -> Option<u32> {
        self.state.countdown_value()
    }

    pub fn finished_waiting_ack(&self) -> bool {
        self.state.finished_waiting_ack()
    }

    pub fn records(&self) -> &[ResponseRecord] {
        self.log.records()
    }

    pub fn tally(&self) -> Tally {
        self.log.tally()
    }

    pub fn signals(&self) -> SignalCount {
        self.signals
    }

    pub fn frame_interval(&self) -> Duration {
        self.pacer.interval()
    }
}
