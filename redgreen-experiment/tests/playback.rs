use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use redgreen_core::{
    KeyStates, LoadOutcome, Position, Scene, SessionContext, SyncSignal, Trajectory, TrialInfo,
    TrialState,
};
use redgreen_experiment::{
    DriverEffect, DriverEvent, Effect, ExperimentConfig, FrameSample, LifecycleController,
    LifecycleEvent, TrialDriver,
};
use std::time::Duration;

const INTERVAL_MS: f64 = 1000.0 / 30.0;

fn scene(n: usize, uid: i64) -> Scene {
    let positions = (0..n)
        .map(|i| Position {
            x: 1.0 + i as f32 * 0.5,
            y: 2.0,
        })
        .collect();
    Scene {
        world_width: 20.0,
        world_height: 20.0,
        radius: 0.5,
        barriers: Vec::new(),
        occluders: Vec::new(),
        red_sensor: None,
        green_sensor: None,
        counterbalance: false,
        step_data: Trajectory::from_positions(positions).unwrap(),
        fps: None,
        info: TrialInfo {
            unique_trial_id: uid,
            trial_i: 1,
            is_trial: true,
            num_trials: 10,
            ..TrialInfo::default()
        },
    }
}

fn frame_at(ms: f64, keys: KeyStates) -> FrameSample {
    FrameSample {
        timestamp: Duration::from_secs_f64(ms / 1000.0),
        keys,
        utc: Utc.timestamp_millis_opt(1_714_564_800_000 + ms as i64).unwrap(),
    }
}

fn start_playing(driver: &mut TrialDriver) {
    driver.handle(DriverEvent::Acknowledge);
    for _ in 0..3 {
        driver.handle(DriverEvent::CountdownTick);
    }
    assert!(driver.is_playing());
}

fn count_submits(effects: &[DriverEffect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, DriverEffect::Submit { .. }))
        .count()
}

#[test]
fn twenty_frame_trial_with_red_held_from_frame_five() {
    let mut driver = TrialDriver::new(scene(20, 11), &ExperimentConfig::default());
    start_playing(&mut driver);

    let mut all = Vec::new();
    let mut t = 0.0;
    all.extend(driver.handle(DriverEvent::Frame(frame_at(t, KeyStates::default()))));
    while driver.is_playing() {
        t += INTERVAL_MS;
        let keys = KeyStates {
            red: driver.current_frame() >= 5,
            green: false,
        };
        all.extend(driver.handle(DriverEvent::Frame(frame_at(t, keys))));
    }

    let records = driver.records();
    assert_eq!(records.len(), 20);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.frame, i);
        assert_eq!(record.keys.red, i >= 5, "frame {i}");
        assert!(!record.keys.green);
    }

    let signals: Vec<_> = all
        .iter()
        .filter_map(|e| match e {
            DriverEffect::Signal { signal, .. } => Some(*signal),
            _ => None,
        })
        .collect();
    assert_eq!(signals, vec![SyncSignal::Start, SyncSignal::End]);
    assert_eq!(count_submits(&all), 1);

    let Some(DriverEffect::Submit { delay, result }) =
        all.iter().find(|e| matches!(e, DriverEffect::Submit { .. }))
    else {
        panic!("no submit effect");
    };
    assert_eq!(*delay, Duration::from_millis(500));
    assert_eq!(result.records.len(), 20);
    assert_eq!(result.info.unique_trial_id, 11);
    assert_eq!(result.first_frame_utc, Some(records[0].utc_timestamp));
    assert_eq!(result.last_frame_utc, Some(records[19].utc_timestamp));

    driver.handle(DriverEvent::SaveCompleted { score: 87.0 });
    assert_eq!(driver.state(), TrialState::AwaitingAck { score: 87.0 });
}

#[test]
fn irregular_callbacks_never_skip_or_burst_frames() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let n = 60;
    let mut driver = TrialDriver::new(scene(n, 3), &ExperimentConfig::default());
    start_playing(&mut driver);

    let mut t = 0.0;
    driver.handle(DriverEvent::Frame(frame_at(t, KeyStates::default())));
    let mut callbacks = 0;
    while driver.is_playing() {
        // anywhere from a fast display refresh up to three missed intervals
        t += rng.random_range(2.0..(3.0 * INTERVAL_MS));
        let before = driver.records().len();
        let frame_before = driver.current_frame();
        driver.handle(DriverEvent::Frame(frame_at(t, KeyStates::default())));
        let after = driver.records().len();
        assert!(after - before <= 1, "burst at callback {callbacks}");
        assert!(driver.current_frame() >= frame_before);
        assert!(driver.current_frame() - frame_before <= 1);
        callbacks += 1;
        assert!(callbacks < 10_000);
    }

    let frames: Vec<_> = driver.records().iter().map(|r| r.frame).collect();
    assert_eq!(frames, (0..n).collect::<Vec<_>>());
}

#[test]
fn callbacks_after_the_last_frame_cannot_submit_twice() {
    let mut driver = TrialDriver::new(scene(3, 5), &ExperimentConfig::default());
    start_playing(&mut driver);
    let mut submits = 0;
    for i in 0..20 {
        let effects = driver.handle(DriverEvent::Frame(frame_at(
            i as f64 * INTERVAL_MS,
            KeyStates::default(),
        )));
        submits += count_submits(&effects);
    }
    assert_eq!(submits, 1);
    assert_eq!(driver.records().len(), 3);
    assert_eq!(driver.state(), TrialState::Submitting);
}

#[test]
fn both_keys_held_are_recorded_as_is() {
    let mut driver = TrialDriver::new(scene(2, 9), &ExperimentConfig::default());
    start_playing(&mut driver);
    let both = KeyStates {
        red: true,
        green: true,
    };
    driver.handle(DriverEvent::Frame(frame_at(0.0, both)));
    driver.handle(DriverEvent::Frame(frame_at(INTERVAL_MS, both)));
    assert_eq!(driver.records()[0].keys, both);
    assert_eq!(driver.tally().undecided, 1);
}

fn run_trial(controller: &mut LifecycleController, frames: usize) -> Vec<Effect> {
    let mut effects = controller.handle(LifecycleEvent::Acknowledge);
    for _ in 0..3 {
        effects.extend(controller.handle(LifecycleEvent::CountdownTick));
    }
    for i in 0..=frames {
        effects.extend(controller.handle(LifecycleEvent::Frame(frame_at(
            i as f64 * INTERVAL_MS,
            KeyStates::default(),
        ))));
    }
    effects
}

#[test]
fn transition_reply_leaves_the_finished_trial_untouched() {
    let mut c = LifecycleController::new(ExperimentConfig::default(), SessionContext::new("abc"));
    c.handle(LifecycleEvent::Start);
    c.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Scene(Box::new(
        scene(4, 21),
    ))));
    let effects = run_trial(&mut c, 4);
    let submit = effects
        .iter()
        .find(|e| matches!(e, Effect::Submit { .. }))
        .cloned();
    let Some(Effect::Submit { session_id, .. }) = submit else {
        panic!("trial did not submit");
    };
    assert_eq!(session_id, "abc");
    c.handle(LifecycleEvent::SaveCompleted {
        unique_trial_id: 21,
        score: 40.0,
    });

    let before = c.driver().map(|d| (d.records().to_vec(), d.state()));
    let effects = c.handle(LifecycleEvent::Acknowledge);
    assert!(matches!(effects[0], Effect::LoadScene { .. }));
    c.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Transition));
    let after = c.driver().map(|d| (d.records().to_vec(), d.state()));
    assert_eq!(before, after);
    assert!(c.prompt().is_some());
}

#[test]
fn loading_a_new_scene_starts_with_empty_records() {
    let mut c = LifecycleController::new(ExperimentConfig::default(), SessionContext::new("abc"));
    c.handle(LifecycleEvent::Start);
    c.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Scene(Box::new(
        scene(4, 1),
    ))));
    run_trial(&mut c, 4);
    c.handle(LifecycleEvent::SaveFailed {
        unique_trial_id: 1,
        reason: "503".into(),
    });
    assert_eq!(c.trial_state(), Some(TrialState::AwaitingAck { score: 0.0 }));
    assert!(c.alert_message().is_some());

    c.handle(LifecycleEvent::Acknowledge);
    c.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Scene(Box::new(
        scene(6, 2),
    ))));
    let driver = c.driver().unwrap();
    assert!(driver.records().is_empty());
    assert_eq!(driver.current_frame(), 0);
    assert_eq!(driver.state(), TrialState::Idle);
    assert!(c.alert_message().is_none());
}

#[test]
fn photodiode_toggles_once_per_signal() {
    let mut c = LifecycleController::new(ExperimentConfig::default(), SessionContext::new("abc"));
    c.handle(LifecycleEvent::Start);
    c.handle(LifecycleEvent::SceneLoaded(LoadOutcome::Scene(Box::new(
        scene(5, 1),
    ))));
    let initial = c.photodiode();
    c.handle(LifecycleEvent::Acknowledge);
    for _ in 0..3 {
        c.handle(LifecycleEvent::CountdownTick);
    }
    c.handle(LifecycleEvent::Frame(frame_at(0.0, KeyStates::default())));
    c.handle(LifecycleEvent::Frame(frame_at(INTERVAL_MS, KeyStates::default())));
    assert_eq!(c.photodiode(), initial.toggled());
    run_trial(&mut c, 8);
    assert_eq!(c.photodiode(), initial);
}
