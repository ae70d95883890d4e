use crate::audio::SyncTones;
use crate::config::AppConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redgreen_core::{Phase, SessionContext, SessionPhase};
use redgreen_experiment::{
    AckGate, Effect, FrameSample, InputSampler, LifecycleController, LifecycleEvent,
};
use redgreen_net::{HttpBackend, NetJob, NetReply, NetWorker, TimeoutWatchdog};
use redgreen_render::{Overlay, SceneRenderer};
use redgreen_timing::{utc_now, HighPrecisionTimer, RepeatingTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

pub struct App {
    config: AppConfig,
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SceneRenderer>,
    lifecycle: LifecycleController,
    input: InputSampler<KeyCode>,
    ack_keys: Vec<KeyCode>,
    pause_keys: Vec<KeyCode>,
    ack: AckGate,
    tones: SyncTones,
    timer: HighPrecisionTimer,
    countdown: RepeatingTimer,
    /// Set when the controller asked for the next display callback.
    frame_armed: bool,
    callbacks: CallbackChain,
    shown_frame: usize,
    backend: HttpBackend,
    proxy: EventLoopProxy<NetReply>,
    worker: Option<NetWorker>,
    watchdog: Option<TimeoutWatchdog>,
    scale_factor: f64,
    refresh_rate: Option<f64>,
}

impl App {
    pub fn new(
        config: AppConfig,
        session: SessionContext,
        event_loop: &EventLoop<NetReply>,
    ) -> Result<Self> {
        let backend = HttpBackend::new(config.client.clone()).context("building HTTP client")?;
        let proxy = event_loop.create_proxy();
        let timer = HighPrecisionTimer::new();

        let replies = proxy.clone();
        let worker = NetWorker::spawn(backend.clone(), timer.clone(), move |reply| {
            if replies.send_event(reply).is_err() {
                debug!("event loop gone, dropping network reply");
            }
        })
        .context("starting network worker")?;

        let keys = &config.keys;
        let input = InputSampler::new(keys.responses());
        let ack_keys = keys.acknowledge_keys();
        let pause_keys = keys.pause_keys();
        let tones = SyncTones::new(config.audio.clone());
        let lifecycle = LifecycleController::new(config.experiment.clone(), session);

        Ok(Self {
            config,
            window: None,
            pixels: None,
            renderer: None,
            lifecycle,
            input,
            ack_keys,
            pause_keys,
            ack: AckGate::default(),
            tones,
            timer,
            countdown: RepeatingTimer::new(),
            frame_armed: false,
            callbacks: CallbackChain::default(),
            shown_frame: 0,
            backend,
            proxy,
            worker: Some(worker),
            watchdog: None,
            scale_factor: 1.0,
            refresh_rate: None,
        })
    }

    pub fn run(mut self, event_loop: EventLoop<NetReply>) -> Result<()> {
        info!("Platform: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
        info!("Server: {}", self.config.client.base_url);
        event_loop.run_app(&mut self).map_err(Into::into)
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next());
        self.refresh_rate = monitor
            .as_ref()
            .and_then(|m| m.refresh_rate_millihertz())
            .map(|rate| rate as f64 / 1000.0);

        let mut attributes = Window::default_attributes().with_title("Red/Green");
        attributes = if self.config.fullscreen {
            attributes
                .with_fullscreen(Some(Fullscreen::Borderless(monitor)))
                .with_resizable(false)
        } else {
            attributes.with_inner_size(LogicalSize::new(1280.0, 800.0))
        };

        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        self.scale_factor = window.scale_factor();

        info!("Display configuration:");
        info!("  Physical size: {}×{}", size.width, size.height);
        info!("  Scale factor: {:.2}", self.scale_factor);
        match self.refresh_rate {
            Some(hz) => info!("  Refresh rate: {hz:.1} Hz"),
            None => warn!("  Refresh rate unknown"),
        }

        let surface = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface)?);
        self.renderer = Some(SceneRenderer::new(
            size.width,
            size.height,
            self.config.render.clone(),
        )?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn start_watchdog(&mut self) {
        let Ok(session_id) = self.lifecycle.session().require_id() else {
            return;
        };
        let proxy = self.proxy.clone();
        match TimeoutWatchdog::spawn(
            self.backend.clone(),
            session_id.to_string(),
            self.config.check_timeout_interval(),
            move |at| {
                let _ = proxy.send_event(NetReply::TimedOut { at });
            },
        ) {
            Ok(watchdog) => self.watchdog = Some(watchdog),
            Err(e) => error!("could not start timeout watchdog: {e}"),
        }
    }

    fn dispatch(&mut self, event: LifecycleEvent, event_loop: &ActiveEventLoop) {
        let effects = self.lifecycle.handle(event);
        self.apply(effects, event_loop);
    }

    fn apply(&mut self, effects: Vec<Effect>, event_loop: &ActiveEventLoop) {
        let mut redraw = false;
        for effect in effects {
            match effect {
                Effect::RequestFrame => {
                    self.frame_armed = true;
                    redraw = true;
                }
                Effect::CancelFrame => {
                    self.frame_armed = false;
                    self.callbacks.end();
                }
                Effect::StartCountdown { interval } => {
                    self.countdown.arm(self.timer.now(), interval);
                }
                Effect::StopCountdown => self.countdown.cancel(),
                Effect::Render(frame) => {
                    self.shown_frame = frame;
                    redraw = true;
                }
                Effect::Redraw | Effect::Alert(_) => redraw = true,
                Effect::Signal { signal, .. } => self.tones.play(signal),
                Effect::Submit {
                    delay,
                    session_id,
                    result,
                } => {
                    self.callbacks.end();
                    let unique_trial_id = result.info.unique_trial_id;
                    let job = NetJob::Save {
                        delay,
                        session_id,
                        result,
                    };
                    if !self.submit(job) {
                        self.dispatch(
                            LifecycleEvent::SaveFailed {
                                unique_trial_id,
                                reason: "network worker stopped".into(),
                            },
                            event_loop,
                        );
                    }
                }
                Effect::LoadScene {
                    session_id,
                    resume_from_trial,
                } => {
                    self.ack.reset();
                    let job = NetJob::LoadScene {
                        session_id,
                        resume_from_trial,
                    };
                    if !self.submit(job) {
                        self.dispatch(
                            LifecycleEvent::SceneLoadFailed {
                                reason: "network worker stopped".into(),
                            },
                            event_loop,
                        );
                    }
                }
                Effect::Exit => self.cleanup_and_exit(event_loop),
            }
        }
        if redraw {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }

    fn submit(&self, job: NetJob) -> bool {
        self.worker.as_ref().is_some_and(|w| w.submit(job))
    }

    /// Display callback: advances the trial if a frame was requested, then
    /// paints whatever the controller currently shows.
    fn on_redraw(&mut self, event_loop: &ActiveEventLoop) {
        if std::mem::take(&mut self.frame_armed) {
            let now = self.timer.now();
            if let Some(interval) = self.callbacks.interval(now) {
                self.timer.record_frame(interval);
            }
            let sample = FrameSample {
                timestamp: now,
                keys: self.input.state(),
                utc: utc_now(),
            };
            self.dispatch(LifecycleEvent::Frame(sample), event_loop);
            if !self.frame_armed {
                self.callbacks.end();
            }
        }
        if let Err(e) = self.render() {
            error!("render failed: {e:#}");
        }
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };
        let lifecycle = &self.lifecycle;
        let phase = lifecycle.phase();
        let driver = lifecycle.driver().filter(|_| phase.runs_trials());

        let status = driver.map(|d| d.scene().info.progress_label());
        let prompt = screen_text(lifecycle).or_else(|| lifecycle.prompt());
        let overlay = Overlay {
            countdown: driver.and_then(|d| d.countdown_value()),
            photodiode: lifecycle.photodiode(),
            status: status.as_deref(),
            prompt: prompt.as_deref(),
            alert: lifecycle.alert_message(),
            score: driver.and_then(|d| d.state().score()),
            keys: driver.filter(|d| d.is_playing()).map(|_| self.input.state()),
            tally: driver.filter(|d| d.is_playing()).map(|d| d.tally()),
        };

        let stats = renderer.render(driver.map(|d| d.scene()), self.shown_frame, &overlay);
        let (width, height) = renderer.size();
        renderer.present(pixels.frame_mut(), width, height)?;
        let before = self.timer.now();
        pixels.render()?;
        let ms = |d: Duration| d.as_secs_f64() * 1e3;
        trace!(
            "frame {}: present {:.3}ms, clear {:.3}ms, scene {:.3}ms, overlay {:.3}ms",
            self.shown_frame,
            ms(self.timer.elapsed(before)),
            ms(stats.clear),
            ms(stats.scene),
            ms(stats.overlay),
        );
        Ok(())
    }

    fn handle_key(&mut self, event: KeyEvent, event_loop: &ActiveEventLoop) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let pressed = event.state == ElementState::Pressed;

        if self.input.binding(&code).is_some() {
            let changed = if pressed {
                self.input.key_down(code)
            } else {
                self.input.key_up(code)
            };
            if changed {
                trace!("keys now {:?}", self.input.state());
            }
            return;
        }

        if self.ack_keys.contains(&code) {
            if pressed {
                self.tones.ensure_open();
                self.ack.press();
            } else if self.ack.release() {
                self.dispatch(LifecycleEvent::Acknowledge, event_loop);
            }
            return;
        }

        if pressed && !event.repeat && self.pause_keys.contains(&code) {
            let at = self.timer.now();
            self.dispatch(LifecycleEvent::PauseRequested { at }, event_loop);
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                error!("Failed to resize surface: {e}");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                error!("Failed to resize buffer: {e}");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(new_size.width, new_size.height) {
                error!("Failed to resize renderer: {e}");
            }
        }
        info!(
            "Display resized to: {}×{} (scale {:.2})",
            new_size.width, new_size.height, self.scale_factor
        );
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        let effects = self.lifecycle.handle(LifecycleEvent::Teardown);
        for effect in effects {
            match effect {
                Effect::CancelFrame => self.frame_armed = false,
                Effect::StopCountdown => self.countdown.cancel(),
                _ => {}
            }
        }
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.watchdog = None;
        self.worker = None;
        info!("Experiment window closed");
        event_loop.exit();
    }
}

/// Text for the screens that end or suspend the session.
fn screen_text(lifecycle: &LifecycleController) -> Option<String> {
    match lifecycle.phase() {
        SessionPhase::Finished => Some(match lifecycle.average_score() {
            Some(avg) => format!("The experiment is complete. Your average score was {avg:.0}."),
            None => "The experiment is complete.".to_string(),
        }),
        SessionPhase::TimedOut => {
            let clock = |at: DateTime<Utc>| at.format("%H:%M:%S UTC").to_string();
            let started = lifecycle.session().started_at.map(clock);
            let ended = lifecycle.timed_out_at().map(clock);
            Some(match (started, ended) {
                (Some(start), Some(end)) => {
                    format!("Your session has expired. Started at {start}, ended at {end}.")
                }
                (None, Some(end)) => format!("Your session has expired at {end}."),
                (Some(start), None) => format!("Your session started at {start} has expired."),
                (None, None) => "Your session has expired.".to_string(),
            })
        }
        SessionPhase::Paused => {
            let session = lifecycle.session().session_id.as_deref().unwrap_or("unknown");
            Some(match lifecycle.resume_trial() {
                Some(trial) => format!(
                    "Experiment paused. Session {session}, resume from trial {trial}."
                ),
                None => format!("Experiment paused. Session {session}."),
            })
        }
        _ => None,
    }
}

/// Spacing of consecutive requested display callbacks. The chain breaks
/// whenever playback stops asking for frames, so idle gaps between trials
/// are not counted.
#[derive(Debug, Default)]
struct CallbackChain {
    last: Option<Duration>,
}

impl CallbackChain {
    fn interval(&mut self, now: Duration) -> Option<Duration> {
        self.last.replace(now).map(|prev| now.saturating_sub(prev))
    }

    fn end(&mut self) {
        self.last = None;
    }
}

fn lifecycle_event(reply: NetReply) -> LifecycleEvent {
    match reply {
        NetReply::SceneLoaded(outcome) => LifecycleEvent::SceneLoaded(outcome),
        NetReply::SceneLoadFailed { reason } => LifecycleEvent::SceneLoadFailed { reason },
        NetReply::Saved {
            unique_trial_id,
            score,
        } => LifecycleEvent::SaveCompleted {
            unique_trial_id,
            score,
        },
        NetReply::SaveFailed {
            unique_trial_id,
            reason,
        } => LifecycleEvent::SaveFailed {
            unique_trial_id,
            reason,
        },
        NetReply::TimedOut { at } => LifecycleEvent::TimedOut { at },
    }
}

impl ApplicationHandler<NetReply> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.create_window_and_surface(event_loop) {
            error!("Failed to create window and surface: {e:#}");
            event_loop.exit();
            return;
        }
        self.start_watchdog();
        self.dispatch(LifecycleEvent::Start, event_loop);
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, reply: NetReply) {
        debug!("network reply: {reply:?}");
        self.dispatch(lifecycle_event(reply), event_loop);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                let at = self.timer.now();
                self.dispatch(LifecycleEvent::CloseRequested { at }, event_loop);
            }
            WindowEvent::RedrawRequested => self.on_redraw(event_loop),
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event, event_loop),
            WindowEvent::Focused(false) => {
                self.input.release_all();
                self.ack.reset();
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(window) = &self.window {
                    self.handle_resize(window.inner_size());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.countdown.poll(self.timer.now()) {
            self.dispatch(LifecycleEvent::CountdownTick, event_loop);
        }
        let flow = match self.countdown.deadline() {
            Some(deadline) => ControlFlow::WaitUntil(self.timer.instant_at(deadline)),
            None => ControlFlow::Wait,
        };
        event_loop.set_control_flow(flow);
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.watchdog = None;
        self.worker = None;
        let stats = self.timer.callback_stats();
        if stats.samples > 0 {
            info!(
                "display callbacks: {} samples, {:.2} Hz, jitter {:.3}ms",
                stats.samples,
                stats.effective_hz,
                stats.jitter_ns / 1e6
            );
        }
        if let Some(renderer) = self.renderer.as_mut() {
            for (component, stats) in renderer.take_component_stats() {
                if stats.samples > 0 {
                    info!(
                        "render {component}: avg {:.3}ms, max {:.3}ms over {} frames",
                        stats.average_interval_ns / 1e6,
                        stats.max_interval_ns / 1e6,
                        stats.samples
                    );
                }
            }
        }
    }
}
