use super::layout::{CanvasLayout, RenderConfig};
use super::text::TextPainter;
use super::RenderError;
use redgreen_core::{KeyStates, PhotodiodeState, ResponseKey, Scene, Tally, WorldRect};
use redgreen_timing::{CallbackStats, HighPrecisionTimer, Timer};
use std::collections::HashMap;
use std::time::Duration;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};
use tracing::{trace, warn};

const BARRIER: [u8; 4] = [0, 0, 0, 255];
const OCCLUDER: [u8; 4] = [128, 128, 128, 255];
const OBJECT: [u8; 4] = [0, 0, 255, 255];
const SENSOR_RED: [u8; 4] = [255, 0, 0, 255];
const SENSOR_GREEN: [u8; 4] = [0, 128, 0, 255];
const PANEL: [u8; 4] = [255, 255, 255, 204];
const BAR_TRACK: [u8; 4] = [220, 220, 220, 255];
const ALERT_TEXT: [u8; 4] = [200, 0, 0, 255];
const UNCERTAIN: [u8; 4] = [128, 128, 128, 255];

/// Everything drawn on top of the scene for the current screen.
#[derive(Debug, Clone, Default)]
pub struct Overlay<'a> {
    /// Pending countdown value; hides frame 0 geometry while set.
    pub countdown: Option<u32>,
    pub photodiode: PhotodiodeState,
    pub status: Option<&'a str>,
    pub prompt: Option<&'a str>,
    pub alert: Option<&'a str>,
    /// Score of the finished trial, shown as a banner.
    pub score: Option<f64>,
    /// Held keys, shown as an indicator while set.
    pub keys: Option<KeyStates>,
    /// Running red / uncertain / green proportions of the current trial.
    pub tally: Option<Tally>,
}

#[derive(Debug, Clone, Copy)]
pub struct FrameStats {
    pub clear: Duration,
    pub scene: Duration,
    pub overlay: Duration,
    pub total: Duration,
}

/// Software renderer for one window-sized surface.
pub struct SceneRenderer {
    width: u32,
    height: u32,
    config: RenderConfig,
    text: TextPainter,
    canvas: Pixmap,
    layout: Option<CanvasLayout>,
    timer: HighPrecisionTimer,
    component_timers: HashMap<&'static str, HighPrecisionTimer>,
}

impl SceneRenderer {
    pub fn new(width: u32, height: u32, config: RenderConfig) -> Result<Self, RenderError> {
        let text = TextPainter::load(config.font_path.as_deref())?;
        Self::with_text(width, height, config, text)
    }

    pub fn with_text(
        width: u32,
        height: u32,
        config: RenderConfig,
        text: TextPainter,
    ) -> Result<Self, RenderError> {
        let canvas = blank_surface(width, height)?;
        Ok(Self {
            width: width.max(1),
            height: height.max(1),
            config,
            text,
            canvas,
            layout: None,
            timer: HighPrecisionTimer::new(),
            component_timers: ["clear", "scene", "overlay", "total"]
                .iter()
                .map(|&k| (k, HighPrecisionTimer::new()))
                .collect(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.canvas = blank_surface(width, height)?;
        self.width = width.max(1);
        self.height = height.max(1);
        self.layout = None;
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn layout(&self) -> Option<CanvasLayout> {
        self.layout
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.canvas
    }

    pub fn component_stats(&self, name: &str) -> CallbackStats {
        self.component_timers
            .get(name)
            .map(Timer::callback_stats)
            .unwrap_or_default()
    }

    /// Per-component render timings since the last call, then starts over.
    pub fn take_component_stats(&mut self) -> Vec<(&'static str, CallbackStats)> {
        let mut stats: Vec<_> = self
            .component_timers
            .iter_mut()
            .map(|(&name, timer)| {
                let s = timer.callback_stats();
                timer.clear_frames();
                (name, s)
            })
            .collect();
        stats.sort_by_key(|(name, _)| *name);
        stats
    }

    /// Draws `frame` of `scene` plus the overlay into the offscreen surface.
    /// A missing scene still draws the overlay; nothing here fails.
    pub fn render(&mut self, scene: Option<&Scene>, frame: usize, overlay: &Overlay) -> FrameStats {
        let t0 = self.timer.now();
        self.canvas.fill(Color::WHITE);
        let clear = self.timer.elapsed(t0);

        let t1 = self.timer.now();
        self.layout = scene.map(|s| {
            CanvasLayout::compute(
                self.width,
                self.height,
                s.world_width,
                s.world_height,
                self.config.canvas_proportion,
            )
        });
        match (scene, self.layout) {
            (Some(scene), Some(layout)) => {
                // frame 0 doubles as the countdown backdrop
                if !(frame == 0 && overlay.countdown.is_some()) {
                    self.draw_scene(scene, frame, &layout);
                }
            }
            _ => trace!("no scene loaded, drawing overlay only"),
        }
        let scene_time = self.timer.elapsed(t1);

        let t2 = self.timer.now();
        self.draw_overlay(overlay);
        let overlay_time = self.timer.elapsed(t2);

        let total = clear + scene_time + overlay_time;
        for (name, d) in [
            ("clear", clear),
            ("scene", scene_time),
            ("overlay", overlay_time),
            ("total", total),
        ] {
            if let Some(t) = self.component_timers.get_mut(name) {
                t.record_frame(d);
            }
        }
        FrameStats {
            clear,
            scene: scene_time,
            overlay: overlay_time,
            total,
        }
    }

    fn draw_scene(&mut self, scene: &Scene, frame: usize, layout: &CanvasLayout) {
        let world = layout.world_transform();

        for r in &scene.barriers {
            fill_world_rect(&mut self.canvas, r, BARRIER, world);
        }
        let sensors = scene.painted_sensors();
        if let Some(r) = &sensors.red {
            fill_world_rect(&mut self.canvas, r, SENSOR_RED, world);
        }
        if let Some(r) = &sensors.green {
            fill_world_rect(&mut self.canvas, r, SENSOR_GREEN, world);
        }

        match scene.position(frame) {
            Some(p) => {
                let (cx, cy) = self.config.object_anchor.center(p, scene.radius);
                if let Some(circle) = PathBuilder::from_circle(cx, cy, scene.radius) {
                    self.canvas.fill_path(
                        &circle,
                        &solid(OBJECT),
                        FillRule::Winding,
                        world,
                        None,
                    );
                }
            }
            None => warn!("frame {frame} outside trajectory of {} frames", scene.len()),
        }

        // occluders hide the object
        for r in &scene.occluders {
            fill_world_rect(&mut self.canvas, r, OCCLUDER, world);
        }
    }

    fn draw_overlay(&mut self, overlay: &Overlay) {
        let text_px = self.config.text_px;
        let (w, h) = (self.width as f32, self.height as f32);
        let canvas = self.layout.unwrap_or(CanvasLayout {
            x: 0.0,
            y: 0.0,
            width: w,
            height: h,
            scale: 1.0,
        });
        let (cx, cy) = canvas.center();

        let side = self.config.photodiode_px;
        let patch = overlay.photodiode.rgba();
        fill_screen_rect(&mut self.canvas, 0.0, h - side, side, side, patch);

        if let Some(status) = overlay.status {
            let y = (canvas.y - text_px).max(text_px);
            self.text.draw_centered(&mut self.canvas, status, cx, y, text_px, Color::BLACK);
        }
        if let Some(alert) = overlay.alert {
            self.text.draw_centered(
                &mut self.canvas,
                alert,
                w / 2.0,
                h - text_px * 1.5,
                text_px,
                rgba(ALERT_TEXT),
            );
        }

        let mut below = canvas.bottom() + text_px;
        if let Some(keys) = overlay.keys {
            self.draw_key_indicator(keys, cx, below + text_px * 0.75);
            below += text_px * 2.0;
        }
        if let Some(tally) = overlay.tally {
            self.draw_tally_bar(tally, &canvas, below);
            below += text_px * 2.0;
        }
        if let Some(prompt) = overlay.prompt {
            let y = if self.layout.is_some() {
                below + text_px / 2.0
            } else {
                cy
            };
            self.text.draw_centered(&mut self.canvas, prompt, cx, y, text_px, Color::BLACK);
        }

        if let Some(n) = overlay.countdown {
            let box_w = (self.config.countdown_px * 1.6).min(canvas.width * 0.5);
            let box_h = box_w * 0.875;
            fill_screen_rect(
                &mut self.canvas,
                cx - box_w / 2.0,
                cy - box_h / 2.0,
                box_w,
                box_h,
                PANEL,
            );
            let digit_px = (box_h * 0.7).min(self.config.countdown_px);
            self.text.draw_centered(
                &mut self.canvas,
                &n.to_string(),
                cx,
                cy,
                digit_px,
                Color::BLACK,
            );
        }

        if let Some(score) = overlay.score {
            self.draw_score_banner(score, &canvas);
        }
    }

    fn draw_key_indicator(&mut self, keys: KeyStates, cx: f32, cy: f32) {
        let side = self.config.text_px * 1.5;
        let gap = side * 0.5;
        let held = keys.decisive();
        for (key, color, x) in [
            (ResponseKey::Red, SENSOR_RED, cx - gap / 2.0 - side),
            (ResponseKey::Green, SENSOR_GREEN, cx + gap / 2.0),
        ] {
            let y = cy - side / 2.0;
            if held == Some(key) {
                fill_screen_rect(&mut self.canvas, x, y, side, side, color);
            } else if let Some(rect) = Rect::from_xywh(x, y, side, side) {
                let path = PathBuilder::from_rect(rect);
                let stroke = Stroke {
                    width: 2.0,
                    ..Stroke::default()
                };
                self.canvas
                    .stroke_path(&path, &solid(color), &stroke, Transform::identity(), None);
            }
        }
    }

    fn draw_tally_bar(&mut self, tally: Tally, canvas: &CanvasLayout, top: f32) {
        let text_px = self.config.text_px;
        let (x, w, h) = (canvas.x, canvas.width, text_px * 1.5);
        fill_screen_rect(&mut self.canvas, x, top, w, h, BAR_TRACK);
        let total = tally.total();
        if total == 0 {
            return;
        }
        let share = |n: usize| w * n as f32 / total as f32;
        let red_w = share(tally.red);
        let green_w = share(tally.green);
        let uncertain_w = w - red_w - green_w;
        fill_screen_rect(&mut self.canvas, x, top, red_w, h, SENSOR_RED);
        fill_screen_rect(&mut self.canvas, x + red_w, top, uncertain_w, h, UNCERTAIN);
        fill_screen_rect(&mut self.canvas, x + w - green_w, top, green_w, h, SENSOR_GREEN);
        if uncertain_w > w * 0.4 {
            self.text.draw_centered(
                &mut self.canvas,
                "Uncertain",
                x + red_w + uncertain_w / 2.0,
                top + h / 2.0,
                text_px * 0.75,
                Color::WHITE,
            );
        }
    }

    fn draw_score_banner(&mut self, score: f64, canvas: &CanvasLayout) {
        let text_px = self.config.text_px;
        let (cx, cy) = canvas.center();
        let box_w = canvas.width * 0.8;
        let box_h = text_px * 5.0;
        let top = cy - box_h / 2.0;
        fill_screen_rect(&mut self.canvas, cx - box_w / 2.0, top, box_w, box_h, PANEL);

        let headline = format!("Finished. You scored {score:.0}");
        self.text.draw_centered(
            &mut self.canvas,
            &headline,
            cx,
            top + text_px * 1.5,
            text_px * 1.5,
            Color::BLACK,
        );

        let bar_w = box_w * 0.8;
        let bar_h = text_px;
        let bar_x = cx - bar_w / 2.0;
        let bar_y = top + text_px * 3.0;
        let fraction = score_fraction(score);
        fill_screen_rect(&mut self.canvas, bar_x, bar_y, bar_w, bar_h, BAR_TRACK);
        fill_screen_rect(
            &mut self.canvas,
            bar_x,
            bar_y,
            bar_w * fraction,
            bar_h,
            score_color(fraction),
        );
    }

    /// Copies the surface into an RGBA8 frame buffer of `frame_width` x
    /// `frame_height`. Sizes may briefly disagree during a resize; the
    /// overlapping region is copied and the rest painted white.
    pub fn present(
        &self,
        frame: &mut [u8],
        frame_width: u32,
        frame_height: u32,
    ) -> Result<(), RenderError> {
        let src = self.canvas.data();
        let len = frame.len();
        if frame.len() == src.len() && frame_width == self.width && frame_height == self.height {
            frame.copy_from_slice(src);
            return Ok(());
        }

        let expected = frame_width as usize * frame_height as usize;
        let dst: &mut [[u8; 4]] = bytemuck::try_cast_slice_mut(frame)
            .map_err(|_| RenderError::FrameBuffer { len })?;
        if dst.len() != expected {
            return Err(RenderError::FrameBuffer { len: dst.len() * 4 });
        }
        let src: &[[u8; 4]] = bytemuck::cast_slice(src);

        dst.fill([255, 255, 255, 255]);
        let cols = frame_width.min(self.width) as usize;
        let rows = frame_height.min(self.height) as usize;
        for row in 0..rows {
            let s = row * self.width as usize;
            let d = row * frame_width as usize;
            dst[d..d + cols].copy_from_slice(&src[s..s + cols]);
        }
        Ok(())
    }
}

/// Position of `score` on the banner bar, which spans -80..120.
pub fn score_fraction(score: f64) -> f32 {
    (((score + 80.0) / 200.0) as f32).clamp(0.0, 1.0)
}

pub fn score_color(fraction: f32) -> [u8; 4] {
    if fraction <= 1.0 / 3.0 {
        [220, 40, 40, 255]
    } else if fraction <= 2.0 / 3.0 {
        [240, 200, 0, 255]
    } else {
        [40, 170, 60, 255]
    }
}

fn rgba(c: [u8; 4]) -> Color {
    Color::from_rgba8(c[0], c[1], c[2], c[3])
}

fn blank_surface(width: u32, height: u32) -> Result<Pixmap, RenderError> {
    let mut pm = Pixmap::new(width.max(1), height.max(1))
        .ok_or(RenderError::Surface { width, height })?;
    pm.fill(Color::WHITE);
    Ok(pm)
}

fn solid(c: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(c[0], c[1], c[2], c[3]);
    paint
}

fn fill_world_rect(canvas: &mut Pixmap, r: &WorldRect, color: [u8; 4], world: Transform) {
    match Rect::from_xywh(r.x, r.y, r.width, r.height) {
        Some(rect) => canvas.fill_rect(rect, &solid(color), world, None),
        None => trace!("skipping degenerate rect {r:?}"),
    }
}

fn fill_screen_rect(canvas: &mut Pixmap, x: f32, y: f32, w: f32, h: f32, color: [u8; 4]) {
    if let Some(rect) = Rect::from_xywh(x, y, w, h) {
        canvas.fill_rect(rect, &solid(color), Transform::identity(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ObjectAnchor;
    use redgreen_core::{Position, Trajectory};

    // 200x200 window, proportion 0.7: 7 px per unit, canvas at (30, 30)
    fn scene() -> Scene {
        Scene {
            world_width: 20.0,
            world_height: 20.0,
            radius: 0.5,
            barriers: vec![WorldRect {
                x: 0.0,
                y: 0.0,
                width: 20.0,
                height: 1.0,
            }],
            occluders: vec![WorldRect {
                x: 14.0,
                y: 10.0,
                width: 4.0,
                height: 4.0,
            }],
            red_sensor: Some(WorldRect {
                x: 0.0,
                y: 1.0,
                width: 4.0,
                height: 4.0,
            }),
            green_sensor: Some(WorldRect {
                x: 16.0,
                y: 1.0,
                width: 4.0,
                height: 4.0,
            }),
            counterbalance: false,
            step_data: Trajectory::from_positions(vec![
                Position { x: 10.0, y: 2.0 },
                Position { x: 16.0, y: 12.0 },
            ])
            .unwrap(),
            fps: None,
            info: Default::default(),
        }
    }

    fn renderer() -> SceneRenderer {
        SceneRenderer::new(200, 200, RenderConfig::default()).unwrap()
    }

    fn count(r: &SceneRenderer, pred: impl Fn((u8, u8, u8)) -> bool) -> usize {
        r.pixmap()
            .pixels()
            .iter()
            .filter(|p| pred((p.red(), p.green(), p.blue())))
            .count()
    }

    fn rgb(r: &SceneRenderer, x: u32, y: u32) -> (u8, u8, u8) {
        let px = r.pixmap().pixel(x, y).unwrap();
        (px.red(), px.green(), px.blue())
    }

    #[test]
    fn y_axis_points_up() {
        let mut r = renderer();
        r.render(Some(&scene()), 0, &Overlay::default());
        // world (10, 2) -> window (100, 30 + 140 - 14)
        assert_eq!(rgb(&r, 100, 156), (0, 0, 255));
        // the floor barrier is at the bottom of the canvas
        assert_eq!(rgb(&r, 60, 166), (0, 0, 0));
    }

    #[test]
    fn counterbalance_swaps_sensor_colors() {
        let mut r = renderer();
        let mut s = scene();
        r.render(Some(&s), 0, &Overlay::default());
        // world (2, 3) and (18, 3)
        assert_eq!(rgb(&r, 44, 149), (255, 0, 0));
        assert_eq!(rgb(&r, 156, 149), (0, 128, 0));

        s.counterbalance = true;
        r.render(Some(&s), 0, &Overlay::default());
        assert_eq!(rgb(&r, 44, 149), (0, 128, 0));
        assert_eq!(rgb(&r, 156, 149), (255, 0, 0));
    }

    #[test]
    fn occluder_hides_the_object() {
        let mut r = renderer();
        r.render(Some(&scene()), 1, &Overlay::default());
        // world (16, 12) -> window (142, 86), inside the occluder
        assert_eq!(rgb(&r, 142, 86), (128, 128, 128));
    }

    #[test]
    fn countdown_hides_frame_zero_geometry() {
        let mut r = renderer();
        let overlay = Overlay {
            countdown: Some(3),
            ..Overlay::default()
        };
        r.render(Some(&scene()), 0, &overlay);
        assert_eq!(rgb(&r, 60, 166), (255, 255, 255));
        assert_eq!(rgb(&r, 100, 156), (255, 255, 255));
    }

    #[test]
    fn bottom_left_anchor_shifts_the_object() {
        let config = RenderConfig {
            object_anchor: ObjectAnchor::BottomLeft,
            ..RenderConfig::default()
        };
        let mut r = SceneRenderer::new(200, 200, config).unwrap();
        r.render(Some(&scene()), 0, &Overlay::default());
        // center moves to world (10.5, 2.5) -> window (103.5, 152.5)
        assert_eq!(rgb(&r, 103, 152), (0, 0, 255));
    }

    #[test]
    fn photodiode_patch_follows_state() {
        let mut r = renderer();
        r.render(None, 0, &Overlay::default());
        assert_eq!(rgb(&r, 2, 197), (0, 0, 0));
        let lit = Overlay {
            photodiode: PhotodiodeState::Lit,
            ..Overlay::default()
        };
        r.render(None, 0, &lit);
        assert_eq!(rgb(&r, 2, 197), (255, 255, 255));
    }

    #[test]
    fn frame_outside_trajectory_is_not_fatal() {
        let mut r = renderer();
        r.render(Some(&scene()), 99, &Overlay::default());
        assert_eq!(rgb(&r, 60, 166), (0, 0, 0));
    }

    #[test]
    fn default_config_draws_prompt_alert_and_status() {
        let dark = |(r, g, b): (u8, u8, u8)| r < 100 && g < 100 && b < 100;
        let alert_red = |(r, g, b): (u8, u8, u8)| r > 150 && g < 60 && b < 60;

        let mut r = SceneRenderer::new(800, 600, RenderConfig::default()).unwrap();
        r.render(None, 0, &Overlay::default());
        // only the photodiode patch
        let blank = count(&r, dark);
        assert_eq!(count(&r, alert_red), 0);

        let overlay = Overlay {
            status: Some("Trial Number: 3/10"),
            prompt: Some("Press Space to continue"),
            ..Overlay::default()
        };
        r.render(None, 0, &overlay);
        assert!(count(&r, dark) > blank + 100);

        let alert = Overlay {
            alert: Some("Session ID not found. Please start again."),
            ..Overlay::default()
        };
        r.render(None, 0, &alert);
        assert!(count(&r, alert_red) > 50);
    }

    #[test]
    fn tally_bar_splits_by_proportion() {
        let mut r = SceneRenderer::new(400, 400, RenderConfig::default()).unwrap();
        let overlay = Overlay {
            tally: Some(Tally {
                red: 1,
                green: 3,
                undecided: 0,
            }),
            ..Overlay::default()
        };
        r.render(Some(&scene()), 1, &overlay);
        let layout = r.layout().unwrap();
        let y = (layout.bottom() + 24.0 + 18.0) as u32;
        let x = |f: f32| (layout.x + layout.width * f) as u32;
        assert_eq!(rgb(&r, x(0.1), y), (255, 0, 0));
        assert_eq!(rgb(&r, x(0.4), y), (0, 128, 0));
        assert_eq!(rgb(&r, x(0.9), y), (0, 128, 0));
    }

    #[test]
    fn empty_tally_shows_only_the_track() {
        let mut r = SceneRenderer::new(400, 400, RenderConfig::default()).unwrap();
        let overlay = Overlay {
            tally: Some(Tally::default()),
            ..Overlay::default()
        };
        r.render(Some(&scene()), 1, &overlay);
        let layout = r.layout().unwrap();
        let y = (layout.bottom() + 24.0 + 18.0) as u32;
        assert_eq!(rgb(&r, (layout.x + 10.0) as u32, y), (220, 220, 220));
    }

    #[test]
    fn component_stats_reset_after_taking() {
        let mut r = renderer();
        r.render(None, 0, &Overlay::default());
        r.render(None, 0, &Overlay::default());
        let stats = r.take_component_stats();
        let names: Vec<_> = stats.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["clear", "overlay", "scene", "total"]);
        assert!(stats.iter().all(|(_, s)| s.samples == 2));
        assert_eq!(r.component_stats("total"), CallbackStats::default());
    }

    #[test]
    fn score_bar_colors() {
        assert_eq!(score_fraction(-80.0), 0.0);
        assert_eq!(score_fraction(500.0), 1.0);
        assert_eq!(score_color(score_fraction(-20.0)), score_color(0.0));
        assert_eq!(score_color(score_fraction(40.0)), score_color(0.5));
        assert_eq!(score_color(score_fraction(100.0)), score_color(1.0));
    }

    #[test]
    fn present_handles_mismatched_sizes() {
        let mut r = renderer();
        r.render(Some(&scene()), 0, &Overlay::default());
        let mut same = vec![0u8; 200 * 200 * 4];
        r.present(&mut same, 200, 200).unwrap();
        assert_eq!(same.as_slice(), r.pixmap().data());

        let mut bigger = vec![0u8; 300 * 250 * 4];
        r.present(&mut bigger, 300, 250).unwrap();
        let at = |x: usize, y: usize| &bigger[(y * 300 + x) * 4..(y * 300 + x) * 4 + 4];
        assert_eq!(at(100, 156), &[0, 0, 255, 255]);
        assert_eq!(at(250, 10), &[255, 255, 255, 255]);

        let mut wrong = vec![0u8; 17];
        assert!(r.present(&mut wrong, 3, 3).is_err());
    }
}
