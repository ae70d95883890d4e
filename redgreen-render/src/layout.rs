use redgreen_core::Position;
use serde::Deserialize;
use std::path::PathBuf;
use tiny_skia::Transform;

/// How a trajectory point maps onto the drawn object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectAnchor {
    /// The point is the circle's center.
    #[default]
    Center,
    /// The point is the lower-left corner of the circle's bounding box.
    BottomLeft,
}

impl ObjectAnchor {
    pub fn center(self, p: Position, radius: f32) -> (f32, f32) {
        match self {
            Self::Center => (p.x, p.y),
            Self::BottomLeft => (p.x + radius, p.y + radius),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Canvas edge as a fraction of the shorter window side.
    pub canvas_proportion: f32,
    pub object_anchor: ObjectAnchor,
    pub font_path: Option<PathBuf>,
    pub photodiode_px: f32,
    pub text_px: f32,
    pub countdown_px: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            canvas_proportion: 0.7,
            object_anchor: ObjectAnchor::Center,
            font_path: None,
            photodiode_px: 48.0,
            text_px: 24.0,
            countdown_px: 96.0,
        }
    }
}

/// Placement of the scene canvas inside the window, in window pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasLayout {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Window pixels per world unit.
    pub scale: f32,
}

impl CanvasLayout {
    /// Each canvas edge is snapped down to a whole multiple of its world
    /// extent, so one world unit covers an integral number of pixels.
    pub fn compute(
        window_width: u32,
        window_height: u32,
        world_width: f32,
        world_height: f32,
        proportion: f32,
    ) -> Self {
        let basis = window_width.min(window_height) as f32 * proportion;
        let snap = |extent: f32| ((basis / extent).floor() * extent).max(0.0);
        let width = snap(world_width);
        let height = snap(world_height);
        let scale = (width / world_width).min(height / world_height);
        Self {
            x: ((window_width as f32 - width) / 2.0).floor(),
            y: ((window_height as f32 - height) / 2.0).floor(),
            width,
            height,
            scale,
        }
    }

    /// World coordinates (y up) to window pixels (y down).
    pub fn world_transform(&self) -> Transform {
        Transform::from_row(
            self.scale,
            0.0,
            0.0,
            -self.scale,
            self.x,
            self.y + self.height,
        )
    }

    pub fn to_window(&self, wx: f32, wy: f32) -> (f32, f32) {
        (self.x + wx * self.scale, self.y + self.height - wy * self.scale)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}
