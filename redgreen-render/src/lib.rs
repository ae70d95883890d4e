pub mod layout;
pub mod render;
pub mod text;

pub use layout::{CanvasLayout, ObjectAnchor, RenderConfig};
pub use render::{score_color, score_fraction, FrameStats, Overlay, SceneRenderer};
pub use text::TextPainter;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot allocate a {width}x{height} surface")]
    Surface { width: u32, height: u32 },
    #[error("cannot read font {path}: {source}")]
    Font {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not a usable font")]
    FontData(String),
    #[error("frame buffer of {len} bytes does not match the surface")]
    FrameBuffer { len: usize },
}
