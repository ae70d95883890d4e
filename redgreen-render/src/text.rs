use super::RenderError;
use ab_glyph::{point, Font, FontArc, Glyph, PxScale, ScaleFont};
use std::path::Path;
use tiny_skia::{Color, Pixmap, PixmapPaint, PremultipliedColorU8, Transform};
use tracing::warn;

static DEJAVU_SANS: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Draws unflipped screen-space text.
pub struct TextPainter {
    font: FontArc,
}

impl TextPainter {
    /// The bundled DejaVu Sans face.
    pub fn embedded() -> Result<Self, RenderError> {
        let font = FontArc::try_from_slice(DEJAVU_SANS)
            .map_err(|_| RenderError::FontData("embedded DejaVuSans.ttf".into()))?;
        Ok(Self { font })
    }

    pub fn from_file(path: &Path) -> Result<Self, RenderError> {
        let bytes = std::fs::read(path).map_err(|source| RenderError::Font {
            path: path.display().to_string(),
            source,
        })?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|_| RenderError::FontData(path.display().to_string()))?;
        Ok(Self { font })
    }

    /// Loads `path` if given. An unreadable font file falls back to the
    /// bundled face.
    pub fn load(path: Option<&Path>) -> Result<Self, RenderError> {
        match path.map(Self::from_file) {
            Some(Ok(painter)) => Ok(painter),
            Some(Err(e)) => {
                warn!("{e}; using the bundled font");
                Self::embedded()
            }
            None => Self::embedded(),
        }
    }

    /// Width and height the text will occupy.
    pub fn measure(&self, text: &str, size_px: f32) -> (f32, f32) {
        let sf = self.font.as_scaled(PxScale::from(size_px));
        let mut width = 0.0;
        let mut prev = None;
        for ch in text.chars() {
            let id = self.font.glyph_id(ch);
            if let Some(p) = prev {
                width += sf.kern(p, id);
            }
            width += sf.h_advance(id);
            prev = Some(id);
        }
        (width, sf.ascent() - sf.descent())
    }

    /// Draws `text` with its top-left corner at (x, y).
    pub fn draw(
        &self,
        canvas: &mut Pixmap,
        text: &str,
        x: f32,
        y: f32,
        size_px: f32,
        color: Color,
    ) {
        if let Some(pm) = rasterize(&self.font, text, size_px, color) {
            canvas.draw_pixmap(
                x.round() as i32,
                y.round() as i32,
                pm.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
    }

    /// Draws `text` centered on (cx, cy).
    pub fn draw_centered(
        &self,
        canvas: &mut Pixmap,
        text: &str,
        cx: f32,
        cy: f32,
        size_px: f32,
        color: Color,
    ) {
        let (w, h) = self.measure(text, size_px);
        self.draw(canvas, text, cx - w / 2.0, cy - h / 2.0, size_px, color);
    }
}

/// Rasterizes a single line into a transparent premultiplied pixmap.
fn rasterize(font: &FontArc, text: &str, size_px: f32, color: Color) -> Option<Pixmap> {
    let scale = PxScale::from(size_px);
    let sf = font.as_scaled(scale);

    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let width = pen_x.ceil().max(1.0) as u32;
    let height = (sf.ascent() - sf.descent()).ceil().max(1.0) as u32;
    let mut pm = Pixmap::new(width, height)?;
    let stride = width as usize;
    let dst = pm.pixels_mut();

    let c = color.to_color_u8();
    for g in glyphs {
        let Some(outline) = font.outline_glyph(g) else {
            continue;
        };
        let b = outline.px_bounds();
        outline.draw(|x, y, cov| {
            let ix = x as i32 + b.min.x as i32;
            let iy = y as i32 + b.min.y as i32;
            if ix < 0 || iy < 0 || ix >= width as i32 || iy >= height as i32 || cov <= 0.0 {
                return;
            }
            let i = iy as usize * stride + ix as usize;
            let a = (cov.min(1.0) * c.alpha() as f32 / 255.0).clamp(0.0, 1.0);
            let premul = |v: u8| (v as f32 * a) as u8;
            let src_a = (a * 255.0) as u8;
            // glyph boxes may overlap; keep the stronger coverage
            if src_a > dst[i].alpha() {
                if let Some(px) = PremultipliedColorU8::from_rgba(
                    premul(c.red()),
                    premul(c.green()),
                    premul(c.blue()),
                    src_a,
                ) {
                    dst[i] = px;
                }
            }
        });
    }
    Some(pm)
}
