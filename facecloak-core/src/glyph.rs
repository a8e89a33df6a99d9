//! Emoji glyph rasterization.
//!
//! Glyphs are drawn through resvg as an SVG `<text>` element so whatever emoji font the
//! system (or the configured font files) provides is used. The rendered canvas is cropped
//! to the glyph's visible extent before it is fitted into a face box.

use std::{fmt, path::PathBuf, sync::Arc};

use image::{Rgba, RgbaImage, imageops, imageops::FilterType};
use imageproc::drawing::draw_filled_circle_mut;
use log::{debug, warn};
use resvg::{tiny_skia, usvg};

use crate::error::{MaskError, Result};

const EMOJI_FONT_FAMILIES: &str =
    "Noto Color Emoji, Apple Color Emoji, Segoe UI Emoji, Twemoji Mozilla, EmojiOne Color, sans-serif";

const LABEL_FONT_FAMILIES: &str = "DejaVu Sans, Arial, Helvetica, sans-serif";

const PLACEHOLDER_COLOR: Rgba<u8> = Rgba([255, 204, 77, 255]);

/// Turns a glyph string into an RGBA raster on a square canvas.
pub trait GlyphRenderer: Send + Sync + fmt::Debug {
    /// Render `glyph` onto a `size` x `size` canvas with straight (non-premultiplied) alpha.
    fn render(&self, glyph: &str, size: u32) -> Result<RgbaImage>;

    /// Render a short text label on a canvas `height` pixels tall.
    fn render_label(&self, text: &str, height: u32) -> Result<RgbaImage> {
        self.render(text, height)
    }
}

/// resvg-backed renderer using system fonts plus any extra font files.
#[derive(Clone)]
pub struct ResvgGlyphRenderer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl fmt::Debug for ResvgGlyphRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResvgGlyphRenderer")
            .field("faces", &self.fontdb.len())
            .finish()
    }
}

impl ResvgGlyphRenderer {
    /// Load system fonts, then every file in `font_paths`. Unreadable files are skipped.
    pub fn new(font_paths: &[PathBuf]) -> Self {
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        for path in font_paths {
            if let Err(err) = fontdb.load_font_file(path) {
                warn!("Skipping font {}: {err}", path.display());
            }
        }
        debug!("Glyph renderer loaded {} font face(s)", fontdb.len());
        Self {
            fontdb: Arc::new(fontdb),
        }
    }
}

impl GlyphRenderer for ResvgGlyphRenderer {
    fn render(&self, glyph: &str, size: u32) -> Result<RgbaImage> {
        self.rasterize(&glyph_svg(glyph, size), size, size)
    }

    fn render_label(&self, text: &str, height: u32) -> Result<RgbaImage> {
        let width = height.saturating_mul(text.chars().count().max(1) as u32);
        self.rasterize(&label_svg(text, width, height), width, height)
    }
}

impl ResvgGlyphRenderer {
    fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<RgbaImage> {
        let options = usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(svg, &options)
            .map_err(|e| MaskError::Glyph(format!("failed to build glyph document: {e}")))?;

        let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
            MaskError::Glyph(format!("invalid glyph canvas size {width}x{height}"))
        })?;
        resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

        let data = pixmap
            .pixels()
            .iter()
            .flat_map(|pixel| {
                let color = pixel.demultiply();
                [color.red(), color.green(), color.blue(), color.alpha()]
            })
            .collect();
        RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| MaskError::Glyph("glyph raster has unexpected length".into()))
    }
}

fn glyph_svg(glyph: &str, size: u32) -> String {
    text_svg(glyph, size, size, EMOJI_FONT_FAMILIES, "black")
}

fn label_svg(text: &str, width: u32, height: u32) -> String {
    text_svg(text, width, height, LABEL_FONT_FAMILIES, "white")
}

fn text_svg(text: &str, width: u32, height: u32, families: &str, fill: &str) -> String {
    let font_size = height as f32 * 0.8;
    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#,
            r#"<text x="{cx}" y="{cy}" font-size="{font_size}" font-family="{families}" fill="{fill}" "#,
            r#"text-anchor="middle" dominant-baseline="central">{text}</text></svg>"#
        ),
        width = width,
        height = height,
        cx = width as f32 / 2.0,
        cy = height as f32 / 2.0,
        font_size = font_size,
        families = families,
        fill = fill,
        text = escape_xml(text),
    )
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// A rendered glyph cropped to its visible pixels, ready to be fitted into face boxes.
#[derive(Debug, Clone)]
pub struct GlyphSprite {
    image: RgbaImage,
}

impl GlyphSprite {
    /// Render `glyph` at `resolution`. A render with no visible pixels falls back to an
    /// opaque placeholder disc.
    pub fn prepare(renderer: &dyn GlyphRenderer, glyph: &str, resolution: u32) -> Result<Self> {
        let resolution = resolution.max(1);
        let raster = renderer.render(glyph, resolution)?;
        let image = match crop_to_visible(&raster) {
            Some(image) => image,
            None => {
                warn!("Glyph {glyph:?} rendered blank; no installed font covers it, using a placeholder");
                placeholder_disc(resolution)
            }
        };
        Ok(Self { image })
    }

    /// Render a text label; `None` when no installed font draws any of it.
    pub fn label(renderer: &dyn GlyphRenderer, text: &str, height: u32) -> Result<Option<Self>> {
        let raster = renderer.render_label(text, height.max(1))?;
        Ok(crop_to_visible(&raster).map(|image| Self { image }))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Scale the sprite to the largest size that fits `width` x `height` without distortion.
    pub fn fit(&self, width: u32, height: u32) -> RgbaImage {
        let (src_w, src_h) = self.image.dimensions();
        let scale = (width as f32 / src_w as f32).min(height as f32 / src_h as f32);
        let fit_w = ((src_w as f32 * scale).round() as u32).clamp(1, width.max(1));
        let fit_h = ((src_h as f32 * scale).round() as u32).clamp(1, height.max(1));
        if (fit_w, fit_h) == (src_w, src_h) {
            return self.image.clone();
        }
        imageops::resize(&self.image, fit_w, fit_h, FilterType::Lanczos3)
    }
}

/// Crop to the bounding rectangle of pixels with non-zero alpha; `None` if there are none.
fn crop_to_visible(image: &RgbaImage) -> Option<RgbaImage> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    let (x0, y0, x1, y1) = bounds?;
    Some(imageops::crop_imm(image, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image())
}

fn placeholder_disc(size: u32) -> RgbaImage {
    let mut image = RgbaImage::new(size, size);
    let center = (size / 2) as i32;
    let radius = (size / 2).saturating_sub(1).max(1) as i32;
    draw_filled_circle_mut(&mut image, (center, center), radius, PLACEHOLDER_COLOR);
    image
}
