//! Selective masking of face regions.
//!
//! The compositor only writes inside the boxes of selected faces. Everything else in the
//! output, including the inside of unselected boxes that no selected box overlaps, is
//! bit-identical to the input when both are viewed as RGBA8.

use std::sync::Arc;

use image::{DynamicImage, GenericImageView, Rgba, RgbaImage, imageops};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut},
    rect::Rect,
};
use log::debug;

use facecloak_utils::{
    config::{MaskMode, MaskSettings},
    timing_guard,
};

use crate::error::{MaskError, Result};
use crate::face::{DetectionPass, Face, FaceBox};
use crate::glyph::{GlyphRenderer, GlyphSprite};
use crate::selection::Selection;

/// Raster height labels are rendered at before being scaled into a box.
const LABEL_RESOLUTION: u32 = 64;
const MAX_LABEL_HEIGHT: u32 = 24;

/// The transform applied uniformly to every selected face in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskConfig {
    pub mode: MaskMode,
    pub emoji: String,
}

impl MaskConfig {
    pub fn blur() -> Self {
        Self {
            mode: MaskMode::Blur,
            ..Self::default()
        }
    }

    pub fn emoji(glyph: impl Into<String>) -> Self {
        Self {
            mode: MaskMode::Emoji,
            emoji: glyph.into(),
        }
    }
}

impl Default for MaskConfig {
    fn default() -> Self {
        (&MaskSettings::default()).into()
    }
}

impl From<&MaskSettings> for MaskConfig {
    fn from(settings: &MaskSettings) -> Self {
        Self {
            mode: settings.mode,
            emoji: settings.emoji.clone(),
        }
    }
}

/// Numeric compositing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositorSettings {
    /// Blur sigma as a fraction of the box's shorter side.
    pub blur_strength: f32,
    pub min_blur_sigma: f32,
    pub glyph_resolution: u32,
    pub outline_color: Rgba<u8>,
    pub outline_thickness: u32,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        (&MaskSettings::default()).into()
    }
}

impl From<&MaskSettings> for CompositorSettings {
    fn from(settings: &MaskSettings) -> Self {
        Self {
            blur_strength: settings.blur_strength.max(0.0),
            min_blur_sigma: settings.min_blur_sigma.max(0.1),
            glyph_resolution: settings.glyph_resolution.max(16),
            outline_color: Rgba(settings.outline_color),
            outline_thickness: settings.outline_thickness,
        }
    }
}

/// Applies blur or emoji masks to the selected faces of an image.
#[derive(Debug, Clone)]
pub struct Compositor {
    settings: CompositorSettings,
    renderer: Arc<dyn GlyphRenderer>,
}

impl Compositor {
    pub fn new(settings: CompositorSettings, renderer: Arc<dyn GlyphRenderer>) -> Self {
        Self { settings, renderer }
    }

    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    /// Blur sigma for a face box: proportional to its shorter side, never below the floor.
    pub fn blur_sigma(&self, bbox: &FaceBox) -> f32 {
        (bbox.shorter_side() as f32 * self.settings.blur_strength).max(self.settings.min_blur_sigma)
    }

    /// Mask every selected face of `pass` in `image`.
    ///
    /// With `annotate` set, an outline and a `#id` label are drawn just inside each selected
    /// box after masking.
    /// The result has the input's dimensions and color kind (alpha kept only if present).
    pub fn composite(
        &self,
        image: &DynamicImage,
        pass: &DetectionPass,
        selection: &Selection,
        mask: &MaskConfig,
        annotate: bool,
    ) -> Result<DynamicImage> {
        let _guard = timing_guard("facecloak_core::composite", log::Level::Debug);
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(MaskError::InvalidImage(format!(
                "image dimensions must be greater than zero (got {width}x{height})"
            )));
        }
        if pass.image_size() != (width, height) {
            return Err(MaskError::StaleSession(format!(
                "faces were detected on a {}x{} image but this image is {width}x{height}",
                pass.image_size().0,
                pass.image_size().1
            )));
        }
        selection.ensure_pass(pass)?;
        if let Some(&id) = selection.state().keys().find(|id| !pass.contains(**id)) {
            return Err(MaskError::UnknownFace(id));
        }

        let selected: Vec<&Face> = pass
            .faces()
            .iter()
            .filter(|face| selection.is_selected(face.id()) == Some(true))
            .collect();

        if selected.is_empty() {
            return Ok(image.clone());
        }

        let source = image.to_rgba8();
        let mut canvas = source.clone();
        match mask.mode {
            MaskMode::Blur => {
                for face in &selected {
                    self.blur_face(&source, &mut canvas, &face.bbox());
                }
            }
            MaskMode::Emoji => {
                let sprite = GlyphSprite::prepare(
                    self.renderer.as_ref(),
                    &mask.emoji,
                    self.settings.glyph_resolution,
                )?;
                for face in &selected {
                    overlay_sprite(&mut canvas, &sprite, &face.bbox());
                }
            }
        }
        debug!(
            "Masked {} of {} face(s) with {}",
            selected.len(),
            pass.len(),
            mask.mode
        );

        if annotate {
            for face in &selected {
                self.outline(&mut canvas, &face.bbox());
                self.label(&mut canvas, face)?;
            }
        }

        Ok(if image.color().has_alpha() {
            DynamicImage::ImageRgba8(canvas)
        } else {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
        })
    }

    fn blur_face(&self, source: &RgbaImage, canvas: &mut RgbaImage, bbox: &FaceBox) {
        let sigma = self.blur_sigma(bbox);
        let region =
            imageops::crop_imm(source, bbox.x1, bbox.y1, bbox.width(), bbox.height()).to_image();
        let blurred = imageops::blur(&region, sigma);
        imageops::replace(canvas, &blurred, i64::from(bbox.x1), i64::from(bbox.y1));
    }

    /// Hollow rectangle `outline_thickness` pixels wide, drawn inside the box.
    fn outline(&self, canvas: &mut RgbaImage, bbox: &FaceBox) {
        for inset in 0..self.settings.outline_thickness {
            let (Some(w), Some(h)) = (
                bbox.width().checked_sub(inset * 2).filter(|w| *w > 0),
                bbox.height().checked_sub(inset * 2).filter(|h| *h > 0),
            ) else {
                break;
            };
            let rect = Rect::at((bbox.x1 + inset) as i32, (bbox.y1 + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(canvas, rect, self.settings.outline_color);
        }
    }

    /// `#id` in the top-left corner of the box, inside the outline, on an outline-colored plate.
    fn label(&self, canvas: &mut RgbaImage, face: &Face) -> Result<()> {
        let bbox = face.bbox();
        let inset = self.settings.outline_thickness;
        let inner_w = bbox.width().saturating_sub(inset * 2);
        let inner_h = bbox.height().saturating_sub(inset * 2);
        if inner_w == 0 || inner_h == 0 {
            return Ok(());
        }
        let text = format!("#{}", face.id());
        let Some(sprite) = GlyphSprite::label(self.renderer.as_ref(), &text, LABEL_RESOLUTION)?
        else {
            debug!("No font draws label {text}; skipping it");
            return Ok(());
        };
        let patch = sprite.fit(inner_w, (inner_h / 4).clamp(1, MAX_LABEL_HEIGHT));
        let (x, y) = (bbox.x1 + inset, bbox.y1 + inset);
        let plate = Rect::at(x as i32, y as i32).of_size(patch.width(), patch.height());
        draw_filled_rect_mut(canvas, plate, self.settings.outline_color);
        blend_patch(canvas, &patch, x, y);
        Ok(())
    }
}

/// Fit the sprite into the box and centre it.
fn overlay_sprite(canvas: &mut RgbaImage, sprite: &GlyphSprite, bbox: &FaceBox) {
    let patch = sprite.fit(bbox.width(), bbox.height());
    let (patch_w, patch_h) = patch.dimensions();
    let origin_x = bbox.x1 + (bbox.width() - patch_w) / 2;
    let origin_y = bbox.y1 + (bbox.height() - patch_h) / 2;
    blend_patch(canvas, &patch, origin_x, origin_y);
}

/// Straight-alpha "over" of `patch` onto the canvas at (`origin_x`, `origin_y`).
fn blend_patch(canvas: &mut RgbaImage, patch: &RgbaImage, origin_x: u32, origin_y: u32) {
    for (px, py, src) in patch.enumerate_pixels() {
        let alpha = u32::from(src[3]);
        if alpha == 0 {
            continue;
        }
        let dst = canvas.get_pixel_mut(origin_x + px, origin_y + py);
        if alpha == 255 {
            *dst = *src;
            continue;
        }
        let inv = 255 - alpha;
        for channel in 0..3 {
            let blended = u32::from(src[channel]) * alpha + u32::from(dst[channel]) * inv;
            dst[channel] = ((blended + 127) / 255) as u8;
        }
        dst[3] = (alpha + (u32::from(dst[3]) * inv + 127) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::FaceCandidate;
    use crate::selection::Tool;
    use facecloak_utils::{checkerboard, gradient};

    /// Opaque red square covering the centre half of the canvas.
    #[derive(Debug)]
    struct RedSquare;

    impl GlyphRenderer for RedSquare {
        fn render(&self, _glyph: &str, size: u32) -> Result<RgbaImage> {
            let quarter = size / 4;
            Ok(RgbaImage::from_fn(size, size, |x, y| {
                let inside = (quarter..size - quarter).contains(&x)
                    && (quarter..size - quarter).contains(&y);
                if inside {
                    Rgba([255, 0, 0, 255])
                } else {
                    Rgba([0, 0, 0, 0])
                }
            }))
        }
    }

    fn compositor() -> Compositor {
        Compositor::new(CompositorSettings::default(), Arc::new(RedSquare))
    }

    fn two_faces(size: (u32, u32)) -> DetectionPass {
        DetectionPass::from_candidates(
            size,
            vec![
                FaceCandidate {
                    bbox: FaceBox::new(10, 10, 60, 70).unwrap(),
                    confidence: 0.9,
                },
                FaceCandidate {
                    bbox: FaceBox::new(80, 20, 110, 50).unwrap(),
                    confidence: 0.8,
                },
            ],
        )
    }

    fn inside(bbox: &FaceBox, x: u32, y: u32) -> bool {
        x >= bbox.x1 && x < bbox.x2 && y >= bbox.y1 && y < bbox.y2
    }

    #[test]
    fn empty_selection_is_identity() {
        let image = DynamicImage::ImageRgb8(checkerboard(128, 96, 4));
        let pass = two_faces((128, 96));
        let selection = Selection::new(&pass).select_none();
        for mask in [MaskConfig::blur(), MaskConfig::emoji("😊")] {
            let out = compositor()
                .composite(&image, &pass, &selection, &mask, true)
                .unwrap();
            assert_eq!(out.to_rgba8().as_raw(), image.to_rgba8().as_raw());
        }
    }

    #[test]
    fn blur_touches_only_selected_box() {
        let image = DynamicImage::ImageRgb8(checkerboard(128, 96, 3));
        let pass = two_faces((128, 96));
        let selection = Selection::new(&pass).toggle(1, Tool::Eraser).unwrap();
        let out = compositor()
            .composite(&image, &pass, &selection, &MaskConfig::blur(), false)
            .unwrap();

        assert_eq!(out.dimensions(), (128, 96));
        assert!(!out.color().has_alpha());
        let (src, dst) = (image.to_rgba8(), out.to_rgba8());
        let selected = pass.face(0).unwrap().bbox();
        let mut changed = 0;
        for (x, y, pixel) in dst.enumerate_pixels() {
            if inside(&selected, x, y) {
                changed += usize::from(pixel != src.get_pixel(x, y));
            } else {
                assert_eq!(pixel, src.get_pixel(x, y), "pixel ({x}, {y}) changed");
            }
        }
        assert!(changed > (selected.area() as usize) / 2);
    }

    #[test]
    fn blur_sigma_scales_with_face_size() {
        let compositor = compositor();
        let small = FaceBox::new(0, 0, 4, 8).unwrap();
        let large = FaceBox::new(0, 0, 200, 100).unwrap();
        assert_eq!(compositor.blur_sigma(&small), 2.0);
        assert!((compositor.blur_sigma(&large) - 15.0).abs() < 1e-4);
    }

    #[test]
    fn emoji_is_centred_and_aspect_preserved() {
        let image = DynamicImage::ImageRgb8(gradient(128, 96));
        let pass = two_faces((128, 96));
        let selection = Selection::from_ids(&pass, [0]).unwrap();
        let out = compositor()
            .composite(&image, &pass, &selection, &MaskConfig::emoji("😊"), false)
            .unwrap()
            .to_rgba8();
        let src = image.to_rgba8();

        // Face 0 is 50x60: the square sprite becomes 50x50, offset 5 rows down.
        let bbox = pass.face(0).unwrap().bbox();
        assert_eq!(bbox, FaceBox::new(10, 10, 60, 70).unwrap());
        assert_eq!(out.get_pixel(10, 15).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(59, 64).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(30, 12), src.get_pixel(30, 12));
        assert_eq!(out.get_pixel(30, 67), src.get_pixel(30, 67));
        assert_eq!(out.get_pixel(90, 30), src.get_pixel(90, 30));
    }

    #[test]
    fn annotation_stays_inside_selected_boxes() {
        let image = DynamicImage::ImageRgb8(gradient(128, 96));
        let pass = two_faces((128, 96));
        let selection = Selection::from_ids(&pass, [1]).unwrap();
        let compositor = compositor();
        let out = compositor
            .composite(&image, &pass, &selection, &MaskConfig::blur(), true)
            .unwrap()
            .to_rgba8();
        let src = image.to_rgba8();
        let bbox = pass.face(1).unwrap().bbox();
        let color = compositor.settings().outline_color;

        assert_eq!(*out.get_pixel(bbox.x1, bbox.y1), color);
        assert_eq!(*out.get_pixel(bbox.x1 + 2, bbox.y1 + 10), color);
        assert_ne!(*out.get_pixel(bbox.x1 + 3, bbox.y1 + 10), color);
        assert_eq!(out.get_pixel(bbox.x1 - 1, bbox.y1), src.get_pixel(bbox.x1 - 1, bbox.y1));
        assert_eq!(out.get_pixel(bbox.x2, bbox.y1), src.get_pixel(bbox.x2, bbox.y1));
    }

    /// Draws nothing for emoji and a wide opaque blue bar for labels, recording label text.
    #[derive(Debug, Default)]
    struct LabelBar {
        labels: std::sync::Mutex<Vec<String>>,
    }

    impl GlyphRenderer for LabelBar {
        fn render(&self, _glyph: &str, size: u32) -> Result<RgbaImage> {
            Ok(RgbaImage::new(size, size))
        }

        fn render_label(&self, text: &str, height: u32) -> Result<RgbaImage> {
            self.labels.lock().unwrap().push(text.to_string());
            Ok(RgbaImage::from_pixel(height * 3, height, Rgba([0, 0, 255, 255])))
        }
    }

    #[test]
    fn preview_labels_carry_face_id_and_stay_inside_the_box() {
        let renderer = Arc::new(LabelBar::default());
        let compositor = Compositor::new(CompositorSettings::default(), renderer.clone());
        let image = DynamicImage::ImageRgb8(gradient(128, 96));
        let pass = two_faces((128, 96));
        let selection = Selection::from_ids(&pass, [0]).unwrap();
        let out = compositor
            .composite(&image, &pass, &selection, &MaskConfig::blur(), true)
            .unwrap()
            .to_rgba8();
        let src = image.to_rgba8();

        assert_eq!(*renderer.labels.lock().unwrap(), vec!["#0".to_string()]);

        let bbox = pass.face(0).unwrap().bbox();
        let inset = compositor.settings().outline_thickness;
        let blue = |p: &Rgba<u8>| p.0 == [0, 0, 255, 255];
        let mut label_pixels = 0;
        for (x, y, pixel) in out.enumerate_pixels() {
            if !inside(&bbox, x, y) {
                assert_eq!(pixel, src.get_pixel(x, y), "pixel ({x}, {y}) changed");
            } else if blue(pixel) {
                label_pixels += 1;
                assert!(x >= bbox.x1 + inset && x < bbox.x2 - inset);
                assert!(y >= bbox.y1 + inset && y < bbox.y1 + inset + MAX_LABEL_HEIGHT);
            }
        }
        assert!(label_pixels > 0, "label should be visible");
        assert!(blue(out.get_pixel(bbox.x1 + inset + 5, bbox.y1 + inset + 5)));
    }

    #[test]
    fn final_output_has_no_labels() {
        let renderer = Arc::new(LabelBar::default());
        let compositor = Compositor::new(CompositorSettings::default(), renderer.clone());
        let image = DynamicImage::ImageRgb8(gradient(128, 96));
        let pass = two_faces((128, 96));
        compositor
            .composite(&image, &pass, &Selection::new(&pass), &MaskConfig::blur(), false)
            .unwrap();
        assert!(renderer.labels.lock().unwrap().is_empty());
    }

    #[test]
    fn alpha_channel_is_kept_when_present() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(128, 96, Rgba([1, 2, 3, 40])));
        let pass = two_faces((128, 96));
        let out = compositor()
            .composite(&image, &pass, &Selection::new(&pass), &MaskConfig::emoji("x"), false)
            .unwrap();
        assert!(out.color().has_alpha());
        assert_eq!(out.to_rgba8().get_pixel(0, 0).0, [1, 2, 3, 40]);
    }

    #[test]
    fn stale_inputs_are_rejected() {
        let image = DynamicImage::ImageRgb8(gradient(128, 96));
        let pass = two_faces((128, 96));
        let other = two_faces((128, 96));
        let err = compositor()
            .composite(&image, &pass, &Selection::new(&other), &MaskConfig::blur(), false)
            .unwrap_err();
        assert!(matches!(err, MaskError::StaleSession(_)));

        let resized = DynamicImage::ImageRgb8(gradient(64, 48));
        let err = compositor()
            .composite(&resized, &pass, &Selection::new(&pass), &MaskConfig::blur(), false)
            .unwrap_err();
        assert!(matches!(err, MaskError::StaleSession(_)));
    }
}
