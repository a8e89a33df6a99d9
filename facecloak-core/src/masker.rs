//! Request-level operations: detect, preview, execute, and mask-all.
//!
//! Every call is self-contained. It takes image bytes plus whatever state the caller holds
//! (a detection pass, a selection, face records) and returns fresh values; nothing is kept
//! between calls except the shared model and glyph fonts.

use std::sync::Arc;

use image::{DynamicImage, GenericImageView, ImageFormat};

use facecloak_utils::{
    AppSettings, ImageFormatHint, OutputOptions, decode_image, encode_image, timing_guard,
};

use crate::compositor::{Compositor, CompositorSettings, MaskConfig};
use crate::detector::FaceDetector;
use crate::error::{MaskError, Result};
use crate::face::{DetectionPass, FaceId, FaceRecord};
use crate::glyph::{GlyphRenderer, ResvgGlyphRenderer};
use crate::selection::Selection;

/// An encoded output image together with the faces it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormatHint,
    pub width: u32,
    pub height: u32,
    /// Every face known for the image, in canonical order.
    pub faces: Vec<FaceRecord>,
    /// Ids that were masked, ascending.
    pub masked: Vec<FaceId>,
}

/// Facade tying a detector, a compositor, and output encoding together.
#[derive(Debug, Clone)]
pub struct FaceMasker {
    detector: Option<FaceDetector>,
    compositor: Compositor,
    output: OutputOptions,
}

impl FaceMasker {
    pub fn new(detector: FaceDetector, compositor: Compositor, output: OutputOptions) -> Self {
        Self {
            detector: Some(detector),
            compositor,
            output,
        }
    }

    /// A masker that can only composite faces the caller already has.
    pub fn without_detector(compositor: Compositor, output: OutputOptions) -> Self {
        Self {
            detector: None,
            compositor,
            output,
        }
    }

    /// Load the model and fonts named in `settings`.
    pub fn from_settings(settings: &AppSettings) -> Result<Self> {
        let detector = FaceDetector::from_settings(settings)?;
        Ok(Self::new(
            detector,
            compositor_from_settings(settings),
            (&settings.output).into(),
        ))
    }

    /// Build a masker that needs no model (for `execute_records`).
    pub fn offline_from_settings(settings: &AppSettings) -> Self {
        Self::without_detector(compositor_from_settings(settings), (&settings.output).into())
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    fn detector(&self) -> Result<&FaceDetector> {
        self.detector.as_ref().ok_or_else(|| MaskError::ModelUnavailable {
            path: Default::default(),
            reason: "no face detector was loaded".into(),
        })
    }

    /// Ordered face list for an image.
    pub fn detect(&self, bytes: &[u8]) -> Result<DetectionPass> {
        self.detector()?.detect(bytes)
    }

    /// Re-detect and render an annotated preview with exactly `selected` masked.
    pub fn preview(&self, bytes: &[u8], selected: &[FaceId], mask: &MaskConfig) -> Result<MaskedImage> {
        let (image, format) = decode(bytes)?;
        let pass = self.detector()?.detect_image(&image)?;
        let selection = Selection::from_ids(&pass, selected.iter().copied())?;
        self.render(&image, format, &pass, &selection, mask, true)
    }

    /// Final output for a pass and selection the caller has been holding.
    pub fn execute(
        &self,
        bytes: &[u8],
        pass: &DetectionPass,
        selection: &Selection,
        mask: &MaskConfig,
    ) -> Result<MaskedImage> {
        let (image, format) = decode(bytes)?;
        self.render(&image, format, pass, selection, mask, false)
    }

    /// Final output masking every face in `records`, which came back from a client.
    pub fn execute_records(
        &self,
        bytes: &[u8],
        records: &[FaceRecord],
        mask: &MaskConfig,
    ) -> Result<MaskedImage> {
        let (image, format) = decode(bytes)?;
        let pass = DetectionPass::from_records(image.dimensions(), records)?;
        let selection = Selection::new(&pass);
        self.render(&image, format, &pass, &selection, mask, false)
    }

    /// Detect, select everything, and produce the final output.
    pub fn mask_all(&self, bytes: &[u8], mask: &MaskConfig) -> Result<MaskedImage> {
        let (image, format) = decode(bytes)?;
        let pass = self.detector()?.detect_image(&image)?;
        let selection = Selection::new(&pass);
        self.render(&image, format, &pass, &selection, mask, false)
    }

    fn render(
        &self,
        image: &DynamicImage,
        source_format: Option<ImageFormat>,
        pass: &DetectionPass,
        selection: &Selection,
        mask: &MaskConfig,
        annotate: bool,
    ) -> Result<MaskedImage> {
        let output = self
            .compositor
            .composite(image, pass, selection, mask, annotate)?;
        let format = self.output.resolve(source_format);
        let bytes = {
            let _guard = timing_guard("facecloak_core::encode", log::Level::Debug);
            encode_image(&output, format, &self.output)
                .map_err(|err| MaskError::Encode(format!("{err:#}")))?
        };
        let (width, height) = output.dimensions();
        Ok(MaskedImage {
            bytes,
            format,
            width,
            height,
            faces: pass.records(),
            masked: selection.selected_ids(),
        })
    }
}

fn compositor_from_settings(settings: &AppSettings) -> Compositor {
    let renderer: Arc<dyn GlyphRenderer> =
        Arc::new(ResvgGlyphRenderer::new(&settings.mask.font_paths));
    Compositor::new(CompositorSettings::from(&settings.mask), renderer)
}

/// Decode bytes, remembering the container format so the output can match it.
fn decode(bytes: &[u8]) -> Result<(DynamicImage, Option<ImageFormat>)> {
    let _guard = timing_guard("facecloak_core::decode", log::Level::Debug);
    let image = decode_image(bytes).map_err(MaskError::invalid_image)?;
    Ok((image, image::guess_format(bytes).ok()))
}
