//! Preprocessing utilities for preparing images for detector inference.
//!
//! Images are letterboxed into the model's square input (aspect preserved, grey padding),
//! converted to normalized RGB in `[1, 3, H, W]` layout, and returned together with the
//! geometry needed to map detections back into the source image.

use anyhow::Result;
use image::{DynamicImage, imageops::FilterType};
use tract_onnx::prelude::Tensor;

use facecloak_utils::{
    Letterbox,
    config::{InputDimensions, ResizeQuality},
    letterbox_image, rgb_to_chw_normalized,
    telemetry::timing_guard,
};

/// Desired model input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::new(640, 640)
    }
}

/// Configuration for preprocessing an image before inference.
#[derive(Debug, Clone, Default)]
pub struct PreprocessConfig {
    pub input_size: InputSize,
    /// Resize filter preference controlling the quality vs speed trade-off.
    pub resize_quality: ResizeQuality,
}

impl PreprocessConfig {
    fn resize_filter(&self) -> FilterType {
        match self.resize_quality {
            ResizeQuality::Quality => FilterType::Triangle,
            ResizeQuality::Speed => FilterType::Nearest,
        }
    }
}

impl From<InputDimensions> for InputSize {
    fn from(dimensions: InputDimensions) -> Self {
        InputSize::new(dimensions.width, dimensions.height)
    }
}

impl From<&InputDimensions> for PreprocessConfig {
    fn from(dimensions: &InputDimensions) -> Self {
        PreprocessConfig {
            input_size: (*dimensions).into(),
            resize_quality: dimensions.resize_quality,
        }
    }
}

impl From<InputDimensions> for PreprocessConfig {
    fn from(dimensions: InputDimensions) -> Self {
        (&dimensions).into()
    }
}

/// Output of preprocessing: tensor plus the letterbox used to build it.
#[derive(Debug)]
pub struct PreprocessOutput {
    /// `[1, 3, H, W]` RGB tensor scaled to `[0, 1]`.
    pub tensor: Tensor,
    pub letterbox: Letterbox,
}

impl PreprocessOutput {
    pub fn original_size(&self) -> (u32, u32) {
        self.letterbox.original_size
    }
}

/// Abstraction over preprocessing backends.
pub trait Preprocessor: Send + Sync + std::fmt::Debug {
    /// Convert the provided image into a model-ready tensor.
    fn preprocess(&self, image: &DynamicImage, config: &PreprocessConfig)
    -> Result<PreprocessOutput>;
}

/// Default CPU implementation backed by `image` + ndarray utilities.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuPreprocessor;

impl Preprocessor for CpuPreprocessor {
    fn preprocess(
        &self,
        image: &DynamicImage,
        config: &PreprocessConfig,
    ) -> Result<PreprocessOutput> {
        let _guard = timing_guard("facecloak_core::preprocess", log::Level::Trace);
        let InputSize { width, height } = config.input_size;
        anyhow::ensure!(
            width > 0 && height > 0,
            "input dimensions must be greater than zero"
        );

        let (canvas, letterbox) = letterbox_image(image, (width, height), config.resize_filter())?;
        let chw = rgb_to_chw_normalized(&canvas);

        let shape = [1usize, 3, height as usize, width as usize];
        let (data, offset) = chw.into_raw_vec_and_offset();
        debug_assert_eq!(offset, Some(0), "expected contiguous array");
        let tensor = Tensor::from_shape(&shape, &data)
            .map_err(|e| anyhow::anyhow!("failed to build tensor: {e}"))?;

        Ok(PreprocessOutput { tensor, letterbox })
    }
}

/// Preprocess an in-memory image with the CPU backend.
pub fn preprocess_dynamic_image(
    image: &DynamicImage,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput> {
    CpuPreprocessor.preprocess(image, config)
}
