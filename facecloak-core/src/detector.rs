use std::{path::Path, sync::Arc};

use image::DynamicImage;
use log::{debug, info};

use facecloak_utils::{
    AppSettings, config::DEFAULT_MODEL_PATH, config::ResizeQuality, decode_image, timing_guard,
};

use crate::error::{MaskError, Result};
use crate::face::DetectionPass;
use crate::model::{InferenceBackend, OnnxModel};
use crate::postprocess::{PostprocessConfig, apply_postprocess};
use crate::preprocess::{CpuPreprocessor, PreprocessConfig, Preprocessor};

/// Couples a shared inference backend with preprocessing and postprocessing settings.
///
/// The backend is reference counted so one loaded model serves every caller; cloning a
/// detector is cheap.
#[derive(Debug, Clone)]
pub struct FaceDetector {
    backend: Arc<dyn InferenceBackend>,
    preprocess: PreprocessConfig,
    postprocess: PostprocessConfig,
}

impl FaceDetector {
    /// Build a detector around an already-loaded backend.
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        resize_quality: ResizeQuality,
        postprocess: PostprocessConfig,
    ) -> Self {
        let preprocess = PreprocessConfig {
            input_size: backend.input_size(),
            resize_quality,
        };
        Self {
            backend,
            preprocess,
            postprocess,
        }
    }

    /// Load the ONNX model named in `settings` and build a detector from it.
    pub fn from_settings(settings: &AppSettings) -> Result<Self> {
        let model_path = settings
            .model_path
            .as_deref()
            .unwrap_or(DEFAULT_MODEL_PATH);
        let detector = Self::load(model_path, settings)?;
        Ok(detector)
    }

    /// Load a model from an explicit path, taking the remaining parameters from `settings`.
    pub fn load<P: AsRef<Path>>(model_path: P, settings: &AppSettings) -> Result<Self> {
        let path = model_path.as_ref();
        let _guard = timing_guard("facecloak_core::load_model", log::Level::Debug);
        let model = OnnxModel::load(path, settings.input.into())?;
        info!(
            "Loaded face model {} ({}x{})",
            path.display(),
            settings.input.width,
            settings.input.height
        );
        Ok(Self::new(
            Arc::new(model),
            settings.input.resize_quality,
            (&settings.detection).into(),
        ))
    }

    /// Decode `bytes` and detect faces in them.
    pub fn detect(&self, bytes: &[u8]) -> Result<DetectionPass> {
        let image = {
            let _guard = timing_guard("facecloak_core::decode", log::Level::Debug);
            decode_image(bytes).map_err(MaskError::invalid_image)?
        };
        self.detect_image(&image)
    }

    /// Detect faces in an already-decoded image.
    ///
    /// Zero faces is a successful pass with an empty face list.
    pub fn detect_image(&self, image: &DynamicImage) -> Result<DetectionPass> {
        let _guard = timing_guard("facecloak_core::detect_image", log::Level::Debug);
        let prep = CpuPreprocessor
            .preprocess(image, &self.preprocess)
            .map_err(MaskError::invalid_image)?;
        let letterbox = prep.letterbox;
        debug!(
            "Letterbox {:?} -> {:?}: scale {:.4}, pad ({}, {})",
            letterbox.original_size,
            letterbox.target_size,
            letterbox.scale,
            letterbox.pad_x,
            letterbox.pad_y
        );

        let raw = {
            let _guard = timing_guard("facecloak_core::inference", log::Level::Debug);
            self.backend.run(prep.tensor)?
        };

        let candidates = {
            let _guard = timing_guard("facecloak_core::postprocess", log::Level::Debug);
            apply_postprocess(&raw, &letterbox, &self.postprocess)
                .map_err(|err| MaskError::Inference(format!("{err:#}")))?
        };
        debug!("{} face candidate(s) survived postprocessing", candidates.len());

        Ok(DetectionPass::from_candidates(
            letterbox.original_size,
            candidates,
        ))
    }
}
