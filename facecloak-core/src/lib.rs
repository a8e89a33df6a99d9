//! Face detection and selective masking.
//!
//! This crate runs a YOLO-style face detector with `tract-onnx`, gives the detected faces
//! stable ids, tracks which of them the user wants hidden, and masks exactly those faces
//! with a blur or an emoji overlay.

/// Unattended masking across many images.
pub mod batch;
/// Blur and emoji compositing restricted to selected faces.
pub mod compositor;
/// High-level face detection runner.
pub mod detector;
/// Error type shared by every operation.
pub mod error;
/// Face ids, boxes, and canonical ordering.
pub mod face;
/// Emoji glyph rasterization.
pub mod glyph;
/// Request-level facade over detection and compositing.
pub mod masker;
/// ONNX model loading and execution.
pub mod model;
/// Detection post-processing (score filtering, NMS, coordinate mapping).
pub mod postprocess;
/// Image pre-processing (letterboxing, tensor conversion).
pub mod preprocess;
/// Per-pass selection state and hit testing.
pub mod selection;

pub use batch::{
    BatchItem, BatchItemFailure, BatchOptions, BatchOutcome, BatchProgress, BatchReport,
    BatchSource, BatchStatus, ProgressFn, process_batch,
};
pub use compositor::{Compositor, CompositorSettings, MaskConfig};
pub use detector::FaceDetector;
pub use error::{MaskError, Result};
pub use face::{
    DetectionPass, Face, FaceBox, FaceCandidate, FaceId, FaceRecord, PassId, describe_faces,
};
pub use glyph::{GlyphRenderer, GlyphSprite, ResvgGlyphRenderer};
pub use masker::{FaceMasker, MaskedImage};
pub use model::{InferenceBackend, OnnxModel};
pub use postprocess::{BoundingBox, Detection, PostprocessConfig, apply_postprocess};
pub use preprocess::{
    CpuPreprocessor, InputSize, PreprocessConfig, PreprocessOutput, Preprocessor,
    preprocess_dynamic_image,
};
pub use selection::{Selection, SelectionEvent, Tool, Viewport, hit_test, replay};

/// Re-exported so backends can be implemented without a direct tract dependency.
pub use tract_onnx::prelude::Tensor;

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
