use std::path::PathBuf;

use thiserror::Error;

use crate::face::FaceId;

/// Failures surfaced by detection, selection, and compositing.
#[derive(Debug, Error)]
pub enum MaskError {
    /// Input bytes are not a decodable raster image, or it has zero size.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A face id that is not part of the current detection pass.
    #[error("unknown face id {0}")]
    UnknownFace(FaceId),

    /// Selection or face records that belong to a different detection pass or image.
    #[error("stale session: {0}")]
    StaleSession(String),

    /// The detection model could not be loaded.
    #[error("model unavailable at {}: {reason}", path.display())]
    ModelUnavailable { path: PathBuf, reason: String },

    /// The model ran but produced something unusable.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The emoji glyph could not be rasterized.
    #[error("glyph rendering failed: {0}")]
    Glyph(String),

    /// The masked image could not be encoded.
    #[error("failed to encode output: {0}")]
    Encode(String),
}

impl MaskError {
    /// Build an `InvalidImage` error from an `anyhow` chain, keeping every cause.
    pub(crate) fn invalid_image(err: anyhow::Error) -> Self {
        MaskError::InvalidImage(format!("{err:#}"))
    }

    /// Short machine-readable kind, used for JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            MaskError::InvalidImage(_) => "invalid_image",
            MaskError::UnknownFace(_) => "unknown_face",
            MaskError::StaleSession(_) => "stale_session",
            MaskError::ModelUnavailable { .. } => "model_unavailable",
            MaskError::Inference(_) => "inference",
            MaskError::Glyph(_) => "glyph",
            MaskError::Encode(_) => "encode",
        }
    }
}

pub type Result<T, E = MaskError> = std::result::Result<T, E>;
