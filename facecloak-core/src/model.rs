use std::{fmt::Write, path::Path};

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::*;

use crate::error::MaskError;
use crate::preprocess::InputSize;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Anything that can turn a preprocessed `[1, 3, H, W]` tensor into raw detector output.
///
/// Implementations must be callable from several threads at once.
pub trait InferenceBackend: Send + Sync + std::fmt::Debug {
    /// Run one forward pass.
    fn run(&self, input: Tensor) -> Result<Tensor, MaskError>;

    /// Input resolution the backend expects.
    fn input_size(&self) -> InputSize;
}

/// YOLO-style face detector loaded from an ONNX file and executed with tract.
#[derive(Debug)]
pub struct OnnxModel {
    runnable: RunnableModel,
    input_size: InputSize,
}

impl OnnxModel {
    /// Load and optimize the ONNX graph for a fixed input size.
    ///
    /// Falls back to a decluttered (unoptimized) plan when optimization fails.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: InputSize) -> Result<Self, MaskError> {
        let path = model_path.as_ref();
        let unavailable = |reason: String| MaskError::ModelUnavailable {
            path: path.to_path_buf(),
            reason,
        };
        if !path.is_file() {
            return Err(unavailable("model file not found".into()));
        }

        let runnable = match load_runnable_model(path, input_size, true) {
            Ok(model) => {
                debug!(
                    "Face model {} optimized successfully ({}x{})",
                    path.display(),
                    input_size.width,
                    input_size.height
                );
                model
            }
            Err(opt_err) => {
                let optimize_msg = format!("{opt_err}");
                let mut chain_msg = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain_msg, "  - {cause}");
                }
                warn!(
                    "Face model {} failed optimized load ({}); falling back to decluttered graph.\nError chain:\n{}",
                    path.display(),
                    optimize_msg,
                    chain_msg.trim_end()
                );
                load_runnable_model(path, input_size, false)
                    .with_context(|| {
                        format!("decluttered graph also failed after optimize error: {optimize_msg}")
                    })
                    .map_err(|err| unavailable(format!("{err:#}")))?
            }
        };

        Ok(Self {
            runnable,
            input_size,
        })
    }
}

impl InferenceBackend for OnnxModel {
    /// The first output is returned; its layout is decoded by the postprocessor.
    fn run(&self, input: Tensor) -> Result<Tensor, MaskError> {
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| MaskError::Inference(format!("model execution failed: {e}")))?;

        outputs
            .into_iter()
            .next()
            .map(|value| value.into_tensor())
            .ok_or_else(|| MaskError::Inference("model produced no outputs".into()))
    }

    fn input_size(&self) -> InputSize {
        self.input_size
    }
}

fn load_runnable_model(path: &Path, input_size: InputSize, optimized: bool) -> Result<RunnableModel> {
    let shape = [1usize, 3, input_size.height as usize, input_size.width as usize];
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?
        .with_input_fact(0, f32::fact(shape).into())
        .map_err(|e| anyhow::anyhow!("unable to pin model input shape {shape:?}: {e}"))?;

    if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize face graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make face graph runnable: {e}"))
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check face graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter face graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make face graph runnable: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn loading_missing_model_is_unavailable() {
        let err = OnnxModel::load("missing.onnx", InputSize::default()).unwrap_err();
        assert!(matches!(err, MaskError::ModelUnavailable { .. }));
        assert_eq!(err.kind(), "model_unavailable");
    }

    #[test]
    fn invalid_model_produces_useful_error() {
        let mut temp = NamedTempFile::new().expect("temp file");
        temp.write_all(b"not a real onnx file")
            .expect("write mock model");

        let err = OnnxModel::load(temp.path(), InputSize::default())
            .expect_err("invalid ONNX should fail");
        let message = format!("{err}");
        assert!(
            message.contains("failed to parse ONNX"),
            "Unexpected error message: {message}"
        );
    }
}
