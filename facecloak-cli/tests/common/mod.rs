/// Common test utilities and macros for CLI integration tests
use std::{
    fs,
    path::{Path, PathBuf},
};

use facecloak_utils::checkerboard;
use serde_json::{Value, json};

#[allow(dead_code)]
pub fn find_model_path() -> Option<PathBuf> {
    let candidates = vec!["models/yolov8n-face.onnx", "../models/yolov8n-face.onnx"];
    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .and_then(|p| p.canonicalize().ok())
}

/// Write a 64x48 checkerboard PNG and return its path.
pub fn write_checkerboard(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    checkerboard(64, 48, 4).save(&path).expect("save checkerboard");
    path
}

/// Face record JSON for a box, with a consistent area.
pub fn face_record(id: u32, (x1, y1, x2, y2): (u32, u32, u32, u32)) -> Value {
    json!({
        "id": id,
        "x1": x1,
        "y1": y1,
        "x2": x2,
        "y2": y2,
        "confidence": 0.9,
        "area": u64::from(x2 - x1) * u64::from(y2 - y1),
    })
}

/// Write a single-image faces file in the shape `detect` produces.
pub fn write_faces_file(dir: &Path, image: &Path, size: (u32, u32), faces: Vec<Value>) -> PathBuf {
    let path = dir.join("faces.json");
    let payload = json!([{
        "image": image.display().to_string(),
        "width": size.0,
        "height": size.1,
        "faces": faces,
    }]);
    fs::write(&path, serde_json::to_string_pretty(&payload).expect("serialize faces"))
        .expect("write faces file");
    path
}

/// Macro to skip a test when the face model is not available.
///
/// # Usage
///
/// ```ignore
/// let model = require_model!();
/// ```
#[macro_export]
macro_rules! require_model {
    () => {{
        match $crate::common::find_model_path() {
            Some(p) => p,
            None => {
                eprintln!("Skipping test: model not found");
                return;
            }
        }
    }};
}

/// Macro to assert CLI success and print stderr on failure.
///
/// # Usage
///
/// ```ignore
/// assert_cli_success!(output, "mask should succeed");
/// ```
#[macro_export]
macro_rules! assert_cli_success {
    ($output:expr, $msg:literal) => {{
        if !$output.status.success() {
            eprintln!("CLI stderr: {}", String::from_utf8_lossy(&$output.stderr));
        }
        assert!($output.status.success(), $msg);
    }};
}

/// Assert the process failed and its stderr mentions `needle`.
#[allow(dead_code)]
pub fn assert_failure_mentions(output: &std::process::Output, needle: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !output.status.success(),
        "expected failure, stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
    assert!(
        stderr.contains(needle),
        "stderr should mention '{needle}', got: {stderr}"
    );
}
