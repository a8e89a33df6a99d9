use anyhow::Result;
use std::cmp::Ordering;
use tract_onnx::prelude::{
    Tensor,
    tract_ndarray::{ArrayView2, Axis},
};

use facecloak_utils::{Letterbox, config::DetectionSettings};

use crate::face::{FaceBox, FaceCandidate};

/// Detection filtering parameters.
#[derive(Debug, Clone)]
pub struct PostprocessConfig {
    /// Minimum confidence score for a detection to be considered valid.
    pub score_threshold: f32,
    /// Overlap above which the lower-scoring of two boxes is suppressed.
    pub nms_threshold: f32,
    /// The maximum number of detections kept after sorting by score (0 keeps all).
    pub top_k: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        (&DetectionSettings::default()).into()
    }
}

impl From<&DetectionSettings> for PostprocessConfig {
    fn from(settings: &DetectionSettings) -> Self {
        PostprocessConfig {
            score_threshold: settings.score_threshold,
            nms_threshold: settings.nms_threshold,
            top_k: settings.top_k,
        }
    }
}

impl From<DetectionSettings> for PostprocessConfig {
    fn from(settings: DetectionSettings) -> Self {
        (&settings).into()
    }
}

/// Axis-aligned bounding box with float corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Calculates the Intersection over Union (IoU) with another bounding box.
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if intersection <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Undo the letterbox and clamp into the original image.
    fn to_original(self, letterbox: &Letterbox) -> Self {
        let (width, height) = letterbox.original_size;
        let (x1, y1) = letterbox.to_original(self.x1, self.y1);
        let (x2, y2) = letterbox.to_original(self.x2, self.y2);
        Self {
            x1: x1.clamp(0.0, width as f32),
            y1: y1.clamp(0.0, height as f32),
            x2: x2.clamp(0.0, width as f32),
            y2: y2.clamp(0.0, height as f32),
        }
    }

    /// Truncate to integer pixels; `None` when the box collapses.
    fn to_face_box(self) -> Option<FaceBox> {
        FaceBox::new(self.x1 as u32, self.y1 as u32, self.x2 as u32, self.y2 as u32)
    }
}

/// A raw model detection in model-input space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Decode raw detector output into face candidates in original-image pixels.
///
/// Candidates come back in descending score order, which is the detection order the
/// face registry uses to break area ties.
pub fn apply_postprocess(
    output: &Tensor,
    letterbox: &Letterbox,
    config: &PostprocessConfig,
) -> Result<Vec<FaceCandidate>> {
    let mut detections: Vec<Detection> = decode_detections(output)?
        .into_iter()
        .filter(|det| det.score.is_finite() && det.score >= config.score_threshold)
        .collect();

    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    if config.top_k > 0 && detections.len() > config.top_k {
        detections.truncate(config.top_k);
    }

    let mapped: Vec<Detection> = detections
        .into_iter()
        .map(|det| Detection {
            bbox: det.bbox.to_original(letterbox),
            score: det.score,
        })
        .filter(|det| det.bbox.width() > 0.0 && det.bbox.height() > 0.0)
        .collect();

    let kept = if config.nms_threshold > 0.0 && mapped.len() > 1 {
        non_max_suppression(mapped, config.nms_threshold)
    } else {
        mapped
    };

    Ok(kept
        .into_iter()
        .filter_map(|det| {
            det.bbox.to_face_box().map(|bbox| FaceCandidate {
                bbox,
                confidence: det.score.clamp(0.0, 1.0),
            })
        })
        .collect())
}

/// Read detections out of any of the supported output layouts.
///
/// * `[1, C, N]` / `[C, N]` with `5 <= C < N`: channel-first `cx, cy, w, h, score`, any
///   further channels (keypoints) ignored.
/// * `[1, N, 6]` / `[N, 6]`: end-to-end `x1, y1, x2, y2, score, class`.
/// * `[1, N, C]` / `[N, C]` with `C >= 5`: row-major `cx, cy, w, h, score`.
pub fn decode_detections(output: &Tensor) -> Result<Vec<Detection>> {
    let (a, b) = match output.shape() {
        [1, a, b] | [a, b] => (*a, *b),
        other => anyhow::bail!("unsupported detector output shape {:?}", other),
    };

    let slice = output
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("detector output is not f32: {e}"))?;
    let view = ArrayView2::from_shape((a, b), slice)
        .map_err(|_| anyhow::anyhow!("detector output data is not contiguous"))?;

    if a == 0 || (a >= 5 && b == 0) {
        return Ok(Vec::new());
    }

    let detections = if a >= 5 && a < b {
        view.t()
            .axis_iter(Axis(0))
            .map(|row| Detection {
                bbox: BoundingBox::from_center(row[0], row[1], row[2], row[3]),
                score: row[4],
            })
            .collect()
    } else if b == 6 {
        view.axis_iter(Axis(0))
            .map(|row| Detection {
                bbox: BoundingBox {
                    x1: row[0],
                    y1: row[1],
                    x2: row[2],
                    y2: row[3],
                },
                score: row[4],
            })
            .collect()
    } else if b >= 5 {
        view.axis_iter(Axis(0))
            .map(|row| Detection {
                bbox: BoundingBox::from_center(row[0], row[1], row[2], row[3]),
                score: row[4],
            })
            .collect()
    } else {
        anyhow::bail!("unsupported detector output shape {:?}", output.shape());
    };
    Ok(detections)
}

/// Greedy suppression over detections already sorted by descending score.
fn non_max_suppression(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    let mut result: Vec<Detection> = Vec::with_capacity(detections.len());
    for detection in detections {
        let suppressed = result
            .iter()
            .any(|kept| detection.bbox.iou(&kept.bbox) > threshold);
        if !suppressed {
            result.push(detection);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use facecloak_utils::compute_letterbox;

    fn identity(width: u32, height: u32) -> Letterbox {
        compute_letterbox((width, height), (width, height)).unwrap()
    }

    fn channel_first(rows: &[[f32; 5]]) -> Tensor {
        let n = rows.len();
        let mut data = vec![0f32; 5 * n];
        for (i, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                data[c * n + i] = *value;
            }
        }
        Tensor::from_shape(&[1, 5, n], &data).unwrap()
    }

    #[test]
    fn filters_by_score_and_truncates_coordinates() {
        let tensor = channel_first(&[
            [50.0, 50.0, 20.5, 30.5, 0.95],
            [10.0, 10.0, 4.0, 4.0, 0.1],
            [90.0, 90.0, 4.0, 4.0, 0.2],
            [120.0, 20.0, 10.0, 10.0, 0.4],
            [150.0, 20.0, 10.0, 10.0, 0.5],
            [180.0, 20.0, 10.0, 10.0, 0.6],
        ]);

        let candidates =
            apply_postprocess(&tensor, &identity(200, 100), &PostprocessConfig::default())
                .expect("postprocess should succeed");

        assert_eq!(candidates.len(), 4);
        let first = candidates[0];
        assert_eq!(first.confidence, 0.95);
        assert_eq!(
            first.bbox,
            FaceBox::new(39, 34, 60, 65).unwrap(),
            "corners are truncated toward zero"
        );
        let scores: Vec<f32> = candidates.iter().map(|c| c.confidence).collect();
        assert_eq!(scores, vec![0.95, 0.6, 0.5, 0.4]);
    }

    #[test]
    fn applies_non_max_suppression() {
        let tensor = channel_first(&[
            [5.0, 5.0, 10.0, 10.0, 0.95],
            [5.0, 5.0, 10.0, 10.0, 0.99],
            [6.0, 6.0, 10.0, 10.0, 0.90],
            [15.0, 15.0, 4.0, 4.0, 0.80],
            [25.0, 25.0, 4.0, 4.0, 0.70],
            [35.0, 35.0, 4.0, 4.0, 0.60],
        ]);

        let candidates = apply_postprocess(
            &tensor,
            &identity(64, 64),
            &PostprocessConfig {
                score_threshold: 0.3,
                nms_threshold: 0.5,
                top_k: 10,
            },
        )
        .expect("postprocess should succeed");

        assert_eq!(candidates.len(), 4);
        assert!((candidates[0].confidence - 0.99).abs() < f32::EPSILON);
    }

    #[test]
    fn maps_letterboxed_boxes_and_clamps_to_image() {
        // 200x100 image letterboxed into 100x100: scale 0.5, pad_y 25.
        let letterbox = compute_letterbox((200, 100), (100, 100)).unwrap();
        let tensor = Tensor::from_shape(
            &[1, 2, 5],
            &[
                50.0f32, 50.0, 20.0, 20.0, 0.9, //
                98.0, 30.0, 10.0, 10.0, 0.8,
            ],
        )
        .unwrap();

        let candidates =
            apply_postprocess(&tensor, &letterbox, &PostprocessConfig::default()).unwrap();
        assert_eq!(candidates[0].bbox, FaceBox::new(80, 30, 120, 70).unwrap());
        // Second box spills past the right edge and is clamped.
        assert_eq!(candidates[1].bbox, FaceBox::new(186, 0, 200, 20).unwrap());
    }

    #[test]
    fn accepts_end_to_end_layout() {
        let tensor = Tensor::from_shape(
            &[1, 2, 6],
            &[
                10.0f32, 10.0, 30.0, 40.0, 0.9, 0.0, //
                0.0, 0.0, 5.0, 5.0, 0.1, 0.0,
            ],
        )
        .unwrap();
        let candidates =
            apply_postprocess(&tensor, &identity(64, 64), &PostprocessConfig::default()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].bbox, FaceBox::new(10, 10, 30, 40).unwrap());
    }

    #[test]
    fn drops_degenerate_and_non_finite_detections() {
        let tensor = Tensor::from_shape(
            &[3, 5],
            &[
                10.0f32, 10.0, 0.0, 10.0, 0.9, // zero width
                10.0, 10.0, 8.0, 8.0, f32::NAN, // bad score
                -50.0, -50.0, 10.0, 10.0, 0.9, // entirely outside
            ],
        )
        .unwrap();
        let candidates =
            apply_postprocess(&tensor, &identity(64, 64), &PostprocessConfig::default()).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn empty_output_is_not_an_error() {
        let tensor = Tensor::from_shape(&[1, 5, 0], &[] as &[f32]).unwrap();
        assert!(decode_detections(&tensor).unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_shapes() {
        let tensor = Tensor::from_shape(&[2, 3], &[0f32; 6]).unwrap();
        assert!(decode_detections(&tensor).is_err());
        let tensor = Tensor::from_shape(&[2, 1, 5], &[0f32; 10]).unwrap();
        assert!(decode_detections(&tensor).is_err());
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = BoundingBox::from_center(5.0, 5.0, 10.0, 10.0);
        let b = BoundingBox::from_center(50.0, 50.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn converts_detection_settings_into_config() {
        let settings = DetectionSettings {
            score_threshold: 0.75,
            nms_threshold: 0.25,
            top_k: 123,
        };

        let config: PostprocessConfig = (&settings).into();
        assert_eq!(config.score_threshold, settings.score_threshold);
        assert_eq!(config.nms_threshold, settings.nms_threshold);
        assert_eq!(config.top_k, settings.top_k);
    }
}
