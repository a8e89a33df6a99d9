//! Face registry: canonical ordering and identifiers for one detection pass.
//!
//! Faces are ordered by area, largest first, with ties kept in detection order. A face's
//! id is its position in that order, so id `0` is always the largest face.

use std::{
    collections::HashSet,
    fmt::Write as _,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::error::{MaskError, Result};

/// Identifier of a face within one detection pass.
pub type FaceId = u32;

static NEXT_PASS_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique token identifying one detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(u64);

impl PassId {
    fn next() -> Self {
        PassId(NEXT_PASS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Axis-aligned integer box in original-image pixels, `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaceBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl FaceBox {
    /// Returns `None` for empty or inverted boxes.
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Option<Self> {
        (x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    pub fn shorter_side(&self) -> u32 {
        self.width().min(self.height())
    }

    /// Inclusive point test on both edges.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.x1..=self.x2).contains(&x) && (self.y1..=self.y2).contains(&y)
    }

    /// Whether the box lies inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x2 <= width && self.y2 <= height
    }
}

/// One surviving detection before canonical ordering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceCandidate {
    pub bbox: FaceBox,
    pub confidence: f32,
}

/// A detected face. Immutable once its pass has been built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
    id: FaceId,
    bbox: FaceBox,
    confidence: f32,
}

impl Face {
    pub fn id(&self) -> FaceId {
        self.id
    }

    pub fn bbox(&self) -> FaceBox {
        self.bbox
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> u64 {
        self.bbox.area()
    }
}

/// Wire shape of a face: `{id, x1, y1, x2, y2, confidence, area}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: FaceId,
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub confidence: f32,
    pub area: u64,
}

impl From<&Face> for FaceRecord {
    fn from(face: &Face) -> Self {
        let FaceBox { x1, y1, x2, y2 } = face.bbox;
        Self {
            id: face.id,
            x1,
            y1,
            x2,
            y2,
            confidence: face.confidence,
            area: face.area(),
        }
    }
}

/// The faces found in one image by one detector invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionPass {
    id: PassId,
    image_size: (u32, u32),
    faces: Vec<Face>,
}

impl DetectionPass {
    /// Order candidates by area (largest first, stable) and number them from 0.
    pub fn from_candidates(image_size: (u32, u32), mut candidates: Vec<FaceCandidate>) -> Self {
        candidates.sort_by(|a, b| b.bbox.area().cmp(&a.bbox.area()));
        let faces = candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| Face {
                id: index as FaceId,
                bbox: candidate.bbox,
                confidence: candidate.confidence,
            })
            .collect();
        Self {
            id: PassId::next(),
            image_size,
            faces,
        }
    }

    /// Rebuild a pass from records a client sent back, checking them against the image.
    ///
    /// Records keep their ids and order. Records that cannot belong to this image (boxes
    /// outside it, inconsistent areas, duplicate ids) are rejected as stale.
    pub fn from_records(image_size: (u32, u32), records: &[FaceRecord]) -> Result<Self> {
        let (width, height) = image_size;
        let mut seen = HashSet::with_capacity(records.len());
        let mut faces = Vec::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.id) {
                return Err(MaskError::StaleSession(format!(
                    "face id {} appears more than once",
                    record.id
                )));
            }
            let bbox = FaceBox::new(record.x1, record.y1, record.x2, record.y2).ok_or_else(|| {
                MaskError::StaleSession(format!("face {} has an empty box", record.id))
            })?;
            if !bbox.fits_within(width, height) {
                return Err(MaskError::StaleSession(format!(
                    "face {} box ({}, {}, {}, {}) lies outside the {}x{} image",
                    record.id, bbox.x1, bbox.y1, bbox.x2, bbox.y2, width, height
                )));
            }
            if bbox.area() != record.area {
                return Err(MaskError::StaleSession(format!(
                    "face {} reports area {} but its box covers {}",
                    record.id,
                    record.area,
                    bbox.area()
                )));
            }
            faces.push(Face {
                id: record.id,
                bbox,
                confidence: record.confidence,
            });
        }
        Ok(Self {
            id: PassId::next(),
            image_size,
            faces,
        })
    }

    pub fn id(&self) -> PassId {
        self.id
    }

    pub fn image_size(&self) -> (u32, u32) {
        self.image_size
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.iter().find(|face| face.id == id)
    }

    pub fn contains(&self, id: FaceId) -> bool {
        self.face(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces.iter().map(Face::id)
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn records(&self) -> Vec<FaceRecord> {
        self.faces.iter().map(FaceRecord::from).collect()
    }
}

/// Human-readable summary of a face list.
pub fn describe_faces(faces: &[Face]) -> String {
    if faces.is_empty() {
        return "No faces detected".to_string();
    }
    let mut text = format!("Detected {} face(s), largest first:\n", faces.len());
    for face in faces {
        let _ = writeln!(
            text,
            "#{}: area={}px², confidence={:.2}",
            face.id(),
            face.area(),
            face.confidence()
        );
    }
    text
}
