//! Shared types and conversions for facecloak-cli.

use std::collections::BTreeMap;

use facecloak_core::{DetectionPass, FaceId, FaceRecord, MaskError, MaskedImage, Selection};
use serde::{Deserialize, Serialize};

/// Faces found in one image, largest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFaces {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub faces: Vec<FaceRecord>,
}

impl ImageFaces {
    pub fn from_pass(image: String, pass: &DetectionPass) -> Self {
        let (width, height) = pass.image_size();
        Self {
            image,
            width,
            height,
            faces: pass.records(),
        }
    }
}

/// A faces file holds either one image entry or the full `detect` output.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FacesFile {
    Many(Vec<ImageFaces>),
    One(ImageFaces),
}

impl FacesFile {
    pub fn into_entries(self) -> Vec<ImageFaces> {
        match self {
            FacesFile::Many(entries) => entries,
            FacesFile::One(entry) => vec![entry],
        }
    }
}

/// Selection state as printed by `select`.
#[derive(Debug, Serialize)]
pub struct SelectionReport {
    pub selected: Vec<FaceId>,
    pub state: BTreeMap<FaceId, bool>,
}

impl From<&Selection> for SelectionReport {
    fn from(selection: &Selection) -> Self {
        Self {
            selected: selection.selected_ids(),
            state: selection.state().clone(),
        }
    }
}

/// Summary of one written image.
#[derive(Debug, Serialize)]
pub struct MaskSummary {
    pub output: String,
    pub width: u32,
    pub height: u32,
    pub faces: usize,
    pub masked: Vec<FaceId>,
}

impl MaskSummary {
    pub fn new(output: String, image: &MaskedImage) -> Self {
        Self {
            output,
            width: image.width,
            height: image.height,
            faces: image.faces.len(),
            masked: image.masked.clone(),
        }
    }
}

/// One line of the batch JSON report.
#[derive(Debug, Serialize)]
pub struct BatchEntry {
    pub source: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faces: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchEntry {
    pub fn failed(source: String, error: &MaskError) -> Self {
        Self {
            source,
            status: "failed",
            output: None,
            faces: None,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
        }
    }
}
