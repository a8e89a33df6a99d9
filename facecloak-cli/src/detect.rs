//! `detect` and `preview` subcommands. Both need the face model.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use facecloak_core::{FaceDetector, FaceMasker, MaskConfig, describe_faces};
use facecloak_utils::{AppSettings, ImageFormatHint, normalize_path, write_bytes};
use log::{info, warn};

use crate::{
    args::{DetectArgs, PreviewArgs},
    emit_json,
    input::collect_images,
    types::{ImageFaces, MaskSummary},
};

pub fn run_detect(settings: &AppSettings, args: &DetectArgs) -> Result<()> {
    let input_path = normalize_path(&args.input)?;
    let detector = FaceDetector::from_settings(settings)?;

    let images = collect_images(&input_path)?;
    if images.is_empty() {
        anyhow::bail!(
            "no images found at {} (supported extensions: jpg, jpeg, png, bmp, webp)",
            input_path.display()
        );
    }

    info!("Processing {} image(s)...", images.len());
    let mut results = Vec::with_capacity(images.len());
    for image_path in images {
        let detected = fs::read(&image_path)
            .with_context(|| format!("failed to read {}", image_path.display()))
            .and_then(|bytes| detector.detect(&bytes).map_err(anyhow::Error::from));
        match detected {
            Ok(pass) => {
                info!(
                    "{}: {}",
                    image_path.display(),
                    describe_faces(pass.faces()).replace('\n', "; ")
                );
                results.push(ImageFaces::from_pass(
                    image_path.display().to_string(),
                    &pass,
                ));
            }
            Err(err) => {
                warn!("Failed to process {}: {err:#}", image_path.display());
            }
        }
    }

    if results.is_empty() {
        anyhow::bail!("all detections failed; cannot produce output");
    }

    emit_json(&results, args.json.as_deref())
}

pub fn run_preview(settings: &AppSettings, args: &PreviewArgs) -> Result<()> {
    let input_path = normalize_path(&args.input)?;
    let masker = FaceMasker::from_settings(settings)?;
    let mask = MaskConfig::from(&settings.mask);

    let bytes = fs::read(&input_path)
        .with_context(|| format!("failed to read {}", input_path.display()))?;
    let preview = masker.preview(&bytes, &args.selected, &mask)?;
    write_bytes(&args.output, &preview.bytes)?;
    info!(
        "Preview with {} of {} face(s) masked written to {}",
        preview.masked.len(),
        preview.faces.len(),
        args.output.display()
    );

    emit_json(
        &MaskSummary::new(args.output.display().to_string(), &preview),
        None,
    )
}

/// Output format implied by the destination file name, if any.
pub fn format_from_output_path(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageFormatHint::from_extension)
        .map(|format| format.extension().to_string())
}
