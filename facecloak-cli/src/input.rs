//! Input collection and faces-file loading.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use walkdir::WalkDir;

use crate::types::{FacesFile, ImageFaces};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Collect all image paths from a file or directory.
pub fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        anyhow::bail!(
            "input path is neither file nor directory: {}",
            path.display()
        );
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            let ext_lower = ext.to_ascii_lowercase();
            if IMAGE_EXTENSIONS.contains(&ext_lower.as_str()) {
                images.push(entry.path().to_path_buf());
            } else {
                debug!("Skipping non-image file {}", entry.path().display());
            }
        }
    }
    images.sort();
    Ok(images)
}

/// Collect images from several files or directories, keeping argument order.
pub fn collect_all_images(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for path in paths {
        images.extend(collect_images(path)?);
    }
    if images.is_empty() {
        anyhow::bail!("no images found (supported extensions: jpg, jpeg, png, bmp, webp)");
    }
    Ok(images)
}

/// Read a faces file and pick the entry for `image`.
///
/// A single-entry file is used for any image; the records are checked against the
/// image later. With several entries the hint must match one of them.
pub fn load_face_entry(faces_path: &Path, image: Option<&str>) -> Result<ImageFaces> {
    let payload = fs::read_to_string(faces_path)
        .with_context(|| format!("failed to read faces file {}", faces_path.display()))?;
    let file: FacesFile = serde_json::from_str(&payload)
        .with_context(|| format!("failed to parse faces JSON at {}", faces_path.display()))?;
    let mut entries = file.into_entries();

    match image {
        Some(wanted) => {
            let wanted_path = Path::new(wanted);
            let canonical = wanted_path.canonicalize().ok();
            let position = entries.iter().position(|entry| {
                let entry_path = Path::new(&entry.image);
                entry_path == wanted_path
                    || canonical.as_deref() == Some(entry_path)
                    || entry_path.file_name() == wanted_path.file_name()
            });
            match position {
                Some(index) => Ok(entries.swap_remove(index)),
                None if entries.len() == 1 => {
                    debug!(
                        "Using the only entry of {} ({}) for {wanted}",
                        faces_path.display(),
                        entries[0].image
                    );
                    Ok(entries.remove(0))
                }
                None => anyhow::bail!(
                    "faces file {} has no entry for {wanted}",
                    faces_path.display()
                ),
            }
        }
        None if entries.len() == 1 => Ok(entries.remove(0)),
        None => anyhow::bail!(
            "faces file {} lists {} images; pick one with --image",
            faces_path.display(),
            entries.len()
        ),
    }
}
