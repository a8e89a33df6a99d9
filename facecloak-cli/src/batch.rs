//! `batch` subcommand: mask every face in many images and write them next to the sources.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::Result;
use facecloak_core::{
    BatchItem, BatchOptions, FaceMasker, MaskConfig, MaskedImage, ProgressFn,
    process_batch,
};
use facecloak_utils::{AppSettings, append_suffix_to_filename, write_bytes};
use log::{info, warn};

use crate::{
    args::BatchArgs,
    emit_json,
    input::collect_all_images,
    types::BatchEntry,
};

const MAX_REPORTED_FAILURES: usize = 5;

pub fn run_batch(settings: &AppSettings, args: &BatchArgs) -> Result<()> {
    let images = collect_all_images(&args.input)?;
    let masker = FaceMasker::from_settings(settings)?;
    let mask = MaskConfig::from(&settings.mask);
    let options = BatchOptions::from(&settings.batch);
    info!(
        "Masking {} image(s) with {} using {} worker(s)",
        images.len(),
        mask.mode,
        options.workers
    );

    let items = images.iter().cloned().map(BatchItem::from_path).collect();
    let progress: &ProgressFn<'_> = &|update| {
        info!(
            "[{}/{}] {} -> {:?}",
            update.completed, update.total, update.label, update.status
        );
    };
    let report = process_batch(&masker, items, &mask, &options, Some(progress));

    let mut claimed = HashSet::new();
    let mut entries = Vec::with_capacity(report.len());
    for outcome in &report.outcomes {
        let source = &images[outcome.index];
        let entry = match &outcome.result {
            Ok(masked) => save_outcome(
                source,
                masked,
                settings,
                args.output_dir.as_deref(),
                &mut claimed,
            ),
            Err(failure) => BatchEntry::failed(source.display().to_string(), &failure.error),
        };
        entries.push(entry);
    }

    if let Some(path) = args.report.as_deref() {
        emit_json(&entries, Some(path))?;
    }

    for failure in report.failures().take(MAX_REPORTED_FAILURES) {
        warn!("{failure}");
    }

    let written = entries.iter().filter(|e| e.status == "done").count();
    let skipped = entries.iter().filter(|e| e.status == "skipped").count();
    let failed = entries.iter().filter(|e| e.status == "failed").count();
    info!("Batch complete: {written} written, {skipped} skipped, {failed} failed");

    if failed == entries.len() {
        anyhow::bail!("every batch item failed");
    }
    Ok(())
}

fn save_outcome(
    source: &Path,
    masked: &MaskedImage,
    settings: &AppSettings,
    output_dir: Option<&Path>,
    claimed: &mut HashSet<PathBuf>,
) -> BatchEntry {
    let label = source.display().to_string();
    if masked.faces.is_empty() && settings.batch.skip_without_faces {
        info!("{label}: no faces found; nothing written");
        return BatchEntry {
            source: label,
            status: "skipped",
            output: None,
            faces: Some(0),
            error_kind: None,
            error: None,
        };
    }

    let planned = output_path(source, output_dir, &settings.batch.suffix, masked);
    let target = claim_unique(planned.clone(), claimed);
    if target != planned {
        warn!(
            "{label}: {} is already written by this batch; using {}",
            planned.display(),
            target.display()
        );
    }
    match write_bytes(&target, &masked.bytes) {
        Ok(()) => BatchEntry {
            source: label,
            status: "done",
            output: Some(target.display().to_string()),
            faces: Some(masked.faces.len()),
            error_kind: None,
            error: None,
        },
        Err(err) => {
            warn!("{label}: {err:#}");
            BatchEntry {
                source: label,
                status: "failed",
                output: None,
                faces: Some(masked.faces.len()),
                error_kind: Some("write"),
                error: Some(format!("{err:#}")),
            }
        }
    }
}

/// `<dir>/<stem><suffix>.<ext>`, where `dir` defaults to the source's own directory.
fn output_path(
    source: &Path,
    output_dir: Option<&Path>,
    suffix: &str,
    masked: &MaskedImage,
) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| source.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let file_name = format!("{stem}.{}", masked.format.extension());
    dir.join(append_suffix_to_filename(&file_name, suffix))
}

/// Reserve `target` for this batch, appending `_2`, `_3`, ... to the stem while it is taken.
fn claim_unique(target: PathBuf, claimed: &mut HashSet<PathBuf>) -> PathBuf {
    if claimed.insert(target.clone()) {
        return target;
    }
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = target.extension().map(|e| e.to_string_lossy().into_owned());
    let mut counter = 2u32;
    loop {
        let name = match &ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = target.with_file_name(name);
        if claimed.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
