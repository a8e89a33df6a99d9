//! `select` and `mask` subcommands. Both work from saved face records and never load a model.

use std::fs;

use anyhow::{Context, Result};
use facecloak_core::{DetectionPass, FaceMasker, MaskConfig, Selection, replay};
use facecloak_utils::{AppSettings, normalize_path, write_bytes};
use log::info;

use crate::{
    args::{MaskCommandArgs, SelectArgs},
    emit_json,
    input::load_face_entry,
    types::{ImageFaces, MaskSummary, SelectionReport},
};

fn pass_from_entry(entry: &ImageFaces) -> Result<DetectionPass> {
    DetectionPass::from_records((entry.width, entry.height), &entry.faces)
        .with_context(|| format!("face records for {} are not usable", entry.image))
}

pub fn run_select(args: &SelectArgs) -> Result<()> {
    let entry = load_face_entry(&args.faces, args.image.as_deref())?;
    let pass = pass_from_entry(&entry)?;
    let selection = replay(&pass, &args.events)?;
    info!(
        "{} of {} face(s) selected after {} event(s)",
        selection.selected_count(),
        selection.len(),
        args.events.len()
    );
    emit_json(&SelectionReport::from(&selection), args.json.as_deref())
}

pub fn run_mask(settings: &AppSettings, args: &MaskCommandArgs) -> Result<()> {
    let input_path = normalize_path(&args.input)?;
    let image_hint = input_path.display().to_string();
    let entry = load_face_entry(&args.faces, Some(&image_hint))?;
    let pass = pass_from_entry(&entry)?;
    let selection = match args.selected.as_ref() {
        Some(ids) => Selection::from_ids(&pass, ids.iter().copied())?,
        None => Selection::new(&pass),
    };

    let masker = FaceMasker::offline_from_settings(settings);
    let mask = MaskConfig::from(&settings.mask);
    let bytes = fs::read(&input_path)
        .with_context(|| format!("failed to read {}", input_path.display()))?;
    let masked = masker.execute(&bytes, &pass, &selection, &mask)?;
    write_bytes(&args.output, &masked.bytes)?;
    info!(
        "Masked {} of {} face(s) with {}; wrote {}",
        masked.masked.len(),
        masked.faces.len(),
        mask.mode,
        args.output.display()
    );

    emit_json(
        &MaskSummary::new(args.output.display().to_string(), &masked),
        None,
    )
}
