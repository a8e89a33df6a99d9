//! Configuration loading and CLI override logic.

use std::path::PathBuf;

use anyhow::{Context, Result};
use facecloak_utils::{AppSettings, config::default_settings_path, normalize_path};
use log::{info, warn};

use crate::args::{BatchArgs, GlobalArgs, MaskArgs};

/// Load application settings from a file or use defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        let settings = AppSettings::load_from_path(&resolved)?;
        info!("Loaded settings from {}", resolved.display());
        Ok(settings)
    } else {
        let default_path = default_settings_path();
        if default_path.exists() {
            let settings = AppSettings::load_from_path(&default_path).with_context(|| {
                format!(
                    "failed to load default settings from {}",
                    default_path.display()
                )
            })?;
            info!("Loaded settings from {}", default_path.display());
            Ok(settings)
        } else {
            Ok(AppSettings::default())
        }
    }
}

/// Apply global command-line arguments to loaded or default settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &GlobalArgs) {
    if let Some(model) = args.model.as_ref() {
        settings.model_path = Some(model.display().to_string());
    }

    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            settings.telemetry.level = lower.clone();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
        }
    }

    if let Some(width) = args.width {
        settings.input.width = width;
    }
    if let Some(height) = args.height {
        settings.input.height = height;
    }
    if let Some(mode) = args.resize_quality {
        settings.input.resize_quality = mode;
    }
    if let Some(score) = args.score_threshold {
        settings.detection.score_threshold = score;
    }
    if let Some(nms) = args.nms_threshold {
        settings.detection.nms_threshold = nms;
    }
    if let Some(top_k) = args.top_k {
        settings.detection.top_k = top_k;
    }

    settings.sanitize();
}

/// Apply mask and output overrides shared by the rendering subcommands.
pub fn apply_mask_overrides(settings: &mut AppSettings, args: &MaskArgs) {
    if let Some(mode) = args.mode {
        settings.mask.mode = mode;
    }
    if let Some(emoji) = args.emoji.as_ref() {
        if emoji.trim().is_empty() {
            warn!("Ignoring empty --emoji; keeping '{}'", settings.mask.emoji);
        } else {
            settings.mask.emoji = emoji.clone();
        }
    }
    if let Some(strength) = args.blur_strength {
        settings.mask.blur_strength = strength;
    }
    if let Some(format) = args.format.as_ref() {
        settings.output.format = format.to_ascii_lowercase();
    }
    if let Some(quality) = args.jpeg_quality {
        settings.output.jpeg_quality = quality;
    }

    settings.sanitize();
}

/// Apply batch-only overrides.
pub fn apply_batch_overrides(settings: &mut AppSettings, args: &BatchArgs) {
    apply_mask_overrides(settings, &args.mask);
    if let Some(workers) = args.workers {
        settings.batch.workers = workers;
    }
    if let Some(suffix) = args.suffix.as_ref() {
        settings.batch.suffix = suffix.clone();
    }
    if args.keep_faceless {
        settings.batch.skip_without_faces = false;
    }

    settings.sanitize();
}
