mod args;
mod batch;
mod config;
mod detect;
mod input;
mod mask;
mod types;

use std::{
    fs::{self, File},
    path::Path,
};

use anyhow::{Context, Result};
use clap::Parser;
use facecloak_utils::{configure_telemetry, init_logging};
use log::{debug, info};
use serde::Serialize;

use crate::{
    args::{Cli, Command, MaskArgs},
    config::{apply_batch_overrides, apply_cli_overrides, apply_mask_overrides, load_settings},
    detect::format_from_output_path,
};

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let cli = Cli::parse();
    debug!("facecloak-core {}", facecloak_core::version());

    let mut settings = load_settings(cli.global.config.as_ref())?;
    apply_cli_overrides(&mut settings, &cli.global);
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );

    match &cli.command {
        Command::Detect(args) => detect::run_detect(&settings, args),
        Command::Select(args) => mask::run_select(args),
        Command::Preview(args) => {
            apply_mask_overrides(&mut settings, &with_output_format(&args.mask, &args.output));
            detect::run_preview(&settings, args)
        }
        Command::Mask(args) => {
            apply_mask_overrides(&mut settings, &with_output_format(&args.mask, &args.output));
            mask::run_mask(&settings, args)
        }
        Command::Batch(args) => {
            apply_batch_overrides(&mut settings, args);
            batch::run_batch(&settings, args)
        }
    }
}

/// Let the destination extension pick the encoder unless `--format` was given.
fn with_output_format(mask: &MaskArgs, output: &Path) -> MaskArgs {
    let mut mask = mask.clone();
    if mask.format.is_none() {
        mask.format = format_from_output_path(output);
    }
    mask
}

/// Pretty-print `value` to `path`, or to stdout when no path is given.
pub(crate) fn emit_json<T: Serialize + ?Sized>(value: &T, path: Option<&Path>) -> Result<()> {
    if let Some(json_path) = path {
        if let Some(dir) = json_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, value)
            .with_context(|| format!("failed to write JSON to {}", json_path.display()))?;
        info!("Wrote {}", json_path.display());
    } else {
        let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
        println!("{json}");
    }
    Ok(())
}
