//! Common helpers shared across facecloak crates.

/// Application configuration and settings management.
pub mod config;
/// Synthetic test images and in-memory encoding helpers.
pub mod fixtures;
/// Image decoding, letterboxing, and tensor conversion.
pub mod image_utils;
/// Image output helpers (format selection, encoding, file naming).
pub mod output;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use config::{
    AppSettings, BatchSettings, DetectionSettings, InputDimensions, MaskMode, MaskSettings,
    OutputSettings, ResizeQuality, TelemetrySettings,
};
pub use fixtures::{checkerboard, encode_jpeg_bytes, encode_png_bytes, gradient, solid};
pub use image_utils::{
    Letterbox, compute_letterbox, decode_image, letterbox_image, rgb_to_chw_normalized,
};
pub use output::{ImageFormatHint, OutputOptions, append_suffix_to_filename, encode_image, write_bytes};
pub use telemetry::{
    TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    telemetry_level, timing_guard, timing_guard_if,
};

/// Initialize logging once for CLI environments.
///
/// This function respects the `RUST_LOG` environment variable if it is set.
/// Otherwise, it falls back to the provided default filter level.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module("facecloak::telemetry", LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
