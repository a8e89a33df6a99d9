//! Command-line argument definitions for facecloak.

use clap::{ArgAction, Args, Parser, Subcommand};
use facecloak_core::{FaceId, SelectionEvent};
use facecloak_utils::{MaskMode, ResizeQuality};
use std::path::PathBuf;

/// Detect faces and mask the ones you choose with a blur or an emoji.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Path to the face detector ONNX model (defaults to the settings file value).
    #[arg(short, long, global = true)]
    pub model: Option<PathBuf>,

    /// Optional settings JSON. Defaults to `config/facecloak.json` when present, otherwise built-in parameters.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, global = true, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,

    /// Override model input width (pixels).
    #[arg(long, global = true)]
    pub width: Option<u32>,

    /// Override model input height (pixels).
    #[arg(long, global = true)]
    pub height: Option<u32>,

    /// Resize quality mode: `quality` (Triangle) or `speed` (fast Nearest).
    #[arg(long, global = true, value_name = "MODE")]
    pub resize_quality: Option<ResizeQuality>,

    /// Override score threshold.
    #[arg(long, global = true)]
    pub score_threshold: Option<f32>,

    /// Override NMS threshold.
    #[arg(long, global = true)]
    pub nms_threshold: Option<f32>,

    /// Override top_k limit (0 keeps every candidate).
    #[arg(long, global = true)]
    pub top_k: Option<usize>,
}

/// Mask transform overrides accepted by the rendering subcommands.
#[derive(Debug, Clone, Args)]
pub struct MaskArgs {
    /// Mask transform: `emoji` or `blur`.
    #[arg(long, value_name = "MODE")]
    pub mode: Option<MaskMode>,

    /// Glyph drawn over each face in emoji mode.
    #[arg(long)]
    pub emoji: Option<String>,

    /// Blur sigma as a fraction of the face box's shorter side.
    #[arg(long)]
    pub blur_strength: Option<f32>,

    /// Force the output format (png, jpeg, webp). Defaults to the source format.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality when writing JPEG output (1-100).
    #[arg(long)]
    pub jpeg_quality: Option<u8>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Detect faces and print them largest first as JSON.
    Detect(DetectArgs),
    /// Replay selection events against saved face records and print the resulting selection.
    Select(SelectArgs),
    /// Re-detect faces and write an annotated preview with the chosen faces masked.
    Preview(PreviewArgs),
    /// Mask faces from saved records without running the detector.
    Mask(MaskCommandArgs),
    /// Detect and mask every face in many images.
    Batch(BatchArgs),
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Path to an image file or a directory containing images.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Write detections to a JSON file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Face records written by `detect`.
    #[arg(long)]
    pub faces: PathBuf,

    /// Which image entry of the faces file to use when it lists several.
    #[arg(long)]
    pub image: Option<String>,

    /// Events to replay in order: `all`, `none`, `pen:<id>`, `eraser:<id>`, `pen@x,y`, `eraser@x,y`.
    #[arg(long = "event", value_name = "EVENT")]
    pub events: Vec<SelectionEvent>,

    /// Write the selection to a JSON file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Image to preview.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Comma-separated face ids to mask (empty masks nothing).
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub selected: Vec<FaceId>,

    #[command(flatten)]
    pub mask: MaskArgs,

    /// Where to write the preview image.
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct MaskCommandArgs {
    /// Image to mask.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Face records written by `detect`.
    #[arg(long)]
    pub faces: PathBuf,

    /// Comma-separated face ids to mask. Defaults to every face in the records.
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub selected: Option<Vec<FaceId>>,

    #[command(flatten)]
    pub mask: MaskArgs,

    /// Where to write the masked image.
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Image files or directories containing images.
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// Directory for masked images. Defaults to next to each source.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Suffix appended to each source file stem.
    #[arg(long)]
    pub suffix: Option<String>,

    /// Images processed concurrently.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Write masked output even for images where no face was found.
    #[arg(long, action = ArgAction::SetTrue)]
    pub keep_faceless: bool,

    #[command(flatten)]
    pub mask: MaskArgs,

    /// Write a JSON report of every item to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,
}
