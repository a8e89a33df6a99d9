//! Shared configuration types consumed across the facecloak workspace.
//!
//! These structures describe detection, masking, batch, and output preferences. They are
//! serialized to JSON so the same settings file drives every front end.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Default location of the face detector ONNX artifact.
pub const DEFAULT_MODEL_PATH: &str = "models/yolov8n-face.onnx";

/// Detection post-processing parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum confidence score for a candidate to survive.
    pub score_threshold: f32,
    /// IoU above which the lower-scoring of two overlapping candidates is suppressed.
    pub nms_threshold: f32,
    /// Maximum number of candidates considered after score sorting (0 = unlimited).
    pub top_k: usize,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            score_threshold: 0.25,
            nms_threshold: 0.5,
            top_k: 300,
        }
    }
}

/// Resize filter preference for model input preparation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// Preserve visual quality when resizing (Triangle filter).
    #[default]
    Quality,
    /// Prioritize throughput for batch inference (Nearest filter).
    Speed,
}

impl fmt::Display for ResizeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResizeQuality::Quality => "quality",
            ResizeQuality::Speed => "speed",
        })
    }
}

impl FromStr for ResizeQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(ResizeQuality::Quality),
            "speed" => Ok(ResizeQuality::Speed),
            other => Err(format!(
                "invalid resize quality '{other}'; expected 'quality' or 'speed'"
            )),
        }
    }
}

/// Model input resolution in pixels (width x height).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputDimensions {
    pub width: u32,
    pub height: u32,
    /// Choose between quality-focused or speed-focused resizing.
    pub resize_quality: ResizeQuality,
}

impl Default for InputDimensions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
            resize_quality: ResizeQuality::Quality,
        }
    }
}

/// Transform applied to every selected face.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaskMode {
    /// Overlay the configured emoji glyph.
    #[default]
    Emoji,
    /// Gaussian blur sized from the face box.
    Blur,
}

impl MaskMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MaskMode::Emoji => "emoji",
            MaskMode::Blur => "blur",
        }
    }
}

impl fmt::Display for MaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaskMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "emoji" => Ok(MaskMode::Emoji),
            "blur" => Ok(MaskMode::Blur),
            other => Err(format!(
                "invalid mask mode '{other}'; expected 'emoji' or 'blur'"
            )),
        }
    }
}

/// Masking preferences shared by preview, final output, and batch runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaskSettings {
    /// Mask transform applied to selected faces.
    pub mode: MaskMode,
    /// Glyph drawn over faces in emoji mode.
    pub emoji: String,
    /// Blur sigma as a fraction of the face box's shorter side.
    pub blur_strength: f32,
    /// Lower bound for the blur sigma so tiny faces are still obscured.
    pub min_blur_sigma: f32,
    /// Edge length (pixels) of the canvas the glyph is rasterized on.
    pub glyph_resolution: u32,
    /// Extra font files loaded in addition to the system fonts.
    pub font_paths: Vec<PathBuf>,
    /// RGBA color of the preview outline.
    pub outline_color: [u8; 4],
    /// Preview outline thickness in pixels.
    pub outline_thickness: u32,
}

impl Default for MaskSettings {
    fn default() -> Self {
        Self {
            mode: MaskMode::Emoji,
            emoji: "😊".to_string(),
            blur_strength: 0.15,
            min_blur_sigma: 2.0,
            glyph_resolution: 256,
            font_paths: Vec::new(),
            outline_color: [255, 0, 0, 255],
            outline_thickness: 3,
        }
    }
}

/// Unattended batch preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchSettings {
    /// Worker threads used for batch items (1 keeps items strictly sequential).
    pub workers: usize,
    /// Suffix appended to the source file stem for masked outputs.
    pub suffix: String,
    /// Do not write an output file for images where no face was found.
    pub skip_without_faces: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            suffix: "_blurred".to_string(),
            skip_without_faces: true,
        }
    }
}

/// Output encoding preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputSettings {
    /// "auto" keeps the source format; otherwise "png", "jpeg", or "webp".
    pub format: String,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: "auto".to_string(),
            jpeg_quality: 92,
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }
}

/// Persistent application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Path to the face detector ONNX model.
    pub model_path: Option<String>,
    /// The input dimensions for model inference.
    pub input: InputDimensions,
    /// The parameters for detection post-processing.
    pub detection: DetectionSettings,
    /// Masking transform and its parameters.
    pub mask: MaskSettings,
    /// Batch run behaviour.
    pub batch: BatchSettings,
    /// Output encoding.
    pub output: OutputSettings,
    /// Telemetry and diagnostics preferences.
    pub telemetry: TelemetrySettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_path: Some(DEFAULT_MODEL_PATH.into()),
            input: InputDimensions::default(),
            detection: DetectionSettings::default(),
            mask: MaskSettings::default(),
            batch: BatchSettings::default(),
            output: OutputSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

impl AppSettings {
    /// Load settings from a JSON file, filling missing sections with defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;

        if settings.model_path.is_none() {
            settings.model_path = Some(DEFAULT_MODEL_PATH.into());
        }
        settings.sanitize();

        Ok(settings)
    }

    /// Serialize settings to disk in pretty-printed JSON.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }

    /// Clamp values to ranges the pipeline can work with.
    pub fn sanitize(&mut self) {
        self.detection.score_threshold = self.detection.score_threshold.clamp(0.0, 1.0);
        self.detection.nms_threshold = self.detection.nms_threshold.clamp(0.0, 1.0);
        self.mask.blur_strength = self.mask.blur_strength.max(0.0);
        self.mask.min_blur_sigma = self.mask.min_blur_sigma.max(0.1);
        self.mask.glyph_resolution = self.mask.glyph_resolution.clamp(16, 2048);
        self.batch.workers = self.batch.workers.max(1);
        self.output.jpeg_quality = self.output.jpeg_quality.clamp(1, 100);
    }
}

/// Returns the default path for persisted settings (`config/facecloak.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/facecloak.json"))
        .unwrap_or_else(|_| PathBuf::from("config/facecloak.json"))
}
