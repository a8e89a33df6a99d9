//! Helpers for encoding masked images and naming output files.
//!
//! Output keeps the source raster format when it is one of the supported encoders
//! (PNG, JPEG, WebP) and falls back to PNG otherwise, unless a format is forced.

use crate::config::OutputSettings;

use anyhow::{Context, Result};
use image::{
    DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
        webp::WebPEncoder,
    },
};
use log::debug;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

/// Canonical image formats supported by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormatHint {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormatHint {
    /// Determine format from a filesystem extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.parse().ok()
    }

    /// Map a decoded source format onto an encodable one.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::WebP => Some(Self::Webp),
            _ => None,
        }
    }

    /// Preferred file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }
}

impl std::str::FromStr for ImageFormatHint {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            other => Err(format!("unknown image format '{other}'")),
        }
    }
}

/// Immutable encoding configuration derived from [`OutputSettings`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutputOptions {
    /// Forced output format; `None` keeps the source format.
    pub format: Option<ImageFormatHint>,
    pub jpeg_quality: u8,
}

impl Default for OutputOptions {
    fn default() -> Self {
        OutputSettings::default().into()
    }
}

impl OutputOptions {
    /// Pick the format to encode with, given the format the source was decoded from.
    pub fn resolve(&self, source: Option<ImageFormat>) -> ImageFormatHint {
        self.format
            .or_else(|| source.and_then(ImageFormatHint::from_image_format))
            .unwrap_or_default()
    }
}

impl From<&OutputSettings> for OutputOptions {
    fn from(settings: &OutputSettings) -> Self {
        let format = match settings.format.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => None,
            other => other.parse().ok(),
        };
        Self {
            format,
            jpeg_quality: settings.jpeg_quality.clamp(1, 100),
        }
    }
}

impl From<OutputSettings> for OutputOptions {
    fn from(settings: OutputSettings) -> Self {
        (&settings).into()
    }
}

/// Encode an image into `format`. Alpha is kept for PNG/WebP only when the image has it.
pub fn encode_image(
    image: &DynamicImage,
    format: ImageFormatHint,
    options: &OutputOptions,
) -> Result<Vec<u8>> {
    debug!(
        "Encoding {}x{} image as {:?}",
        image.width(),
        image.height(),
        format
    );
    match format {
        ImageFormatHint::Png => encode_png(image),
        ImageFormatHint::Jpeg => encode_jpeg(image, options.jpeg_quality),
        ImageFormatHint::Webp => encode_webp(image),
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buffer, CompressionType::Default, FilterType::Adaptive);
    if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        encoder
            .write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                ExtendedColorType::Rgba8,
            )
            .context("failed to encode PNG")?;
    } else {
        let rgb = image.to_rgb8();
        encoder
            .write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
            .context("failed to encode PNG")?;
    }
    Ok(buffer)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )
        .context("failed to encode JPEG")?;
    Ok(buffer)
}

fn encode_webp(image: &DynamicImage) -> Result<Vec<u8>> {
    let rgba = image.to_rgba8();
    let mut buffer = Vec::new();
    WebPEncoder::new_lossless(&mut buffer)
        .write_image(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            ExtendedColorType::Rgba8,
        )
        .context("failed to encode WebP")?;
    Ok(buffer)
}

/// Append a suffix to a filename, preserving the existing extension.
pub fn append_suffix_to_filename(name: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return name.to_string();
    }
    if let Some(idx) = name.rfind('.').filter(|idx| *idx > 0) {
        let (base, ext) = name.split_at(idx);
        format!("{base}{suffix}{ext}")
    } else {
        format!("{name}{suffix}")
    }
}

/// Write `bytes` to `path`, creating parent directories as needed.
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty() && !p.exists()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}
