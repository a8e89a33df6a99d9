use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, ImageReader, Rgb, RgbImage, imageops::FilterType};
use ndarray::Array3;
use std::io::Cursor;

/// Grey level used for letterbox padding.
pub const LETTERBOX_FILL: u8 = 114;

/// Geometry of an aspect-preserving resize into a fixed model input.
///
/// The source image is scaled uniformly by `scale`, then placed at (`pad_x`, `pad_y`)
/// inside the target canvas; the remaining border is padding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    /// Size of the resized image inside the canvas.
    pub content_size: (u32, u32),
    /// Size of the original image.
    pub original_size: (u32, u32),
    /// Size of the model input canvas.
    pub target_size: (u32, u32),
}

impl Letterbox {
    /// Map a point in model-input space back into original-image space.
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Decode raw image bytes, sniffing the format from the content.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    anyhow::ensure!(!bytes.is_empty(), "image data is empty");
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("failed to read image header")?;
    anyhow::ensure!(
        reader.format().is_some(),
        "unrecognized image format"
    );
    let image = reader.decode().context("failed to decode image")?;
    let (width, height) = image.dimensions();
    anyhow::ensure!(
        width > 0 && height > 0,
        "image dimensions must be greater than zero (got {width}x{height})"
    );
    Ok(image)
}

/// Compute the letterbox geometry for fitting `original` into `target`.
pub fn compute_letterbox(original: (u32, u32), target: (u32, u32)) -> Result<Letterbox> {
    let (orig_w, orig_h) = original;
    let (target_w, target_h) = target;
    anyhow::ensure!(
        target_w > 0 && target_h > 0,
        "target dimensions must be non-zero"
    );
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "original dimensions must be non-zero"
    );

    let scale = (target_w as f32 / orig_w as f32).min(target_h as f32 / orig_h as f32);
    let content_w = ((orig_w as f32 * scale).round() as u32).clamp(1, target_w);
    let content_h = ((orig_h as f32 * scale).round() as u32).clamp(1, target_h);

    Ok(Letterbox {
        scale,
        pad_x: (target_w - content_w) / 2,
        pad_y: (target_h - content_h) / 2,
        content_size: (content_w, content_h),
        original_size: original,
        target_size: target,
    })
}

/// Resize `image` into a `target` canvas without distortion, padding the border.
pub fn letterbox_image(
    image: &DynamicImage,
    target: (u32, u32),
    filter: FilterType,
) -> Result<(RgbImage, Letterbox)> {
    let geometry = compute_letterbox(image.dimensions(), target)?;
    let (content_w, content_h) = geometry.content_size;

    let rgb = image.to_rgb8();
    let resized = if (content_w, content_h) == geometry.original_size {
        rgb
    } else {
        image::imageops::resize(&rgb, content_w, content_h, filter)
    };

    let mut canvas = RgbImage::from_pixel(target.0, target.1, Rgb([LETTERBOX_FILL; 3]));
    image::imageops::replace(
        &mut canvas,
        &resized,
        i64::from(geometry.pad_x),
        i64::from(geometry.pad_y),
    );
    Ok((canvas, geometry))
}

/// Convert an RGB image into an RGB CHW array scaled to `[0, 1]`.
///
/// This rearranges the memory layout from HWC (height, width, channels) to
/// CHW (channels, height, width).
pub fn rgb_to_chw_normalized(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        array[(0, yi, xi)] = pixel[0] as f32 / 255.0;
        array[(1, yi, xi)] = pixel[1] as f32 / 255.0;
        array[(2, yi, xi)] = pixel[2] as f32 / 255.0;
    }
    array
}
