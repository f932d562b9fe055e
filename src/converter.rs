use anyhow::{Context, Result, anyhow};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader};
use libwebp_sys::WebPConfig;
use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;
use webp::{Encoder, WebPMemory};

use crate::config::ResizeOptions;

/// WebP maximum dimensions are 16383x16383
pub const MAX_WEBP_DIMENSION: u32 = 16383;

/// Slowest, most thorough libwebp compression method
const MAX_COMPRESSION_EFFORT: i32 = 6;

pub struct ImageConverter {
    quality: f32,
    method: i32,
}

impl ImageConverter {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: f32::from(quality),
            method: MAX_COMPRESSION_EFFORT,
        }
    }

    /// Decode an image from its encoded bytes, sniffing the format from content
    pub fn decode(bytes: &[u8], input_path: &Path) -> Result<DynamicImage> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .with_context(|| format!("Failed to read image: {}", input_path.display()))?
            .decode()
            .with_context(|| format!("Failed to decode image: {}", input_path.display()))
    }

    /// Encode `img` as lossy WebP and write it to `output_path`.
    ///
    /// Returns the number of bytes written.
    pub fn encode_to_file(&self, img: &DynamicImage, output_path: &Path) -> Result<u64> {
        let validated_img = validate_dimensions(img)?;
        let encodable = to_encodable(&validated_img);

        let encoder = Encoder::from_image(&encodable)
            .map_err(|e| anyhow!("Failed to create encoder: {}", e))?;

        let mut config =
            WebPConfig::new().map_err(|_| anyhow!("Failed to initialize WebP encoder config"))?;
        config.lossless = 0;
        config.quality = self.quality;
        config.method = self.method;

        let webp_data = encoder
            .encode_advanced(&config)
            .map_err(|e| anyhow!("WebP encoding failed: {:?}", e))?;
        save_webp_data(&webp_data, output_path)?;
        Ok(webp_data.len() as u64)
    }
}

fn save_webp_data(webp_data: &WebPMemory, output_path: &Path) -> Result<()> {
    std::fs::write(output_path, &**webp_data)
        .with_context(|| format!("Failed to save WebP file: {}", output_path.display()))
}

/// libwebp only accepts 8-bit RGB or RGBA buffers
fn to_encodable(img: &DynamicImage) -> Cow<'_, DynamicImage> {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Cow::Borrowed(img),
        other if other.color().has_alpha() => {
            Cow::Owned(DynamicImage::ImageRgba8(other.to_rgba8()))
        }
        other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
    }
}

/// Reject empty images and shrink oversized ones to fit WebP limits
fn validate_dimensions(img: &DynamicImage) -> Result<Cow<'_, DynamicImage>> {
    let (width, height) = img.dimensions();

    if width == 0 || height == 0 {
        return Err(anyhow!(
            "Invalid image dimensions: {}x{} (zero dimensions)",
            width,
            height
        ));
    }

    if width <= MAX_WEBP_DIMENSION && height <= MAX_WEBP_DIMENSION {
        return Ok(Cow::Borrowed(img));
    }

    let (new_width, new_height) =
        fit_within(width, height, MAX_WEBP_DIMENSION, MAX_WEBP_DIMENSION);
    log::warn!(
        "Resizing image from {}x{} to {}x{} to fit WebP limits",
        width,
        height,
        new_width,
        new_height
    );
    Ok(Cow::Owned(img.resize_exact(
        new_width,
        new_height,
        FilterType::Lanczos3,
    )))
}

/// Apply the resize directive, leaving `img` untouched.
///
/// Borrows the input when the directive is inactive or changes nothing.
pub fn resize_image<'a>(img: &'a DynamicImage, resize: &ResizeOptions) -> Cow<'a, DynamicImage> {
    let (width, height) = img.dimensions();
    match target_dimensions(width, height, resize) {
        Some((w, h)) if (w, h) != (width, height) => {
            log::debug!("Resizing {}x{} -> {}x{}", width, height, w, h);
            Cow::Owned(img.resize_exact(w, h, FilterType::Lanczos3))
        }
        _ => Cow::Borrowed(img),
    }
}

/// Output dimensions for an image of `width`x`height`, `None` when no resize applies.
///
/// An unset bound defaults to the image's own dimension, and every bound is
/// clamped to `1..=MAX_WEBP_DIMENSION`.
pub fn target_dimensions(width: u32, height: u32, resize: &ResizeOptions) -> Option<(u32, u32)> {
    if !resize.is_active() {
        return None;
    }

    let bound_width = resize.width.unwrap_or(width).clamp(1, MAX_WEBP_DIMENSION);
    let bound_height = resize.height.unwrap_or(height).clamp(1, MAX_WEBP_DIMENSION);

    if resize.preserve_aspect_ratio {
        Some(fit_within(width, height, bound_width, bound_height))
    } else {
        Some((bound_width, bound_height))
    }
}

/// Largest size with the same proportions that fits the box; never upscales
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width.max(1), height.max(1));
    }

    let scale = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    let new_width = (f64::from(width) * scale).round() as u32;
    let new_height = (f64::from(height) * scale).round() as u32;
    (new_width.clamp(1, max_width), new_height.clamp(1, max_height))
}
