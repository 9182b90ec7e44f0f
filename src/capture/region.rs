//! Pure region cropping and encoding. Functional core.
//!
//! This module has zero infrastructure dependencies.
//! It takes pixel data in, returns an encoded still image out.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// A crop rectangle in bitmap pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRegion {
    /// Intersects the region with a `width`×`height` image.
    /// Returns `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRegion> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(PixelRegion {
            x: self.x,
            y: self.y,
            width: w,
            height: h,
        })
    }
}

/// A base64 PNG data URL, usable directly as an image source.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Wraps raw image bytes of the given MIME type.
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
    }

    pub fn png(bytes: &[u8]) -> Self {
        Self::from_bytes("image/png", bytes)
    }

    /// Accepts an existing data URL; bare base64 is assumed to be PNG.
    pub fn from_data_url(data_url: impl Into<String>) -> Self {
        let s = data_url.into();
        if s.starts_with("data:") {
            Self(s)
        } else {
            Self(format!("data:image/png;base64,{}", s))
        }
    }

    pub fn as_data_url(&self) -> &str {
        &self.0
    }

    pub fn into_data_url(self) -> String {
        self.0
    }

    /// MIME type from the data URL header, e.g. `image/png`.
    pub fn mime_type(&self) -> &str {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split(|c| c == ';' || c == ',').next())
            .unwrap_or("")
    }

    /// The base64 payload after the comma.
    pub fn base64_payload(&self) -> &str {
        self.0.split_once(',').map(|(_, p)| p).unwrap_or(&self.0)
    }

    pub fn decode_bytes(&self) -> Result<Vec<u8>, CropError> {
        STANDARD
            .decode(self.base64_payload())
            .map_err(|e| CropError::DecodingFailed(e.to_string()))
    }

    pub fn decode(&self) -> Result<DynamicImage, CropError> {
        let bytes = self.decode_bytes()?;
        image::load_from_memory(&bytes).map_err(|e| CropError::DecodingFailed(e.to_string()))
    }
}

/// Crops `image` to `region`.
///
/// The region must lie fully inside the image.
pub fn crop(image: &RgbaImage, region: PixelRegion) -> Result<RgbaImage, CropError> {
    if region.width == 0 || region.height == 0 {
        return Err(CropError::ZeroDimension);
    }

    let (img_width, img_height) = image.dimensions();

    let fits_x = region.x.checked_add(region.width).is_some_and(|r| r <= img_width);
    let fits_y = region.y.checked_add(region.height).is_some_and(|b| b <= img_height);
    if !fits_x || !fits_y {
        return Err(CropError::OutOfBounds {
            requested: (region.x, region.y, region.width, region.height),
            image_size: (img_width, img_height),
        });
    }

    Ok(image::imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image())
}

/// Encodes pixels as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CropError> {
    let mut png_bytes: Vec<u8> = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| CropError::EncodingFailed(e.to_string()))?;
    Ok(png_bytes)
}

/// Crops `image` to `region` and returns PNG bytes.
pub fn crop_to_png_bytes(image: &RgbaImage, region: PixelRegion) -> Result<Vec<u8>, CropError> {
    let cropped = crop(image, region)?;
    encode_png(&cropped)
}

/// Crops and wraps the PNG as a data URL in one step.
pub fn crop_to_encoded(image: &RgbaImage, region: PixelRegion) -> Result<EncodedImage, CropError> {
    let start = std::time::Instant::now();
    let png_bytes = crop_to_png_bytes(image, region)?;
    log::info!(
        "[CAPTURE] Cropped region ({}x{} at {},{}) in {}ms — {} bytes",
        region.width,
        region.height,
        region.x,
        region.y,
        start.elapsed().as_millis(),
        png_bytes.len()
    );
    Ok(EncodedImage::png(&png_bytes))
}

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("Crop rectangle has zero width or height")]
    ZeroDimension,

    #[error(
        "Crop rectangle ({},{},{},{}) exceeds image bounds ({}x{})",
        requested.0, requested.1, requested.2, requested.3,
        image_size.0, image_size.1
    )]
    OutOfBounds {
        requested: (u32, u32, u32, u32),
        image_size: (u32, u32),
    },

    #[error("PNG encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Image decoding failed: {0}")]
    DecodingFailed(String),
}
