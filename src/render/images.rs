use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GenericImageView, ImageReader};
use thiserror::Error;

/// Longest side, in pixels, of any image embedded in a document.
pub const MAX_EMBED_DIMENSION: u32 = 1600;

#[derive(Debug, Error)]
pub enum ImageDecodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("malformed data URL: {0}")]
    DataUrl(String),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unreadable image: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported or corrupt image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decoded 8-bit RGB pixels, ready to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Payload of a `data:image/...;base64,` URL. Bare base64 is accepted too,
/// since some clients strip the prefix.
pub fn decode_data_url(value: &str) -> Result<Vec<u8>, ImageDecodeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ImageDecodeError::Empty);
    }

    let payload = if let Some(rest) = trimmed.strip_prefix("data:") {
        let (meta, data) = rest
            .split_once(',')
            .ok_or_else(|| ImageDecodeError::DataUrl("missing ',' separator".into()))?;
        if !meta.ends_with(";base64") {
            return Err(ImageDecodeError::DataUrl(format!(
                "expected base64 encoding, got '{meta}'"
            )));
        }
        data
    } else {
        trimmed
    };

    let cleaned: String = payload.chars().filter(|ch| !ch.is_whitespace()).collect();
    let bytes = STANDARD.decode(cleaned)?;
    if bytes.is_empty() {
        return Err(ImageDecodeError::Empty);
    }
    Ok(bytes)
}

pub fn decode_raster(bytes: &[u8]) -> Result<RasterImage, ImageDecodeError> {
    if bytes.is_empty() {
        return Err(ImageDecodeError::Empty);
    }

    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let image = reader.decode()?;

    let image = if image.width() > MAX_EMBED_DIMENSION || image.height() > MAX_EMBED_DIMENSION {
        image.thumbnail(MAX_EMBED_DIMENSION, MAX_EMBED_DIMENSION)
    } else {
        image
    };

    Ok(flatten_onto_white(&image))
}

/// Signatures are drawn on transparent canvases; dropping alpha directly
/// would turn the background black.
fn flatten_onto_white(image: &DynamicImage) -> RasterImage {
    let (width, height) = image.dimensions();
    let rgba = image.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for pixel in rgba.pixels() {
        let alpha = u32::from(pixel[3]);
        for channel in &pixel.0[..3] {
            let blended = (u32::from(*channel) * alpha + 255 * (255 - alpha)) / 255;
            rgb.push(blended as u8);
        }
    }
    RasterImage { width, height, rgb }
}
