//! Image decoding: base64 field → raw bytes → PNG for the recognizer.
//!
//! The request carries the image as base64 text. The raw decoded bytes are
//! what the extraction cache hashes, so two submissions of the same file hit
//! the same entry regardless of how the base64 was wrapped. Before recognition
//! the bytes are decoded with the `image` crate and re-encoded as PNG: that
//! both validates the upload and hands tesseract one lossless format.

use crate::error::TaError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Cursor;
use tracing::debug;

/// Decode the base64 `image` field of a request.
///
/// Accepts an optional `data:<mime>;base64,` prefix. ASCII whitespace
/// anywhere in the payload is dropped, so line-wrapped base64 decodes.
pub fn decode_image_field(field: &str) -> Result<Vec<u8>, TaError> {
    let trimmed = field.trim();
    let payload = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    let compact: Vec<u8> = payload
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    let bytes = STANDARD.decode(&compact).map_err(|e| TaError::ImageDecode {
        reason: format!("invalid base64: {e}"),
    })?;
    debug!("Decoded image field → {} bytes", bytes.len());
    Ok(bytes)
}

/// Decode arbitrary image bytes and re-encode them as PNG.
pub fn normalise_to_png(bytes: &[u8]) -> Result<Vec<u8>, TaError> {
    let img = image::load_from_memory(bytes).map_err(|e| TaError::ImageDecode {
        reason: e.to_string(),
    })?;

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| TaError::ImageDecode {
            reason: format!("PNG re-encoding failed: {e}"),
        })?;
    Ok(buf)
}
