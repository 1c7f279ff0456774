//! Data-URI image payloads as submitted by capture front ends.

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use thiserror::Error;

const DEFAULT_EXTENSION: &str = "png";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload is empty")]
    Empty,
    #[error("payload has no ',' separating the header from the image data")]
    MissingSeparator,
    #[error("payload data is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("payload decoded to zero bytes")]
    NoImageData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    /// File extension used when the image is stored as a sample.
    pub fn extension(&self) -> &'static str {
        if let Ok(format) = image::guess_format(&self.bytes) {
            if let Some(ext) = format.extensions_str().first().copied() {
                return ext;
            }
        }
        self.media_type
            .as_deref()
            .and_then(ImageFormat::from_mime_type)
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or(DEFAULT_EXTENSION)
    }
}

/// Splits `data:<media-type>;base64,<data>` and decodes the data part.
pub fn decode_data_uri(payload: &str) -> Result<DecodedImage, PayloadError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(PayloadError::Empty);
    }
    let (header, data) = payload
        .split_once(',')
        .ok_or(PayloadError::MissingSeparator)?;

    let compact: String = data.chars().filter(|ch| !ch.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| PayloadError::InvalidBase64(err.to_string()))?;
    if bytes.is_empty() {
        return Err(PayloadError::NoImageData);
    }

    Ok(DecodedImage {
        media_type: media_type_from_header(header),
        bytes,
    })
}

/// Wraps raw image bytes into the transport format accepted by [`decode_data_uri`].
pub fn encode_data_uri(bytes: &[u8]) -> String {
    let media_type = image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!(
        "data:{media_type};base64,{}",
        general_purpose::STANDARD.encode(bytes)
    )
}

fn media_type_from_header(header: &str) -> Option<String> {
    let rest = header.trim().strip_prefix("data:")?;
    let media_type = rest.split(';').next()?.trim();
    if media_type.is_empty() {
        None
    } else {
        Some(media_type.to_ascii_lowercase())
    }
}
