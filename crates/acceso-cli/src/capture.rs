use std::fs;
use std::path::Path;

use acceso_core::payload::encode_data_uri;

use crate::errors::{AppError, AppResult};

const DATA_URI_PREFIX: &[u8] = b"data:";

/// Loads a photo file as the data-URI payload the core expects.
///
/// Files that already hold a data URI (as posted by a browser form) are
/// passed through; anything else is treated as raw image bytes.
pub fn read_capture(path: &Path) -> AppResult<String> {
    let bytes = fs::read(path).map_err(|source| AppError::CaptureRead {
        path: path.to_path_buf(),
        source,
    })?;
    let start = bytes
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let trimmed = &bytes[start..];
    if trimmed.starts_with(DATA_URI_PREFIX) {
        if let Ok(text) = std::str::from_utf8(trimmed) {
            return Ok(text.trim().to_string());
        }
    }
    Ok(encode_data_uri(&bytes))
}
