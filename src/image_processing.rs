use std::io::Cursor;
use std::path::Path;

use image::ImageFormat;
use tracing::debug;

use crate::data_url::DataUrl;
use crate::error::{Result, StudioError};

/// Media type sent to the model for every input image.
pub const REQUEST_MIME_TYPE: &str = "image/png";

pub fn mime_type_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Bmp => Some("image/bmp"),
        _ => None,
    }
}

/// Sniffs the bytes and wraps them in a data URL. Non-images are rejected.
pub fn to_data_url(bytes: &[u8]) -> Result<DataUrl> {
    if bytes.is_empty() {
        return Err(StudioError::InvalidInput("uploaded file is empty".into()));
    }
    let format = image::guess_format(bytes)
        .map_err(|_| StudioError::InvalidInput("file is not a supported image".into()))?;
    let mime_type = mime_type_for(format).ok_or_else(|| {
        StudioError::InvalidInput(format!("unsupported image format: {format:?}"))
    })?;
    Ok(DataUrl::from_bytes(mime_type, bytes))
}

pub async fn load_data_url(path: &Path) -> Result<DataUrl> {
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        StudioError::InvalidInput(format!("cannot read {}: {err}", path.display()))
    })?;
    to_data_url(&bytes)
}

/// Accepts a data URL or a local file path.
pub async fn resolve_image_input(input: &str) -> Result<DataUrl> {
    let trimmed = input.trim();
    if trimmed.starts_with("data:") {
        return trimmed.parse();
    }
    load_data_url(Path::new(trimmed)).await
}

/// Returns the base64 PNG payload for `input`, re-encoding when the source
/// is another format.
pub fn png_payload(input: &DataUrl) -> Result<String> {
    if input.mime_type() == REQUEST_MIME_TYPE {
        return Ok(input.data().to_string());
    }
    let bytes = input.decode()?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|err| StudioError::InvalidInput(format!("cannot decode image: {err}")))?;
    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| StudioError::InvalidInput(format!("cannot re-encode image: {err}")))?;
    debug!(
        from = input.mime_type(),
        bytes = out.get_ref().len(),
        "input image converted to PNG"
    );
    Ok(DataUrl::from_bytes(REQUEST_MIME_TYPE, out.get_ref()).data().to_string())
}
