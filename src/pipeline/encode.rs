//! Image encoding: persisted page PNG → base64 `ImageData` for the vision engine.
//!
//! Page images are already PNG on disk, so the bytes are wrapped as-is
//! instead of being decoded and re-encoded. `detail: "high"` keeps small print
//! (invoice numbers, IBANs) legible for tiling vision models.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

/// Read a page PNG and wrap it as a base64 image attachment.
pub async fn encode_page_file(path: &Path) -> std::io::Result<ImageData> {
    let bytes = tokio::fs::read(path).await?;
    Ok(encode_png_bytes(&bytes))
}

/// Wrap PNG bytes as a base64 image attachment.
pub fn encode_png_bytes(png: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(png);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}
