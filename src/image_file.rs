//! Loading input images.

use tokio::fs;

use crate::prelude::*;

/// The image we OCR when no input path is given.
pub const DEFAULT_IMAGE_PATH: &str = "./image/ocr-sample.png";

/// Read an image file into memory, exactly as stored on disk.
#[instrument(level = "debug")]
pub async fn read_image(path: &Path) -> Result<Vec<u8>> {
    let data = fs::read(path)
        .await
        .with_context(|| format!("Failed to read image at path: {:?}", path))?;
    debug!(bytes = data.len(), "Read image");
    Ok(data)
}
