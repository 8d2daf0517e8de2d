//! Photo preparation for upload.
//!
//! The server is always told it receives `photo.jpg` as `image/jpeg`, so
//! anything that is not already JPEG gets re-encoded first.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use tracing::{debug, info};

use crate::error::ApiError;

/// Return `bytes` as JPEG: untouched if already JPEG, re-encoded otherwise.
pub fn to_jpeg(bytes: Vec<u8>) -> Result<Vec<u8>, ApiError> {
    let format = image::guess_format(&bytes)?;
    if format == ImageFormat::Jpeg {
        debug!("Photo is already JPEG ({} bytes)", bytes.len());
        return Ok(bytes);
    }

    let img = image::load_from_memory_with_format(&bytes, format)?;
    // JPEG carries no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)?;
    info!(
        "Re-encoded {:?} photo to JPEG ({} -> {} bytes)",
        format,
        bytes.len(),
        out.len()
    );
    Ok(out)
}
