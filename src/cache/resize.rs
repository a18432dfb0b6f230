use image::imageops::FilterType;
use image::{ImageFormat, ImageReader};
use std::path::Path;
use tracing::debug;

use crate::errors::{CacheError, CacheResult};

/// Decode `src`, shrink it to fit inside `max`x`max` keeping its aspect
/// ratio, and write it to `dest` in the source format. Smaller images are
/// re-encoded unchanged. Blocking.
pub fn resize_to_fit(src: &Path, dest: &Path, max: u32) -> CacheResult<()> {
    let reader = ImageReader::open(src)
        .map_err(|e| CacheError::io(src, e))?
        .with_guessed_format()
        .map_err(|e| CacheError::io(src, e))?;
    let format = reader
        .format()
        .or_else(|| ImageFormat::from_path(dest).ok())
        .unwrap_or(ImageFormat::Png);

    let image = reader.decode().map_err(|source| CacheError::Image {
        path: src.to_path_buf(),
        source,
    })?;

    let (width, height) = (image.width(), image.height());
    let image = if width > max || height > max {
        image.resize(max, max, FilterType::Lanczos3)
    } else {
        image
    };
    debug!(
        "Resized {}x{} -> {}x{} ({:?})",
        width,
        height,
        image.width(),
        image.height(),
        format
    );

    image
        .save_with_format(dest, format)
        .map_err(|source| CacheError::Image {
            path: dest.to_path_buf(),
            source,
        })
}
