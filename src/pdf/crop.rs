//! Raster cropping for page excerpts
//!
//! Crops a rendered page image to a rectangle given in 1/10000 units of
//! the page dimensions. Pure pixel work on an already-rendered PNG; the
//! renderer itself lives in [`super::extract`].

use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::cache::{FileCache, Namespace};
use crate::error::{AppError, Result};

use super::types::{CropRequest, CROP_SCALE};

/// Crop a rendered page according to the request rectangle and return the
/// cached PNG path. The source page must already be rendered; callers go
/// through [`super::PdfExtractor::render_page`] first.
pub fn crop_page(
    cache: &FileCache,
    item_id: &str,
    page_png: &Path,
    request: &CropRequest,
) -> Result<PathBuf> {
    request.validate()?;

    let key = crop_key(item_id, request);
    if let Some(path) = cache.get(Namespace::Temp, &key)? {
        return Ok(path);
    }

    let image = image::open(page_png)?;
    let cropped = crop_raster(&image, request)?;

    let mut bytes = Vec::new();
    cropped.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    cache.put(Namespace::Temp, &key, &bytes)
}

/// Apply the crop rectangle to a loaded image. Fractional units are
/// converted to pixels against the actual raster dimensions, so the same
/// request works for any zoom tier.
pub(crate) fn crop_raster(
    image: &image::DynamicImage,
    request: &CropRequest,
) -> Result<image::DynamicImage> {
    let x = to_pixels(request.x, image.width());
    let y = to_pixels(request.y, image.height());
    let width = to_pixels(request.width, image.width()).max(1);
    let height = to_pixels(request.height, image.height()).max(1);

    if x >= image.width() || y >= image.height() {
        return Err(AppError::Validation(
            "crop origin outside page bounds".to_string(),
        ));
    }

    let width = width.min(image.width() - x);
    let height = height.min(image.height() - y);
    Ok(image.crop_imm(x, y, width, height))
}

fn to_pixels(value: u32, dimension: u32) -> u32 {
    (value as u64 * dimension as u64 / CROP_SCALE as u64) as u32
}

fn crop_key(item_id: &str, request: &CropRequest) -> String {
    format!(
        "crop-{}-{}-{}-{}-{}-{}-{}.png",
        crate::cache::store::sanitize_id(item_id),
        request.page,
        request.x,
        request.y,
        request.width,
        request.height,
        request.zoom.dpi()
    )
}
