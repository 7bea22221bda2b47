//! Conversions between encoded image files and grayscale buffers.
//!
//! Reference images are stored as the original encoded file bytes; they are
//! decoded with the `image` crate only when a matcher bank is prepared.

use crate::image::{ImageView, OwnedImage};
use crate::util::{SlotWatchError, SlotWatchResult};
use image::imageops::FilterType;
use image::{GrayImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Creates a borrowed view from a grayscale image buffer.
pub fn view_from_gray_image(img: &GrayImage) -> SlotWatchResult<ImageView<'_, u8>> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    ImageView::from_slice(img.as_raw(), width, height)
}

/// Creates an owned image from a grayscale image buffer.
pub fn owned_from_gray_image(img: &GrayImage) -> SlotWatchResult<OwnedImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    OwnedImage::new(img.as_raw().clone(), width, height)
}

/// Decodes encoded image bytes (PNG or JPEG) into a grayscale image.
///
/// `name` only labels the error.
pub fn decode_gray(name: &str, bytes: &[u8]) -> SlotWatchResult<OwnedImage> {
    let img = image::load_from_memory(bytes).map_err(|err| SlotWatchError::Decode {
        name: name.to_string(),
        reason: err.to_string(),
    })?;
    owned_from_gray_image(&img.to_luma8())
}

/// Loads an image from disk and converts it to a grayscale owned image.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> SlotWatchResult<OwnedImage> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|err| SlotWatchError::io(path, err))?;
    decode_gray(&path.display().to_string(), &bytes)
}

/// Resizes a grayscale image with bilinear filtering.
///
/// Returns a clone when the size already matches.
pub fn resize_gray(img: &OwnedImage, width: usize, height: usize) -> SlotWatchResult<OwnedImage> {
    if width == 0 || height == 0 {
        return Err(SlotWatchError::InvalidDimensions { width, height });
    }
    if img.width() == width && img.height() == height {
        return Ok(img.clone());
    }
    let src = to_gray_image(img)?;
    let resized = image::imageops::resize(&src, width as u32, height as u32, FilterType::Triangle);
    owned_from_gray_image(&resized)
}

/// Encodes a grayscale image as PNG bytes.
pub fn encode_png(name: &str, img: &OwnedImage) -> SlotWatchResult<Vec<u8>> {
    let gray = to_gray_image(img)?;
    let mut out = Cursor::new(Vec::new());
    gray.write_to(&mut out, ImageFormat::Png)
        .map_err(|err| SlotWatchError::Decode {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
    Ok(out.into_inner())
}

fn to_gray_image(img: &OwnedImage) -> SlotWatchResult<GrayImage> {
    GrayImage::from_raw(img.width() as u32, img.height() as u32, img.data().to_vec()).ok_or(
        SlotWatchError::BufferTooSmall {
            needed: img.width() * img.height(),
            got: img.data().len(),
        },
    )
}
