//! Sobel gradient-magnitude edge detection.
//!
//! The image is first reduced to a luminance plane, then
//! [`imageproc::gradients::sobel_gradients`] computes `sqrt(gx² + gy²)`
//! at every pixel with clamp-to-edge reads, so the output has exactly the
//! input's dimensions. The magnitude is saturated to 255 and written to
//! R, G and B; alpha is always 255 so the edge map is fully opaque.

use image::{GrayImage, Luma};

use crate::types::{CHANNELS, PixelBuffer};

/// BT.601 luminance weights in thousandths: R, G, B.
const LUMA_WEIGHTS: [u32; 3] = [299, 587, 114];

/// Convert an RGBA buffer to a single-channel luminance plane.
///
/// Uses integer BT.601 weights, `(299 R + 587 G + 114 B) / 1000`;
/// alpha is ignored.
#[must_use = "returns the luminance plane"]
pub fn luminance(image: &PixelBuffer) -> GrayImage {
    let bytes = image.as_bytes();
    let cols = image.dimensions().cols();
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let idx = (y as usize * cols + x as usize) * CHANNELS;
        let weighted: u32 = LUMA_WEIGHTS
            .iter()
            .zip(&bytes[idx..idx + 3])
            .map(|(&w, &v)| w * u32::from(v))
            .sum();
        // At most 255 * 1000 / 1000, so the value fits.
        Luma([u8::try_from(weighted / 1000).unwrap_or(u8::MAX)])
    })
}

/// Run Sobel edge detection on `image`.
///
/// Returns an opaque grey-scale RGBA buffer of the same dimensions where
/// brighter pixels mark stronger luminance gradients.
#[must_use = "returns the edge map"]
pub fn sobel_edge_detect(image: &PixelBuffer) -> PixelBuffer {
    let gradients = imageproc::gradients::sobel_gradients(&luminance(image));

    let mut out = Vec::with_capacity(image.as_bytes().len());
    for &magnitude in gradients.as_raw() {
        let v = u8::try_from(magnitude).unwrap_or(u8::MAX);
        out.extend_from_slice(&[v, v, v, u8::MAX]);
    }
    PixelBuffer::from_kernel_output(image.dimensions(), out)
}
