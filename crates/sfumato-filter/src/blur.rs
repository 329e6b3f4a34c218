//! Gaussian blur over RGBA buffers.
//!
//! R, G and B are split into `f32` planes and each plane is blurred with
//! [`imageproc::filter::gaussian_blur_f32`], so the separable passes keep
//! full precision and rounding happens once when the planes are packed
//! back into bytes. imageproc pads by edge continuity and sizes the
//! kernel from sigma alone.
//!
//! Alpha is copied through unchanged, so a blurred opaque image stays
//! opaque and transparent cut-outs keep their hard mask.

use image::{ImageBuffer, Luma};

use crate::types::{BlurFactor, CHANNELS, FilterConfig, PixelBuffer};

/// Colour channels that take part in the blur.
const COLOR_CHANNELS: usize = 3;

/// One colour channel as a full-precision single-channel image.
type FloatPlane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Blur `image` with the strength selected by `factor`.
///
/// [`BlurFactor::MIN`] (and anything clamped to it) returns an exact
/// copy, which avoids a degenerate near-zero sigma. Output dimensions
/// always equal input dimensions.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(
    image: &PixelBuffer,
    factor: BlurFactor,
    config: &FilterConfig,
) -> PixelBuffer {
    if factor <= BlurFactor::MIN {
        return image.clone();
    }
    gaussian_blur_sigma(image, factor.sigma(config))
}

/// Blur `image` with an explicit Gaussian `sigma`.
///
/// Non-positive or non-finite sigma values return the image unchanged.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur_sigma(image: &PixelBuffer, sigma: f32) -> PixelBuffer {
    // imageproc panics on sigma <= 0.
    if !sigma.is_finite() || sigma <= 0.0 {
        return image.clone();
    }

    let bytes = image.as_bytes();
    let cols = image.dimensions().cols();
    let planes: [FloatPlane; COLOR_CHANNELS] = std::array::from_fn(|c| {
        FloatPlane::from_fn(image.width(), image.height(), |x, y| {
            Luma([f32::from(bytes[(y as usize * cols + x as usize) * CHANNELS + c])])
        })
    });

    let blurred = blur_planes(&planes, sigma);

    let mut output = Vec::with_capacity(bytes.len());
    for (i, px) in bytes.chunks_exact(CHANNELS).enumerate() {
        for plane in &blurred {
            output.push(to_byte(plane.as_raw()[i]));
        }
        output.push(px[3]);
    }
    PixelBuffer::from_kernel_output(image.dimensions(), output)
}

#[cfg(feature = "parallel")]
fn blur_planes(planes: &[FloatPlane], sigma: f32) -> Vec<FloatPlane> {
    use rayon::prelude::*;

    planes
        .par_iter()
        .map(|plane| imageproc::filter::gaussian_blur_f32(plane, sigma))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn blur_planes(planes: &[FloatPlane], sigma: f32) -> Vec<FloatPlane> {
    planes
        .iter()
        .map(|plane| imageproc::filter::gaussian_blur_f32(plane, sigma))
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_byte(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// 10x10 image with a sharp black-to-white boundary at x=5.
    fn sharp_edge_image() -> PixelBuffer {
        PixelBuffer::from_fn(10, 10, |x, _y| {
            if x < 5 {
                [0, 0, 0, 255]
            } else {
                [255, 255, 255, 255]
            }
        })
        .unwrap()
    }

    #[test]
    fn min_factor_returns_identical_image() {
        let img = sharp_edge_image();
        let blurred = gaussian_blur(&img, BlurFactor::MIN, &FilterConfig::default());
        assert_eq!(img, blurred);
    }

    #[test]
    fn non_positive_sigma_returns_identical_image() {
        let img = sharp_edge_image();
        assert_eq!(gaussian_blur_sigma(&img, 0.0), img);
        assert_eq!(gaussian_blur_sigma(&img, -1.0), img);
        assert_eq!(gaussian_blur_sigma(&img, f32::NAN), img);
    }

    #[test]
    fn output_dimensions_preserved() {
        let img = PixelBuffer::from_fn(17, 31, |x, y| {
            [u8::try_from(x).unwrap(), u8::try_from(y).unwrap(), 0, 255]
        })
        .unwrap();
        let blurred = gaussian_blur(&img, BlurFactor::new(30), &FilterConfig::default());
        assert_eq!(blurred.dimensions(), img.dimensions());
    }

    #[test]
    fn blur_smooths_sharp_edge() {
        let img = sharp_edge_image();
        let blurred = gaussian_blur(&img, BlurFactor::new(10), &FilterConfig::default());

        let left_of_edge = blurred.pixel(4, 5).unwrap()[0];
        let right_of_edge = blurred.pixel(5, 5).unwrap()[0];
        assert!(
            left_of_edge > 0,
            "expected blur to raise left-of-edge above 0, got {left_of_edge}",
        );
        assert!(
            right_of_edge < 255,
            "expected blur to lower right-of-edge below 255, got {right_of_edge}",
        );
    }

    #[test]
    fn bright_dot_spreads_symmetrically() {
        let img = PixelBuffer::from_fn(9, 9, |x, y| {
            if (x, y) == (4, 4) {
                [255, 255, 255, 255]
            } else {
                [0, 0, 0, 255]
            }
        })
        .unwrap();
        let blurred = gaussian_blur(&img, BlurFactor::new(5), &FilterConfig::default());

        let center = blurred.pixel(4, 4).unwrap()[0];
        assert!(center < 255, "center was not spread, got {center}");
        for (dx, dy) in [(1, 0), (0, 1), (2, 2)] {
            let a = blurred.pixel(4 + dx, 4 + dy).unwrap()[0];
            let b = blurred.pixel(4 - dx, 4 - dy).unwrap()[0];
            assert!(a.abs_diff(b) <= 1, "asymmetric at ({dx},{dy}): {a} vs {b}");
        }
        assert!(blurred.pixel(5, 4).unwrap()[0] > 0);
    }

    #[test]
    fn grey_image_matches_imageproc_within_rounding() {
        // imageproc's u8 path truncates between passes; ours rounds once.
        let img = PixelBuffer::from_fn(20, 12, |x, y| {
            let v = u8::try_from((x * 13 + y * 7) % 256).unwrap();
            [v, v, v, 255]
        })
        .unwrap();
        let config = FilterConfig::default();
        let factor = BlurFactor::new(12);
        let ours = gaussian_blur(&img, factor, &config);

        let gray = image::GrayImage::from_fn(20, 12, |x, y| Luma([img.pixel(x, y).unwrap()[0]]));
        let reference = imageproc::filter::gaussian_blur_f32(&gray, factor.sigma(&config));

        for (x, y, px) in reference.enumerate_pixels() {
            let got = ours.pixel(x, y).unwrap()[0];
            assert!(
                got.abs_diff(px.0[0]) <= 2,
                "({x},{y}): ours={got} imageproc={}",
                px.0[0]
            );
        }
    }

    #[test]
    fn uniform_image_unchanged_by_any_factor() {
        let img = PixelBuffer::from_fn(12, 9, |_, _| [100, 150, 200, 255]).unwrap();
        let config = FilterConfig::default();
        for factor in [1, 2, 10, 50, 100] {
            let blurred = gaussian_blur(&img, BlurFactor::new(factor), &config);
            assert_eq!(blurred, img, "uniform image drifted at factor {factor}");
        }
    }

    #[test]
    fn alpha_is_preserved() {
        // Alternating alpha columns must come through untouched while the
        // colour channels are smoothed.
        let img = PixelBuffer::from_fn(8, 8, |x, _| {
            if x % 2 == 0 {
                [255, 0, 0, 255]
            } else {
                [0, 0, 255, 40]
            }
        })
        .unwrap();
        let blurred = gaussian_blur(&img, BlurFactor::new(15), &FilterConfig::default());
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(
                    blurred.pixel(x, y).unwrap()[3],
                    img.pixel(x, y).unwrap()[3],
                    "alpha changed at ({x},{y})",
                );
            }
        }
        assert_ne!(blurred.pixel(3, 3).unwrap()[0], 0, "colour was not blurred");
    }

    #[test]
    fn single_pixel_image_is_stable() {
        let img = PixelBuffer::new(vec![9, 8, 7, 6], 1, 1).unwrap();
        let blurred = gaussian_blur(&img, BlurFactor::MAX, &FilterConfig::default());
        assert_eq!(blurred, img);
    }

    #[test]
    fn blur_is_deterministic() {
        let img = sharp_edge_image();
        let config = FilterConfig::default();
        let a = gaussian_blur(&img, BlurFactor::new(37), &config);
        let b = gaussian_blur(&img, BlurFactor::new(37), &config);
        assert_eq!(a, b);
    }
}
