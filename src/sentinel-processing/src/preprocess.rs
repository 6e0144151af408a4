//! Grayscale conversion and smoothing applied to every frame

use image::{imageops, GrayImage, RgbImage};
use imageproc::filter::gaussian_blur_f32;

/// Convert to grayscale and apply a Gaussian blur
///
/// A non-positive sigma skips the blur.
pub fn prepare(image: &RgbImage, blur_sigma: f32) -> GrayImage {
    let gray = imageops::grayscale(image);
    if blur_sigma > 0.0 {
        gaussian_blur_f32(&gray, blur_sigma)
    } else {
        gray
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_prepare_keeps_dimensions() {
        let image = RgbImage::from_pixel(32, 24, Rgb([200, 10, 10]));
        let gray = prepare(&image, 1.0);
        assert_eq!(gray.dimensions(), (32, 24));
    }

    #[test]
    fn test_uniform_frame_stays_uniform() {
        let image = RgbImage::from_pixel(16, 16, Rgb([90, 90, 90]));
        let gray = prepare(&image, 2.0);
        // the blur may shift the level slightly but must keep it flat
        let first = gray.get_pixel(0, 0)[0];
        assert!(first.abs_diff(90) <= 3, "level drifted to {}", first);
        assert!(gray.pixels().all(|p| p[0].abs_diff(first) <= 1));
    }

    #[test]
    fn test_zero_sigma_skips_blur() {
        let mut image = RgbImage::new(8, 8);
        image.put_pixel(4, 4, Rgb([255, 255, 255]));
        let gray = prepare(&image, 0.0);
        assert_eq!(gray.get_pixel(4, 4)[0], 255);
        assert_eq!(gray.get_pixel(3, 4)[0], 0);
    }
}
