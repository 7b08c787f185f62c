//! Input size normalization.
//!
//! Shrinks oversized photos so the longest axis matches the configured
//! limit before any other work happens. This runs once per image, so a
//! high-quality Lanczos filter is used rather than a fast one.
//!
//! If the image is already at or below the limit, it is returned
//! unchanged.

use image::imageops::{self, FilterType};

use crate::types::RgbaImage;

/// Resampling filter for normalization.
const NORMALIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Target dimensions for scaling `(width, height)` so the longest side
/// equals `longest_side`.
///
/// Each side is `round(dim * scale)`, floored to 1.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn target_dimensions(width: u32, height: u32, longest_side: u32) -> (u32, u32) {
    let long_axis = width.max(height).max(1);
    let scale = f64::from(longest_side) / f64::from(long_axis);
    let scaled = |dim: u32| ((f64::from(dim) * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

/// Shrink `image` so its longest axis is at most `longest_side` pixels.
///
/// Returns the (possibly unchanged) image and whether resampling was
/// actually applied. Never enlarges.
#[must_use]
pub fn normalize(image: RgbaImage, longest_side: u32) -> (RgbaImage, bool) {
    let (w, h) = image.dimensions();
    if w.max(h) <= longest_side {
        return (image, false);
    }

    let (tw, th) = target_dimensions(w, h, longest_side);
    tracing::debug!(from_w = w, from_h = h, to_w = tw, to_h = th, "normalizing input");
    (imageops::resize(&image, tw, th, NORMALIZE_FILTER), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        })
    }

    #[test]
    fn no_normalize_when_already_small() {
        let img = test_image(100, 80);
        let (result, applied) = normalize(img.clone(), 256);
        assert!(!applied);
        assert_eq!(result, img, "no-op must be byte-identical");
    }

    #[test]
    fn no_normalize_when_exact_match() {
        let img = test_image(256, 200);
        let (result, applied) = normalize(img.clone(), 256);
        assert!(!applied);
        assert_eq!(result, img);
    }

    #[test]
    fn normalize_landscape() {
        let (result, applied) = normalize(test_image(1024, 768), 256);
        assert!(applied);
        assert_eq!(result.dimensions(), (256, 192));
    }

    #[test]
    fn normalize_portrait() {
        let (result, applied) = normalize(test_image(600, 1200), 256);
        assert!(applied);
        assert_eq!(result.dimensions(), (128, 256));
    }

    #[test]
    fn normalize_rounds_short_side() {
        // 1000x333 -> scale 0.1 -> 100 x 33.3 -> 33
        assert_eq!(target_dimensions(1000, 333, 100), (100, 33));
        // 1000x335 -> 33.5 rounds up
        assert_eq!(target_dimensions(1000, 335, 100), (100, 34));
    }

    #[test]
    fn extreme_aspect_ratio_floors_to_one() {
        assert_eq!(target_dimensions(10_000, 3, 100), (100, 1));
        let (result, applied) = normalize(test_image(4000, 2), 64);
        assert!(applied);
        assert_eq!(result.dimensions(), (64, 1));
    }

    #[test]
    fn never_exceeds_limit() {
        for (w, h) in [(1001, 999), (3, 4097), (777, 777), (2049, 1)] {
            for limit in [1, 7, 100, 512] {
                let (tw, th) = target_dimensions(w, h, limit);
                assert!(
                    tw.max(th) <= limit,
                    "{w}x{h} at limit {limit} gave {tw}x{th}"
                );
            }
        }
    }

    #[test]
    fn normalize_preserves_uniform_color() {
        let img = RgbaImage::from_pixel(300, 300, image::Rgba([40, 80, 120, 255]));
        let (result, _) = normalize(img, 100);
        for p in result.pixels() {
            for (got, want) in p.0.iter().zip([40u8, 80, 120, 255]) {
                assert!(got.abs_diff(want) <= 1, "pixel {:?}", p.0);
            }
        }
    }
}
