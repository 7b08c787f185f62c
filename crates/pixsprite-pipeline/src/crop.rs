//! Subject cropping from the alpha channel.
//!
//! After background removal the subject is whatever remains visible.
//! [`subject_bounds`] finds the tight inclusive bounding box of pixels
//! whose alpha exceeds a threshold, and [`crop`] copies that region out
//! pixel for pixel.
//!
//! A buffer with no qualifying pixels has no bounds. That is not an
//! error: [`crop_to_subject`] falls back to the full frame.
//! [`take_subject`] does the same on an owned buffer and hands the frame
//! back without copying it.

use crate::types::{Rect, RgbaImage};

/// Alpha above which a pixel counts as part of the subject.
pub const SUBJECT_ALPHA_THRESHOLD: u8 = 16;

/// Tight bounding box of all pixels with alpha strictly greater than
/// `alpha_threshold`.
///
/// Returns `None` when no pixel qualifies.
#[must_use]
pub fn subject_bounds(image: &RgbaImage, alpha_threshold: u8) -> Option<Rect> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut found = false;

    for (x, y, p) in image.enumerate_pixels() {
        if p.0[3] > alpha_threshold {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| Rect {
        x: min_x,
        y: min_y,
        w: (max_x - min_x + 1).max(1),
        h: (max_y - min_y + 1).max(1),
    })
}

/// Copy `rect` out of `image` into a new buffer of the rect's size.
///
/// The rect is clipped to the image, so a rect reaching past the edge
/// yields a smaller buffer rather than a panic.
#[must_use]
pub fn crop(image: &RgbaImage, rect: Rect) -> RgbaImage {
    let x = rect.x.min(image.width());
    let y = rect.y.min(image.height());
    let w = rect.w.min(image.width() - x);
    let h = rect.h.min(image.height() - y);
    image::imageops::crop_imm(image, x, y, w, h).to_image()
}

/// Crop `image` to its subject, falling back to the full frame.
///
/// Returns the cropped buffer, the rect that was used, and whether a
/// subject was actually found.
#[must_use]
pub fn crop_to_subject(image: &RgbaImage, alpha_threshold: u8) -> (RgbaImage, Rect, bool) {
    match subject_bounds(image, alpha_threshold) {
        Some(rect) => (crop(image, rect), rect, true),
        None => full_frame(image.clone()),
    }
}

/// Owned form of [`crop_to_subject`].
///
/// `image` is dropped once the subject is copied out; the full-frame
/// fallback returns it as is.
#[must_use]
pub fn take_subject(image: RgbaImage, alpha_threshold: u8) -> (RgbaImage, Rect, bool) {
    match subject_bounds(&image, alpha_threshold) {
        Some(rect) => (crop(&image, rect), rect, true),
        None => full_frame(image),
    }
}

fn full_frame(image: RgbaImage) -> (RgbaImage, Rect, bool) {
    let rect = Rect::full(image.width(), image.height());
    tracing::debug!(
        width = rect.w,
        height = rect.h,
        "no subject pixels, using full frame"
    );
    (image, rect, false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn transparent(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba([0, 0, 0, 0]))
    }

    #[test]
    fn fully_transparent_has_no_bounds() {
        assert_eq!(subject_bounds(&transparent(32, 32), 16), None);
    }

    #[test]
    fn fallback_is_full_frame() {
        let img = transparent(32, 20);
        let (cropped, rect, found) = crop_to_subject(&img, 16);
        assert!(!found);
        assert_eq!(rect, Rect::full(32, 20));
        assert_eq!(cropped.dimensions(), (32, 20));
    }

    #[test]
    fn single_pixel_subject() {
        let mut img = transparent(10, 10);
        img.put_pixel(4, 7, image::Rgba([255, 255, 255, 255]));
        assert_eq!(
            subject_bounds(&img, 16),
            Some(Rect {
                x: 4,
                y: 7,
                w: 1,
                h: 1
            })
        );
    }

    #[test]
    fn bounds_are_inclusive() {
        let mut img = transparent(20, 20);
        img.put_pixel(2, 3, image::Rgba([1, 1, 1, 200]));
        img.put_pixel(11, 15, image::Rgba([1, 1, 1, 200]));
        let rect = subject_bounds(&img, 16).unwrap();
        assert_eq!(
            rect,
            Rect {
                x: 2,
                y: 3,
                w: 10,
                h: 13
            }
        );
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut img = transparent(5, 5);
        img.put_pixel(1, 1, image::Rgba([9, 9, 9, 16]));
        assert_eq!(subject_bounds(&img, 16), None);
        img.put_pixel(1, 1, image::Rgba([9, 9, 9, 17]));
        assert!(subject_bounds(&img, 16).is_some());
    }

    #[test]
    fn crop_copies_pixels_exactly() {
        let img = RgbaImage::from_fn(8, 8, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            image::Rgba([x as u8, y as u8, 0, 255])
        });
        let rect = Rect {
            x: 2,
            y: 5,
            w: 3,
            h: 2,
        };
        let out = crop(&img, rect);
        assert_eq!(out.dimensions(), (3, 2));
        assert_eq!(out.get_pixel(0, 0).0, [2, 5, 0, 255]);
        assert_eq!(out.get_pixel(2, 1).0, [4, 6, 0, 255]);
    }

    #[test]
    fn crop_clips_rect_to_image() {
        let img = transparent(4, 4);
        let out = crop(
            &img,
            Rect {
                x: 2,
                y: 2,
                w: 10,
                h: 10,
            },
        );
        assert_eq!(out.dimensions(), (2, 2));
    }

    #[test]
    fn crop_to_subject_uses_bounds() {
        let mut img = transparent(16, 16);
        for y in 4..8 {
            for x in 6..12 {
                img.put_pixel(x, y, image::Rgba([200, 10, 10, 255]));
            }
        }
        let (cropped, rect, found) = crop_to_subject(&img, SUBJECT_ALPHA_THRESHOLD);
        assert!(found);
        assert_eq!(
            rect,
            Rect {
                x: 6,
                y: 4,
                w: 6,
                h: 4
            }
        );
        assert!(cropped.pixels().all(|p| p.0 == [200, 10, 10, 255]));
    }

    #[test]
    fn take_subject_matches_borrowed_crop() {
        let mut img = transparent(16, 16);
        img.put_pixel(3, 9, image::Rgba([1, 2, 3, 255]));
        img.put_pixel(7, 12, image::Rgba([4, 5, 6, 255]));
        let borrowed = crop_to_subject(&img, SUBJECT_ALPHA_THRESHOLD);
        assert_eq!(take_subject(img, SUBJECT_ALPHA_THRESHOLD), borrowed);
    }

    #[test]
    fn take_subject_fallback_reuses_buffer() {
        let img = transparent(12, 10);
        let before = img.as_raw().as_ptr();
        let (frame, rect, found) = take_subject(img, SUBJECT_ALPHA_THRESHOLD);
        assert!(!found);
        assert_eq!(rect, Rect::full(12, 10));
        assert_eq!(frame.as_raw().as_ptr(), before);
    }
}
