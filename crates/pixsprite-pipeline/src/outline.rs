//! Outline generation by alpha mask dilation.
//!
//! The sprite's silhouette is the set of pixels with alpha above
//! [`OUTLINE_ALPHA_THRESHOLD`]. Growing that mask by `thickness` pixels
//! under the Chebyshev (8-neighborhood) metric and removing the original
//! silhouette leaves a band that hugs the sprite from outside. Band
//! pixels are opaque black; everything else is fully transparent.
//!
//! Dilation uses `imageproc` for radii below 255. Its distance transform
//! saturates at `u8::MAX`, so larger radii fall back to a multi-source
//! breadth-first search, which computes the same Chebyshev distances.

use std::collections::VecDeque;

use image::Luma;
use imageproc::distance_transform::Norm;

use crate::types::{GrayImage, RgbaImage};

/// Alpha above which a sprite pixel belongs to the silhouette.
pub const OUTLINE_ALPHA_THRESHOLD: u8 = 10;

/// Pixel value written for outline band pixels.
pub const OUTLINE_COLOR: image::Rgba<u8> = image::Rgba([0, 0, 0, 255]);

/// Binary silhouette of `sprite`: 255 where alpha exceeds the threshold,
/// 0 elsewhere.
#[must_use]
pub fn silhouette(sprite: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(sprite.width(), sprite.height(), |x, y| {
        if sprite.get_pixel(x, y).0[3] > OUTLINE_ALPHA_THRESHOLD {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Grow `mask` by `radius` pixels under the Chebyshev metric.
///
/// Foreground is any nonzero pixel. Pixels outside the buffer are
/// treated as background and never produced. An empty mask stays empty.
#[must_use]
pub fn dilate_chebyshev(mask: &GrayImage, radius: u32) -> GrayImage {
    if mask.pixels().all(|p| p.0[0] == 0) {
        return GrayImage::new(mask.width(), mask.height());
    }
    match u8::try_from(radius) {
        Ok(k) if k < u8::MAX => imageproc::morphology::dilate(mask, Norm::LInf, k),
        _ => dilate_bfs(mask, radius),
    }
}

/// Breadth-first dilation for radii where `imageproc` saturates.
fn dilate_bfs(mask: &GrayImage, radius: u32) -> GrayImage {
    let (w, h) = mask.dimensions();
    let mut out = GrayImage::new(w, h);
    let mut distance = vec![u32::MAX; (w as usize) * (h as usize)];
    let mut frontier = VecDeque::new();
    let index = |x: u32, y: u32| (y as usize) * (w as usize) + x as usize;

    for (x, y, p) in mask.enumerate_pixels() {
        if p.0[0] != 0 {
            distance[index(x, y)] = 0;
            out.put_pixel(x, y, Luma([255]));
            frontier.push_back((x, y));
        }
    }

    while let Some((x, y)) = frontier.pop_front() {
        let d = distance[index(x, y)];
        if d >= radius {
            continue;
        }
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let i = index(nx, ny);
                if distance[i] == u32::MAX {
                    distance[i] = d + 1;
                    out.put_pixel(nx, ny, Luma([255]));
                    frontier.push_back((nx, ny));
                }
            }
        }
    }

    out
}

/// Build the outline layer for `sprite`.
///
/// The result has the sprite's dimensions. A thickness of 0 yields a
/// fully transparent buffer.
#[must_use]
pub fn outline(sprite: &RgbaImage, thickness: u32) -> RgbaImage {
    let (w, h) = sprite.dimensions();
    let mut out = RgbaImage::new(w, h);
    if thickness == 0 || w == 0 || h == 0 {
        return out;
    }

    let mask = silhouette(sprite);
    let grown = dilate_chebyshev(&mask, thickness);

    let mut band = 0usize;
    for (x, y, p) in grown.enumerate_pixels() {
        if p.0[0] != 0 && mask.get_pixel(x, y).0[0] == 0 {
            out.put_pixel(x, y, OUTLINE_COLOR);
            band += 1;
        }
    }
    tracing::debug!(thickness, band_pixels = band, "outline generated");

    out
}
