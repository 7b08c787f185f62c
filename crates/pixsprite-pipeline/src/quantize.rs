//! Palette quantization with ordered dithering.
//!
//! Every visible sprite pixel is snapped to the nearest color of a fixed
//! palette. With dithering enabled, each pixel is first nudged by an
//! amount that depends only on its position in a 4x4 Bayer matrix, so
//! colors that fall between two palette entries alternate between them
//! across neighboring pixels.
//!
//! The nudge is a hue-preserving luminance heuristic:
//!
//! ```text
//! t      = BAYER_4X4[y % 4][x % 4] / 15
//! offset = (t - 0.5) * 2 * (strength * 32)
//! Y      = 0.2126 r + 0.7152 g + 0.0722 b
//! c'     = clamp(c + offset * c / (Y + 1), 0, 255)
//! ```
//!
//! The `+ 1` only guards the division; the formula is a stylistic choice
//! and is kept exactly as written.
//!
//! Each output pixel depends only on its own input pixel and position,
//! so the stage has no ordering requirements.

use crate::palette;
use crate::types::{Rgb, RgbaImage};

/// Pixels with alpha below this are treated as outside the subject.
pub const TRANSPARENT_ALPHA_CUTOFF: u8 = 5;

/// 4x4 Bayer threshold matrix, indexed `[y % 4][x % 4]`.
pub const BAYER_4X4: [[u8; 4]; 4] = [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];

/// Largest per-channel offset at full dither strength.
const DITHER_AMPLITUDE: f32 = 32.0;

/// Signed dither offset for position `(x, y)`.
#[must_use]
pub fn dither_offset(x: u32, y: u32, strength: f32) -> f32 {
    let t = f32::from(BAYER_4X4[(y % 4) as usize][(x % 4) as usize]) / 15.0;
    (t - 0.5) * 2.0 * (strength * DITHER_AMPLITUDE)
}

/// Apply the luminance-proportional perturbation to one color.
#[must_use]
pub fn perturb(r: f32, g: f32, b: f32, offset: f32) -> (f32, f32, f32) {
    let luma = 0.0722f32.mul_add(b, 0.2126f32.mul_add(r, 0.7152 * g));
    let nudge = |c: f32| offset.mul_add(c / (luma + 1.0), c).clamp(0.0, 255.0);
    (nudge(r), nudge(g), nudge(b))
}

/// Quantize `image` against `palette`.
///
/// `dither_strength` in `[0, 1]`; `0.0` disables dithering entirely.
/// Pixels with alpha below [`TRANSPARENT_ALPHA_CUTOFF`] become
/// `(0, 0, 0, 0)`; every other pixel becomes an opaque palette color.
#[must_use]
pub fn quantize(image: &RgbaImage, palette: &[Rgb], dither_strength: f32) -> RgbaImage {
    let dither = dither_strength > 0.0;
    let mut out = RgbaImage::new(image.width(), image.height());

    for (x, y, p) in image.enumerate_pixels() {
        let [r, g, b, a] = p.0;
        if a < TRANSPARENT_ALPHA_CUTOFF {
            continue;
        }

        let (mut fr, mut fg, mut fb) = (f32::from(r), f32::from(g), f32::from(b));
        if dither {
            (fr, fg, fb) = perturb(fr, fg, fb, dither_offset(x, y, dither_strength));
        }

        out.put_pixel(x, y, palette::nearest(palette, fr, fg, fb).to_rgba());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::PaletteName;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            image::Rgba([
                (x * 17 % 256) as u8,
                (y * 23 % 256) as u8,
                ((x + y) * 11 % 256) as u8,
                255,
            ])
        })
    }

    #[test]
    fn bayer_matrix_is_a_permutation_of_0_to_15() {
        let mut seen = [false; 16];
        for row in BAYER_4X4 {
            for v in row {
                seen[v as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn dither_offset_range() {
        // Bayer 0 -> t = 0 -> -strength*32; Bayer 15 -> +strength*32.
        assert!((dither_offset(0, 0, 1.0) + 32.0).abs() < 1e-4);
        assert!((dither_offset(0, 3, 1.0) - 32.0).abs() < 1e-4);
        assert!((dither_offset(0, 3, 0.5) - 16.0).abs() < 1e-4);
        assert!(dither_offset(1, 1, 0.0).abs() < f32::EPSILON);
        // Position wraps every 4 pixels.
        assert!((dither_offset(5, 6, 0.7) - dither_offset(1, 2, 0.7)).abs() < f32::EPSILON);
    }

    #[test]
    fn perturb_follows_formula() {
        let (r, g, b) = perturb(100.0, 50.0, 0.0, 10.0);
        let luma = 0.2126 * 100.0 + 0.7152 * 50.0;
        assert!((r - (100.0 + 10.0 * 100.0 / (luma + 1.0))).abs() < 1e-3);
        assert!((g - (50.0 + 10.0 * 50.0 / (luma + 1.0))).abs() < 1e-3);
        assert!(b.abs() < f32::EPSILON, "zero channel stays zero");
    }

    #[test]
    fn perturb_clamps() {
        let (r, g, b) = perturb(255.0, 255.0, 255.0, 32.0);
        assert!((r - 255.0).abs() < f32::EPSILON);
        assert!((g - 255.0).abs() < f32::EPSILON);
        assert!((b - 255.0).abs() < f32::EPSILON);
        let (r, _, _) = perturb(1.0, 0.0, 0.0, -300.0);
        assert!(r.abs() < f32::EPSILON);
    }

    #[test]
    fn near_transparent_pixels_are_cleared() {
        let mut img = RgbaImage::from_pixel(2, 1, image::Rgba([200, 10, 10, 4]));
        img.put_pixel(1, 0, image::Rgba([200, 10, 10, 5]));
        let out = quantize(&img, PaletteName::Pico8.colors(), 0.0);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(out.get_pixel(1, 0).0[3], 255);
    }

    #[test]
    fn solid_red_quantizes_to_pico8_red() {
        let img = RgbaImage::from_pixel(8, 8, image::Rgba([255, 0, 0, 255]));
        let out = quantize(&img, PaletteName::Pico8.colors(), 0.0);
        assert!(out.pixels().all(|p| p.0 == [255, 0, 77, 255]));
    }

    #[test]
    fn output_colors_are_always_in_palette() {
        let img = gradient(24, 24);
        for name in PaletteName::ALL {
            for strength in [0.0, 0.3, 1.0] {
                let out = quantize(&img, name.colors(), strength);
                for p in out.pixels() {
                    let c = Rgb::new(p.0[0], p.0[1], p.0[2]);
                    assert_eq!(p.0[3], 255);
                    assert!(name.colors().contains(&c), "{name} produced {c}");
                }
            }
        }
    }

    #[test]
    fn undithered_quantization_is_idempotent() {
        let img = gradient(16, 16);
        for name in PaletteName::ALL {
            let once = quantize(&img, name.colors(), 0.0);
            let twice = quantize(&once, name.colors(), 0.0);
            assert_eq!(once, twice, "{name}");
        }
    }

    #[test]
    fn dithering_alternates_between_entries() {
        // Mid gray sits between two GB shades; dithering should use both.
        let img = RgbaImage::from_pixel(8, 8, image::Rgba([94, 135, 40, 255]));
        let plain = quantize(&img, PaletteName::Gb.colors(), 0.0);
        let dithered = quantize(&img, PaletteName::Gb.colors(), 1.0);

        let distinct = |im: &RgbaImage| {
            let mut colors: Vec<[u8; 4]> = im.pixels().map(|p| p.0).collect();
            colors.sort_unstable();
            colors.dedup();
            colors.len()
        };
        assert_eq!(distinct(&plain), 1);
        assert!(distinct(&dithered) >= 2);
    }

    #[test]
    fn dithered_output_is_deterministic() {
        let img = gradient(12, 9);
        let a = quantize(&img, PaletteName::Nes.colors(), 0.6);
        let b = quantize(&img, PaletteName::Nes.colors(), 0.6);
        assert_eq!(a, b);
    }
}
