//! Final canvas composition.
//!
//! The sprite is enlarged back up with nearest-neighbor sampling, so each
//! sprite pixel becomes a crisp block, and centered on a square canvas
//! sized to the cropped subject. The canvas is first filled with an
//! opaque background color, then the outline layer is drawn, then the
//! sprite on top. Transparent source pixels leave the canvas untouched.

use serde::{Deserialize, Serialize};

use crate::downsample::resize_nearest;
use crate::types::{Rgb, RgbaImage};

/// Where the enlarged sprite lands on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpritePlacement {
    /// Left edge on the canvas.
    pub x: u32,
    /// Top edge on the canvas.
    pub y: u32,
    /// Enlarged sprite width.
    pub width: u32,
    /// Enlarged sprite height.
    pub height: u32,
}

/// Side length of the square canvas for a crop of `crop_w` x `crop_h`.
#[must_use]
pub fn canvas_side(crop_w: u32, crop_h: u32) -> u32 {
    crop_w.max(crop_h).max(1)
}

/// Compute the placement of a `small_w` x `small_h` sprite on the canvas
/// for a crop of `crop_w` x `crop_h`.
///
/// The scale factor is `floor(square * coverage) / max(small_w, small_h)`
/// and is not rounded; each enlarged side is floored and kept at least 1.
/// Offsets center the sprite, rounding toward the top-left.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn placement(
    small_w: u32,
    small_h: u32,
    crop_w: u32,
    crop_h: u32,
    coverage: f32,
) -> SpritePlacement {
    let square = canvas_side(crop_w, crop_h);
    let budget = (f64::from(square) * f64::from(coverage)).floor();
    let scale = budget / f64::from(small_w.max(small_h).max(1));
    let enlarge = |dim: u32| ((f64::from(dim) * scale).floor() as u32).max(1);

    let width = enlarge(small_w);
    let height = enlarge(small_h);
    SpritePlacement {
        x: square.saturating_sub(width) / 2,
        y: square.saturating_sub(height) / 2,
        width,
        height,
    }
}

/// Draw `layer` onto `canvas` at `at`, enlarged with nearest-neighbor
/// sampling. Fully transparent layer pixels are skipped.
fn draw_layer(canvas: &mut RgbaImage, layer: &RgbaImage, at: SpritePlacement) {
    if layer.width() == 0 || layer.height() == 0 {
        return;
    }
    let scaled = resize_nearest(layer, at.width, at.height);
    for (x, y, p) in scaled.enumerate_pixels() {
        if p.0[3] == 0 {
            continue;
        }
        let (cx, cy) = (at.x + x, at.y + y);
        if cx < canvas.width() && cy < canvas.height() {
            canvas.put_pixel(cx, cy, *p);
        }
    }
}

/// Compose the final square canvas.
///
/// `outline` and `sprite` share the sprite grid's dimensions. Returns the
/// canvas and where the sprite was placed.
#[must_use]
pub fn composite(
    outline: &RgbaImage,
    sprite: &RgbaImage,
    crop_w: u32,
    crop_h: u32,
    coverage: f32,
    fill: Rgb,
) -> (RgbaImage, SpritePlacement) {
    let square = canvas_side(crop_w, crop_h);
    let at = placement(sprite.width(), sprite.height(), crop_w, crop_h, coverage);
    tracing::debug!(
        square,
        x = at.x,
        y = at.y,
        width = at.width,
        height = at.height,
        "compositing sprite"
    );

    let mut canvas = RgbaImage::from_pixel(square, square, fill.to_rgba());
    draw_layer(&mut canvas, outline, at);
    draw_layer(&mut canvas, sprite, at);
    (canvas, at)
}
