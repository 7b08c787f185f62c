//! Reduction to sprite resolution.
//!
//! Shrinks the cropped subject to a small grid where every output pixel
//! stands for a `block_size` x `block_size` block of the source. Sampling
//! is nearest-neighbor with no smoothing, which keeps the hard edges
//! pixel art depends on.
//!
//! The grid is never smaller than [`MIN_SPRITE_DIMENSION`] on either
//! axis, so tiny crops and huge block sizes still give a usable sprite.

use crate::types::RgbaImage;

/// Smallest sprite grid side, in pixels.
pub const MIN_SPRITE_DIMENSION: u32 = 8;

/// Sprite grid size for a `width` x `height` source.
///
/// Each axis is `max(8, dim / block_size)`. A zero block size is treated
/// as 1.
#[must_use]
pub const fn sprite_dimensions(width: u32, height: u32, block_size: u32) -> (u32, u32) {
    let block = if block_size == 0 { 1 } else { block_size };
    let w = width / block;
    let h = height / block;
    (
        if w < MIN_SPRITE_DIMENSION {
            MIN_SPRITE_DIMENSION
        } else {
            w
        },
        if h < MIN_SPRITE_DIMENSION {
            MIN_SPRITE_DIMENSION
        } else {
            h
        },
    )
}

/// Source index sampled for output index `dst` when mapping
/// `src_len` pixels onto `dst_len` pixels.
#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn nearest_index(dst: u32, src_len: u32, dst_len: u32) -> u32 {
    let idx = (dst as u64 * src_len as u64 / dst_len as u64) as u32;
    if idx >= src_len { src_len - 1 } else { idx }
}

/// Resample `image` to exactly `width` x `height` with nearest-neighbor
/// sampling.
///
/// Works for both reduction and enlargement.
#[must_use]
pub fn resize_nearest(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (sw, sh) = image.dimensions();
    if sw == 0 || sh == 0 {
        return RgbaImage::new(width, height);
    }
    RgbaImage::from_fn(width, height, |x, y| {
        *image.get_pixel(nearest_index(x, sw, width), nearest_index(y, sh, height))
    })
}

/// Reduce `image` to its sprite grid for the given block size.
#[must_use]
pub fn downsample(image: &RgbaImage, block_size: u32) -> RgbaImage {
    let (w, h) = sprite_dimensions(image.width(), image.height(), block_size);
    tracing::debug!(
        from_w = image.width(),
        from_h = image.height(),
        to_w = w,
        to_h = h,
        block_size,
        "downsampling to sprite grid"
    );
    resize_nearest(image, w, h)
}
