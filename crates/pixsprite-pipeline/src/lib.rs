//! pixsprite-pipeline: Pure sprite-making pipeline (sans-IO).
//!
//! Turns an arbitrary photo into a pixel-art sprite on a square canvas
//! through:
//! decode -> normalize -> background removal -> subject crop ->
//! downsample -> palette quantization -> outline -> composite -> encode.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory byte
//! slices and pixel buffers. Background removal is an external
//! collaborator supplied through [`BackgroundRemover`]; filesystem and
//! terminal interaction lives in the `pixsprite` binary.

pub mod background;
pub mod codec;
pub mod composite;
pub mod crop;
pub mod diagnostics;
pub mod downsample;
pub mod normalize;
pub mod outline;
pub mod palette;
pub mod pipeline;
pub mod quantize;
pub mod types;

pub use background::{BackgroundRemover, CollaboratorError, Passthrough};
pub use composite::SpritePlacement;
pub use palette::PaletteName;
pub use pipeline::{Pipeline, ProgressStage};
pub use types::{
    GrayImage, PipelineConfig, PipelineError, Rect, Rgb, RgbaImage, StagedResult,
};

/// Run the full pipeline and return the canvas as PNG bytes.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP), a configuration, and
/// the background-removal collaborator (only consulted when
/// `config.remove_background` is set).
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// validation, [`PipelineError::EmptyInput`] or
/// [`PipelineError::ImageDecode`] for unusable input,
/// [`PipelineError::Collaborator`] if background removal fails, and
/// [`PipelineError::ImageEncode`] if the canvas cannot be encoded.
pub fn process(
    image_bytes: &[u8],
    config: &PipelineConfig,
    remover: &dyn BackgroundRemover,
) -> Result<Vec<u8>, PipelineError> {
    process_with_progress(image_bytes, config, remover, |_| {})
}

/// Run the full pipeline, calling `on_progress` before each step.
///
/// Optional steps that the config disables (normalization, background
/// removal) are not announced. The callback is a notification only and
/// cannot influence the run.
///
/// Unlike [`process_staged`], each intermediate buffer is dropped as
/// soon as the next step has consumed it.
///
/// # Errors
///
/// Same as [`process`].
pub fn process_with_progress<F>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    remover: &dyn BackgroundRemover,
    mut on_progress: F,
) -> Result<Vec<u8>, PipelineError>
where
    F: FnMut(ProgressStage),
{
    let canvas = render(image_bytes, config, remover, &mut on_progress)?;
    on_progress(ProgressStage::Encode);
    codec::encode_png(&canvas)
}

/// Run the full pipeline, retaining every intermediate raster.
///
/// # Errors
///
/// Same as [`process`], except that nothing is encoded.
pub fn process_staged(
    image_bytes: &[u8],
    config: &PipelineConfig,
    remover: &dyn BackgroundRemover,
) -> Result<StagedResult, PipelineError> {
    config.validate()?;
    let _span = tracing::info_span!("pipeline", bytes = image_bytes.len()).entered();
    Pipeline::new(image_bytes.to_vec(), config.clone(), remover)
        .decode()?
        .normalize()
        .remove_background()
        .map(|cutout| cutout.crop().downsample().quantize().outline().composite())
        .map(pipeline::Composited::into_result)
}

/// Move-through run: every step takes the previous buffer by value or
/// borrows it only until its successor exists.
fn render(
    image_bytes: &[u8],
    config: &PipelineConfig,
    remover: &dyn BackgroundRemover,
    on_progress: &mut dyn FnMut(ProgressStage),
) -> Result<RgbaImage, PipelineError> {
    config.validate()?;
    let _span = tracing::info_span!("pipeline", bytes = image_bytes.len()).entered();

    on_progress(ProgressStage::Decode);
    let image = codec::decode(image_bytes)?;
    tracing::debug!(width = image.width(), height = image.height(), "decoded input");

    let image = if config.normalize_enabled {
        on_progress(ProgressStage::Normalize);
        normalize::normalize(image, config.normalize_longest_side).0
    } else {
        image
    };

    let image = if config.remove_background {
        on_progress(ProgressStage::RemoveBackground);
        background::apply(remover, image)?
    } else {
        image
    };

    on_progress(ProgressStage::Crop);
    let (cropped, rect, subject_found) = crop::take_subject(image, crop::SUBJECT_ALPHA_THRESHOLD);
    tracing::debug!(
        x = rect.x,
        y = rect.y,
        w = rect.w,
        h = rect.h,
        subject_found,
        "cropped to subject"
    );
    let (crop_w, crop_h) = cropped.dimensions();

    on_progress(ProgressStage::Downsample);
    let sprite = downsample::downsample(&cropped, config.block_size);
    drop(cropped);

    on_progress(ProgressStage::Quantize);
    let sprite = quantize::quantize(
        &sprite,
        config.palette.colors(),
        config.effective_dither_strength(),
    );

    on_progress(ProgressStage::Outline);
    let band = outline::outline(&sprite, config.outline_thickness);

    on_progress(ProgressStage::Composite);
    let (canvas, placement) = composite::composite(
        &band,
        &sprite,
        crop_w,
        crop_h,
        config.subject_coverage,
        config.background_fill,
    );

    tracing::info!(
        canvas = canvas.width(),
        x = placement.x,
        y = placement.y,
        "sprite composed"
    );
    Ok(canvas)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn png(img: &RgbaImage) -> Vec<u8> {
        codec::encode_png(img).unwrap()
    }

    fn red_square() -> Vec<u8> {
        png(&RgbaImage::from_pixel(64, 64, image::Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn process_empty_input() {
        let result = process(&[], &PipelineConfig::default(), &Passthrough);
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn process_corrupt_input() {
        let result = process(&[0xFF, 0x00], &PipelineConfig::default(), &Passthrough);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn process_rejects_invalid_config() {
        let config = PipelineConfig {
            subject_coverage: 1.5,
            ..PipelineConfig::default()
        };
        let result = process(&red_square(), &config, &Passthrough);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn process_returns_decodable_png() {
        let bytes = process(&red_square(), &PipelineConfig::default(), &Passthrough).unwrap();
        let canvas = codec::decode(&bytes).unwrap();
        assert_eq!(canvas.dimensions(), (64, 64));
    }

    #[test]
    fn process_matches_staged_final_image() {
        let config = PipelineConfig::default();
        let bytes = process(&red_square(), &config, &Passthrough).unwrap();
        let staged = process_staged(&red_square(), &config, &Passthrough).unwrap();
        assert_eq!(&codec::decode(&bytes).unwrap(), staged.final_image());
    }

    #[test]
    fn progress_reports_every_step_in_order() {
        let config = PipelineConfig {
            remove_background: true,
            ..PipelineConfig::default()
        };
        let mut seen = Vec::new();
        process_with_progress(&red_square(), &config, &Passthrough, |s| seen.push(s)).unwrap();
        assert_eq!(
            seen,
            [
                ProgressStage::Decode,
                ProgressStage::Normalize,
                ProgressStage::RemoveBackground,
                ProgressStage::Crop,
                ProgressStage::Downsample,
                ProgressStage::Quantize,
                ProgressStage::Outline,
                ProgressStage::Composite,
                ProgressStage::Encode,
            ]
        );
    }

    #[test]
    fn progress_skips_disabled_steps() {
        let config = PipelineConfig {
            normalize_enabled: false,
            ..PipelineConfig::default()
        };
        let mut seen = Vec::new();
        process_with_progress(&red_square(), &config, &Passthrough, |s| seen.push(s)).unwrap();
        assert!(!seen.contains(&ProgressStage::Normalize));
        assert!(!seen.contains(&ProgressStage::RemoveBackground));
        assert_eq!(seen.first(), Some(&ProgressStage::Decode));
        assert_eq!(seen.last(), Some(&ProgressStage::Encode));
    }

    #[test]
    fn progress_stops_at_failure() {
        let config = PipelineConfig {
            remove_background: true,
            ..PipelineConfig::default()
        };
        let failing = |_: RgbaImage| -> Result<RgbaImage, CollaboratorError> {
            Err(CollaboratorError::new("quota exceeded"))
        };
        let mut seen = Vec::new();
        let result = process_with_progress(&red_square(), &config, &failing, |s| seen.push(s));
        assert!(matches!(result, Err(PipelineError::Collaborator(_))));
        assert_eq!(seen.last(), Some(&ProgressStage::RemoveBackground));
    }

    #[test]
    fn remover_cutout_drives_crop() {
        // Opaque photo; the collaborator keeps only a centered 32x16 block.
        let photo = RgbaImage::from_pixel(64, 64, image::Rgba([30, 60, 200, 255]));
        let keep_center = |mut img: RgbaImage| -> Result<RgbaImage, CollaboratorError> {
            for (x, y, p) in img.enumerate_pixels_mut() {
                if !((16..48).contains(&x) && (24..40).contains(&y)) {
                    p.0[3] = 0;
                }
            }
            Ok(img)
        };
        let config = PipelineConfig {
            remove_background: true,
            dither_enabled: false,
            outline_thickness: 0,
            ..PipelineConfig::default()
        };
        let staged = process_staged(&png(&photo), &config, &keep_center).unwrap();
        assert!(staged.subject_found);
        assert_eq!(
            staged.crop_rect,
            Rect {
                x: 16,
                y: 24,
                w: 32,
                h: 16
            }
        );
        // 32/8 = 4 -> clamped to 8; 16/8 = 2 -> clamped to 8.
        assert_eq!(staged.downsampled.dimensions(), (8, 8));
        assert_eq!(staged.composited.dimensions(), (32, 32));
    }

    #[test]
    fn streaming_and_staged_paths_agree() {
        // Irregular subject on a transparent frame, large enough that
        // normalization resamples it.
        let photo = RgbaImage::from_fn(96, 72, |x, y| {
            let (dx, dy) = (i64::from(x) - 40, i64::from(y) - 36);
            if dx * dx + dy * dy < 600 {
                #[allow(clippy::cast_possible_truncation)]
                image::Rgba([(x * 2) as u8, (y * 3) as u8, 90, 255])
            } else {
                image::Rgba([0, 0, 0, 0])
            }
        });
        let bytes = png(&photo);
        let erase_left = |mut img: RgbaImage| -> Result<RgbaImage, CollaboratorError> {
            for (x, _, p) in img.enumerate_pixels_mut() {
                if x < 20 {
                    p.0[3] = 0;
                }
            }
            Ok(img)
        };
        let configs = [
            PipelineConfig::default(),
            PipelineConfig {
                normalize_longest_side: 48,
                outline_thickness: 2,
                block_size: 3,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                normalize_enabled: false,
                remove_background: true,
                dither_enabled: false,
                subject_coverage: 1.0,
                ..PipelineConfig::default()
            },
        ];
        for config in &configs {
            let streamed = process(&bytes, config, &erase_left).unwrap();
            let staged = process_staged(&bytes, config, &erase_left).unwrap();
            assert_eq!(
                &codec::decode(&streamed).unwrap(),
                staged.final_image(),
                "{config:?}"
            );
        }
    }

    #[test]
    fn streaming_path_on_transparent_input_is_fill_only() {
        let config = PipelineConfig {
            outline_thickness: 16,
            ..PipelineConfig::default()
        };
        let bytes = process(&png(&RgbaImage::new(32, 32)), &config, &Passthrough).unwrap();
        let canvas = codec::decode(&bytes).unwrap();
        let fill = config.background_fill.to_rgba();
        assert!(canvas.pixels().all(|p| *p == fill));
    }
}
