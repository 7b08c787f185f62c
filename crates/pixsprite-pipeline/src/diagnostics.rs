//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! parameter experimentation. [`process_staged_with_diagnostics`] runs
//! the pipeline and collects them alongside the staged results.
//!
//! The crate is sans-IO, so it never reads a clock itself: callers pass
//! a [`Clock`] implementation. Durations are serialized as fractional
//! seconds (`f64`) for JSON compatibility, since `std::time::Duration`
//! does not implement serde traits.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::background::BackgroundRemover;
use crate::composite::SpritePlacement;
use crate::pipeline::{Pipeline, PipelineStage};
use crate::types::{PipelineConfig, PipelineError, Rect, RgbaImage, StagedResult};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Injectable time source.
///
/// Native callers wrap `std::time::Instant`; tests use a fake clock.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single pipeline run.
///
/// Background removal is `None` when it was disabled in the config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 2: size normalization (present even when skipped, with
    /// `applied == false`).
    pub normalize: StageDiagnostics,
    /// Stage 3: background removal (only when
    /// `config.remove_background == true`).
    pub remove_background: Option<StageDiagnostics>,
    /// Stage 4: subject crop.
    pub crop: StageDiagnostics,
    /// Stage 5: reduction to the sprite grid.
    pub downsample: StageDiagnostics,
    /// Stage 6: palette quantization.
    pub quantize: StageDiagnostics,
    /// Stage 7: outline band.
    pub outline: StageDiagnostics,
    /// Stage 8: canvas composition.
    pub composite: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// Size normalization metrics.
    Normalize {
        /// Width before normalization.
        original_width: u32,
        /// Height before normalization.
        original_height: u32,
        /// Width after normalization.
        width: u32,
        /// Height after normalization.
        height: u32,
        /// Configured longest side.
        longest_side: u32,
        /// Whether resampling actually happened.
        applied: bool,
    },
    /// Background removal metrics.
    RemoveBackground {
        /// Pixels with alpha 0 after removal.
        transparent_pixel_count: u64,
        /// Total pixel count.
        total_pixel_count: u64,
    },
    /// Subject crop metrics.
    Crop {
        /// Crop region within the cutout.
        rect: Rect,
        /// `false` when the full frame was used as a fallback.
        subject_found: bool,
    },
    /// Sprite grid metrics.
    Downsample {
        /// Source pixels per sprite pixel.
        block_size: u32,
        /// Sprite width.
        width: u32,
        /// Sprite height.
        height: u32,
    },
    /// Quantization metrics.
    Quantize {
        /// Palette name.
        palette: String,
        /// Effective dither strength (0 when disabled).
        dither_strength: f32,
        /// Pixels inside the sprite.
        opaque_pixel_count: u64,
        /// Distinct palette colors actually used.
        distinct_colors: usize,
    },
    /// Outline metrics.
    Outline {
        /// Band thickness in sprite pixels.
        thickness: u32,
        /// Pixels in the band.
        outline_pixel_count: u64,
    },
    /// Composition metrics.
    Composite {
        /// Side of the square canvas.
        canvas_side: u32,
        /// Where the enlarged sprite landed.
        placement: SpritePlacement,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Sprite grid width.
    pub sprite_width: u32,
    /// Sprite grid height.
    pub sprite_height: u32,
    /// Side of the output canvas.
    pub canvas_side: u32,
    /// Whether a subject was found in the alpha channel.
    pub subject_found: bool,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{}  ->  sprite {}x{}  ->  canvas {}x{}",
            self.summary.image_width,
            self.summary.image_height,
            self.summary.sprite_width,
            self.summary.sprite_height,
            self.summary.canvas_side,
            self.summary.canvas_side,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<20} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        let mut stages = vec![("Decode", &self.decode), ("Normalize", &self.normalize)];
        if let Some(ref removal) = self.remove_background {
            stages.push(("Remove Background", removal));
        }
        stages.extend([
            ("Crop", &self.crop),
            ("Downsample", &self.downsample),
            ("Quantize", &self.quantize),
            ("Outline", &self.outline),
            ("Composite", &self.composite),
        ]);

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<20} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        if !self.summary.subject_found {
            lines.push(String::new());
            lines.push("No subject found: the full frame was used.".to_string());
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Normalize {
            original_width,
            original_height,
            width,
            height,
            longest_side,
            applied,
        } => {
            if *applied {
                format!(
                    "{original_width}x{original_height} -> {width}x{height} (limit {longest_side})"
                )
            } else {
                format!("{width}x{height} (unchanged)")
            }
        }
        StageMetrics::RemoveBackground {
            transparent_pixel_count,
            total_pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let pct = if *total_pixel_count > 0 {
                *transparent_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!("{transparent_pixel_count} transparent ({pct:.1}%)")
        }
        StageMetrics::Crop {
            rect,
            subject_found,
        } => {
            let note = if *subject_found { "" } else { " (fallback)" };
            format!("{}x{} at ({}, {}){note}", rect.w, rect.h, rect.x, rect.y)
        }
        StageMetrics::Downsample {
            block_size,
            width,
            height,
        } => format!("block={block_size} -> {width}x{height}"),
        StageMetrics::Quantize {
            palette,
            dither_strength,
            opaque_pixel_count,
            distinct_colors,
        } => format!(
            "{palette} dither={dither_strength:.2} {opaque_pixel_count} px, {distinct_colors} colors"
        ),
        StageMetrics::Outline {
            thickness,
            outline_pixel_count,
        } => format!("thickness={thickness} {outline_pixel_count} px"),
        StageMetrics::Composite {
            canvas_side,
            placement,
        } => format!(
            "{canvas_side}x{canvas_side}, sprite {}x{} at ({}, {})",
            placement.width, placement.height, placement.x, placement.y
        ),
    }
}

/// Total pixel count of a buffer.
pub(crate) fn pixel_count(image: &RgbaImage) -> u64 {
    u64::from(image.width()) * u64::from(image.height())
}

/// Count pixels whose alpha is exactly 0.
pub(crate) fn count_transparent_pixels(image: &RgbaImage) -> u64 {
    image.pixels().map(|p| u64::from(u8::from(p.0[3] == 0))).sum()
}

/// Count pixels whose alpha is nonzero.
pub(crate) fn count_opaque_pixels(image: &RgbaImage) -> u64 {
    pixel_count(image) - count_transparent_pixels(image)
}

/// Number of distinct RGB values among pixels with nonzero alpha.
pub(crate) fn distinct_opaque_colors(image: &RgbaImage) -> usize {
    image
        .pixels()
        .filter(|p| p.0[3] != 0)
        .map(|p| [p.0[0], p.0[1], p.0[2]])
        .collect::<HashSet<_>>()
        .len()
}

/// Run one stage transition, measuring how long it took.
fn timed<C, S, T, F>(clock: &C, stage: S, advance: F) -> Result<(T, Duration), PipelineError>
where
    C: Clock,
    F: FnOnce(S) -> Result<T, PipelineError>,
{
    let start = clock.now();
    let next = advance(stage)?;
    Ok((next, clock.elapsed(&start)))
}

/// Metrics for a stage that always reports them.
fn required_metrics<'a, S: PipelineStage<'a>>(stage: &S) -> StageMetrics {
    // Only Pending and a skipped removal stage report None.
    #[allow(clippy::unreachable)]
    stage
        .metrics()
        .unwrap_or_else(|| unreachable!("stage '{}' always reports metrics", S::NAME))
}

/// Run the full pipeline, collecting per-stage diagnostics.
///
/// Validates `config`, then advances the typed pipeline one stage at a
/// time, timing each transition with `clock`.
///
/// # Errors
///
/// Returns the same errors as [`crate::process_staged`].
pub fn process_staged_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    remover: &dyn BackgroundRemover,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    config.validate()?;
    let _span = tracing::info_span!("pipeline", bytes = image_bytes.len()).entered();
    let run_start = clock.now();

    let pending = Pipeline::new(image_bytes.to_vec(), config.clone(), remover);

    let (decoded, d) = timed(clock, pending, |s| s.decode())?;
    let decode = StageDiagnostics {
        duration: d,
        metrics: required_metrics(&decoded),
    };

    let (normalized, d) = timed(clock, decoded, |s| Ok(s.normalize()))?;
    let normalize = StageDiagnostics {
        duration: d,
        metrics: required_metrics(&normalized),
    };

    let (cutout, d) = timed(clock, normalized, |s| s.remove_background())?;
    let remove_background = cutout.metrics().map(|metrics| StageDiagnostics {
        duration: d,
        metrics,
    });

    let (cropped, d) = timed(clock, cutout, |s| Ok(s.crop()))?;
    let crop = StageDiagnostics {
        duration: d,
        metrics: required_metrics(&cropped),
    };
    let subject_found = cropped.subject_found();

    let (downsampled, d) = timed(clock, cropped, |s| Ok(s.downsample()))?;
    let downsample = StageDiagnostics {
        duration: d,
        metrics: required_metrics(&downsampled),
    };

    let (quantized, d) = timed(clock, downsampled, |s| Ok(s.quantize()))?;
    let quantize = StageDiagnostics {
        duration: d,
        metrics: required_metrics(&quantized),
    };

    let (outlined, d) = timed(clock, quantized, |s| Ok(s.outline()))?;
    let outline = StageDiagnostics {
        duration: d,
        metrics: required_metrics(&outlined),
    };

    let (composited, d) = timed(clock, outlined, |s| Ok(s.composite()))?;
    let composite = StageDiagnostics {
        duration: d,
        metrics: required_metrics(&composited),
    };

    let total_duration = clock.elapsed(&run_start);
    let staged = composited.into_result();

    let summary = PipelineSummary {
        image_width: staged.original.width(),
        image_height: staged.original.height(),
        sprite_width: staged.quantized.width(),
        sprite_height: staged.quantized.height(),
        canvas_side: staged.composited.width(),
        subject_found,
    };
    tracing::info!(
        canvas = summary.canvas_side,
        sprite_w = summary.sprite_width,
        sprite_h = summary.sprite_height,
        elapsed_ms = duration_ms(total_duration),
        "pipeline finished"
    );

    Ok((
        staged,
        PipelineDiagnostics {
            decode,
            normalize,
            remove_background,
            crop,
            downsample,
            quantize,
            outline,
            composite,
            total_duration,
            summary,
        },
    ))
}
