//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate raster before continuing.
//!
//! Unlike [`crate::process_staged`] which runs the entire pipeline in one
//! call, [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use pixsprite_pipeline::{Passthrough, Pipeline, PipelineConfig, PipelineError};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let config = PipelineConfig::default();
//! let pipeline = Pipeline::new(png, config, &Passthrough)
//!     .decode()?
//!     .normalize()
//!     .remove_background()?
//!     .crop()
//!     .downsample()
//!     .quantize()
//!     .outline()
//!     .composite();
//!
//! let staged = pipeline.into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages), carrying all previously computed
//! intermediates. The caller can inspect the current stage's output via
//! accessor methods at any point.
//!
//! The first three states borrow the background remover; from
//! [`Cutout`] onward the pipeline owns everything it holds.

use crate::background::{self, BackgroundRemover};
use crate::composite::SpritePlacement;
use crate::crop::SUBJECT_ALPHA_THRESHOLD;
use crate::diagnostics::{self, StageMetrics};
use crate::types::{PipelineConfig, PipelineError, Rect, RgbaImage, StagedResult};

// ───────────────────────── Progress notification ─────────────────────

/// Coarse progress notification for front ends.
///
/// Passed to the callback of [`crate::process_with_progress`] right
/// before the named step runs. Carries no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressStage {
    /// Decoding the input bytes.
    Decode,
    /// Shrinking an oversized input.
    Normalize,
    /// Waiting on the background-removal collaborator.
    RemoveBackground,
    /// Cropping to the subject.
    Crop,
    /// Reducing to the sprite grid.
    Downsample,
    /// Palette quantization and dithering.
    Quantize,
    /// Building the outline band.
    Outline,
    /// Composing the final canvas.
    Composite,
    /// Encoding the canvas as PNG.
    Encode,
}

impl ProgressStage {
    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Normalize => "normalize",
            Self::RemoveBackground => "remove_background",
            Self::Crop => "crop",
            Self::Downsample => "downsample",
            Self::Quantize => "quantize",
            Self::Outline => "outline",
            Self::Composite => "composite",
            Self::Encode => "encode",
        }
    }
}

impl std::fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// The source image bytes and config are stored but not yet touched.
/// Call [`decode`](Self::decode) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
pub struct Pending<'a> {
    config: PipelineConfig,
    source: Vec<u8>,
    remover: &'a dyn BackgroundRemover,
}

impl<'a> Pending<'a> {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Decode the source image and advance to the [`Decoded`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] if the source bytes are
    /// empty. Returns [`PipelineError::ImageDecode`] if the image
    /// format is unrecognized or the data is corrupt.
    pub fn decode(self) -> Result<Decoded<'a>, PipelineError> {
        let source_len = self.source.len();
        let original = crate::codec::decode(&self.source)?;
        tracing::debug!(
            bytes = source_len,
            width = original.width(),
            height = original.height(),
            "decoded input"
        );
        Ok(Decoded {
            config: self.config,
            remover: self.remover,
            original,
            source_len,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state after decoding the source image.
///
/// Call [`normalize`](Self::normalize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .normalize() to continue"]
pub struct Decoded<'a> {
    config: PipelineConfig,
    remover: &'a dyn BackgroundRemover,
    original: RgbaImage,
    source_len: usize,
}

impl<'a> Decoded<'a> {
    /// The original decoded RGBA image.
    #[must_use]
    pub const fn original(&self) -> &RgbaImage {
        &self.original
    }

    /// Advance to the normalize stage.
    ///
    /// When `config.normalize_enabled` is `false` the image is passed
    /// through untouched.
    pub fn normalize(self) -> Normalized<'a> {
        let (normalized, applied) = if self.config.normalize_enabled {
            crate::normalize::normalize(self.original.clone(), self.config.normalize_longest_side)
        } else {
            (self.original.clone(), false)
        };
        Normalized {
            config: self.config,
            remover: self.remover,
            original: self.original,
            normalized,
            applied,
        }
    }
}

// ───────────────────────── Stage 2: Normalized ───────────────────────

/// Pipeline state after optional size normalization.
///
/// Call [`remove_background`](Self::remove_background) to advance to
/// the next stage. This is a fallible step when background removal is
/// enabled.
#[must_use = "pipeline stages are consumed by advancing; call .remove_background() to continue"]
pub struct Normalized<'a> {
    config: PipelineConfig,
    remover: &'a dyn BackgroundRemover,
    original: RgbaImage,
    normalized: RgbaImage,
    applied: bool,
}

impl Normalized<'_> {
    /// The normalized RGBA image.
    #[must_use]
    pub const fn normalized(&self) -> &RgbaImage {
        &self.normalized
    }

    /// Whether resampling was actually applied.
    #[must_use]
    pub const fn applied(&self) -> bool {
        self.applied
    }

    /// Advance to the background removal stage.
    ///
    /// When `config.remove_background` is `false` the remover is never
    /// called and the image is passed through.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Collaborator`] if the remover fails or
    /// returns a buffer of the wrong size.
    pub fn remove_background(self) -> Result<Cutout, PipelineError> {
        let cutout = if self.config.remove_background {
            let cutout = background::apply(self.remover, self.normalized.clone())?;
            tracing::debug!(
                transparent = diagnostics::count_transparent_pixels(&cutout),
                "background removed"
            );
            cutout
        } else {
            self.normalized.clone()
        };
        Ok(Cutout {
            config: self.config,
            original: self.original,
            normalized: self.normalized,
            normalize_applied: self.applied,
            cutout,
        })
    }
}

// ───────────────────────── Stage 3: Cutout ───────────────────────────

/// Pipeline state after optional background removal.
///
/// Call [`crop`](Self::crop) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .crop() to continue"]
pub struct Cutout {
    config: PipelineConfig,
    original: RgbaImage,
    normalized: RgbaImage,
    normalize_applied: bool,
    cutout: RgbaImage,
}

impl Cutout {
    /// The image with background pixels made transparent (or the
    /// normalized image when removal is disabled).
    #[must_use]
    pub const fn cutout(&self) -> &RgbaImage {
        &self.cutout
    }

    /// Advance to the subject crop stage.
    pub fn crop(self) -> Cropped {
        let (cropped, crop_rect, subject_found) =
            crate::crop::crop_to_subject(&self.cutout, SUBJECT_ALPHA_THRESHOLD);
        tracing::debug!(
            x = crop_rect.x,
            y = crop_rect.y,
            w = crop_rect.w,
            h = crop_rect.h,
            subject_found,
            "cropped to subject"
        );
        Cropped {
            config: self.config,
            original: self.original,
            normalized: self.normalized,
            normalize_applied: self.normalize_applied,
            cutout: self.cutout,
            crop_rect,
            subject_found,
            cropped,
        }
    }
}

// ───────────────────────── Stage 4: Cropped ──────────────────────────

/// Pipeline state after cropping to the subject bounds.
///
/// Call [`downsample`](Self::downsample) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .downsample() to continue"]
pub struct Cropped {
    config: PipelineConfig,
    original: RgbaImage,
    normalized: RgbaImage,
    normalize_applied: bool,
    cutout: RgbaImage,
    crop_rect: Rect,
    subject_found: bool,
    cropped: RgbaImage,
}

impl Cropped {
    /// The cropped subject.
    #[must_use]
    pub const fn cropped(&self) -> &RgbaImage {
        &self.cropped
    }

    /// The crop region within the cutout.
    #[must_use]
    pub const fn crop_rect(&self) -> Rect {
        self.crop_rect
    }

    /// `false` when no subject was found and the full frame was used.
    #[must_use]
    pub const fn subject_found(&self) -> bool {
        self.subject_found
    }

    /// Advance to the downsample stage.
    pub fn downsample(self) -> Downsampled {
        let downsampled = crate::downsample::downsample(&self.cropped, self.config.block_size);
        Downsampled {
            config: self.config,
            original: self.original,
            normalized: self.normalized,
            normalize_applied: self.normalize_applied,
            cutout: self.cutout,
            crop_rect: self.crop_rect,
            subject_found: self.subject_found,
            cropped: self.cropped,
            downsampled,
        }
    }
}

// ───────────────────────── Stage 5: Downsampled ──────────────────────

/// Pipeline state after reduction to the sprite grid.
///
/// Call [`quantize`](Self::quantize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .quantize() to continue"]
pub struct Downsampled {
    config: PipelineConfig,
    original: RgbaImage,
    normalized: RgbaImage,
    normalize_applied: bool,
    cutout: RgbaImage,
    crop_rect: Rect,
    subject_found: bool,
    cropped: RgbaImage,
    downsampled: RgbaImage,
}

impl Downsampled {
    /// The sprite-resolution raster.
    #[must_use]
    pub const fn downsampled(&self) -> &RgbaImage {
        &self.downsampled
    }

    /// Advance to the quantize stage.
    pub fn quantize(self) -> Quantized {
        let quantized = crate::quantize::quantize(
            &self.downsampled,
            self.config.palette.colors(),
            self.config.effective_dither_strength(),
        );
        tracing::debug!(
            palette = %self.config.palette,
            dither_strength = self.config.effective_dither_strength(),
            "quantized sprite"
        );
        Quantized {
            config: self.config,
            original: self.original,
            normalized: self.normalized,
            normalize_applied: self.normalize_applied,
            cutout: self.cutout,
            crop_rect: self.crop_rect,
            subject_found: self.subject_found,
            cropped: self.cropped,
            downsampled: self.downsampled,
            quantized,
        }
    }
}

// ───────────────────────── Stage 6: Quantized ────────────────────────

/// Pipeline state after palette quantization.
///
/// Call [`outline`](Self::outline) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .outline() to continue"]
pub struct Quantized {
    config: PipelineConfig,
    original: RgbaImage,
    normalized: RgbaImage,
    normalize_applied: bool,
    cutout: RgbaImage,
    crop_rect: Rect,
    subject_found: bool,
    cropped: RgbaImage,
    downsampled: RgbaImage,
    quantized: RgbaImage,
}

impl Quantized {
    /// The palette-quantized sprite.
    #[must_use]
    pub const fn quantized(&self) -> &RgbaImage {
        &self.quantized
    }

    /// Advance to the outline stage.
    pub fn outline(self) -> Outlined {
        let outline = crate::outline::outline(&self.quantized, self.config.outline_thickness);
        Outlined {
            config: self.config,
            original: self.original,
            normalized: self.normalized,
            normalize_applied: self.normalize_applied,
            cutout: self.cutout,
            crop_rect: self.crop_rect,
            subject_found: self.subject_found,
            cropped: self.cropped,
            downsampled: self.downsampled,
            quantized: self.quantized,
            outline,
        }
    }
}

// ───────────────────────── Stage 7: Outlined ─────────────────────────

/// Pipeline state after building the outline band.
///
/// Call [`composite`](Self::composite) to advance to the final stage.
#[must_use = "pipeline stages are consumed by advancing; call .composite() to continue"]
pub struct Outlined {
    config: PipelineConfig,
    original: RgbaImage,
    normalized: RgbaImage,
    normalize_applied: bool,
    cutout: RgbaImage,
    crop_rect: Rect,
    subject_found: bool,
    cropped: RgbaImage,
    downsampled: RgbaImage,
    quantized: RgbaImage,
    outline: RgbaImage,
}

impl Outlined {
    /// The outline layer at sprite resolution.
    #[must_use]
    pub const fn outline(&self) -> &RgbaImage {
        &self.outline
    }

    /// Advance to the composite stage, the final pipeline step.
    pub fn composite(self) -> Composited {
        let (composited, placement) = crate::composite::composite(
            &self.outline,
            &self.quantized,
            self.cropped.width(),
            self.cropped.height(),
            self.config.subject_coverage,
            self.config.background_fill,
        );
        Composited {
            config: self.config,
            original: self.original,
            normalized: self.normalized,
            normalize_applied: self.normalize_applied,
            cutout: self.cutout,
            crop_rect: self.crop_rect,
            subject_found: self.subject_found,
            cropped: self.cropped,
            downsampled: self.downsampled,
            quantized: self.quantized,
            outline: self.outline,
            placement,
            composited,
        }
    }
}

// ───────────────────────── Stage 8: Composited ───────────────────────

/// Pipeline state after composing the canvas: the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`StagedResult`] containing all intermediates.
#[must_use = "call .into_result() to extract the StagedResult"]
pub struct Composited {
    config: PipelineConfig,
    original: RgbaImage,
    normalized: RgbaImage,
    normalize_applied: bool,
    cutout: RgbaImage,
    crop_rect: Rect,
    subject_found: bool,
    cropped: RgbaImage,
    downsampled: RgbaImage,
    quantized: RgbaImage,
    outline: RgbaImage,
    placement: SpritePlacement,
    composited: RgbaImage,
}

impl Composited {
    /// The final square canvas.
    #[must_use]
    pub const fn composited(&self) -> &RgbaImage {
        &self.composited
    }

    /// Where the sprite was placed on the canvas.
    #[must_use]
    pub const fn placement(&self) -> SpritePlacement {
        self.placement
    }

    /// The configuration this run used.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether normalization resampled the input.
    #[must_use]
    pub const fn normalize_applied(&self) -> bool {
        self.normalize_applied
    }

    /// Consume the pipeline and return the full [`StagedResult`].
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            original: self.original,
            normalized: self.normalized,
            cutout: self.cutout,
            crop_rect: self.crop_rect,
            subject_found: self.subject_found,
            cropped: self.cropped,
            downsampled: self.downsampled,
            quantized: self.quantized,
            outline: self.outline,
            placement: self.placement,
            composited: self.composited,
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 9;

/// The output produced by a single pipeline stage.
///
/// Each variant borrows the data that the corresponding stage computed.
#[must_use]
pub enum StageOutput<'a> {
    /// Source image bytes (not yet decoded).
    Source {
        /// The raw image bytes.
        bytes: &'a [u8],
    },
    /// Decoded RGBA image.
    Decoded {
        /// The original image.
        original: &'a RgbaImage,
    },
    /// Size-normalized image.
    Normalized {
        /// The normalized image.
        normalized: &'a RgbaImage,
    },
    /// Image after background removal.
    Cutout {
        /// The cutout image.
        cutout: &'a RgbaImage,
    },
    /// Subject crop.
    Cropped {
        /// The cropped image.
        cropped: &'a RgbaImage,
        /// Crop region within the cutout.
        rect: Rect,
    },
    /// Sprite-resolution raster.
    Downsampled {
        /// The downsampled image.
        downsampled: &'a RgbaImage,
    },
    /// Palette-quantized sprite.
    Quantized {
        /// The quantized sprite.
        quantized: &'a RgbaImage,
    },
    /// Outline layer.
    Outlined {
        /// The outline band.
        outline: &'a RgbaImage,
    },
    /// Final canvas.
    Composited {
        /// The composited canvas.
        composited: &'a RgbaImage,
        /// Sprite placement on the canvas.
        placement: SpritePlacement,
    },
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// Each stage struct implements it, and [`Stage`] delegates to whichever
/// variant it holds.
pub trait PipelineStage<'a>: Sized {
    /// Human-readable name of this stage (e.g. `"source"`, `"crop"`).
    const NAME: &'static str;

    /// Zero-based index of this stage (`0` for Pending through `8` for
    /// Composited).
    const INDEX: usize;

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Stage-specific metrics for diagnostics.
    ///
    /// Returns `None` for [`Pending`], which has not done any work, and
    /// for [`Cutout`] when background removal was disabled.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(stage))` on success, `Ok(None)` if already at
    /// the final stage, or `Err` if the stage transition fails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] or
    /// [`PipelineError::ImageDecode`] when decoding fails, and
    /// [`PipelineError::Collaborator`] when background removal fails.
    fn next(self) -> Result<Option<Stage<'a>>, PipelineError>;

    /// Run all remaining stages to completion and return the final
    /// [`StagedResult`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    fn complete(self) -> Result<StagedResult, PipelineError>;
}

impl<'a> PipelineStage<'a> for Pending<'a> {
    const NAME: &'static str = "source";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source {
            bytes: &self.source,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Result<Option<Stage<'a>>, PipelineError> {
        Ok(Some(Stage::Decoded(self.decode()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.decode()?.complete()
    }
}

impl<'a> PipelineStage<'a> for Decoded<'a> {
    const NAME: &'static str = "decode";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Decoded {
            original: &self.original,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Decode {
            input_bytes: self.source_len,
            width: self.original.width(),
            height: self.original.height(),
            pixel_count: diagnostics::pixel_count(&self.original),
        })
    }

    fn next(self) -> Result<Option<Stage<'a>>, PipelineError> {
        Ok(Some(Stage::Normalized(self.normalize())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.normalize().complete()
    }
}

impl<'a> PipelineStage<'a> for Normalized<'a> {
    const NAME: &'static str = "normalize";
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Normalized {
            normalized: &self.normalized,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Normalize {
            original_width: self.original.width(),
            original_height: self.original.height(),
            width: self.normalized.width(),
            height: self.normalized.height(),
            longest_side: self.config.normalize_longest_side,
            applied: self.applied,
        })
    }

    fn next(self) -> Result<Option<Stage<'a>>, PipelineError> {
        Ok(Some(Stage::Cutout(self.remove_background()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.remove_background()?.complete()
    }
}

impl<'a> PipelineStage<'a> for Cutout {
    const NAME: &'static str = "remove_background";
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Cutout {
            cutout: &self.cutout,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        if !self.config.remove_background {
            return None;
        }
        Some(StageMetrics::RemoveBackground {
            transparent_pixel_count: diagnostics::count_transparent_pixels(&self.cutout),
            total_pixel_count: diagnostics::pixel_count(&self.cutout),
        })
    }

    fn next(self) -> Result<Option<Stage<'a>>, PipelineError> {
        Ok(Some(Stage::Cropped(self.crop())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.crop().complete()
    }
}

impl<'a> PipelineStage<'a> for Cropped {
    const NAME: &'static str = "crop";
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Cropped {
            cropped: &self.cropped,
            rect: self.crop_rect,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Crop {
            rect: self.crop_rect,
            subject_found: self.subject_found,
        })
    }

    fn next(self) -> Result<Option<Stage<'a>>, PipelineError> {
        Ok(Some(Stage::Downsampled(self.downsample())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.downsample().complete()
    }
}

impl<'a> PipelineStage<'a> for Downsampled {
    const NAME: &'static str = "downsample";
    const INDEX: usize = 5;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Downsampled {
            downsampled: &self.downsampled,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Downsample {
            block_size: self.config.block_size,
            width: self.downsampled.width(),
            height: self.downsampled.height(),
        })
    }

    fn next(self) -> Result<Option<Stage<'a>>, PipelineError> {
        Ok(Some(Stage::Quantized(self.quantize())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.quantize().complete()
    }
}

impl<'a> PipelineStage<'a> for Quantized {
    const NAME: &'static str = "quantize";
    const INDEX: usize = 6;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Quantized {
            quantized: &self.quantized,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Quantize {
            palette: self.config.palette.to_string(),
            dither_strength: self.config.effective_dither_strength(),
            opaque_pixel_count: diagnostics::count_opaque_pixels(&self.quantized),
            distinct_colors: diagnostics::distinct_opaque_colors(&self.quantized),
        })
    }

    fn next(self) -> Result<Option<Stage<'a>>, PipelineError> {
        Ok(Some(Stage::Outlined(self.outline())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.outline().complete()
    }
}

impl<'a> PipelineStage<'a> for Outlined {
    const NAME: &'static str = "outline";
    const INDEX: usize = 7;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Outlined {
            outline: &self.outline,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Outline {
            thickness: self.config.outline_thickness,
            outline_pixel_count: diagnostics::count_opaque_pixels(&self.outline),
        })
    }

    fn next(self) -> Result<Option<Stage<'a>>, PipelineError> {
        Ok(Some(Stage::Composited(self.composite())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        Ok(self.composite().into_result())
    }
}

impl<'a> PipelineStage<'a> for Composited {
    const NAME: &'static str = "composite";
    const INDEX: usize = 8;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Composited {
            composited: &self.composited,
            placement: self.placement,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Composite {
            canvas_side: self.composited.width(),
            placement: self.placement,
        })
    }

    fn next(self) -> Result<Option<Stage<'a>>, PipelineError> {
        Ok(None)
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        Ok(self.into_result())
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
///
/// Use [`From`] conversions to enter the dynamic API from any typed
/// stage, then call [`advance`](Self::advance) in a loop:
///
/// ```rust
/// # use pixsprite_pipeline::{Passthrough, Pipeline, PipelineConfig, PipelineError};
/// # use pixsprite_pipeline::pipeline::{Advance, Stage};
/// # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(png, PipelineConfig::default(), &Passthrough).into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let result = stage.complete()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub enum Stage<'a> {
    /// See [`Pending`].
    Pending(Pending<'a>),
    /// See [`Decoded`].
    Decoded(Decoded<'a>),
    /// See [`Normalized`].
    Normalized(Normalized<'a>),
    /// See [`Cutout`].
    Cutout(Cutout),
    /// See [`Cropped`].
    Cropped(Cropped),
    /// See [`Downsampled`].
    Downsampled(Downsampled),
    /// See [`Quantized`].
    Quantized(Quantized),
    /// See [`Outlined`].
    Outlined(Outlined),
    /// See [`Composited`].
    Composited(Composited),
}

/// Compile-time guard: adding a [`Stage`] variant makes this match
/// non-exhaustive, so [`STAGE_COUNT`] cannot silently drift.
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage<'_>) {
    match s {
        Stage::Pending(_)
        | Stage::Decoded(_)
        | Stage::Normalized(_)
        | Stage::Cutout(_)
        | Stage::Cropped(_)
        | Stage::Downsampled(_)
        | Stage::Quantized(_)
        | Stage::Outlined(_)
        | Stage::Composited(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the
/// completed final stage returned unchanged.
#[must_use]
pub enum Advance<'a> {
    /// The pipeline advanced to this next stage.
    Next(Stage<'a>),
    /// The pipeline was already at the final stage; returned unchanged.
    Complete(Stage<'a>),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Decoded(s) => s.$method($($arg),*),
            Self::Normalized(s) => s.$method($($arg),*),
            Self::Cutout(s) => s.$method($($arg),*),
            Self::Cropped(s) => s.$method($($arg),*),
            Self::Downsampled(s) => s.$method($($arg),*),
            Self::Quantized(s) => s.$method($($arg),*),
            Self::Outlined(s) => s.$method($($arg),*),
            Self::Composited(s) => s.$method($($arg),*),
        }
    };
}

impl<'a> Stage<'a> {
    /// Human-readable name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Stage-specific metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Composited(_))
    }

    /// Advance to the next stage.
    ///
    /// Returns `Ok(None)` if already complete (the final stage is
    /// consumed).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn next(self) -> Result<Option<Self>, PipelineError> {
        delegate!(self, next)
    }

    /// Advance to the next stage, returning `self` unchanged if
    /// already complete.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn advance(self) -> Result<Advance<'a>, PipelineError> {
        if self.is_complete() {
            return Ok(Advance::Complete(self));
        }
        // The is_complete() guard above ensures next() returns Some.
        #[allow(clippy::unreachable)]
        let next = self
            .next()?
            .unwrap_or_else(|| unreachable!("non-complete stage returned None from next()"));
        Ok(Advance::Next(next))
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    pub fn complete(self) -> Result<StagedResult, PipelineError> {
        delegate!(self, complete)
    }
}

// Lets the macro call `.name()` and `.index()` on `&self`; associated
// constants aren't reachable through a receiver.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<'a, T: PipelineStage<'a>> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

macro_rules! stage_from {
    ($($variant:ident $(<$lt:lifetime>)?),* $(,)?) => {
        $(
            impl<'a> From<$variant $(<$lt>)?> for Stage<'a> {
                fn from(s: $variant $(<$lt>)?) -> Self {
                    Self::$variant(s)
                }
            }
        )*
    };
}

stage_from!(
    Pending<'a>,
    Decoded<'a>,
    Normalized<'a>,
    Cutout,
    Cropped,
    Downsampled,
    Quantized,
    Outlined,
    Composited,
);

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental sprite pipeline.
///
/// Created via [`Pipeline::new`], which stores the source image, config,
/// and background remover without doing any processing. Each stage
/// method consumes the current state and returns the next, making it a
/// compile-time error to skip stages or call them out of order.
///
/// The config is used as given; call [`PipelineConfig::validate`] first
/// (the `process*` entry points do this for you).
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from source image bytes, config, and the
    /// background-removal collaborator.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(
        image_bytes: Vec<u8>,
        config: PipelineConfig,
        remover: &dyn BackgroundRemover,
    ) -> Pending<'_> {
        Pending {
            config,
            source: image_bytes,
            remover,
        }
    }
}
