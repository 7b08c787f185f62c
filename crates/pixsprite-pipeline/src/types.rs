//! Shared types for the pixsprite image processing pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::background::CollaboratorError;
use crate::palette::PaletteName;

/// Re-export `GrayImage` so downstream crates can reference binary
/// masks without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage`, the pixel buffer every stage consumes and
/// produces.
pub use image::RgbaImage;

/// An opaque RGB color.
///
/// Serialized as a `[r, g, b]` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Create a new color.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from a packed `0xRRGGBB` value.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
        }
    }

    /// The fully opaque RGBA pixel for this color.
    #[must_use]
    pub const fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, 255])
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        [c.r, c.g, c.b]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Error returned when a string is not a `#rrggbb` color.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color '{0}': expected #rrggbb")]
pub struct ParseRgbError(String);

impl FromStr for Rgb {
    type Err = ParseRgbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseRgbError(s.to_string()));
        }
        u32::from_str_radix(digits, 16)
            .map(Self::from_hex)
            .map_err(|_| ParseRgbError(s.to_string()))
    }
}

/// An axis-aligned rectangle inside a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in pixels (at least 1).
    pub w: u32,
    /// Height in pixels (at least 1).
    pub h: u32,
}

impl Rect {
    /// The rectangle covering an entire `width` x `height` buffer.
    ///
    /// Dimensions are floored to 1 so the result is always a valid
    /// crop region.
    #[must_use]
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            w: if width == 0 { 1 } else { width },
            h: if height == 0 { 1 } else { height },
        }
    }
}

/// Configuration for the sprite pipeline.
///
/// These fields are the complete set of tunable parameters. Fixed
/// thresholds (subject alpha, quantizer transparency, outline mask) are
/// module constants.
///
/// Use [`validate`](Self::validate) (called by every `process*` entry
/// point) to reject out-of-range values. Missing fields in serialized
/// form fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Whether to shrink oversized inputs before anything else.
    pub normalize_enabled: bool,

    /// Longest side, in pixels, after normalization.
    pub normalize_longest_side: u32,

    /// Whether to ask the background-removal collaborator for an alpha
    /// mask.
    pub remove_background: bool,

    /// Source pixels per sprite pixel. Must be at least 1.
    pub block_size: u32,

    /// Fixed palette used for quantization.
    pub palette: PaletteName,

    /// Whether ordered dithering is applied before quantization.
    pub dither_enabled: bool,

    /// Dither strength in `[0, 1]`. Ignored when `dither_enabled` is
    /// `false`.
    pub dither_strength: f32,

    /// Outline band width in sprite pixels. `0` disables the outline.
    pub outline_thickness: u32,

    /// Fraction of the canvas side the sprite occupies, in `(0, 1]`.
    pub subject_coverage: f32,

    /// Opaque canvas color behind the sprite.
    pub background_fill: Rgb,
}

impl PipelineConfig {
    /// Default for [`normalize_enabled`](Self::normalize_enabled).
    pub const DEFAULT_NORMALIZE_ENABLED: bool = true;
    /// Default for [`normalize_longest_side`](Self::normalize_longest_side).
    pub const DEFAULT_NORMALIZE_LONGEST_SIDE: u32 = 1024;
    /// Default for [`remove_background`](Self::remove_background).
    pub const DEFAULT_REMOVE_BACKGROUND: bool = false;
    /// Default for [`block_size`](Self::block_size).
    pub const DEFAULT_BLOCK_SIZE: u32 = 8;
    /// Default for [`palette`](Self::palette).
    pub const DEFAULT_PALETTE: PaletteName = PaletteName::Pico8;
    /// Default for [`dither_enabled`](Self::dither_enabled).
    pub const DEFAULT_DITHER_ENABLED: bool = true;
    /// Default for [`dither_strength`](Self::dither_strength).
    pub const DEFAULT_DITHER_STRENGTH: f32 = 0.5;
    /// Default for [`outline_thickness`](Self::outline_thickness).
    pub const DEFAULT_OUTLINE_THICKNESS: u32 = 1;
    /// Default for [`subject_coverage`](Self::subject_coverage).
    pub const DEFAULT_SUBJECT_COVERAGE: f32 = 0.7;
    /// Default for [`background_fill`](Self::background_fill).
    pub const DEFAULT_BACKGROUND_FILL: Rgb = Rgb::new(255, 255, 255);

    /// Effective dither strength: `0.0` when dithering is disabled.
    #[must_use]
    pub const fn effective_dither_strength(&self) -> f32 {
        if self.dither_enabled {
            self.dither_strength
        } else {
            0.0
        }
    }

    /// Check every field against its documented range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first field
    /// that is out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.block_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "block_size must be at least 1".to_string(),
            ));
        }
        if self.normalize_enabled && self.normalize_longest_side == 0 {
            return Err(PipelineError::InvalidConfig(
                "normalize_longest_side must be at least 1".to_string(),
            ));
        }
        if !self.dither_strength.is_finite() || !(0.0..=1.0).contains(&self.dither_strength) {
            return Err(PipelineError::InvalidConfig(format!(
                "dither_strength must be within [0, 1], got {}",
                self.dither_strength,
            )));
        }
        if !self.subject_coverage.is_finite()
            || self.subject_coverage <= 0.0
            || self.subject_coverage > 1.0
        {
            return Err(PipelineError::InvalidConfig(format!(
                "subject_coverage must be within (0, 1], got {}",
                self.subject_coverage,
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            normalize_enabled: Self::DEFAULT_NORMALIZE_ENABLED,
            normalize_longest_side: Self::DEFAULT_NORMALIZE_LONGEST_SIDE,
            remove_background: Self::DEFAULT_REMOVE_BACKGROUND,
            block_size: Self::DEFAULT_BLOCK_SIZE,
            palette: Self::DEFAULT_PALETTE,
            dither_enabled: Self::DEFAULT_DITHER_ENABLED,
            dither_strength: Self::DEFAULT_DITHER_STRENGTH,
            outline_thickness: Self::DEFAULT_OUTLINE_THICKNESS,
            subject_coverage: Self::DEFAULT_SUBJECT_COVERAGE,
            background_fill: Self::DEFAULT_BACKGROUND_FILL,
        }
    }
}

/// Result of running the pipeline with every intermediate preserved.
///
/// Each raster is owned by this struct once the run finishes; the
/// pipeline itself keeps nothing.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Decoded input image.
    pub original: RgbaImage,
    /// After optional normalization.
    pub normalized: RgbaImage,
    /// After optional background removal.
    pub cutout: RgbaImage,
    /// Subject crop region within `cutout`.
    pub crop_rect: Rect,
    /// `false` when no pixel passed the subject threshold and the full
    /// frame was used instead.
    pub subject_found: bool,
    /// Cropped subject.
    pub cropped: RgbaImage,
    /// Sprite-resolution raster.
    pub downsampled: RgbaImage,
    /// Palette-quantized sprite.
    pub quantized: RgbaImage,
    /// Outline band at sprite resolution.
    pub outline: RgbaImage,
    /// Where the sprite landed on the canvas.
    pub placement: crate::composite::SpritePlacement,
    /// Final square canvas.
    pub composited: RgbaImage,
}

impl StagedResult {
    /// The final composited canvas, ready for encoding.
    #[must_use]
    pub const fn final_image(&self) -> &RgbaImage {
        &self.composited
    }
}

/// Errors that can occur during pipeline processing.
///
/// An empty subject is deliberately absent: the pipeline falls back to
/// the full frame (see [`StagedResult::subject_found`]).
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input bytes could not be decoded as a raster image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The final canvas could not be encoded.
    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    /// An external collaborator (e.g. background removal) failed.
    #[error("collaborator failed: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

/// Serde-compatible proxy for `PipelineError`.
///
/// `ImageDecode` stores its `Display` string; deserializing yields an
/// [`PipelineError::ImageDecode`] wrapping an unsupported-format error
/// that carries the same message.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    ImageEncode(String),
    Collaborator(String),
    InvalidConfig(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::ImageEncode(s) => PipelineErrorProxy::ImageEncode(s.clone()),
            Self::Collaborator(e) => PipelineErrorProxy::Collaborator(e.message().to_string()),
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::ImageDecode(image::ImageError::Unsupported(
                    image::error::UnsupportedError::from_format_and_kind(
                        image::error::ImageFormatHint::Unknown,
                        image::error::UnsupportedErrorKind::GenericFeature(msg),
                    ),
                ))
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::ImageEncode(s) => Self::ImageEncode(s),
            PipelineErrorProxy::Collaborator(s) => Self::Collaborator(CollaboratorError::new(s)),
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Rgb tests ---

    #[test]
    fn rgb_from_hex() {
        assert_eq!(Rgb::from_hex(0xFF_00_4D), Rgb::new(255, 0, 77));
    }

    #[test]
    fn rgb_parse_with_and_without_hash() {
        assert_eq!("#1d2b53".parse::<Rgb>().unwrap(), Rgb::new(29, 43, 83));
        assert_eq!("FFFFFF".parse::<Rgb>().unwrap(), Rgb::new(255, 255, 255));
    }

    #[test]
    fn rgb_parse_rejects_garbage() {
        assert!("#12345".parse::<Rgb>().is_err());
        assert!("#zzzzzz".parse::<Rgb>().is_err());
        assert!("".parse::<Rgb>().is_err());
    }

    #[test]
    fn rgb_display_is_lowercase_hex() {
        assert_eq!(Rgb::new(255, 0, 77).to_string(), "#ff004d");
    }

    #[test]
    fn rgb_serializes_as_triple() {
        let json = serde_json::to_string(&Rgb::new(1, 2, 3)).unwrap();
        assert_eq!(json, "[1,2,3]");
        let back: Rgb = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Rgb::new(1, 2, 3));
    }

    // --- Rect tests ---

    #[test]
    fn rect_full_covers_buffer() {
        assert_eq!(
            Rect::full(32, 20),
            Rect {
                x: 0,
                y: 0,
                w: 32,
                h: 20
            }
        );
    }

    #[test]
    fn rect_full_floors_to_one() {
        let r = Rect::full(0, 0);
        assert_eq!((r.w, r.h), (1, 1));
    }

    // --- PipelineConfig tests ---

    #[test]
    fn pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert!(config.normalize_enabled);
        assert_eq!(config.normalize_longest_side, 1024);
        assert!(!config.remove_background);
        assert_eq!(config.block_size, 8);
        assert_eq!(config.palette, PaletteName::Pico8);
        assert!(config.dither_enabled);
        assert!((config.dither_strength - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.outline_thickness, 1);
        assert!((config.subject_coverage - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.background_fill, Rgb::new(255, 255, 255));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_block_size() {
        let config = PipelineConfig {
            block_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(ref s)) if s.contains("block_size")
        ));
    }

    #[test]
    fn validate_rejects_zero_longest_side_only_when_enabled() {
        let mut config = PipelineConfig {
            normalize_longest_side: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
        config.normalize_enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_dither_strength() {
        for strength in [-0.1, 1.5, f32::NAN] {
            let config = PipelineConfig {
                dither_strength: strength,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "strength {strength} accepted");
        }
    }

    #[test]
    fn validate_rejects_out_of_range_coverage() {
        for coverage in [0.0, -1.0, 1.01, f32::INFINITY] {
            let config = PipelineConfig {
                subject_coverage: coverage,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "coverage {coverage} accepted");
        }
        let full = PipelineConfig {
            subject_coverage: 1.0,
            ..PipelineConfig::default()
        };
        assert!(full.validate().is_ok());
    }

    #[test]
    fn effective_dither_strength_respects_toggle() {
        let mut config = PipelineConfig {
            dither_strength: 0.8,
            ..PipelineConfig::default()
        };
        assert!((config.effective_dither_strength() - 0.8).abs() < f32::EPSILON);
        config.dither_enabled = false;
        assert!(config.effective_dither_strength().abs() < f32::EPSILON);
    }

    #[test]
    fn pipeline_config_serde_round_trip() {
        let config = PipelineConfig {
            normalize_enabled: false,
            normalize_longest_side: 512,
            remove_background: true,
            block_size: 4,
            palette: PaletteName::Gb,
            dither_enabled: false,
            dither_strength: 0.25,
            outline_thickness: 3,
            subject_coverage: 0.6,
            background_fill: Rgb::new(10, 20, 30),
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn pipeline_config_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"palette":"c64","block_size":3}"#).unwrap();
        assert_eq!(config.palette, PaletteName::C64);
        assert_eq!(config.block_size, 3);
        assert_eq!(config.outline_thickness, PipelineConfig::DEFAULT_OUTLINE_THICKNESS);
    }

    // --- PipelineError tests ---

    #[test]
    fn error_display() {
        assert_eq!(
            PipelineError::EmptyInput.to_string(),
            "input image data is empty"
        );
        assert_eq!(
            PipelineError::Collaborator(CollaboratorError::new("timed out")).to_string(),
            "collaborator failed: timed out",
        );
    }

    #[test]
    fn pipeline_error_serde_round_trip_collaborator() {
        let err = PipelineError::Collaborator(CollaboratorError::new("model missing"));
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            deserialized,
            PipelineError::Collaborator(ref e) if e.message() == "model missing"
        ));
    }

    #[test]
    fn pipeline_error_serde_round_trip_decode_keeps_message() {
        let err = crate::codec::decode(&[0xFF, 0x00]).unwrap_err();
        let message = err.to_string();
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(deserialized, PipelineError::ImageDecode(_)));
        let inner = match err {
            PipelineError::ImageDecode(e) => e.to_string(),
            other => other.to_string(),
        };
        assert!(deserialized.to_string().contains(&inner), "{message}");
    }
}
