//! Fixed retro palettes and nearest-color matching.
//!
//! Each palette is an ordered list of RGB colors. Order matters: when two
//! entries are equally close to a pixel, the one listed first wins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::Rgb;

/// Names of the built-in palettes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteName {
    /// Original Game Boy, four shades of green.
    Gb,
    /// NES PPU colors (duplicate blacks removed).
    Nes,
    /// IBM EGA 16-color palette.
    Ega,
    /// Commodore 64 (Pepto) 16-color palette.
    C64,
    /// PICO-8 fantasy console 16-color palette.
    #[default]
    Pico8,
}

impl PaletteName {
    /// Every built-in palette, in display order.
    pub const ALL: [Self; 5] = [Self::Gb, Self::Nes, Self::Ega, Self::C64, Self::Pico8];

    /// The palette's colors, in tie-break order.
    #[must_use]
    pub const fn colors(self) -> &'static [Rgb] {
        match self {
            Self::Gb => GB,
            Self::Nes => NES,
            Self::Ega => EGA,
            Self::C64 => C64,
            Self::Pico8 => PICO8,
        }
    }

    /// Short lowercase identifier (`"gb"`, `"pico8"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gb => "gb",
            Self::Nes => "nes",
            Self::Ega => "ega",
            Self::C64 => "c64",
            Self::Pico8 => "pico8",
        }
    }
}

impl fmt::Display for PaletteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown palette name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown palette '{0}' (expected one of: gb, nes, ega, c64, pico8)")]
pub struct UnknownPalette(String);

impl FromStr for PaletteName {
    type Err = UnknownPalette;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPalette(s.to_string()))
    }
}

/// Perceptually weighted squared distance between two colors.
///
/// `0.3*dr² + 0.59*dg² + 0.11*db²`: green differences weigh most,
/// following the eye's luminance sensitivity.
#[must_use]
pub fn weighted_distance(r: f32, g: f32, b: f32, entry: Rgb) -> f32 {
    let dr = r - f32::from(entry.r);
    let dg = g - f32::from(entry.g);
    let db = b - f32::from(entry.b);
    0.11f32.mul_add(db * db, 0.3f32.mul_add(dr * dr, 0.59 * dg * dg))
}

/// The palette entry closest to `(r, g, b)` under
/// [`weighted_distance`].
///
/// Ties go to the lowest index. Returns black for an empty palette.
#[must_use]
pub fn nearest(palette: &[Rgb], r: f32, g: f32, b: f32) -> Rgb {
    let mut best = Rgb::new(0, 0, 0);
    let mut best_distance = f32::INFINITY;
    for &entry in palette {
        let d = weighted_distance(r, g, b, entry);
        // Strict comparison keeps the earliest entry on ties.
        if d < best_distance {
            best_distance = d;
            best = entry;
        }
    }
    best
}

const GB: &[Rgb] = &[
    Rgb::from_hex(0x0F_38_0F),
    Rgb::from_hex(0x30_62_30),
    Rgb::from_hex(0x8B_AC_0F),
    Rgb::from_hex(0x9B_BC_0F),
];

const NES: &[Rgb] = &[
    Rgb::from_hex(0x7C_7C_7C),
    Rgb::from_hex(0x00_00_FC),
    Rgb::from_hex(0x00_00_BC),
    Rgb::from_hex(0x44_28_BC),
    Rgb::from_hex(0x94_00_84),
    Rgb::from_hex(0xA8_00_20),
    Rgb::from_hex(0xA8_10_00),
    Rgb::from_hex(0x88_14_00),
    Rgb::from_hex(0x50_30_00),
    Rgb::from_hex(0x00_78_00),
    Rgb::from_hex(0x00_68_00),
    Rgb::from_hex(0x00_58_00),
    Rgb::from_hex(0x00_40_58),
    Rgb::from_hex(0x00_00_00),
    Rgb::from_hex(0xBC_BC_BC),
    Rgb::from_hex(0x00_78_F8),
    Rgb::from_hex(0x00_58_F8),
    Rgb::from_hex(0x68_44_FC),
    Rgb::from_hex(0xD8_00_CC),
    Rgb::from_hex(0xE4_00_58),
    Rgb::from_hex(0xF8_38_00),
    Rgb::from_hex(0xE4_5C_10),
    Rgb::from_hex(0xAC_7C_00),
    Rgb::from_hex(0x00_B8_00),
    Rgb::from_hex(0x00_A8_00),
    Rgb::from_hex(0x00_A8_44),
    Rgb::from_hex(0x00_88_88),
    Rgb::from_hex(0xF8_F8_F8),
    Rgb::from_hex(0x3C_BC_FC),
    Rgb::from_hex(0x68_88_FC),
    Rgb::from_hex(0x98_78_F8),
    Rgb::from_hex(0xF8_78_F8),
    Rgb::from_hex(0xF8_58_98),
    Rgb::from_hex(0xF8_78_58),
    Rgb::from_hex(0xFC_A0_44),
    Rgb::from_hex(0xF8_B8_00),
    Rgb::from_hex(0xB8_F8_18),
    Rgb::from_hex(0x58_D8_54),
    Rgb::from_hex(0x58_F8_98),
    Rgb::from_hex(0x00_E8_D8),
    Rgb::from_hex(0x78_78_78),
    Rgb::from_hex(0xFC_FC_FC),
    Rgb::from_hex(0xA4_E4_FC),
    Rgb::from_hex(0xB8_B8_F8),
    Rgb::from_hex(0xD8_B8_F8),
    Rgb::from_hex(0xF8_B8_F8),
    Rgb::from_hex(0xF8_A4_C0),
    Rgb::from_hex(0xF0_D0_B0),
    Rgb::from_hex(0xFC_E0_A8),
    Rgb::from_hex(0xF8_D8_78),
    Rgb::from_hex(0xD8_F8_78),
    Rgb::from_hex(0xB8_F8_B8),
    Rgb::from_hex(0xB8_F8_D8),
    Rgb::from_hex(0x00_FC_FC),
    Rgb::from_hex(0xF8_D8_F8),
];

const EGA: &[Rgb] = &[
    Rgb::from_hex(0x00_00_00),
    Rgb::from_hex(0x00_00_AA),
    Rgb::from_hex(0x00_AA_00),
    Rgb::from_hex(0x00_AA_AA),
    Rgb::from_hex(0xAA_00_00),
    Rgb::from_hex(0xAA_00_AA),
    Rgb::from_hex(0xAA_55_00),
    Rgb::from_hex(0xAA_AA_AA),
    Rgb::from_hex(0x55_55_55),
    Rgb::from_hex(0x55_55_FF),
    Rgb::from_hex(0x55_FF_55),
    Rgb::from_hex(0x55_FF_FF),
    Rgb::from_hex(0xFF_55_55),
    Rgb::from_hex(0xFF_55_FF),
    Rgb::from_hex(0xFF_FF_55),
    Rgb::from_hex(0xFF_FF_FF),
];

const C64: &[Rgb] = &[
    Rgb::from_hex(0x00_00_00),
    Rgb::from_hex(0xFF_FF_FF),
    Rgb::from_hex(0x68_37_2B),
    Rgb::from_hex(0x70_A4_B2),
    Rgb::from_hex(0x6F_3D_86),
    Rgb::from_hex(0x58_8D_43),
    Rgb::from_hex(0x35_28_79),
    Rgb::from_hex(0xB8_C7_6F),
    Rgb::from_hex(0x6F_4F_25),
    Rgb::from_hex(0x43_39_00),
    Rgb::from_hex(0x9A_67_59),
    Rgb::from_hex(0x44_44_44),
    Rgb::from_hex(0x6C_6C_6C),
    Rgb::from_hex(0x9A_D2_84),
    Rgb::from_hex(0x6C_5E_B5),
    Rgb::from_hex(0x95_95_95),
];

const PICO8: &[Rgb] = &[
    Rgb::from_hex(0x00_00_00),
    Rgb::from_hex(0x1D_2B_53),
    Rgb::from_hex(0x7E_25_53),
    Rgb::from_hex(0x00_87_51),
    Rgb::from_hex(0xAB_52_36),
    Rgb::from_hex(0x5F_57_4F),
    Rgb::from_hex(0xC2_C3_C7),
    Rgb::from_hex(0xFF_F1_E8),
    Rgb::from_hex(0xFF_00_4D),
    Rgb::from_hex(0xFF_A3_00),
    Rgb::from_hex(0xFF_EC_27),
    Rgb::from_hex(0x00_E4_36),
    Rgb::from_hex(0x29_AD_FF),
    Rgb::from_hex(0x83_76_9C),
    Rgb::from_hex(0xFF_77_A8),
    Rgb::from_hex(0xFF_CC_AA),
];
