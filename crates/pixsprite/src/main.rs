//! pixsprite: turn an image file into a pixel-art sprite PNG.
//!
//! Reads the input image, runs the sprite pipeline with configurable
//! parameters, and writes the square canvas as PNG. Optionally prints
//! per-stage diagnostics.
//!
//! # Usage
//!
//! ```text
//! pixsprite [OPTIONS] <INPUT> -o <OUTPUT>
//! pixsprite --list-palettes
//! ```
//!
//! Background removal is not built in: pass `--cutout` with a
//! pre-computed transparent cutout of the same picture and its alpha
//! channel is used as the subject mask.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use image::imageops::{self, FilterType};
use pixsprite_pipeline::diagnostics::Clock;
use pixsprite_pipeline::{
    BackgroundRemover, CollaboratorError, PaletteName, Passthrough, PipelineConfig, Rgb, RgbaImage,
};

/// Convert a photo into a palette-quantized pixel-art sprite.
#[derive(Parser)]
#[command(name = "pixsprite", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    #[arg(required_unless_present = "list_palettes")]
    input: Option<PathBuf>,

    /// Where to write the output PNG.
    #[arg(short, long, required_unless_present = "list_palettes")]
    output: Option<PathBuf>,

    /// Do not shrink oversized inputs before processing.
    #[arg(long)]
    no_normalize: bool,

    /// Longest side in pixels after normalization.
    #[arg(
        long,
        default_value_t = PipelineConfig::DEFAULT_NORMALIZE_LONGEST_SIDE,
        value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..)
    )]
    longest_side: u32,

    /// Source pixels per sprite pixel.
    #[arg(
        long,
        default_value_t = PipelineConfig::DEFAULT_BLOCK_SIZE,
        value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..)
    )]
    block_size: u32,

    /// Palette (gb, nes, ega, c64, pico8).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_PALETTE)]
    palette: PaletteName,

    /// Disable ordered dithering.
    #[arg(long)]
    no_dither: bool,

    /// Dither strength (0.0-1.0).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_DITHER_STRENGTH)]
    dither_strength: f32,

    /// Outline thickness in sprite pixels (0 disables the outline).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_OUTLINE_THICKNESS)]
    outline: u32,

    /// Fraction of the canvas the sprite occupies (0.0-1.0].
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SUBJECT_COVERAGE)]
    coverage: f32,

    /// Canvas background color as #rrggbb.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BACKGROUND_FILL)]
    background: Rgb,

    /// Pre-computed transparent cutout of the input, used as the
    /// background mask. Implies background removal.
    #[arg(long)]
    cutout: Option<PathBuf>,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Print per-stage diagnostics to stdout.
    #[arg(long)]
    diagnostics: bool,

    /// Print diagnostics as JSON instead of a human-readable report.
    #[arg(long, requires = "diagnostics")]
    json: bool,

    /// List the available palettes and exit.
    #[arg(long)]
    list_palettes: bool,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual parameter flags are ignored. `--cutout` always turns
/// background removal on.
fn config_from_cli(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).context("parsing --config-json")?
    } else {
        PipelineConfig {
            normalize_enabled: !cli.no_normalize,
            normalize_longest_side: cli.longest_side,
            remove_background: false,
            block_size: cli.block_size,
            palette: cli.palette,
            dither_enabled: !cli.no_dither,
            dither_strength: cli.dither_strength,
            outline_thickness: cli.outline,
            subject_coverage: cli.coverage,
            background_fill: cli.background,
        }
    };
    if cli.cutout.is_some() {
        config.remove_background = true;
    }
    config.validate()?;
    Ok(config)
}

/// Background remover backed by a cutout image loaded from disk.
///
/// The cutout's alpha channel is scaled to whatever size the pipeline
/// hands over (normalization may have shrunk the input) and copied
/// onto the incoming pixels.
struct CutoutFile {
    mask: RgbaImage,
}

impl CutoutFile {
    /// Load `path` and check it matches the input's dimensions.
    fn load(path: &Path, expected: (u32, u32)) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading cutout {}", path.display()))?;
        let mask = pixsprite_pipeline::codec::decode(&bytes)
            .with_context(|| format!("decoding cutout {}", path.display()))?;
        anyhow::ensure!(
            mask.dimensions() == expected,
            "cutout {} is {}x{} but the input is {}x{}",
            path.display(),
            mask.width(),
            mask.height(),
            expected.0,
            expected.1,
        );
        Ok(Self { mask })
    }
}

impl BackgroundRemover for CutoutFile {
    fn remove_background(&self, mut image: RgbaImage) -> Result<RgbaImage, CollaboratorError> {
        let (w, h) = image.dimensions();
        let scaled;
        let mask = if self.mask.dimensions() == (w, h) {
            &self.mask
        } else {
            scaled = imageops::resize(&self.mask, w, h, FilterType::Nearest);
            &scaled
        };
        for (dst, src) in image.pixels_mut().zip(mask.pixels()) {
            dst.0[3] = src.0[3];
        }
        Ok(image)
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

fn print_palettes() {
    for name in PaletteName::ALL {
        let colors: Vec<String> = name.colors().iter().map(ToString::to_string).collect();
        println!("{:<6} {:>2} colors  {}", name.as_str(), colors.len(), colors.join(" "));
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if cli.list_palettes {
        print_palettes();
        return Ok(());
    }

    let (Some(input), Some(output)) = (cli.input.as_deref(), cli.output.as_deref()) else {
        anyhow::bail!("both <INPUT> and --output are required");
    };

    let config = config_from_cli(cli)?;
    tracing::debug!(?config, "resolved configuration");

    let image_bytes =
        std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    tracing::info!(path = %input.display(), bytes = image_bytes.len(), "loaded input");

    let cutout = match cli.cutout.as_deref() {
        Some(path) => {
            let dims = image::ImageReader::new(std::io::Cursor::new(&image_bytes))
                .with_guessed_format()?
                .into_dimensions()
                .with_context(|| format!("reading dimensions of {}", input.display()))?;
            Some(CutoutFile::load(path, dims)?)
        }
        None => None,
    };
    let remover: &dyn BackgroundRemover = match cutout {
        Some(ref c) => c,
        None => &Passthrough,
    };

    let png = if cli.diagnostics {
        let (staged, diagnostics) =
            pixsprite_pipeline::diagnostics::process_staged_with_diagnostics(
                &image_bytes,
                &config,
                remover,
                &StdClock,
            )?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&diagnostics).context("serializing diagnostics")?
            );
        } else {
            println!("{}", diagnostics.report());
        }
        pixsprite_pipeline::codec::encode_png(staged.final_image())?
    } else {
        pixsprite_pipeline::process_with_progress(&image_bytes, &config, remover, |stage| {
            tracing::debug!(%stage, "running");
        })?
    };

    std::fs::write(output, &png).with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(path = %output.display(), bytes = png.len(), "sprite written");
    Ok(())
}

fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixsprite=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
