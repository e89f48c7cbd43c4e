//! Command-line configuration for WSI DICOM.
//!
//! Two subcommands share the slide argument:
//! - `convert` writes the DICOM instances for a slide
//! - `inspect` prints the pyramid and the conversion plan as JSON
//!
//! # Environment Variables
//!
//! - `WSI_DICOM_MAX_FRAMES` - Max frames per instance (default: 500)
//! - `WSI_DICOM_TILE_SIZE` - Frame size, `512` or `512x256` (default: 512x512)
//! - `WSI_DICOM_QUALITY` - JPEG quality (default: 75)
//! - `WSI_DICOM_WORKERS` - Concurrent tile encoders (default: CPU count)

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::convert::{default_workers, ConversionOptions};
use crate::plan::{
    LevelSelection, SlideCoordinates, TileSize, DEFAULT_MAX_FRAME_COUNT, DEFAULT_ORIGIN_X_MM,
    DEFAULT_ORIGIN_Y_MM, DEFAULT_PIXEL_SPACING_MM, MAX_TILE_SIDE,
};
use crate::tile::{FrameCodec, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY};

/// Micrometres per millimetre.
const MICRONS_PER_MM: f64 = 1000.0;

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI DICOM - Convert Whole Slide Images to DICOM.
///
/// Reads a tiled pyramidal TIFF/SVS slide and writes one multi-frame
/// VL Whole Slide Microscopy instance per batch of tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-dicom")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert a slide into DICOM instances
    Convert(ConvertConfig),

    /// Print the slide pyramid and the conversion plan
    Inspect(InspectConfig),
}

// =============================================================================
// Convert
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ConvertConfig {
    /// Path to the slide file (.svs, .tif, .tiff).
    pub slide: PathBuf,

    /// Directory the instances are written to.
    #[arg(short, long, default_value = ".", env = "WSI_DICOM_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Maximum number of frames per instance.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_COUNT, env = "WSI_DICOM_MAX_FRAMES")]
    pub max_frames: usize,

    /// Frame size in pixels, `N` or `WxH`.
    #[arg(long, default_value_t = TileSize::default(), env = "WSI_DICOM_TILE_SIZE")]
    pub tile_size: TileSize,

    /// Pyramid levels to convert: `all` or a comma-separated list.
    #[arg(long, default_value = "all")]
    pub levels: LevelSelection,

    /// Store uncompressed RGB frames instead of JPEG.
    #[arg(long, default_value_t = false)]
    pub raw: bool,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_DICOM_QUALITY")]
    pub quality: u8,

    /// Number of tiles read and encoded concurrently.
    #[arg(long, default_value_t = default_workers(), env = "WSI_DICOM_WORKERS")]
    pub workers: usize,

    /// Slide x origin in millimetres.
    #[arg(long, default_value_t = DEFAULT_ORIGIN_X_MM)]
    pub origin_x: f64,

    /// Slide y origin in millimetres.
    #[arg(long, default_value_t = DEFAULT_ORIGIN_Y_MM)]
    pub origin_y: f64,

    /// Level-0 pixel spacing in millimetres.
    ///
    /// Defaults to the slide's MPP when it reports one, else 0.00025.
    #[arg(long)]
    pub pixel_spacing: Option<f64>,

    /// Write a JSON report of the run to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ConvertConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_frames == 0 {
            return Err("max_frames must be greater than 0".to_string());
        }

        if !self.tile_size.is_valid() {
            return Err(format!(
                "tile_size must be between 1 and {} in both dimensions, got {}",
                MAX_TILE_SIDE, self.tile_size
            ));
        }

        if self.quality > MAX_JPEG_QUALITY {
            return Err("quality must be between 1 and 100".to_string());
        }

        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }

        if let LevelSelection::Levels(levels) = &self.levels {
            if levels.is_empty() {
                return Err("levels must name at least one level".to_string());
            }
        }

        if let Some(spacing) = self.pixel_spacing {
            if !(spacing.is_finite() && spacing > 0.0) {
                return Err("pixel_spacing must be a positive number".to_string());
            }
        }

        check_slide_path(&self.slide)
    }

    /// Frame codec selected by `--raw` and `--quality`.
    pub fn codec(&self) -> FrameCodec {
        FrameCodec::from_options(!self.raw, self.quality)
    }

    /// Level-0 spacing in mm: the explicit flag, then the slide's MPP,
    /// then the default.
    pub fn resolve_pixel_spacing(&self, slide_mpp: Option<f64>) -> f64 {
        self.pixel_spacing
            .or_else(|| {
                slide_mpp
                    .filter(|mpp| mpp.is_finite() && *mpp > 0.0)
                    .map(|mpp| mpp / MICRONS_PER_MM)
            })
            .unwrap_or(DEFAULT_PIXEL_SPACING_MM)
    }

    /// Build the run options, given the MPP reported by the slide.
    pub fn to_options(&self, slide_mpp: Option<f64>) -> ConversionOptions {
        let spacing = self.resolve_pixel_spacing(slide_mpp);
        ConversionOptions {
            max_frame_count: self.max_frames,
            tile_size: self.tile_size,
            levels: self.levels.clone(),
            codec: self.codec(),
            workers: self.workers,
            coordinates: SlideCoordinates {
                origin_x: self.origin_x,
                origin_y: self.origin_y,
                spacing_x: spacing,
                spacing_y: spacing,
            },
        }
    }

    /// File stem used to name the patient.
    pub fn slide_stem(&self) -> String {
        slide_stem(&self.slide)
    }
}

// =============================================================================
// Inspect
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Path to the slide file.
    pub slide: PathBuf,

    /// Maximum number of frames per instance used for the plan.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_COUNT)]
    pub max_frames: usize,

    /// Frame size used for the plan.
    #[arg(long, default_value_t = TileSize::default())]
    pub tile_size: TileSize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InspectConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_frames == 0 {
            return Err("max_frames must be greater than 0".to_string());
        }
        if !self.tile_size.is_valid() {
            return Err(format!(
                "tile_size must be between 1 and {} in both dimensions, got {}",
                MAX_TILE_SIDE, self.tile_size
            ));
        }
        check_slide_path(&self.slide)
    }

    pub fn to_options(&self) -> ConversionOptions {
        ConversionOptions {
            max_frame_count: self.max_frames,
            tile_size: self.tile_size,
            ..ConversionOptions::default()
        }
    }
}

fn check_slide_path(path: &Path) -> Result<(), String> {
    if !path.is_file() {
        return Err(format!("Slide file not found: {}", path.display()));
    }
    Ok(())
}

fn slide_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slide".to_string())
}

// =============================================================================
// Tests
// =============================================================================
