//! WSI DICOM - Convert Whole Slide Images to DICOM.
//!
//! This binary parses the command line, opens the slide and drives the
//! conversion pipeline.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_dicom::{
    config::{Cli, Command, ConvertConfig, InspectConfig},
    convert::{ConversionPlan, InstanceAssembler},
    dicom::{DicomFileWriter, SharedMetadata},
    slide::{ImageSource, PyramidGeometry, TiffSlide},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Convert(config) => run_convert(config).await,
        Command::Inspect(config) => run_inspect(config).await,
    }
}

// =============================================================================
// Convert Command
// =============================================================================

async fn run_convert(config: ConvertConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let slide = match TiffSlide::open_file(&config.slide).await {
        Ok(slide) => Arc::new(slide),
        Err(e) => {
            error!("Failed to open {}: {}", config.slide.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let options = config.to_options(slide.microns_per_pixel());
    let shared = SharedMetadata::for_slide(&config.slide_stem(), options.codec);

    info!("Configuration:");
    info!("  Slide: {}", config.slide.display());
    info!("  Output: {}", config.output_dir.display());
    info!("  Codec: {}", options.codec);
    info!("  Tile size: {}", options.tile_size);
    info!("  Max frames per instance: {}", options.max_frame_count);
    info!("  Workers: {}", options.workers);
    info!("  Pixel spacing: {} mm", options.coordinates.spacing_x);
    if slide.microns_per_pixel().is_none() && config.pixel_spacing.is_none() {
        warn!("  Slide reports no MPP; using the default pixel spacing");
    }

    let writer = DicomFileWriter::new(&config.output_dir);
    let assembler = InstanceAssembler::new(slide, writer, shared, options);

    let started = Instant::now();
    let report = match assembler.run().await {
        Ok(report) => report,
        Err(e) => {
            error!("Conversion failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Wrote {} instance(s), {} frame(s) in {:.1}s",
        report.instances.len(),
        report.total_frames(),
        started.elapsed().as_secs_f64()
    );

    if let Some(ref path) = config.report {
        match report.write_json(path).await {
            Ok(()) => info!("Report written to {}", path.display()),
            Err(e) => {
                error!("Failed to write report {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }

    if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        error!("{} instance(s) failed", report.failures.len());
        for failure in &report.failures {
            error!(
                "  Instance {} (level {}): {}",
                failure.instance_number, failure.level, failure.error
            );
        }
        ExitCode::FAILURE
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let slide = match TiffSlide::open_file(&config.slide).await {
        Ok(slide) => slide,
        Err(e) => {
            eprintln!("Error: failed to open {}: {}", config.slide.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let plan = PyramidGeometry::from_source(&slide)
        .and_then(|geometry| ConversionPlan::build(&geometry, &config.to_options()));
    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let metadata = slide.metadata();
    let output = json!({
        "slide": config.slide.display().to_string(),
        "vendor": metadata.vendor,
        "mpp": metadata.mpp,
        "magnification": metadata.magnification,
        "plan": plan.summary(),
    });

    match serde_json::to_string_pretty(&output) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_dicom=debug"
    } else {
        "wsi_dicom=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
