//! # WSI DICOM
//!
//! Converts tiled pyramidal Whole Slide Images (Aperio SVS, pyramidal TIFF,
//! BigTIFF) into DICOM VL Whole Slide Microscopy Image instances.
//!
//! Every selected pyramid level is cut into fixed-size frames, scanned
//! column by column. Frames are grouped into batches of at most
//! `max_frame_count`, and each batch becomes one multi-frame instance with
//! per-frame position metadata and either raw RGB or encapsulated JPEG
//! pixel data.
//!
//! ## Architecture
//!
//! - [`io`] - Byte-range reads from slide files
//! - [`mod@format`] - TIFF structure, JPEG tables and vendor metadata
//! - [`slide`] - The [`ImageSource`] seam and its TIFF implementation
//! - [`plan`] - Frame layout, instance splitting and frame positions
//! - [`tile`] - Frame encoding and pixel stream packing
//! - [`dicom`] - Dataset construction and the container writer
//! - [`convert`] - Pipeline orchestration and run reports
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wsi_dicom::{ConversionOptions, DicomFileWriter, InstanceAssembler, SharedMetadata, TiffSlide};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let slide = Arc::new(TiffSlide::open_file("CMU-1.svs").await?);
//!     let options = ConversionOptions::default();
//!     let shared = SharedMetadata::for_slide("CMU-1", options.codec);
//!
//!     let assembler = InstanceAssembler::new(slide, DicomFileWriter::new("out"), shared, options);
//!     let report = assembler.run().await?;
//!     println!("{} instances written", report.instances.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod dicom;
pub mod error;
pub mod format;
pub mod io;
pub mod plan;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, ConvertConfig, InspectConfig};
pub use convert::{
    ConversionOptions, ConversionPlan, ConversionReport, InstanceAssembler, InstanceFailure,
    InstanceSummary, PlanSummary,
};
pub use dicom::{
    build_dataset, ContainerInstance, ContainerWriter, DicomFileWriter, SharedMetadata,
};
pub use error::{
    ConvertError, EncodeError, InstanceError, IoError, PlanError, SourceError, StreamError,
    TiffError, WriterError,
};
pub use format::tiff::{Compression, TiffPyramid, TileData};
pub use format::SlideMetadata;
pub use io::{FileRangeReader, RangeReader};
pub use plan::{
    FrameBatch, FrameLayoutPlanner, FrameMetadata, FrameMetadataBuilder, InstanceSplitter,
    LevelPlan, LevelSelection, SlideCoordinates, TileDescriptor, TileSize,
};
pub use slide::{ImageSource, PyramidGeometry, TiffSlide};
pub use tile::{EncodedFrame, FrameCodec, PixelStream};
