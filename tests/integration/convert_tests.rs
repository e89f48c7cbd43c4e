//! Conversion pipeline tests against a synthetic pyramid.

use std::collections::HashSet;
use std::sync::Arc;

use clap::Parser;
use wsi_dicom::config::{Cli, Command};
use wsi_dicom::convert::{ConversionOptions, InstanceAssembler};
use wsi_dicom::dicom::{ContainerInstance, SharedMetadata};
use wsi_dicom::error::{ConvertError, PlanError};
use wsi_dicom::plan::{LevelSelection, SlideCoordinates, TileSize};
use wsi_dicom::slide::ImageSource;
use wsi_dicom::tile::{split_native, FrameCodec, PixelStream};

use super::test_utils::{synthetic_pixel, RecordingWriter, SyntheticSlide};

fn options(max_frame_count: usize, codec: FrameCodec) -> ConversionOptions {
    ConversionOptions {
        max_frame_count,
        tile_size: TileSize::square(512),
        levels: LevelSelection::All,
        codec,
        workers: 4,
        coordinates: SlideCoordinates::default(),
    }
}

fn assembler(
    slide: SyntheticSlide,
    writer: RecordingWriter,
    options: ConversionOptions,
) -> InstanceAssembler<SyntheticSlide, RecordingWriter> {
    let shared = SharedMetadata::for_slide("synthetic", options.codec);
    InstanceAssembler::new(Arc::new(slide), writer, shared, options)
}

fn frame_indices(instances: &[ContainerInstance]) -> Vec<(u32, u32)> {
    instances
        .iter()
        .flat_map(|i| i.frames.iter().map(|f| f.dimension_index))
        .collect()
}

// =============================================================================
// Planning and Splitting
// =============================================================================

#[tokio::test]
async fn test_six_instances_of_two_frames() {
    let conv = assembler(
        SyntheticSlide::new(2000, 1500),
        RecordingWriter::new(),
        options(2, FrameCodec::Raw),
    );

    let report = conv.run().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.instances.len(), 6);
    assert_eq!(report.total_frames(), 12);

    let instances = conv.writer().instances().await;
    let numbers: Vec<u32> = instances.iter().map(|i| i.instance_number).collect();
    assert_eq!(numbers, vec![0, 1, 2, 3, 4, 5]);
    assert!(instances.iter().all(|i| i.frame_count() == 2));

    // Column-major scan: rows advance first within a column
    assert_eq!(
        frame_indices(&instances),
        vec![
            (1, 1),
            (1, 2),
            (1, 3),
            (2, 1),
            (2, 2),
            (2, 3),
            (3, 1),
            (3, 2),
            (3, 3),
            (4, 1),
            (4, 2),
            (4, 3),
        ]
    );
}

#[tokio::test]
async fn test_single_instance_when_under_limit() {
    let conv = assembler(
        SyntheticSlide::new(2000, 1500),
        RecordingWriter::new(),
        options(500, FrameCodec::Raw),
    );

    let report = conv.run().await.unwrap();
    assert_eq!(report.instances.len(), 1);

    let instances = conv.writer().instances().await;
    assert_eq!(instances[0].instance_number, 0);
    assert_eq!(instances[0].frame_count(), 12);
    assert_eq!(instances[0].total_matrix, (2000, 1500));
}

#[tokio::test]
async fn test_every_tile_emitted_exactly_once() {
    let conv = assembler(
        SyntheticSlide::new(2600, 1100).with_level(1300, 550, 2.0),
        RecordingWriter::new(),
        options(4, FrameCodec::Raw),
    );

    conv.run().await.unwrap();
    let instances = conv.writer().instances().await;

    for level in 0..2 {
        let level_instances: Vec<_> = instances
            .iter()
            .filter(|i| i.level == level)
            .cloned()
            .collect();
        let indices = frame_indices(&level_instances);
        let unique: HashSet<_> = indices.iter().copied().collect();
        assert_eq!(indices.len(), unique.len(), "duplicate frame on level {}", level);

        let expected = if level == 0 { 6 * 3 } else { 3 * 2 };
        assert_eq!(indices.len(), expected);
    }
}

#[tokio::test]
async fn test_instance_numbers_continue_across_levels() {
    let conv = assembler(
        SyntheticSlide::new(2000, 1500).with_level(1000, 750, 2.0),
        RecordingWriter::new(),
        options(5, FrameCodec::Raw),
    );

    let report = conv.run().await.unwrap();
    let instances = conv.writer().instances().await;

    // Level 0: 12 tiles in 3 batches; level 1: 4 tiles in 1 batch
    let numbers: Vec<(usize, u32)> = instances
        .iter()
        .map(|i| (i.level, i.instance_number))
        .collect();
    assert_eq!(numbers, vec![(0, 0), (0, 1), (0, 2), (1, 3)]);
    assert_eq!(report.instances.last().unwrap().instance_number, 3);
}

#[tokio::test]
async fn test_level_selection_skips_unselected_levels() {
    let mut opts = options(500, FrameCodec::Raw);
    opts.levels = LevelSelection::Levels(vec![1]);

    let conv = assembler(
        SyntheticSlide::new(2000, 1500).with_level(1000, 750, 2.0),
        RecordingWriter::new(),
        opts,
    );

    conv.run().await.unwrap();
    let instances = conv.writer().instances().await;
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].level, 1);
    assert_eq!(instances[0].instance_number, 0);
    assert_eq!(instances[0].total_matrix, (1000, 750));
}

#[tokio::test]
async fn test_bad_level_fails_before_writing() {
    let mut opts = options(500, FrameCodec::Raw);
    opts.levels = LevelSelection::Levels(vec![0, 3]);

    let slide = Arc::new(SyntheticSlide::new(2000, 1500));
    let conv = InstanceAssembler::new(
        Arc::clone(&slide),
        RecordingWriter::new(),
        SharedMetadata::default(),
        opts,
    );

    let result = conv.run().await;
    assert!(matches!(
        result,
        Err(ConvertError::Plan(PlanError::LevelRange {
            level: 3,
            level_count: 1
        }))
    ));
    assert!(conv.writer().instances().await.is_empty());
    assert_eq!(slide.read_count(), 0);
}

#[tokio::test]
async fn test_zero_max_frames_rejected() {
    let conv = assembler(
        SyntheticSlide::new(2000, 1500),
        RecordingWriter::new(),
        options(0, FrameCodec::Raw),
    );

    assert!(matches!(
        conv.run().await,
        Err(ConvertError::Plan(PlanError::InvalidMaxFrameCount))
    ));
}

#[tokio::test]
async fn test_runs_are_idempotent() {
    let first = assembler(
        SyntheticSlide::new(1500, 1100),
        RecordingWriter::new(),
        options(3, FrameCodec::Raw),
    );
    let second = assembler(
        SyntheticSlide::new(1500, 1100),
        RecordingWriter::new(),
        options(3, FrameCodec::Raw),
    );

    first.run().await.unwrap();
    second.run().await.unwrap();
    assert_eq!(
        first.writer().instances().await,
        second.writer().instances().await
    );
}

// =============================================================================
// Frame Metadata
// =============================================================================

#[tokio::test]
async fn test_frame_positions() {
    let conv = assembler(
        SyntheticSlide::new(2000, 1500),
        RecordingWriter::new(),
        options(500, FrameCodec::Raw),
    );
    conv.run().await.unwrap();

    let instance = &conv.writer().instances().await[0];
    let spacing = 0.00025;

    // Second frame: column 1, row 2
    let frame = instance.frames[1];
    assert_eq!(frame.dimension_index, (1, 2));
    assert_eq!(frame.matrix_col_position, 1);
    assert_eq!(frame.matrix_row_position, 513);
    assert!((frame.slide_x_offset - 20.0).abs() < 1e-9);
    assert!((frame.slide_y_offset - (40.0 + 512.0 * spacing)).abs() < 1e-9);
    assert_eq!(frame.slide_z_offset, 0.0);

    // Last frame: column 4, row 3
    let last = instance.frames[11];
    assert_eq!(last.dimension_index, (4, 3));
    assert_eq!(last.matrix_col_position, 1537);
    assert_eq!(last.matrix_row_position, 1025);

    assert_eq!(instance.pixel_spacing, (spacing, spacing));
    assert_eq!(instance.origin, (20.0, 40.0));
}

#[tokio::test]
async fn test_slide_mpp_sets_spacing_and_offsets() {
    let slide = SyntheticSlide::new(2000, 1500)
        .with_level(1000, 750, 2.0)
        .with_mpp(0.5);

    let cli = Cli::try_parse_from(["wsi-dicom", "convert", "slide.svs", "--raw"]).unwrap();
    let Command::Convert(config) = cli.into_command() else {
        panic!("expected convert");
    };
    let opts = config.to_options(slide.microns_per_pixel());

    let conv = assembler(slide, RecordingWriter::new(), opts);
    conv.run().await.unwrap();
    let instances = conv.writer().instances().await;
    assert_eq!(instances.len(), 2);

    // 0.5 um per pixel is 0.0005 mm at level 0
    let level0 = &instances[0];
    assert_eq!(level0.pixel_spacing, (0.0005, 0.0005));
    let frame = level0.frames[1];
    assert_eq!(frame.dimension_index, (1, 2));
    assert!((frame.slide_y_offset - (40.0 + 512.0 * 0.0005)).abs() < 1e-9);

    // Level 1 frames step 1024 level-0 pixels; spacing doubles
    let level1 = &instances[1];
    assert_eq!(level1.level, 1);
    assert_eq!(level1.pixel_spacing, (0.001, 0.001));
    let frame = level1.frames[1];
    assert_eq!(frame.dimension_index, (1, 2));
    assert_eq!(frame.matrix_row_position, 513);
    assert!((frame.slide_y_offset - (40.0 + 1024.0 * 0.0005)).abs() < 1e-9);
}

#[tokio::test]
async fn test_downsampled_level_positions() {
    let mut opts = options(500, FrameCodec::Raw);
    opts.levels = LevelSelection::Levels(vec![1]);

    let conv = assembler(
        SyntheticSlide::new(4000, 3000).with_level(1000, 750, 4.0),
        RecordingWriter::new(),
        opts,
    );
    conv.run().await.unwrap();

    let instance = &conv.writer().instances().await[0];
    // step = 512 * 4 = 2048 level-0 pixels -> 2 x 2 frames
    assert_eq!(instance.frame_count(), 4);
    assert_eq!(instance.total_matrix, (1000, 750));
    assert_eq!(instance.pixel_spacing, (0.001, 0.001));

    let frame = instance.frames[3];
    assert_eq!(frame.dimension_index, (2, 2));
    assert_eq!(frame.matrix_col_position, 513);
    assert_eq!(frame.matrix_row_position, 513);
    assert!((frame.slide_x_offset - (20.0 + 2048.0 * 0.00025)).abs() < 1e-9);
}

// =============================================================================
// Pixel Data
// =============================================================================

#[tokio::test]
async fn test_raw_frames_match_source_pixels() {
    let conv = assembler(
        SyntheticSlide::new(1200, 700),
        RecordingWriter::new(),
        options(500, FrameCodec::Raw),
    );
    conv.run().await.unwrap();

    let instance = &conv.writer().instances().await[0];
    assert_eq!(instance.frame_count(), 6);

    let PixelStream::Native { data, frame_count } = &instance.pixel_stream else {
        panic!("expected native pixel data");
    };
    let frame_len = 512 * 512 * 3;
    assert_eq!(data.len(), frame_len * frame_count);

    let frames = split_native(data.clone(), *frame_count);
    // Frame k is the k-th tile in scan order: (col 2, row 2) is index 3
    let frame = &frames[3];
    let tile_x = 512u32;
    let tile_y = 512u32;
    for &(dx, dy) in &[(0u32, 0u32), (10, 20), (100, 150)] {
        let offset = ((dy * 512 + dx) * 3) as usize;
        assert_eq!(
            &frame[offset..offset + 3],
            &synthetic_pixel(0, tile_x + dx, tile_y + dy)[..]
        );
    }

    // Bottom-right frame is padded with black outside the image
    let last = &frames[5];
    let inside = ((100 * 512 + 100) * 3) as usize;
    assert_eq!(
        &last[inside..inside + 3],
        &synthetic_pixel(0, 1024 + 100, 512 + 100)[..]
    );
    let outside = ((300 * 512 + 300) * 3) as usize;
    assert_eq!(&last[outside..outside + 3], &[0, 0, 0]);
}

#[tokio::test]
async fn test_jpeg_frames_are_encapsulated() {
    let conv = assembler(
        SyntheticSlide::new(1500, 512),
        RecordingWriter::new(),
        options(500, FrameCodec::Jpeg { quality: 75 }),
    );
    conv.run().await.unwrap();

    let instance = &conv.writer().instances().await[0];
    assert_eq!(instance.frame_count(), 3);

    let PixelStream::Encapsulated {
        offset_table,
        fragments,
    } = &instance.pixel_stream
    else {
        panic!("expected encapsulated pixel data");
    };
    assert_eq!(offset_table.len(), 3);
    assert_eq!(offset_table[0], 0);
    assert!(offset_table.windows(2).all(|w| w[0] < w[1]));
    for fragment in fragments {
        assert_eq!(fragment.len() % 2, 0);
        assert_eq!(&fragment[..2], &[0xFF, 0xD8]);
    }

    // Serialized stream parses back to the same offsets
    let parsed = PixelStream::parse_encapsulated(&instance.pixel_stream.to_bytes()).unwrap();
    assert_eq!(parsed, instance.pixel_stream);

    // Each frame decodes on its own
    let decoded = image::load_from_memory(&fragments[1]).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (512, 512));
}

// =============================================================================
// Failure Isolation
// =============================================================================

#[tokio::test]
async fn test_failed_tile_skips_only_its_instance() {
    // Tile (2, 1) sits at level-0 (512, 0); it is in the second batch
    let conv = assembler(
        SyntheticSlide::new(2000, 1500).failing_at(0, 512, 0),
        RecordingWriter::new(),
        options(2, FrameCodec::Raw),
    );

    let report = conv.run().await.unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].instance_number, 1);
    assert_eq!(report.failures[0].level, 0);

    let numbers: Vec<u32> = conv
        .writer()
        .instances()
        .await
        .iter()
        .map(|i| i.instance_number)
        .collect();
    assert_eq!(numbers, vec![0, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_writer_rejection_is_recorded() {
    let conv = assembler(
        SyntheticSlide::new(2000, 1500),
        RecordingWriter::rejecting([3]),
        options(2, FrameCodec::Raw),
    );

    let report = conv.run().await.unwrap();
    assert_eq!(report.instances.len(), 5);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].instance_number, 3);
    assert!(report.failures[0].error.contains("disk full"));
}

#[tokio::test]
async fn test_report_json_lists_written_and_failed() {
    let conv = assembler(
        SyntheticSlide::new(2000, 1500).failing_at(0, 1536, 1024),
        RecordingWriter::new(),
        options(6, FrameCodec::Raw),
    );

    let report = conv.run().await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["instances"].as_array().unwrap().len(), 1);
    assert_eq!(json["instances"][0]["path"], "instance_0.dcm");
    assert_eq!(json["failures"][0]["instance_number"], 1);
}
