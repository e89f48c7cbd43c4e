//! Instance assembly.
//!
//! For every planned batch: build frame metadata, read and encode the tiles,
//! pack the pixel stream and hand the instance to the writer. A failing
//! batch is recorded and skipped; earlier and later instances are unaffected.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dicom::{ContainerInstance, ContainerWriter, SharedMetadata};
use crate::error::{ConvertError, InstanceError, PlanError};
use crate::plan::{FrameBatch, FrameMetadataBuilder, LevelPlan};
use crate::slide::{ImageSource, PyramidGeometry};
use crate::tile::EncodedFrame;

use super::{ConversionOptions, ConversionPlan, ConversionReport, InstanceFailure, InstanceSummary};

/// Drives a conversion from an [`ImageSource`] into a [`ContainerWriter`].
pub struct InstanceAssembler<S: ?Sized, W> {
    source: Arc<S>,
    writer: W,
    shared: SharedMetadata,
    options: ConversionOptions,
}

impl<S, W> InstanceAssembler<S, W>
where
    S: ImageSource + ?Sized + 'static,
    W: ContainerWriter,
{
    pub fn new(
        source: Arc<S>,
        writer: W,
        shared: SharedMetadata,
        options: ConversionOptions,
    ) -> Self {
        Self {
            source,
            writer,
            shared,
            options,
        }
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Plan the run against the source's current geometry.
    pub fn plan(&self) -> Result<ConversionPlan, PlanError> {
        let geometry = PyramidGeometry::from_source(self.source.as_ref())?;
        ConversionPlan::build(&geometry, &self.options)
    }

    /// Convert every planned batch.
    ///
    /// Only planning errors abort the run. Per-instance failures end up in
    /// the report's `failures`.
    pub async fn run(&self) -> Result<ConversionReport, ConvertError> {
        let plan = self.plan()?;
        let total = plan.instance_count();
        info!(
            levels = plan.levels.len(),
            tiles = plan.tile_count(),
            instances = total,
            codec = %self.options.codec,
            "Starting conversion"
        );

        let mut report = ConversionReport::default();
        let mut next_instance = 0u32;
        for planned in &plan.levels {
            next_instance = self
                .emit_level(&planned.layout, &planned.batches, next_instance, total, &mut report)
                .await;
        }

        info!(
            written = report.instances.len(),
            failed = report.failures.len(),
            frames = report.total_frames(),
            "Conversion finished"
        );
        Ok(report)
    }

    /// Emit one level's batches, numbering them from `first_instance`.
    /// Returns the number the next level starts from.
    async fn emit_level(
        &self,
        layout: &LevelPlan,
        batches: &[FrameBatch],
        first_instance: u32,
        total: usize,
        report: &mut ConversionReport,
    ) -> u32 {
        let mut instance_number = first_instance;

        for batch in batches {
            info!("Saving instance {}/{}", instance_number, total);

            let result = match self.assemble(layout, batch, instance_number).await {
                Ok(instance) => {
                    let written = self.writer.write(&self.shared, &instance).await;
                    written
                        .map(|path| (instance, path))
                        .map_err(InstanceError::from)
                }
                Err(e) => Err(e),
            };

            match result {
                Ok((instance, path)) => {
                    debug!(
                        instance = instance_number,
                        frames = instance.frame_count(),
                        path = %path.display(),
                        "Instance written"
                    );
                    report.instances.push(InstanceSummary {
                        instance_number,
                        level: layout.level,
                        frame_count: instance.frame_count(),
                        pixel_bytes: instance.pixel_stream.byte_len(),
                        path,
                    });
                }
                Err(e) => {
                    match &e {
                        InstanceError::Writer(_) => error!(error = %e, "Writer rejected instance"),
                        _ => warn!(error = %e, "Skipping instance"),
                    }
                    report.failures.push(InstanceFailure::new(layout.level, &e));
                }
            }

            instance_number += 1;
        }

        instance_number
    }

    /// Build the complete instance for one batch, without writing it.
    pub async fn assemble(
        &self,
        layout: &LevelPlan,
        batch: &FrameBatch,
        instance_number: u32,
    ) -> Result<ContainerInstance, InstanceError> {
        let coordinates = self.options.coordinates;
        let frames = FrameMetadataBuilder::new(coordinates).build_batch(batch, layout.downsample);
        for frame in &frames {
            debug!(
                instance = instance_number,
                column = frame.dimension_index.0,
                row = frame.dimension_index.1,
                "DimensionIndexValues"
            );
        }

        let encoded = self.encode_batch(batch, instance_number).await?;
        let pixel_stream =
            self.options
                .codec
                .pack(encoded)
                .map_err(|e| InstanceError::Encoding {
                    instance: instance_number,
                    message: e.message,
                })?;

        Ok(ContainerInstance {
            instance_number,
            level: layout.level,
            codec: self.options.codec,
            tile_size: self.options.tile_size,
            total_matrix: layout.dimensions,
            pixel_spacing: (
                coordinates.spacing_y * layout.downsample,
                coordinates.spacing_x * layout.downsample,
            ),
            origin: (coordinates.origin_x, coordinates.origin_y),
            frames,
            pixel_stream,
        })
    }

    /// Read and encode every tile of a batch, at most `workers` at a time.
    ///
    /// Results are slotted back by tile index, so the output keeps scan
    /// order. The first failure aborts the tasks still in flight.
    async fn encode_batch(
        &self,
        batch: &FrameBatch,
        instance_number: u32,
    ) -> Result<Vec<EncodedFrame>, InstanceError> {
        let permits = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let codec = self.options.codec;
        let tile_size = self.options.tile_size;
        let mut tasks = JoinSet::new();

        for (index, tile) in batch.tiles.iter().copied().enumerate() {
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let encoding_error = |message: String| InstanceError::Encoding {
                    instance: instance_number,
                    message,
                };

                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| encoding_error(e.to_string()))?;

                let pixels = source
                    .read_region(
                        tile.level,
                        tile.pixel_x,
                        tile.pixel_y,
                        tile_size.width,
                        tile_size.height,
                    )
                    .await
                    .map_err(|e| InstanceError::TileRead {
                        instance: instance_number,
                        level: tile.level,
                        column: tile.column_index,
                        row: tile.row_index,
                        source: e,
                    })?;

                let frame = tokio::task::spawn_blocking(move || codec.encode(&pixels))
                    .await
                    .map_err(|e| encoding_error(e.to_string()))?
                    .map_err(|e| encoding_error(e.message))?;

                Ok::<_, InstanceError>((index, frame))
            });
        }

        let mut slots: Vec<Option<EncodedFrame>> = vec![None; batch.len()];
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| InstanceError::Encoding {
                instance: instance_number,
                message: e.to_string(),
            });
            match outcome.and_then(|result| result) {
                Ok((index, frame)) => slots[index] = Some(frame),
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(InstanceError::Encoding {
                instance: instance_number,
                message: "frame missing after encoding".to_string(),
            })
    }
}
