//! Whole-run planning: layout every target level and split it into
//! instance batches before any pixel is read.

use serde::Serialize;
use tracing::info;

use crate::error::PlanError;
use crate::plan::{FrameBatch, FrameLayoutPlanner, InstanceSplitter, LevelPlan};
use crate::slide::PyramidGeometry;

use super::ConversionOptions;

/// A level's layout together with its batches.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLevel {
    pub layout: LevelPlan,
    pub batches: Vec<FrameBatch>,
}

/// Everything a run will emit, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionPlan {
    pub levels: Vec<PlannedLevel>,
}

impl ConversionPlan {
    /// Layout and split every selected level.
    ///
    /// Fails before producing anything if the options do not fit the
    /// pyramid.
    pub fn build(
        geometry: &PyramidGeometry,
        options: &ConversionOptions,
    ) -> Result<Self, PlanError> {
        let planner = FrameLayoutPlanner::new(options.tile_size)?;
        let splitter = InstanceSplitter::new(options.max_frame_count)?;

        let levels = planner
            .plan(geometry, &options.levels)?
            .into_iter()
            .map(|layout| {
                let batches = splitter.split(layout.level, &layout.tiles);
                info!(
                    level = layout.level,
                    columns = layout.columns,
                    rows = layout.rows,
                    tiles = layout.tiles.len(),
                    instances = batches.len(),
                    "Planned level"
                );
                PlannedLevel { layout, batches }
            })
            .collect();

        Ok(Self { levels })
    }

    pub fn instance_count(&self) -> usize {
        self.levels.iter().map(|l| l.batches.len()).sum()
    }

    pub fn tile_count(&self) -> usize {
        self.levels.iter().map(|l| l.layout.tiles.len()).sum()
    }

    /// Serializable overview, with the instance numbers each level will use.
    pub fn summary(&self) -> PlanSummary {
        let mut next_instance = 0u32;
        let levels = self
            .levels
            .iter()
            .map(|planned| {
                let layout = &planned.layout;
                let summary = LevelSummary {
                    level: layout.level,
                    width: layout.dimensions.0,
                    height: layout.dimensions.1,
                    downsample: layout.downsample,
                    columns: layout.columns,
                    rows: layout.rows,
                    tiles: layout.tiles.len(),
                    instances: planned.batches.len(),
                    first_instance: next_instance,
                    frames_per_instance: planned.batches.iter().map(FrameBatch::len).collect(),
                };
                next_instance += planned.batches.len() as u32;
                summary
            })
            .collect();

        PlanSummary {
            total_tiles: self.tile_count(),
            total_instances: self.instance_count(),
            levels,
        }
    }
}

/// JSON view of a [`ConversionPlan`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    pub total_tiles: usize,
    pub total_instances: usize,
    pub levels: Vec<LevelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSummary {
    pub level: usize,
    pub width: u32,
    pub height: u32,
    pub downsample: f64,
    pub columns: u32,
    pub rows: u32,
    pub tiles: usize,
    pub instances: usize,
    pub first_instance: u32,
    pub frames_per_instance: Vec<usize>,
}
