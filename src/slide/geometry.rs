//! Pyramid geometry queries.

use crate::error::PlanError;

use super::ImageSource;

/// Dimensions and downsample factor of one level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelGeometry {
    pub width: u32,
    pub height: u32,
    pub downsample: f64,
}

/// Snapshot of a source's pyramid shape.
///
/// Captured once before planning, so the planner works from plain values
/// and never calls back into the source.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidGeometry {
    levels: Vec<LevelGeometry>,
}

impl PyramidGeometry {
    /// Query every level of `source`.
    ///
    /// Levels whose dimensions or downsample the source cannot report are
    /// an inconsistency in the source and fail with `InvalidLevel`.
    pub fn from_source<S: ImageSource + ?Sized>(source: &S) -> Result<Self, PlanError> {
        let level_count = source.level_count();
        let levels = (0..level_count)
            .map(|level| {
                let (width, height) = source
                    .level_dimensions(level)
                    .ok_or(PlanError::InvalidLevel { level, level_count })?;
                let downsample = source
                    .level_downsample(level)
                    .ok_or(PlanError::InvalidLevel { level, level_count })?;
                Ok(LevelGeometry {
                    width,
                    height,
                    downsample: downsample.max(1.0),
                })
            })
            .collect::<Result<Vec<_>, PlanError>>()?;

        Ok(Self { levels })
    }

    /// Build geometry from explicit level values.
    pub fn from_levels(levels: Vec<LevelGeometry>) -> Self {
        Self { levels }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// `(width, height)` of `level` in its own pixels.
    pub fn dimensions(&self, level: usize) -> Result<(u32, u32), PlanError> {
        self.level(level).map(|l| (l.width, l.height))
    }

    /// Downsample factor of `level` relative to level 0 (always ≥ 1.0).
    pub fn downsample_factor(&self, level: usize) -> Result<f64, PlanError> {
        self.level(level).map(|l| l.downsample)
    }

    fn level(&self, level: usize) -> Result<&LevelGeometry, PlanError> {
        self.levels.get(level).ok_or(PlanError::InvalidLevel {
            level,
            level_count: self.levels.len(),
        })
    }
}
