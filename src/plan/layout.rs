//! Frame layout planning.
//!
//! Every target level is tiled in level-0 coordinates: the planner steps by
//! `tile_size × downsample` across the level-0 extent, so each frame covers
//! a level-dependent footprint of the full-resolution image while holding
//! the same number of pixels at every level.
//!
//! Scan order is column-major. All rows of column 1 are emitted before
//! column 2, and `column_index`/`row_index` are 1-based.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::error::PlanError;
use crate::slide::PyramidGeometry;

/// Default frame size in pixels
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Largest frame side: DICOM Rows and Columns are 16-bit.
pub const MAX_TILE_SIDE: u32 = u16::MAX as u32;

// =============================================================================
// Tile Size
// =============================================================================

/// Pixel size of every output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
}

impl TileSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    /// Both sides are non-zero and fit in Rows/Columns.
    pub const fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.width <= MAX_TILE_SIDE
            && self.height <= MAX_TILE_SIDE
    }
}

impl Default for TileSize {
    fn default() -> Self {
        Self::square(DEFAULT_TILE_SIZE)
    }
}

impl fmt::Display for TileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Accepts `512` or `512x256`.
impl FromStr for TileSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid tile size '{}': expected WIDTHxHEIGHT", s))
        };

        match s.split_once(['x', 'X']) {
            Some((w, h)) => Ok(Self::new(parse(w)?, parse(h)?)),
            None => Ok(Self::square(parse(s)?)),
        }
    }
}

// =============================================================================
// Level Selection
// =============================================================================

/// Which pyramid levels to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LevelSelection {
    #[default]
    All,
    Levels(Vec<usize>),
}

/// Accepts `all` or a comma-separated list such as `0,2,3`.
impl FromStr for LevelSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(LevelSelection::All);
        }

        s.split(',')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|_| format!("invalid level '{}' in '{}'", part.trim(), s))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(LevelSelection::Levels)
    }
}

// =============================================================================
// Tile Descriptor
// =============================================================================

/// One frame position within a level.
///
/// `pixel_x`/`pixel_y` are level-0 coordinates of the frame's top-left
/// corner. `width`/`height` are the level-native pixels of the frame that
/// fall inside the image; edge frames may be smaller than the tile size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileDescriptor {
    pub level: usize,
    pub column_index: u32,
    pub row_index: u32,
    pub pixel_x: u64,
    pub pixel_y: u64,
    pub width: u32,
    pub height: u32,
}

/// Scan-ordered tiles for one level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelPlan {
    pub level: usize,
    pub downsample: f64,
    /// Level-native `(width, height)`
    pub dimensions: (u32, u32),
    pub columns: u32,
    pub rows: u32,
    pub tiles: Vec<TileDescriptor>,
}

// =============================================================================
// Frame Layout Planner
// =============================================================================

/// Enumerates tile origins and indices for the selected levels.
#[derive(Debug, Clone, Copy)]
pub struct FrameLayoutPlanner {
    tile_size: TileSize,
}

impl FrameLayoutPlanner {
    pub fn new(tile_size: TileSize) -> Result<Self, PlanError> {
        if !tile_size.is_valid() {
            return Err(PlanError::InvalidTileSize {
                width: tile_size.width,
                height: tile_size.height,
            });
        }
        Ok(Self { tile_size })
    }

    pub fn tile_size(&self) -> TileSize {
        self.tile_size
    }

    /// Resolve a selection to a sorted, duplicate-free list of levels.
    ///
    /// Any level outside the pyramid fails the whole selection with
    /// `LevelRange`.
    pub fn resolve_levels(
        geometry: &PyramidGeometry,
        selection: &LevelSelection,
    ) -> Result<Vec<usize>, PlanError> {
        let level_count = geometry.level_count();
        match selection {
            LevelSelection::All => Ok((0..level_count).collect()),
            LevelSelection::Levels(levels) => {
                if levels.is_empty() {
                    return Err(PlanError::EmptyTargetLevels);
                }
                if let Some(&level) = levels.iter().find(|&&l| l >= level_count) {
                    return Err(PlanError::LevelRange { level, level_count });
                }

                let mut levels = levels.clone();
                levels.sort_unstable();
                levels.dedup();
                Ok(levels)
            }
        }
    }

    /// Plan every selected level, in ascending level order.
    pub fn plan(
        &self,
        geometry: &PyramidGeometry,
        selection: &LevelSelection,
    ) -> Result<Vec<LevelPlan>, PlanError> {
        Self::resolve_levels(geometry, selection)?
            .into_iter()
            .map(|level| self.plan_level(geometry, level))
            .collect()
    }

    /// Tile one level in column-major order.
    pub fn plan_level(
        &self,
        geometry: &PyramidGeometry,
        level: usize,
    ) -> Result<LevelPlan, PlanError> {
        let (base_width, base_height) = geometry.dimensions(0)?;
        let dimensions = geometry.dimensions(level)?;
        let downsample = geometry.downsample_factor(level)?;

        let step_x = level0_step(self.tile_size.width, downsample);
        let step_y = level0_step(self.tile_size.height, downsample);

        let mut tiles = Vec::new();
        let mut columns = 0;
        let mut rows = 0;

        for (column, pixel_x) in (0..base_width as u64).step_by(step_x as usize).enumerate() {
            let width = native_extent(base_width as u64 - pixel_x, downsample, self.tile_size.width);
            columns = column as u32 + 1;

            for (row, pixel_y) in (0..base_height as u64).step_by(step_y as usize).enumerate() {
                let height =
                    native_extent(base_height as u64 - pixel_y, downsample, self.tile_size.height);
                rows = row as u32 + 1;

                tiles.push(TileDescriptor {
                    level,
                    column_index: columns,
                    row_index: rows,
                    pixel_x,
                    pixel_y,
                    width,
                    height,
                });
            }
        }

        debug!(
            level,
            columns,
            rows,
            tiles = tiles.len(),
            step_x,
            step_y,
            "Planned level layout"
        );

        Ok(LevelPlan {
            level,
            downsample,
            dimensions,
            columns,
            rows,
            tiles,
        })
    }
}

/// Level-0 distance covered by `tile_pixels` pixels at `downsample`.
fn level0_step(tile_pixels: u32, downsample: f64) -> u64 {
    ((tile_pixels as f64 * downsample).floor() as u64).max(1)
}

/// Level-native pixels left in a frame that starts `remaining` level-0
/// pixels before the image edge.
fn native_extent(remaining: u64, downsample: f64, tile_pixels: u32) -> u32 {
    let native = (remaining as f64 / downsample).ceil() as u64;
    native.clamp(1, tile_pixels as u64) as u32
}
