//! Conversion orchestration.
//!
//! ```text
//! PLANNING → SPLITTING → per batch: METADATA → ENCODING → PACKING → EMITTING
//! ```
//!
//! [`ConversionPlan`] covers the first two stages and is pure.
//! [`InstanceAssembler`] runs the per-batch stages and collects a
//! [`ConversionReport`].

mod assembler;
mod options;
mod plan;
mod report;

pub use assembler::InstanceAssembler;
pub use options::{default_workers, ConversionOptions};
pub use plan::{ConversionPlan, LevelSummary, PlanSummary, PlannedLevel};
pub use report::{ConversionReport, InstanceFailure, InstanceSummary};
