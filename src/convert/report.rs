use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::InstanceError;

/// One instance that was written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSummary {
    pub instance_number: u32,
    pub level: usize,
    pub frame_count: usize,
    /// Serialized pixel-data length in bytes
    pub pixel_bytes: usize,
    pub path: PathBuf,
}

/// One instance that was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceFailure {
    pub instance_number: u32,
    pub level: usize,
    pub error: String,
}

impl InstanceFailure {
    pub fn new(level: usize, error: &InstanceError) -> Self {
        Self {
            instance_number: error.instance(),
            level,
            error: error.to_string(),
        }
    }
}

/// Outcome of a conversion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversionReport {
    pub instances: Vec<InstanceSummary>,
    pub failures: Vec<InstanceFailure>,
}

impl ConversionReport {
    /// True when every planned instance was written.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_frames(&self) -> usize {
        self.instances.iter().map(|i| i.frame_count).sum()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the report as pretty-printed JSON.
    pub async fn write_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        tokio::fs::write(path, json).await
    }
}
