//! JSON export of a simulation run.

use crate::runner::RunSummary;
use crate::SimError;
use serde::{Deserialize, Serialize};
use skytrack_core::FeatureCollection;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Registry state right after one snapshot was reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFrame {
    /// Seconds since the start of the run
    pub time_sec: f64,
    pub entities: usize,
    pub active: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub rejected: usize,
    pub total_points: usize,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExport {
    pub scenario: String,
    pub seed: u64,
    pub duration_sec: f64,
    pub frames: Vec<SnapshotFrame>,
    pub summary: RunSummary,
    /// Every trajectory still held at the end of the run
    pub trajectories: FeatureCollection,
}

impl RunExport {
    /// Frames where at least one record was rejected.
    pub fn frames_with_rejections(&self) -> impl Iterator<Item = &SnapshotFrame> {
        self.frames.iter().filter(|f| f.rejected > 0)
    }

    /// Writes pretty-printed JSON to `path`.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
