//! ═══════════════════════════════════════════════════════════════════════════════
//! RECORD — Hazard Event Lines
//! ═══════════════════════════════════════════════════════════════════════════════
//! One JSON object per line. The forecast CLI appends these; the calibration
//! tool reads them back on the next cycle.
//! ═══════════════════════════════════════════════════════════════════════════════

use crate::error::HazardResult;
use crate::hazard::HazardState;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// One persisted forecast result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardRecord {
    /// RFC 3339 timestamp
    pub ts: String,
    pub series_id: String,
    pub hazard: HazardState,
    /// Current snapshot, kept so calibration can fit feature scalers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

impl HazardRecord {
    pub fn new(series_id: impl Into<String>, hazard: HazardState) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339(),
            series_id: series_id.into(),
            hazard,
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}

/// Append one record as a JSON line, creating parent directories
pub fn append_record(path: &Path, record: &HazardRecord) -> HazardResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let line = serde_json::to_string(record)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
