//! `calibration.json` persistence.

use std::path::Path;

use anyhow::Result;

use super::estimator::CalibrationReport;

/// Write `report` as pretty JSON, creating parent directories.
pub fn save_report(path: &Path, report: &CalibrationReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read a saved report; `Ok(None)` when the file does not exist.
pub fn load_report(path: &Path) -> Result<Option<CalibrationReport>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&json)?))
}
