//! Writing reports to disk

use super::{csv::to_csv, json::to_json, ExportError, Report};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    /// Render `report` in this format
    pub fn render(&self, report: &Report) -> Result<String, ExportError> {
        match self {
            ExportFormat::Json => to_json(report),
            ExportFormat::Csv => Ok(to_csv(report)),
        }
    }

    /// Default file name, e.g. `callcheck_results_1773480600000.csv`
    pub fn file_name(&self, report: &Report) -> String {
        format!(
            "callcheck_results_{}.{}",
            report.generated_at.timestamp_millis(),
            self.extension()
        )
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Render and write `report` to `path`
///
/// The content goes to a sibling temporary file that is renamed over `path`
/// once complete, so a failed export never leaves a truncated artifact.
pub fn save_artifact(report: &Report, format: ExportFormat, path: &Path) -> Result<(), ExportError> {
    let content = format.render(report)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp = temp_sibling(path);
    let written = fs::write(&temp, content.as_bytes()).and_then(|_| fs::rename(&temp, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        tracing::warn!(path = %path.display(), error = %e, "report_export_failed");
        return Err(e.into());
    }

    tracing::info!(
        path = %path.display(),
        format = format.extension(),
        bytes = content.len(),
        "report_exported"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::from_json;
    use crate::report::CSV_HEADER;
    use chrono::{TimeZone, Utc};

    fn report() -> Report {
        Report::empty(Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap())
    }

    #[test]
    fn test_save_json_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        save_artifact(&report(), ExportFormat::Json, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(from_json(&text).unwrap(), report());
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn test_save_csv_artifact_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        fs::write(&path, "stale").unwrap();

        save_artifact(&report(), ExportFormat::Csv, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(CSV_HEADER));
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        // Target is an existing directory, so the rename fails
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let err = save_artifact(&report(), ExportFormat::Json, &path).unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
        assert!(!temp_sibling(&path).exists());
        assert!(path.join("keep").exists());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            ExportFormat::Csv.file_name(&report()),
            "callcheck_results_1773480600000.csv"
        );
    }
}
