//! JSON export

use super::{ExportError, Report};

/// Pretty-printed JSON; parses back to an equal [`Report`] via [`from_json`]
pub fn to_json(report: &Report) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn from_json(text: &str) -> Result<Report, ExportError> {
    Ok(serde_json::from_str(text)?)
}
