//! Report assembly and export
//!
//! [`build_report`] folds an orchestrator snapshot into one [`Report`]; the
//! [`json`] and [`csv`] modules serialize it and [`artifact`] writes it to
//! disk. Every section is optional, so a report can be built from whatever
//! subset of tests has completed.

pub mod artifact;
pub mod csv;
pub mod json;

pub use artifact::{save_artifact, ExportFormat};
pub use csv::{to_csv, CSV_HEADER};
pub use json::{from_json, to_json};

use crate::media::MediaSummary;
use crate::probe::advanced::AdvancedSummary;
use crate::probe::ping::PingSummary;
use crate::probe::speed::SpeedMeasurement;
use crate::probe::traceroute::TracerouteSummary;
use crate::quick::QuickTestSummary;
use crate::session::{OrchestratorSnapshot, ProbeResult};
use crate::system::SystemInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Export failures; no artifact is written when one is returned
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of the report timestamp
pub trait TimestampSource {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimestampSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl TimestampSource for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<SpeedMeasurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced: Option<AdvancedSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping: Option<PingSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceroute: Option<TracerouteSummary>,
}

impl NetworkSection {
    pub fn is_empty(&self) -> bool {
        self.speed.is_none()
            && self.advanced.is_none()
            && self.ping.is_none()
            && self.traceroute.is_none()
    }
}

/// Canonical export of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Export time; also stamped on every CSV row
    #[serde(rename = "timestamp")]
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_test: Option<QuickTestSummary>,
}

impl Report {
    /// A report with no sections
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            network: None,
            media: None,
            system: None,
            quick_test: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.network.is_none()
            && self.media.is_none()
            && self.system.is_none()
            && self.quick_test.is_none()
    }
}

/// Fold every completed result in `snapshot` into a report
///
/// Only `Completed` records carry results, so running, failed and untouched
/// tests simply leave their section out.
pub fn build_report<C: TimestampSource + ?Sized>(
    snapshot: &OrchestratorSnapshot,
    clock: &C,
) -> Report {
    let mut report = Report::empty(clock.now());
    let mut network = NetworkSection::default();

    for result in snapshot.results() {
        match result {
            ProbeResult::Speed(m) => network.speed = Some(m.clone()),
            ProbeResult::Advanced(a) => network.advanced = Some(a.clone()),
            ProbeResult::Ping(s) => network.ping = Some(s.clone()),
            ProbeResult::Traceroute(s) => network.traceroute = Some(s.clone()),
            ProbeResult::Media(m) if !m.is_empty() => report.media = Some(m.clone()),
            ProbeResult::Media(_) => {}
            ProbeResult::System(info) => report.system = Some(info.clone()),
            ProbeResult::QuickTest(q) => report.quick_test = Some(q.clone()),
        }
    }

    if !network.is_empty() {
        report.network = Some(network);
    }

    tracing::debug!(
        network = report.network.is_some(),
        media = report.media.is_some(),
        system = report.system.is_some(),
        quick_test = report.quick_test.is_some(),
        "report_built"
    );
    report
}
