//! Test identifiers, per-test status and typed results

use super::OrchestratorError;
use crate::media::MediaSummary;
use crate::probe::advanced::AdvancedSummary;
use crate::probe::ping::PingSummary;
use crate::probe::speed::SpeedMeasurement;
use crate::probe::traceroute::TracerouteSummary;
use crate::quick::QuickTestSummary;
use crate::system::SystemInfo;
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::str::FromStr;

/// Named test tracked by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestId {
    #[serde(alias = "network")]
    Speed,
    Advanced,
    Ping,
    Traceroute,
    Media,
    System,
    QuickTest,
}

impl TestId {
    pub const ALL: [TestId; 7] = [
        TestId::Speed,
        TestId::Advanced,
        TestId::Ping,
        TestId::Traceroute,
        TestId::Media,
        TestId::System,
        TestId::QuickTest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestId::Speed => "speed",
            TestId::Advanced => "advanced",
            TestId::Ping => "ping",
            TestId::Traceroute => "traceroute",
            TestId::Media => "media",
            TestId::System => "system",
            TestId::QuickTest => "quick_test",
        }
    }
}

impl std::fmt::Display for TestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestId {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speed" | "network" => Ok(TestId::Speed),
            "advanced" | "advanced_tests" | "advanced-tests" => Ok(TestId::Advanced),
            "ping" => Ok(TestId::Ping),
            "traceroute" | "trace" => Ok(TestId::Traceroute),
            "media" => Ok(TestId::Media),
            "system" => Ok(TestId::System),
            "quick_test" | "quick-test" | "quick" => Ok(TestId::QuickTest),
            other => Err(OrchestratorError::UnknownTest(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::NotStarted => "not_started",
            ProbeStatus::Running => "running",
            ProbeStatus::Completed => "completed",
            ProbeStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result payload of a completed test, one variant per test kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ProbeResult {
    Speed(SpeedMeasurement),
    Advanced(AdvancedSummary),
    Ping(PingSummary),
    Traceroute(TracerouteSummary),
    Media(MediaSummary),
    System(SystemInfo),
    QuickTest(QuickTestSummary),
}

impl ProbeResult {
    /// The test this payload belongs to
    pub fn test_id(&self) -> TestId {
        match self {
            ProbeResult::Speed(_) => TestId::Speed,
            ProbeResult::Advanced(_) => TestId::Advanced,
            ProbeResult::Ping(_) => TestId::Ping,
            ProbeResult::Traceroute(_) => TestId::Traceroute,
            ProbeResult::Media(_) => TestId::Media,
            ProbeResult::System(_) => TestId::System,
            ProbeResult::QuickTest(_) => TestId::QuickTest,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RecordState {
    NotStarted,
    Running,
    Completed(Box<ProbeResult>),
    Failed(Option<String>),
}

/// Status and result of one test
///
/// Only the orchestrator can change a record. A result exists exactly when
/// the status is `Completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRecord {
    test_id: TestId,
    state: RecordState,
    updated_at: DateTime<Utc>,
}

impl TestRecord {
    pub(crate) fn new(test_id: TestId) -> Self {
        Self {
            test_id,
            state: RecordState::NotStarted,
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn transition(&mut self, state: RecordState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    pub fn status(&self) -> ProbeStatus {
        match self.state {
            RecordState::NotStarted => ProbeStatus::NotStarted,
            RecordState::Running => ProbeStatus::Running,
            RecordState::Completed(_) => ProbeStatus::Completed,
            RecordState::Failed(_) => ProbeStatus::Failed,
        }
    }

    pub fn result(&self) -> Option<&ProbeResult> {
        match &self.state {
            RecordState::Completed(result) => Some(result.as_ref()),
            _ => None,
        }
    }

    /// Reason given when the test failed
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            RecordState::Failed(reason) => reason.as_deref(),
            _ => None,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Serialize for TestRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TestRecord", 5)?;
        state.serialize_field("testId", &self.test_id)?;
        state.serialize_field("status", &self.status())?;
        state.serialize_field("result", &self.result())?;
        if let Some(reason) = self.failure() {
            state.serialize_field("error", reason)?;
        } else {
            state.skip_field("error")?;
        }
        state.serialize_field("updatedAt", &self.updated_at)?;
        state.end()
    }
}
