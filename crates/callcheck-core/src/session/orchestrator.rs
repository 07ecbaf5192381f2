//! Test orchestrator state machine
//!
//! Per test: `NotStarted -> Running -> Completed | Failed`, with
//! `Failed -> Running` allowed as a retry. A completed test must be reset
//! before it can run again. In guided mode at most one test runs at a time;
//! quick mode leaves sequencing to the caller.

use super::record::{ProbeResult, ProbeStatus, RecordState, TestId, TestRecord};
use super::OrchestratorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// Capacity of the change-notification channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationMode {
    /// Manual suite: one running test at a time
    #[default]
    Guided,
    /// Unguided sequence driven by the caller
    Quick,
}

/// Change notification sent after every successful transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TestEvent {
    StatusChanged {
        test_id: TestId,
        status: ProbeStatus,
        at: DateTime<Utc>,
    },
    SessionReset {
        at: DateTime<Utc>,
    },
}

/// Point-in-time copy of every record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorSnapshot {
    pub mode: OrchestrationMode,
    pub taken_at: DateTime<Utc>,
    pub records: Vec<TestRecord>,
}

impl OrchestratorSnapshot {
    pub fn record(&self, id: TestId) -> Option<&TestRecord> {
        self.records.iter().find(|r| r.test_id() == id)
    }

    pub fn status(&self, id: TestId) -> ProbeStatus {
        self.record(id)
            .map(|r| r.status())
            .unwrap_or(ProbeStatus::NotStarted)
    }

    pub fn result(&self, id: TestId) -> Option<&ProbeResult> {
        self.record(id).and_then(|r| r.result())
    }

    /// Every completed result, in test order
    pub fn results(&self) -> impl Iterator<Item = &ProbeResult> {
        self.records.iter().filter_map(|r| r.result())
    }
}

/// Owner of the per-session test records
#[derive(Debug)]
pub struct TestOrchestrator {
    mode: OrchestrationMode,
    records: BTreeMap<TestId, TestRecord>,
    events: broadcast::Sender<TestEvent>,
}

impl Default for TestOrchestrator {
    fn default() -> Self {
        Self::new(OrchestrationMode::Guided)
    }
}

impl TestOrchestrator {
    /// Start a session with every test `NotStarted`
    pub fn new(mode: OrchestrationMode) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let records = TestId::ALL
            .iter()
            .map(|id| (*id, TestRecord::new(*id)))
            .collect();
        Self {
            mode,
            records,
            events,
        }
    }

    pub fn mode(&self) -> OrchestrationMode {
        self.mode
    }

    /// Switch policy; refused while anything is running
    pub fn set_mode(&mut self, mode: OrchestrationMode) -> Result<(), OrchestratorError> {
        if let Some(active) = self.active() {
            return Err(OrchestratorError::ModeChangeWhileRunning(active));
        }
        self.mode = mode;
        Ok(())
    }

    /// Receive a [`TestEvent`] after every transition
    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.events.subscribe()
    }

    pub fn record(&self, id: TestId) -> &TestRecord {
        // Every id is inserted in `new` and never removed
        &self.records[&id]
    }

    pub fn status(&self, id: TestId) -> ProbeStatus {
        self.record(id).status()
    }

    pub fn result(&self, id: TestId) -> Option<&ProbeResult> {
        self.record(id).result()
    }

    /// First running test, if any
    pub fn active(&self) -> Option<TestId> {
        self.running().next()
    }

    pub fn running(&self) -> impl Iterator<Item = TestId> + '_ {
        self.records
            .values()
            .filter(|r| r.status() == ProbeStatus::Running)
            .map(|r| r.test_id())
    }

    pub fn start(&mut self, id: TestId) -> Result<(), OrchestratorError> {
        match self.status(id) {
            ProbeStatus::NotStarted | ProbeStatus::Failed => {}
            ProbeStatus::Running => {
                return Err(OrchestratorError::AlreadyRunning {
                    active: id,
                    requested: id,
                })
            }
            ProbeStatus::Completed => return Err(OrchestratorError::AlreadyCompleted(id)),
        }

        if self.mode == OrchestrationMode::Guided {
            if let Some(active) = self.running().find(|other| *other != id) {
                tracing::debug!(requested = %id, active = %active, "start_rejected");
                return Err(OrchestratorError::AlreadyRunning {
                    active,
                    requested: id,
                });
            }
        }

        self.apply(id, RecordState::Running);
        Ok(())
    }

    pub fn complete(&mut self, id: TestId, result: ProbeResult) -> Result<(), OrchestratorError> {
        self.require_running(id)?;
        let actual = result.test_id();
        if actual != id {
            return Err(OrchestratorError::ResultMismatch { id, actual });
        }
        self.apply(id, RecordState::Completed(Box::new(result)));
        Ok(())
    }

    pub fn fail(&mut self, id: TestId, reason: Option<String>) -> Result<(), OrchestratorError> {
        self.require_running(id)?;
        if let Some(reason) = &reason {
            tracing::warn!(test = %id, reason = %reason, "test_failed");
        }
        self.apply(id, RecordState::Failed(reason));
        Ok(())
    }

    /// Return one test to `NotStarted`, clearing its result
    pub fn reset_one(&mut self, id: TestId) {
        self.apply(id, RecordState::NotStarted);
    }

    /// Return every test to `NotStarted`
    pub fn reset_all(&mut self) {
        for record in self.records.values_mut() {
            record.transition(RecordState::NotStarted);
        }
        tracing::info!("session_reset");
        let _ = self.events.send(TestEvent::SessionReset { at: Utc::now() });
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        OrchestratorSnapshot {
            mode: self.mode,
            taken_at: Utc::now(),
            records: self.records.values().cloned().collect(),
        }
    }

    fn require_running(&self, id: TestId) -> Result<(), OrchestratorError> {
        match self.status(id) {
            ProbeStatus::Running => Ok(()),
            status => Err(OrchestratorError::NotRunning { id, status }),
        }
    }

    fn apply(&mut self, id: TestId, state: RecordState) {
        let record = self
            .records
            .entry(id)
            .or_insert_with(|| TestRecord::new(id));
        record.transition(state);
        let status = record.status();
        let at = record.updated_at();
        tracing::info!(test = %id, status = %status, "test_status_changed");
        // No subscribers is fine
        let _ = self.events.send(TestEvent::StatusChanged {
            test_id: id,
            status,
            at,
        });
    }
}
