//! Test session state
//!
//! The [`orchestrator`] owns one [`record::TestRecord`] per test and is the
//! only writer of test status. Probes hand their results to it; the report
//! builder and the UI read snapshots.

pub mod orchestrator;
pub mod record;

pub use orchestrator::{OrchestrationMode, OrchestratorSnapshot, TestEvent, TestOrchestrator};
pub use record::{ProbeResult, ProbeStatus, TestId, TestRecord};

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Rejected orchestrator transitions; state is unchanged when returned
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Cannot start {requested}: {active} is still running")]
    AlreadyRunning { active: TestId, requested: TestId },

    #[error("{id} is not running (status: {status})")]
    NotRunning { id: TestId, status: ProbeStatus },

    #[error("{0} already completed; reset it before running again")]
    AlreadyCompleted(TestId),

    #[error("Result for {actual} cannot complete {id}")]
    ResultMismatch { id: TestId, actual: TestId },

    #[error("Cannot change mode while {0} is running")]
    ModeChangeWhileRunning(TestId),

    #[error("Unknown test: {0}")]
    UnknownTest(String),
}

/// Orchestrator shared between the UI surface and running probes
pub type SharedOrchestrator = Arc<Mutex<TestOrchestrator>>;

/// Lock the orchestrator, recovering the state if a holder panicked
///
/// Transitions never leave a record half-written, so the state behind a
/// poisoned lock is still consistent.
pub fn lock_session(orchestrator: &Mutex<TestOrchestrator>) -> MutexGuard<'_, TestOrchestrator> {
    orchestrator
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Failure reason recorded when a tracked run is dropped before it settles
pub const CANCELLED_REASON: &str = "cancelled";

/// How a tracked run ended
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedOutcome {
    Completed(ProbeResult),
    Failed(String),
}

/// Holds a started test until its work settles
///
/// Dropping the guard while still armed (the owning future was cancelled)
/// marks the test failed, so a dead task never keeps the running slot.
pub(crate) struct RunningGuard<'a> {
    orchestrator: &'a Mutex<TestOrchestrator>,
    id: TestId,
    armed: bool,
}

impl<'a> RunningGuard<'a> {
    /// Guard a test that has already been started
    pub(crate) fn new(orchestrator: &'a Mutex<TestOrchestrator>, id: TestId) -> Self {
        Self {
            orchestrator,
            id,
            armed: true,
        }
    }

    /// Record the outcome and disarm
    pub(crate) fn settle(
        mut self,
        outcome: Result<ProbeResult, String>,
    ) -> Result<TrackedOutcome, OrchestratorError> {
        self.armed = false;
        let mut session = lock_session(self.orchestrator);
        match outcome {
            Ok(result) => {
                session.complete(self.id, result.clone())?;
                Ok(TrackedOutcome::Completed(result))
            }
            Err(reason) => {
                session.fail(self.id, Some(reason.clone()))?;
                Ok(TrackedOutcome::Failed(reason))
            }
        }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut session = lock_session(self.orchestrator);
        if session.status(self.id) == ProbeStatus::Running {
            tracing::warn!(test = %self.id, "tracked_run_cancelled");
            let _ = session.fail(self.id, Some(CANCELLED_REASON.to_string()));
        }
    }
}

/// Run `work` as test `id`: start it, await the work without holding the
/// lock, then record completion or failure
///
/// Returns an error only when the orchestrator refuses the start. If the
/// returned future is dropped mid-run the test is recorded as failed.
pub async fn run_tracked<F, Fut>(
    orchestrator: &Mutex<TestOrchestrator>,
    id: TestId,
    work: F,
) -> Result<TrackedOutcome, OrchestratorError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<ProbeResult, String>>,
{
    lock_session(orchestrator).start(id)?;
    let guard = RunningGuard::new(orchestrator, id);
    run_started(guard, work).await
}

/// Await `work` for a test the caller already started
pub(crate) async fn run_started<F, Fut>(
    guard: RunningGuard<'_>,
    work: F,
) -> Result<TrackedOutcome, OrchestratorError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<ProbeResult, String>>,
{
    let outcome = work().await;
    guard.settle(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ping::PingSummary;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_tracked_completes() {
        let orch = Mutex::new(TestOrchestrator::default());
        let outcome = run_tracked(&orch, TestId::Ping, || async {
            Ok(ProbeResult::Ping(PingSummary::from_samples("example.com", vec![])))
        })
        .await
        .unwrap();
        assert!(matches!(outcome, TrackedOutcome::Completed(ProbeResult::Ping(_))));
        assert_eq!(lock_session(&orch).status(TestId::Ping), ProbeStatus::Completed);
    }

    #[tokio::test]
    async fn test_run_tracked_records_failure() {
        let orch = Mutex::new(TestOrchestrator::default());
        let outcome = run_tracked(&orch, TestId::Media, || async {
            Err("no microphone".to_string())
        })
        .await
        .unwrap();
        assert_eq!(outcome, TrackedOutcome::Failed("no microphone".into()));
        let session = lock_session(&orch);
        assert_eq!(session.status(TestId::Media), ProbeStatus::Failed);
        assert_eq!(session.record(TestId::Media).failure(), Some("no microphone"));
    }

    #[tokio::test]
    async fn test_run_tracked_refused_start_skips_work() {
        let orch = Mutex::new(TestOrchestrator::default());
        lock_session(&orch).start(TestId::Speed).unwrap();

        let mut ran = false;
        let result = run_tracked(&orch, TestId::Ping, || {
            ran = true;
            async { Err("unreachable".to_string()) }
        })
        .await;
        assert!(matches!(result, Err(OrchestratorError::AlreadyRunning { .. })));
        assert!(!ran);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_fails_test_and_frees_slot() {
        let orch = Mutex::new(TestOrchestrator::default());
        let pending = run_tracked(&orch, TestId::Ping, || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ProbeResult::Ping(PingSummary::from_samples("example.com", vec![])))
        });
        assert!(tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .is_err());

        let mut session = lock_session(&orch);
        assert_eq!(session.status(TestId::Ping), ProbeStatus::Failed);
        assert_eq!(session.record(TestId::Ping).failure(), Some(CANCELLED_REASON));
        assert!(session.start(TestId::Speed).is_ok());
        // A cancelled test can be retried
        session.fail(TestId::Speed, None).unwrap();
        assert!(session.start(TestId::Ping).is_ok());
    }

    #[tokio::test]
    async fn test_settled_run_is_not_failed_on_drop() {
        let orch = Mutex::new(TestOrchestrator::default());
        run_tracked(&orch, TestId::Ping, || async {
            Ok(ProbeResult::Ping(PingSummary::from_samples("example.com", vec![])))
        })
        .await
        .unwrap();
        let session = lock_session(&orch);
        assert_eq!(session.status(TestId::Ping), ProbeStatus::Completed);
        assert_eq!(session.record(TestId::Ping).failure(), None);
    }
}
