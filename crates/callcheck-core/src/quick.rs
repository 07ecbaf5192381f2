//! Quick test: speed then system information, summarised in one verdict

use crate::media::MediaSummary;
use crate::probe::grading::Readiness;
use crate::probe::pacing::Pacer;
use crate::probe::speed::{estimate_speed, SpeedConfig, SpeedMeasurement};
use crate::probe::transport::ProbeTransport;
use crate::session::{
    lock_session, run_started, run_tracked, OrchestrationMode, OrchestratorError, ProbeResult,
    ProbeStatus, RunningGuard, TestId, TestOrchestrator, TrackedOutcome,
};
use crate::system::collect_system_info;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Download above which the network counts as excellent (Mbps)
const EXCELLENT_DOWNLOAD_MBPS: f64 = 25.0;

/// Download above which the network counts as good (Mbps)
const GOOD_DOWNLOAD_MBPS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickTestSummary {
    pub network_status: String,
    pub media_status: String,
    pub overall_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<Readiness>,
    pub completed_at: DateTime<Utc>,
}

/// Network verdict from the download figure
pub fn network_status(speed: Option<&SpeedMeasurement>) -> &'static str {
    match speed {
        None => "Not tested",
        Some(m) if m.is_failed() => "Failed",
        Some(m) if m.download_mbps > EXCELLENT_DOWNLOAD_MBPS => "Excellent",
        Some(m) if m.download_mbps > GOOD_DOWNLOAD_MBPS => "Good",
        Some(_) => "Needs Improvement",
    }
}

/// Overall verdict from call readiness
pub fn overall_status(speed: Option<&SpeedMeasurement>) -> &'static str {
    match speed.filter(|m| !m.is_failed()).map(|m| m.readiness) {
        Some(r) if r.is_call_ready() => "Ready",
        Some(Readiness::Limited) => "Fair",
        _ => "Not Ready",
    }
}

impl QuickTestSummary {
    pub fn derive(speed: Option<&SpeedMeasurement>, media: Option<&MediaSummary>) -> Self {
        Self {
            network_status: network_status(speed).to_string(),
            media_status: media.map(|m| m.status()).unwrap_or("Not tested").to_string(),
            overall_status: overall_status(speed).to_string(),
            readiness: speed.filter(|m| !m.is_failed()).map(|m| m.readiness),
            completed_at: Utc::now(),
        }
    }
}

/// Tests the quick sequence resets and records
const QUICK_SEQUENCE: [TestId; 3] = [TestId::Speed, TestId::System, TestId::QuickTest];

/// Run the quick sequence through the orchestrator
///
/// Earlier speed, system and quick-test results are reset first, in the
/// same lock that starts the speed test; a refused start leaves every
/// record as it was. Speed and system run one after the other; a failed
/// speed run is recorded and the sequence carries on. The media verdict
/// uses whatever media result the session already holds.
pub async fn run_quick_test<T, P>(
    orchestrator: &Mutex<TestOrchestrator>,
    transport: &T,
    pacer: &P,
    speed_config: &SpeedConfig,
) -> Result<QuickTestSummary, OrchestratorError>
where
    T: ProbeTransport,
    P: Pacer,
{
    let guard = {
        let mut session = lock_session(orchestrator);
        let blocking = match session.mode() {
            OrchestrationMode::Guided => session.active(),
            OrchestrationMode::Quick => QUICK_SEQUENCE
                .into_iter()
                .find(|id| session.status(*id) == ProbeStatus::Running),
        };
        if let Some(active) = blocking {
            return Err(OrchestratorError::AlreadyRunning {
                active,
                requested: TestId::Speed,
            });
        }
        for id in QUICK_SEQUENCE {
            session.reset_one(id);
        }
        session.start(TestId::Speed)?;
        RunningGuard::new(orchestrator, TestId::Speed)
    };
    tracing::info!("quick_test_started");

    let speed = run_started(guard, || async {
        let measurement = estimate_speed(transport, pacer, speed_config, |phase| {
            tracing::debug!(phase = phase.description(), "quick_test_progress");
        })
        .await;
        match &measurement.error {
            Some(reason) => Err(reason.clone()),
            None => Ok(ProbeResult::Speed(measurement)),
        }
    })
    .await?;

    run_tracked(orchestrator, TestId::System, || async {
        Ok(ProbeResult::System(collect_system_info(transport).await))
    })
    .await?;

    let speed = match speed {
        TrackedOutcome::Completed(ProbeResult::Speed(m)) => Some(m),
        TrackedOutcome::Failed(reason) => Some(SpeedMeasurement::failed(reason)),
        TrackedOutcome::Completed(_) => None,
    };
    let media = match lock_session(orchestrator).result(TestId::Media) {
        Some(ProbeResult::Media(m)) => Some(m.clone()),
        _ => None,
    };

    let summary = QuickTestSummary::derive(speed.as_ref(), media.as_ref());
    let recorded = summary.clone();
    run_tracked(orchestrator, TestId::QuickTest, move || async move {
        Ok(ProbeResult::QuickTest(recorded))
    })
    .await?;

    tracing::info!(
        network = %summary.network_status,
        media = %summary.media_status,
        overall = %summary.overall_status,
        "quick_test_finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::pacing::InstantPacer;
    use crate::probe::scripted::{ScriptStep, ScriptedTransport};
    use crate::probe::speed::MetricSource;
    use crate::probe::transport::ProbeTransportError;

    fn measurement(download: f64, upload: f64, latency: f64) -> SpeedMeasurement {
        SpeedMeasurement::graded(
            download,
            (upload, MetricSource::Measured),
            (latency, MetricSource::Measured),
            (2.0, MetricSource::Measured),
            Some(0.0),
        )
    }

    fn small_config() -> SpeedConfig {
        SpeedConfig {
            loss_attempts: 3,
            ..SpeedConfig::default()
        }
    }

    #[test]
    fn test_network_status_bands() {
        assert_eq!(network_status(None), "Not tested");
        assert_eq!(network_status(Some(&measurement(30.0, 10.0, 20.0))), "Excellent");
        assert_eq!(network_status(Some(&measurement(12.0, 6.0, 80.0))), "Good");
        assert_eq!(network_status(Some(&measurement(10.0, 6.0, 80.0))), "Needs Improvement");
        assert_eq!(network_status(Some(&SpeedMeasurement::failed("x"))), "Failed");
    }

    #[test]
    fn test_overall_status() {
        assert_eq!(overall_status(Some(&measurement(12.0, 6.0, 80.0))), "Ready");
        assert_eq!(overall_status(Some(&measurement(8.0, 3.0, 150.0))), "Fair");
        assert_eq!(overall_status(Some(&measurement(3.0, 1.0, 150.0))), "Not Ready");
        assert_eq!(overall_status(None), "Not Ready");
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_test_records_every_step() {
        let orch = Mutex::new(TestOrchestrator::new(OrchestrationMode::Quick));
        let transport = ScriptedTransport::new()
            .with_download(3_750_000, ScriptStep::ok(1000))
            .with_upload(ScriptStep::fail(ProbeTransportError::Http(405)));
        let pacer = InstantPacer::new();

        let summary = run_quick_test(&orch, &transport, &pacer, &small_config())
            .await
            .unwrap();

        // 30 Mbps down, upload estimated at 4.5
        assert_eq!(summary.network_status, "Excellent");
        assert_eq!(summary.media_status, "Not tested");
        assert_eq!(summary.overall_status, "Fair");

        let session = lock_session(&orch);
        assert_eq!(session.status(TestId::Speed), ProbeStatus::Completed);
        assert_eq!(session.status(TestId::System), ProbeStatus::Completed);
        assert_eq!(session.status(TestId::QuickTest), ProbeStatus::Completed);
        assert!(session.active().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_test_survives_download_failure() {
        let orch = Mutex::new(TestOrchestrator::new(OrchestrationMode::Guided));
        let transport = ScriptedTransport::new()
            .with_download(0, ScriptStep::fail(ProbeTransportError::Connect("offline".into())));
        let pacer = InstantPacer::new();

        let summary = run_quick_test(&orch, &transport, &pacer, &small_config())
            .await
            .unwrap();

        assert_eq!(summary.network_status, "Failed");
        assert_eq!(summary.overall_status, "Not Ready");
        let session = lock_session(&orch);
        assert_eq!(session.status(TestId::Speed), ProbeStatus::Failed);
        assert_eq!(session.status(TestId::System), ProbeStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_test_can_rerun() {
        let orch = Mutex::new(TestOrchestrator::new(OrchestrationMode::Quick));
        let transport = ScriptedTransport::new();
        let pacer = InstantPacer::new();
        run_quick_test(&orch, &transport, &pacer, &small_config())
            .await
            .unwrap();
        run_quick_test(&orch, &transport, &pacer, &small_config())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_test_refused_while_guided_test_runs() {
        let orch = Mutex::new(TestOrchestrator::new(OrchestrationMode::Guided));
        lock_session(&orch).start(TestId::Ping).unwrap();
        let transport = ScriptedTransport::new();
        let pacer = InstantPacer::new();

        let err = run_quick_test(&orch, &transport, &pacer, &small_config())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyRunning { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_quick_test_keeps_earlier_results() {
        let orch = Mutex::new(TestOrchestrator::new(OrchestrationMode::Guided));
        {
            let mut session = lock_session(&orch);
            session.start(TestId::Speed).unwrap();
            session
                .complete(TestId::Speed, ProbeResult::Speed(measurement(30.0, 10.0, 20.0)))
                .unwrap();
            session.start(TestId::Ping).unwrap();
        }
        let transport = ScriptedTransport::new();
        let pacer = InstantPacer::new();

        let err = run_quick_test(&orch, &transport, &pacer, &small_config())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::AlreadyRunning {
                active: TestId::Ping,
                requested: TestId::Speed,
            }
        );

        let session = lock_session(&orch);
        assert_eq!(session.status(TestId::Speed), ProbeStatus::Completed);
        assert!(session.result(TestId::Speed).is_some());
        assert_eq!(session.status(TestId::Ping), ProbeStatus::Running);
        assert_eq!(transport.count(crate::probe::scripted::CallKind::Download), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_mode_refuses_while_own_step_runs() {
        let orch = Mutex::new(TestOrchestrator::new(OrchestrationMode::Quick));
        {
            let mut session = lock_session(&orch);
            session.start(TestId::QuickTest).unwrap();
            session.fail(TestId::QuickTest, None).unwrap();
            session.start(TestId::System).unwrap();
        }
        let transport = ScriptedTransport::new();
        let pacer = InstantPacer::new();

        let err = run_quick_test(&orch, &transport, &pacer, &small_config())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::AlreadyRunning { active: TestId::System, .. }
        ));
        assert_eq!(lock_session(&orch).status(TestId::QuickTest), ProbeStatus::Failed);
    }
}
