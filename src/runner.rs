//! Runs probes for the command line through a tracked session
//!
//! Each command records its result in the orchestrator exactly as the server
//! does, so a report can be exported after any sequence of commands.

use crate::config::AppConfig;
use callcheck_core::media::{measure_mic, AudioSource, MediaSummary, PermissionStore};
use callcheck_core::probe::advanced::{run_advanced_tests, AdvancedSummary};
use callcheck_core::probe::pacing::TokioPacer;
use callcheck_core::probe::transport::{HttpTransport, ProbeTransport};
use callcheck_core::quick::{run_quick_test, QuickTestSummary};
use callcheck_core::report::{
    build_report, save_artifact, ExportError, ExportFormat, Report, SystemClock,
};
use callcheck_core::session::{
    lock_session, run_tracked, OrchestratorError, ProbeResult, SharedOrchestrator, TestId,
    TrackedOutcome,
};
use callcheck_core::system::{collect_system_info, SystemInfo};
use callcheck_core::{
    estimate_speed, measure_ping, trace_route, OrchestrationMode, PingSummary, SpeedMeasurement,
    TestOrchestrator, TracerouteSummary,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct Diagnostics<T = HttpTransport> {
    session: SharedOrchestrator,
    transport: T,
    config: AppConfig,
}

impl<T: ProbeTransport> Diagnostics<T> {
    pub fn new(transport: T, config: AppConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(TestOrchestrator::new(OrchestrationMode::Guided))),
            transport,
            config,
        }
    }

    pub fn session(&self) -> SharedOrchestrator {
        Arc::clone(&self.session)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn ping(
        &self,
        host: Option<String>,
        count: Option<u32>,
    ) -> Result<PingSummary, OrchestratorError> {
        let mut config = self.config.ping_config();
        if let Some(host) = host {
            config.target_host = host;
        }
        if let Some(count) = count {
            config.count = count.max(1);
        }

        let transport = &self.transport;
        let outcome = run_tracked(&self.session, TestId::Ping, move || async move {
            let summary = measure_ping(transport, &TokioPacer, &config, |samples| {
                if let Some(last) = samples.last() {
                    tracing::info!(
                        attempt = samples.len(),
                        elapsed_ms = last.elapsed_ms,
                        outcome = ?last.outcome,
                        "ping_attempt"
                    );
                }
            })
            .await;
            Ok(ProbeResult::Ping(summary))
        })
        .await?;

        match outcome {
            TrackedOutcome::Completed(ProbeResult::Ping(summary)) => Ok(summary),
            _ => Err(self.unexpected(TestId::Ping)),
        }
    }

    pub async fn traceroute(
        &self,
        host: Option<String>,
        max_hops: Option<u32>,
    ) -> Result<TracerouteSummary, OrchestratorError> {
        let mut config = self.config.traceroute_config();
        if let Some(host) = host {
            config.target_host = host;
        }
        if let Some(max_hops) = max_hops {
            config.max_hops = max_hops.max(1);
        }

        let transport = &self.transport;
        let outcome = run_tracked(&self.session, TestId::Traceroute, move || async move {
            let summary = trace_route(transport, &TokioPacer, &config, |hops| {
                if let Some(hop) = hops.last() {
                    tracing::info!(
                        hop = hop.hop_index,
                        elapsed_ms = hop.elapsed_ms,
                        outcome = hop.outcome.label(),
                        "traceroute_hop"
                    );
                }
            })
            .await;
            Ok(ProbeResult::Traceroute(summary))
        })
        .await?;

        match outcome {
            TrackedOutcome::Completed(ProbeResult::Traceroute(summary)) => Ok(summary),
            _ => Err(self.unexpected(TestId::Traceroute)),
        }
    }

    /// Run the speed test; a failed download is recorded and returned as a
    /// failed measurement
    pub async fn speed(&self) -> Result<SpeedMeasurement, OrchestratorError> {
        let config = self.config.speed_config();
        let transport = &self.transport;
        let outcome = run_tracked(&self.session, TestId::Speed, move || async move {
            let measurement = estimate_speed(transport, &TokioPacer, &config, |phase| {
                tracing::info!(phase = phase.description(), "speed_phase");
            })
            .await;
            match &measurement.error {
                Some(reason) => Err(reason.clone()),
                None => Ok(ProbeResult::Speed(measurement)),
            }
        })
        .await?;

        match outcome {
            TrackedOutcome::Completed(ProbeResult::Speed(m)) => Ok(m),
            TrackedOutcome::Failed(reason) => Ok(SpeedMeasurement::failed(reason)),
            TrackedOutcome::Completed(_) => Err(self.unexpected(TestId::Speed)),
        }
    }

    /// DNS, HTTP, HTTPS and CDN timings plus network type and VPN guesses
    pub async fn advanced(&self) -> Result<AdvancedSummary, OrchestratorError> {
        let config = self.config.advanced_config();
        let transport = &self.transport;
        let outcome = run_tracked(&self.session, TestId::Advanced, move || async move {
            Ok(ProbeResult::Advanced(
                run_advanced_tests(transport, &config).await,
            ))
        })
        .await?;

        match outcome {
            TrackedOutcome::Completed(ProbeResult::Advanced(summary)) => Ok(summary),
            _ => Err(self.unexpected(TestId::Advanced)),
        }
    }

    pub async fn system(&self) -> Result<SystemInfo, OrchestratorError> {
        let transport = &self.transport;
        let outcome = run_tracked(&self.session, TestId::System, move || async move {
            Ok(ProbeResult::System(collect_system_info(transport).await))
        })
        .await?;

        match outcome {
            TrackedOutcome::Completed(ProbeResult::System(info)) => Ok(info),
            _ => Err(self.unexpected(TestId::System)),
        }
    }

    /// Sample the microphone for `duration`; access failures are recorded as
    /// a failed media test and returned as `Err` in the outcome
    pub async fn media<S: AudioSource>(
        &self,
        source: &mut S,
        duration: Duration,
        store: &dyn PermissionStore,
    ) -> Result<Result<MediaSummary, String>, OrchestratorError> {
        let period = self.config.mic_sample_period();
        let outcome = run_tracked(&self.session, TestId::Media, move || async move {
            measure_mic(source, period, duration, store)
                .await
                .map(ProbeResult::Media)
                .map_err(|e| e.to_string())
        })
        .await?;

        match outcome {
            TrackedOutcome::Completed(ProbeResult::Media(summary)) => Ok(Ok(summary)),
            TrackedOutcome::Failed(reason) => Ok(Err(reason)),
            TrackedOutcome::Completed(_) => Err(self.unexpected(TestId::Media)),
        }
    }

    pub async fn quick(&self) -> Result<QuickTestSummary, OrchestratorError> {
        let speed_config = self.config.speed_config();
        run_quick_test(&self.session, &self.transport, &TokioPacer, &speed_config).await
    }

    /// Report of everything completed so far
    pub fn report(&self) -> Report {
        let snapshot = lock_session(&self.session).snapshot();
        build_report(&snapshot, &SystemClock)
    }

    pub fn export(&self, format: ExportFormat, path: &Path) -> Result<(), ExportError> {
        save_artifact(&self.report(), format, path)
    }

    // run_tracked only completes a test with a result of its own kind
    fn unexpected(&self, id: TestId) -> OrchestratorError {
        OrchestratorError::NotRunning {
            id,
            status: lock_session(&self.session).status(id),
        }
    }
}
