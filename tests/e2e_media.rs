//! E2E tests for the microphone test feeding the report
//!
//! Uses an in-process audio source so no capture device is needed.

use callcheck::{AppConfig, Diagnostics};
use callcheck_core::media::{
    AudioSource, LevelMeter, MediaAccessError, MemoryPermissionStore, PermissionState,
    PermissionStore,
};
use callcheck_core::probe::scripted::ScriptedTransport;
use callcheck_core::report::{to_csv, CSV_HEADER};
use callcheck_core::session::{lock_session, ProbeStatus, TestId};
use std::time::Duration;

struct SteadyMeter(f32);

impl LevelMeter for SteadyMeter {
    fn level(&mut self) -> Option<f32> {
        Some(self.0)
    }

    fn close(&mut self) {}
}

enum TestSource {
    Steady(f32),
    Denied,
}

impl AudioSource for TestSource {
    type Meter = SteadyMeter;

    fn label(&self) -> String {
        "Test Microphone".into()
    }

    fn open(&mut self) -> Result<SteadyMeter, MediaAccessError> {
        match self {
            TestSource::Steady(level) => Ok(SteadyMeter(*level)),
            TestSource::Denied => Err(MediaAccessError::PermissionDenied),
        }
    }
}

fn diagnostics() -> Diagnostics<ScriptedTransport> {
    Diagnostics::new(
        ScriptedTransport::new(),
        AppConfig {
            mic_sample_period_ms: 100,
            ..AppConfig::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_mic_only_report_has_media_rows_only() {
    let diag = diagnostics();
    let store = MemoryPermissionStore::new();
    let summary = diag
        .media(&mut TestSource::Steady(0.25), Duration::from_secs(3), &store)
        .await
        .unwrap()
        .unwrap();

    let stats = summary.mic_stats.as_ref().unwrap();
    assert!(!stats.samples.is_empty());
    assert!(stats.samples.len() <= 100);
    assert!((stats.average_volume - 25.0).abs() < 1e-3);
    assert_eq!(store.load(), PermissionState::Granted);

    let report = diag.report();
    assert!(report.network.is_none());
    assert!(report.system.is_none());
    assert!(report.quick_test.is_none());
    assert_eq!(report.media.as_ref(), Some(&summary));

    let csv = to_csv(&report);
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some(CSV_HEADER));
    let rows: Vec<&str> = lines.collect();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|row| row.starts_with("Media,")));
    assert!(rows.iter().any(|row| row.starts_with("Media,Microphone,Test Microphone,")));
}

#[tokio::test(start_paused = true)]
async fn test_denied_microphone_fails_media_test() {
    let diag = diagnostics();
    let store = MemoryPermissionStore::new();
    let outcome = diag
        .media(&mut TestSource::Denied, Duration::from_secs(1), &store)
        .await
        .unwrap();

    assert!(outcome.is_err());
    assert_eq!(store.load(), PermissionState::Denied);
    {
        let session = diag.session();
        let session = lock_session(&session);
        assert_eq!(session.status(TestId::Media), ProbeStatus::Failed);
    }
    assert!(diag.report().is_empty());

    // A failed test can be retried without a reset
    let retried = diag
        .media(&mut TestSource::Steady(0.1), Duration::from_secs(1), &store)
        .await
        .unwrap();
    assert!(retried.is_ok());
}
