//! E2E tests for a full diagnostics session
//!
//! Runs every network probe through the tracked session against a scripted
//! transport, then checks what the exported reports contain.

use callcheck::{AppConfig, Diagnostics, ExportFormat};
use callcheck_core::probe::scripted::{ScriptStep, ScriptedTransport};
use callcheck_core::probe::transport::ProbeTransportError;
use callcheck_core::report::{from_json, CSV_HEADER};
use callcheck_core::session::{lock_session, OrchestratorError, ProbeStatus, TestId};

fn config() -> AppConfig {
    AppConfig {
        ping_count: 3,
        max_hops: 5,
        loss_attempts: 4,
        ..AppConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_guided_session_exports_every_section() {
    let transport = ScriptedTransport::new()
        .with_download(6_250_000, ScriptStep::ok(2000))
        .with_text("api.ipify.org", Ok(r#"{"ip": "198.51.100.20"}"#.into()))
        .with_text("ipapi.co", Ok(r#"{"city": "Prague", "country_name": "Czechia"}"#.into()));
    let diag = Diagnostics::new(transport, config());

    let ping = diag.ping(None, None).await.unwrap();
    assert_eq!(ping.success_rate_percent(), 100);

    let trace = diag.traceroute(None, None).await.unwrap();
    assert!(trace.reached_destination());

    let speed = diag.speed().await.unwrap();
    assert!((speed.download_mbps - 25.0).abs() < 0.1);

    let advanced = diag.advanced().await.unwrap();
    // Unscripted lookups answer 404: the resolver was reached but refused
    assert_eq!(advanced.dns_performance.status.label(), "Good");

    let system = diag.system().await.unwrap();
    assert_eq!(system.public_ip.as_deref(), Some("198.51.100.20"));
    assert_eq!(system.location.as_deref(), Some("Prague, Czechia"));

    let dir = tempfile::tempdir().unwrap();
    let json_path = dir.path().join("report.json");
    let csv_path = dir.path().join("report.csv");
    diag.export(ExportFormat::Json, &json_path).unwrap();
    diag.export(ExportFormat::Csv, &csv_path).unwrap();

    let report = from_json(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    let network = report.network.as_ref().unwrap();
    assert!(network.ping.is_some());
    assert!(network.traceroute.is_some());
    assert!(network.speed.is_some());
    assert_eq!(network.advanced.as_ref(), Some(&advanced));
    assert!(report.system.is_some());
    assert!(report.media.is_none());
    assert!(report.quick_test.is_none());

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some(CSV_HEADER));
    let types: Vec<&str> = lines.map(|l| l.split(',').next().unwrap()).collect();
    let first = |t: &str| types.iter().position(|x| *x == t).unwrap();
    assert!(first("Speed Test") < first("Advanced Test"));
    assert!(first("Advanced Test") < first("Ping Test"));
    assert!(first("Ping Test") < first("Traceroute"));
    assert!(first("Traceroute") < first("Traceroute Hop 1"));
    assert!(first("Traceroute Hop 1") < first("System"));
    assert!(!types.contains(&"Media"));
    assert!(csv.contains("System,Location,\"Prague, Czechia\","));
}

#[tokio::test(start_paused = true)]
async fn test_all_attempts_failing_is_still_a_result() {
    let transport = ScriptedTransport::new()
        .with_head_fallback(ScriptStep::fail(ProbeTransportError::Connect("refused".into())));
    let diag = Diagnostics::new(transport, config());

    let ping = diag.ping(None, None).await.unwrap();
    assert_eq!(ping.success_rate_percent(), 0);
    assert_eq!(ping.average_elapsed_ms_over_successes(), 0);
    assert_eq!(ping.samples().len(), 3);

    let trace = diag.traceroute(None, None).await.unwrap();
    assert_eq!(trace.total_hops_attempted(), 5);
    assert_eq!(trace.successful_hop_count(), 0);

    let session = diag.session();
    let session = lock_session(&session);
    assert_eq!(session.status(TestId::Ping), ProbeStatus::Completed);
    assert_eq!(session.status(TestId::Traceroute), ProbeStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_quick_test_then_rerun_after_reset() {
    let diag = Diagnostics::new(ScriptedTransport::new(), config());
    let summary = diag.quick().await.unwrap();
    assert_eq!(summary.media_status, "Not tested");

    let report = diag.report();
    assert_eq!(report.quick_test.as_ref(), Some(&summary));

    // The speed test completed inside the quick run
    assert!(matches!(
        diag.speed().await,
        Err(OrchestratorError::AlreadyCompleted(TestId::Speed))
    ));
    lock_session(&diag.session()).reset_one(TestId::Speed);
    assert!(diag.speed().await.is_ok());
}
