//! Callcheck Core - call-readiness probes, test orchestration and report export
//!
//! This library estimates whether a network path and the local audio capture
//! device are good enough for real-time video calls. It measures latency,
//! throughput and path behaviour with application-layer requests, samples
//! microphone activity, sequences the individual tests through a small state
//! machine and merges whatever results exist into a single exportable report.

pub mod media;
pub mod probe;
pub mod quick;
pub mod report;
pub mod session;
pub mod system;

pub use probe::ping::{measure_ping, PingSummary};
pub use probe::speed::{estimate_speed, SpeedMeasurement};
pub use probe::traceroute::{trace_route, TracerouteSummary};
pub use report::{build_report, to_csv, to_json, Report};
pub use session::orchestrator::{OrchestrationMode, TestOrchestrator};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default host probed by ping and traceroute
pub const DEFAULT_PROBE_HOST: &str = "www.microsoft.com";

/// User agent sent with every probe request
pub fn user_agent() -> String {
    format!("callcheck/{}", VERSION)
}
