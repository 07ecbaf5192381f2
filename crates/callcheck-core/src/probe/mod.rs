//! Network probe module
//!
//! Application-layer approximations of classic network diagnostics:
//! - Transport seam for timed, cancellable requests ([`transport`])
//! - Pacing between sequential attempts ([`pacing`])
//! - Fetch-based ping ([`ping`])
//! - Escalating-timeout traceroute ([`traceroute`])
//! - Throughput and call-quality estimation ([`speed`], [`grading`])
//! - Latency series statistics ([`series`])
//! - Endpoint timing, network type and VPN guesses ([`advanced`])
//! - Deterministic transport for tests and dry runs ([`scripted`])
//!
//! None of these send raw ICMP. A "ping" is a HEAD request and a traceroute
//! "hop" is the same request retried with a growing deadline.

pub mod advanced;
pub mod grading;
pub mod pacing;
pub mod ping;
pub mod scripted;
pub mod series;
pub mod speed;
pub mod traceroute;
pub mod transport;

use std::time::Duration;

/// Convert a measured duration to whole milliseconds, rounding half up
pub(crate) fn duration_to_ms(elapsed: Duration) -> u64 {
    (elapsed.as_secs_f64() * 1000.0).round() as u64
}

/// Round to two decimal places
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
