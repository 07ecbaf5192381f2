//! Fetch-based ping
//!
//! Each attempt is a single HEAD request with a deadline. Attempts run
//! strictly one after another with a pacing gap in between so the probe never
//! competes with itself on the measured link.

use super::duration_to_ms;
use super::pacing::Pacer;
use super::transport::{probe_url, ProbeTransport};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Default number of attempts per ping run
pub const DEFAULT_PING_COUNT: u32 = 4;

/// Default gap between consecutive attempts
pub const DEFAULT_INTER_SAMPLE_DELAY: Duration = Duration::from_millis(500);

/// Default per-attempt deadline
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Parameters of a ping run
#[derive(Debug, Clone, PartialEq)]
pub struct PingConfig {
    pub target_host: String,
    pub count: u32,
    pub inter_sample_delay: Duration,
    pub attempt_timeout: Duration,
}

impl PingConfig {
    pub fn new(target_host: impl Into<String>) -> Self {
        Self {
            target_host: target_host.into(),
            count: DEFAULT_PING_COUNT,
            inter_sample_delay: DEFAULT_INTER_SAMPLE_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

/// Result of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingOutcome {
    Success,
    Error,
}

/// One ping attempt, immutable once produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingSample {
    pub target_host: String,
    /// Round trip in ms; 0 for failed attempts
    pub elapsed_ms: u64,
    pub outcome: PingOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl PingSample {
    pub fn is_success(&self) -> bool {
        self.outcome == PingOutcome::Success
    }
}

/// Coarse label for a ping success rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PingQuality {
    Excellent,
    Good,
    Poor,
}

impl PingQuality {
    pub fn from_success_rate(percent: u32) -> Self {
        match percent {
            100.. => Self::Excellent,
            75..=99 => Self::Good,
            _ => Self::Poor,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Poor => "Poor",
        }
    }
}

/// Samples of a ping run together with their aggregate
///
/// The aggregate fields are derived from `samples` when the summary is built
/// and again when it is deserialized; nothing mutates them afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "PingSummaryWire")]
pub struct PingSummary {
    target_host: String,
    samples: Vec<PingSample>,
    success_rate_percent: u32,
    average_elapsed_ms_over_successes: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PingSummaryWire {
    target_host: String,
    #[serde(default)]
    samples: Vec<PingSample>,
}

impl From<PingSummaryWire> for PingSummary {
    fn from(wire: PingSummaryWire) -> Self {
        PingSummary::from_samples(wire.target_host, wire.samples)
    }
}

impl PingSummary {
    /// Aggregate a sample set
    pub fn from_samples(target_host: impl Into<String>, samples: Vec<PingSample>) -> Self {
        let total = samples.len();
        let successes: Vec<u64> = samples
            .iter()
            .filter(|s| s.is_success())
            .map(|s| s.elapsed_ms)
            .collect();

        let success_rate_percent = if total == 0 {
            0
        } else {
            (100.0 * successes.len() as f64 / total as f64).round() as u32
        };

        let average_elapsed_ms_over_successes = if successes.is_empty() {
            0
        } else {
            (successes.iter().sum::<u64>() as f64 / successes.len() as f64).round() as u64
        };

        Self {
            target_host: target_host.into(),
            samples,
            success_rate_percent,
            average_elapsed_ms_over_successes,
        }
    }

    pub fn target_host(&self) -> &str {
        &self.target_host
    }

    pub fn samples(&self) -> &[PingSample] {
        &self.samples
    }

    pub fn success_rate_percent(&self) -> u32 {
        self.success_rate_percent
    }

    pub fn average_elapsed_ms_over_successes(&self) -> u64 {
        self.average_elapsed_ms_over_successes
    }

    pub fn success_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_success()).count()
    }

    pub fn quality(&self) -> PingQuality {
        PingQuality::from_success_rate(self.success_rate_percent)
    }
}

/// Issue a single timed attempt
pub async fn ping_once<T: ProbeTransport>(
    transport: &T,
    target_host: &str,
    timeout: Duration,
) -> PingSample {
    let url = probe_url(target_host);
    let start = Instant::now();
    match transport.head(&url, timeout).await {
        Ok(()) => {
            let elapsed_ms = duration_to_ms(start.elapsed());
            tracing::debug!(host = %target_host, elapsed_ms, "ping_success");
            PingSample {
                target_host: target_host.to_string(),
                elapsed_ms,
                outcome: PingOutcome::Success,
                error_detail: None,
            }
        }
        Err(e) => {
            tracing::debug!(host = %target_host, error = %e, "ping_error");
            PingSample {
                target_host: target_host.to_string(),
                elapsed_ms: 0,
                outcome: PingOutcome::Error,
                error_detail: Some(e.to_string()),
            }
        }
    }
}

/// Step-wise ping run producing one attempt per [`PingRun::next`] call
///
/// The pacing gap is requested before every attempt except the first, so no
/// wait follows the final attempt.
pub struct PingRun<'a, T, P> {
    transport: &'a T,
    pacer: &'a P,
    config: &'a PingConfig,
    samples: Vec<PingSample>,
}

impl<'a, T: ProbeTransport, P: Pacer> PingRun<'a, T, P> {
    pub fn new(transport: &'a T, pacer: &'a P, config: &'a PingConfig) -> Self {
        Self {
            transport,
            pacer,
            config,
            samples: Vec::with_capacity(config.count as usize),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.samples.len() >= self.config.count as usize
    }

    /// Run the next attempt, or return `None` once `count` attempts are done
    pub async fn next(&mut self) -> Option<&PingSample> {
        if self.is_finished() {
            return None;
        }
        if !self.samples.is_empty() {
            self.pacer.pause(self.config.inter_sample_delay).await;
        }
        let sample = ping_once(
            self.transport,
            &self.config.target_host,
            self.config.attempt_timeout,
        )
        .await;
        self.samples.push(sample);
        self.samples.last()
    }

    /// Samples produced so far
    pub fn samples(&self) -> &[PingSample] {
        &self.samples
    }

    pub fn into_summary(self) -> PingSummary {
        PingSummary::from_samples(self.config.target_host.clone(), self.samples)
    }
}

/// Run a complete ping measurement
///
/// `observer` receives the growing sample slice after every attempt. Attempt
/// failures are recorded as samples; the run itself cannot fail.
pub async fn measure_ping<T, P, F>(
    transport: &T,
    pacer: &P,
    config: &PingConfig,
    mut observer: F,
) -> PingSummary
where
    T: ProbeTransport,
    P: Pacer,
    F: FnMut(&[PingSample]),
{
    tracing::info!(host = %config.target_host, count = config.count, "ping_started");
    let mut run = PingRun::new(transport, pacer, config);
    while run.next().await.is_some() {
        observer(run.samples());
    }
    let summary = run.into_summary();
    tracing::info!(
        host = %summary.target_host(),
        success_rate = summary.success_rate_percent(),
        avg_ms = summary.average_elapsed_ms_over_successes(),
        "ping_finished"
    );
    summary
}
