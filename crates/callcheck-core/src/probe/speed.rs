//! Throughput and call-quality estimation
//!
//! Download is always measured. Upload is measured against an upload sink
//! when one answers and otherwise estimated from the download figure.
//! Latency, jitter and packet loss come from one short series of HEAD
//! requests. Every derived figure records whether it was measured or
//! estimated.

use super::grading::{assess_quality, bandwidth_score, Grade, QualityInputs, Readiness};
use super::pacing::Pacer;
use super::series::LatencySeries;
use super::transport::ProbeTransport;
use super::{duration_to_ms, round2};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Download payload size (25 MiB)
pub const DEFAULT_DOWNLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// Upload payload size (5 MiB)
pub const DEFAULT_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// HEAD requests used for latency, jitter and loss
pub const DEFAULT_LOSS_ATTEMPTS: u32 = 10;

/// Upload assumed as a fraction of download when no upload sink answers
pub const ESTIMATED_UPLOAD_RATIO: f64 = 0.15;

/// Recommendation attached to a failed run
pub const FAILED_RECOMMENDATION: &str = "Network test failed. Please check your connection.";

/// Whether a figure was measured on the wire or derived from other figures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    Measured,
    Estimated,
}

impl MetricSource {
    pub fn is_estimated(&self) -> bool {
        *self == MetricSource::Estimated
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedConfig {
    /// Payload endpoint; the size is appended as `?bytes=N`
    pub download_base_url: String,
    pub download_bytes: u64,
    pub download_timeout: Duration,
    pub upload_url: String,
    pub upload_bytes: usize,
    pub upload_timeout: Duration,
    /// Target of the latency/loss HEAD series
    pub latency_url: String,
    pub loss_attempts: u32,
    pub loss_attempt_timeout: Duration,
    pub loss_pacing: Duration,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            download_base_url: "https://speed.cloudflare.com/__down".to_string(),
            download_bytes: DEFAULT_DOWNLOAD_BYTES,
            download_timeout: Duration::from_secs(60),
            upload_url: "https://speed.cloudflare.com/__up".to_string(),
            upload_bytes: DEFAULT_UPLOAD_BYTES,
            upload_timeout: Duration::from_secs(30),
            latency_url: "https://speed.cloudflare.com".to_string(),
            loss_attempts: DEFAULT_LOSS_ATTEMPTS,
            loss_attempt_timeout: Duration::from_secs(3),
            loss_pacing: Duration::from_millis(50),
        }
    }
}

impl SpeedConfig {
    pub fn download_url(&self) -> String {
        format!("{}?bytes={}", self.download_base_url, self.download_bytes)
    }
}

/// Stage of a speed run, reported to progress observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedPhase {
    Download,
    Upload,
    Latency,
    Grading,
}

impl SpeedPhase {
    pub fn description(&self) -> &'static str {
        match self {
            SpeedPhase::Download => "Testing download speed...",
            SpeedPhase::Upload => "Testing upload speed...",
            SpeedPhase::Latency => "Testing latency and packet loss...",
            SpeedPhase::Grading => "Calculating connection quality...",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedMeasurement {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub upload_source: MetricSource,
    pub latency_ms: f64,
    pub latency_source: MetricSource,
    pub jitter_ms: f64,
    pub jitter_source: MetricSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_loss_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_score: Option<f64>,
    /// 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_grade: Option<Grade>,
    pub readiness: Readiness,
    pub call_ready: bool,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpeedMeasurement {
    /// Result of a run whose download could not complete
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            download_mbps: 0.0,
            upload_mbps: 0.0,
            upload_source: MetricSource::Measured,
            latency_ms: 0.0,
            latency_source: MetricSource::Measured,
            jitter_ms: 0.0,
            jitter_source: MetricSource::Measured,
            packet_loss_percent: None,
            bandwidth_score: Some(0.0),
            quality_score: Some(0),
            connection_grade: Some(Grade::F),
            readiness: Readiness::NotReady,
            call_ready: false,
            recommendations: vec![FAILED_RECOMMENDATION.to_string()],
            error: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Grade a set of figures and attach score, grade, readiness and advice
    pub fn graded(
        download_mbps: f64,
        upload: (f64, MetricSource),
        latency: (f64, MetricSource),
        jitter: (f64, MetricSource),
        packet_loss_percent: Option<f64>,
    ) -> Self {
        let assessment = assess_quality(&QualityInputs {
            download_mbps,
            upload_mbps: upload.0,
            latency_ms: latency.0,
            jitter_ms: jitter.0,
            packet_loss_percent: packet_loss_percent.unwrap_or(0.0),
        });
        let readiness = Readiness::classify(download_mbps, upload.0, latency.0);

        Self {
            download_mbps,
            upload_mbps: upload.0,
            upload_source: upload.1,
            latency_ms: latency.0,
            latency_source: latency.1,
            jitter_ms: jitter.0,
            jitter_source: jitter.1,
            packet_loss_percent,
            bandwidth_score: Some(bandwidth_score(download_mbps, upload.0)),
            quality_score: Some(assessment.score),
            connection_grade: Some(assessment.grade),
            readiness,
            call_ready: readiness.is_call_ready(),
            recommendations: assessment.recommendations,
            error: None,
        }
    }
}

/// Convert bytes moved in `elapsed` to megabits per second
pub fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    // Sub-millisecond transfers are clamped so the rate stays finite
    let seconds = elapsed.as_secs_f64().max(0.001);
    (bytes as f64 * 8.0) / 1_000_000.0 / seconds
}

/// Outcome of the HEAD series used for latency, jitter and loss
#[derive(Debug, Clone, PartialEq)]
struct LinkSeries {
    stats: Option<LatencySeries>,
    loss_percent: f64,
}

async fn measure_link<T: ProbeTransport, P: Pacer>(
    transport: &T,
    pacer: &P,
    config: &SpeedConfig,
) -> LinkSeries {
    let mut latencies = Vec::with_capacity(config.loss_attempts as usize);
    for attempt in 0..config.loss_attempts {
        if attempt > 0 {
            pacer.pause(config.loss_pacing).await;
        }
        let start = Instant::now();
        match transport
            .head(&config.latency_url, config.loss_attempt_timeout)
            .await
        {
            Ok(()) => latencies.push(duration_to_ms(start.elapsed()) as f64),
            Err(e) => tracing::debug!(attempt, error = %e, "loss_probe_failed"),
        }
    }

    let loss_percent = if config.loss_attempts == 0 {
        0.0
    } else {
        let lost = config.loss_attempts as usize - latencies.len();
        round2(lost as f64 / config.loss_attempts as f64 * 100.0)
    };

    LinkSeries {
        stats: LatencySeries::from_values(&latencies),
        loss_percent,
    }
}

/// Run the full speed and quality estimation
///
/// `on_phase` is called as each stage begins. A failed download ends the run
/// with [`SpeedMeasurement::failed`]; later stages degrade to estimates
/// instead of failing.
pub async fn estimate_speed<T, P, F>(
    transport: &T,
    pacer: &P,
    config: &SpeedConfig,
    mut on_phase: F,
) -> SpeedMeasurement
where
    T: ProbeTransport,
    P: Pacer,
    F: FnMut(SpeedPhase),
{
    tracing::info!(bytes = config.download_bytes, "speed_test_started");

    on_phase(SpeedPhase::Download);
    let start = Instant::now();
    let received = match transport
        .download(&config.download_url(), config.download_timeout)
        .await
    {
        Ok(received) => received,
        Err(e) => {
            tracing::warn!(error = %e, "download_failed");
            return SpeedMeasurement::failed(e.to_string());
        }
    };
    let download_mbps = round2(mbps(received, start.elapsed()));
    tracing::debug!(received, download_mbps, "download_measured");

    on_phase(SpeedPhase::Upload);
    let start = Instant::now();
    let upload = match transport
        .upload(&config.upload_url, config.upload_bytes, config.upload_timeout)
        .await
    {
        Ok(()) => (
            round2(mbps(config.upload_bytes as u64, start.elapsed())),
            MetricSource::Measured,
        ),
        Err(e) => {
            let estimate = round2(download_mbps * ESTIMATED_UPLOAD_RATIO);
            tracing::warn!(error = %e, estimate, "upload_failed_using_estimate");
            (estimate, MetricSource::Estimated)
        }
    };

    on_phase(SpeedPhase::Latency);
    let link = measure_link(transport, pacer, config).await;
    let (latency, jitter) = match link.stats {
        Some(stats) => (
            (stats.mean.round(), MetricSource::Measured),
            (round2(stats.jitter), MetricSource::Measured),
        ),
        None => {
            // Nothing answered: assume the worst latency the series allowed
            let worst = duration_to_ms(config.loss_attempt_timeout) as f64;
            tracing::warn!(worst, "latency_series_empty_using_estimate");
            ((worst, MetricSource::Estimated), (0.0, MetricSource::Estimated))
        }
    };

    on_phase(SpeedPhase::Grading);
    let measurement = SpeedMeasurement::graded(
        download_mbps,
        upload,
        latency,
        jitter,
        Some(link.loss_percent),
    );

    tracing::info!(
        download_mbps = measurement.download_mbps,
        upload_mbps = measurement.upload_mbps,
        upload_estimated = measurement.upload_source.is_estimated(),
        latency_ms = measurement.latency_ms,
        jitter_ms = measurement.jitter_ms,
        score = ?measurement.quality_score,
        call_ready = measurement.call_ready,
        "speed_test_finished"
    );
    measurement
}
