//! Call-quality grading tables
//!
//! Both the quality score and the call-readiness tier are driven by static
//! threshold tables. Tuning a threshold means editing a table row; the
//! evaluation code never changes.

use serde::{Deserialize, Serialize};

/// Metric graded by the quality table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Download,
    Upload,
    Latency,
    Jitter,
    PacketLoss,
}

/// Which side of a band limit is the good side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Band matches when value >= limit
    HigherIsBetter,
    /// Band matches when value <= limit
    LowerIsBetter,
}

/// One row of a metric's band list
#[derive(Debug, Clone, Copy)]
struct Band {
    limit: f64,
    deduction: u8,
    message: Option<&'static str>,
}

const fn band(limit: f64, deduction: u8, message: Option<&'static str>) -> Band {
    Band {
        limit,
        deduction,
        message,
    }
}

#[derive(Debug)]
struct MetricRule {
    metric: Metric,
    direction: Direction,
    bands: &'static [Band],
    /// Applies when no band matches
    otherwise: Band,
}

/// Evaluated in declaration order; recommendations follow this order
const QUALITY_RULES: &[MetricRule] = &[
    MetricRule {
        metric: Metric::Download,
        direction: Direction::HigherIsBetter,
        bands: &[
            band(50.0, 0, None),
            band(25.0, 10, Some("Download speed is good but could be better for 4K video calls")),
            band(10.0, 20, Some("Download speed may limit video call quality")),
            band(5.0, 30, Some("Download speed is too low for HD video calls")),
        ],
        otherwise: band(0.0, 40, Some("Download speed is insufficient for video calls")),
    },
    MetricRule {
        metric: Metric::Upload,
        direction: Direction::HigherIsBetter,
        bands: &[
            band(25.0, 0, None),
            band(10.0, 8, Some("Upload speed is adequate but could be improved")),
            band(5.0, 15, Some("Upload speed may cause video quality issues")),
            band(2.0, 25, Some("Upload speed is too low for good video calls")),
        ],
        otherwise: band(0.0, 30, Some("Upload speed is insufficient for video calls")),
    },
    MetricRule {
        metric: Metric::Latency,
        direction: Direction::LowerIsBetter,
        bands: &[
            band(50.0, 0, None),
            band(100.0, 5, Some("Latency is acceptable but could be lower")),
            band(200.0, 10, Some("High latency may cause delays in video calls")),
        ],
        otherwise: band(
            0.0,
            20,
            Some("Very high latency will significantly impact video call quality"),
        ),
    },
    MetricRule {
        metric: Metric::Jitter,
        direction: Direction::LowerIsBetter,
        bands: &[
            band(10.0, 0, None),
            band(20.0, 2, Some("Some jitter detected, may cause minor video issues")),
            band(50.0, 5, Some("High jitter will cause video quality problems")),
        ],
        otherwise: band(0.0, 10, Some("Very high jitter will severely impact video calls")),
    },
    MetricRule {
        metric: Metric::PacketLoss,
        direction: Direction::LowerIsBetter,
        bands: &[
            band(1.0, 0, None),
            band(3.0, 2, Some("Minor packet loss detected")),
            band(5.0, 5, Some("Moderate packet loss will affect video quality")),
        ],
        otherwise: band(0.0, 10, Some("High packet loss will severely impact video calls")),
    },
];

impl MetricRule {
    fn evaluate(&self, value: f64) -> &Band {
        self.bands
            .iter()
            .find(|b| match self.direction {
                Direction::HigherIsBetter => value >= b.limit,
                Direction::LowerIsBetter => value <= b.limit,
            })
            .unwrap_or(&self.otherwise)
    }
}

/// Letter grade for a quality score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

/// Minimum score per grade, best first
const GRADE_TABLE: &[(u8, Grade)] = &[(90, Grade::A), (80, Grade::B), (70, Grade::C), (60, Grade::D)];

impl Grade {
    pub fn from_score(score: u8) -> Self {
        GRADE_TABLE
            .iter()
            .find(|(min, _)| score >= *min)
            .map(|(_, grade)| *grade)
            .unwrap_or(Grade::F)
    }

    pub fn letter(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// Inputs to the quality table
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QualityInputs {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub latency_ms: f64,
    pub jitter_ms: f64,
    pub packet_loss_percent: f64,
}

impl QualityInputs {
    fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Download => self.download_mbps,
            Metric::Upload => self.upload_mbps,
            Metric::Latency => self.latency_ms,
            Metric::Jitter => self.jitter_ms,
            Metric::PacketLoss => self.packet_loss_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityAssessment {
    /// 0-100
    pub score: u8,
    pub grade: Grade,
    pub recommendations: Vec<String>,
}

/// Score a connection: 100 minus the matching band deduction of every metric
pub fn assess_quality(inputs: &QualityInputs) -> QualityAssessment {
    let mut score: u8 = 100;
    let mut recommendations = Vec::new();

    for rule in QUALITY_RULES {
        let band = rule.evaluate(inputs.value(rule.metric));
        score = score.saturating_sub(band.deduction);
        if let Some(message) = band.message {
            recommendations.push(message.to_string());
        }
    }

    QualityAssessment {
        score,
        grade: Grade::from_score(score),
        recommendations,
    }
}

/// Call-readiness tier, ordered worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Readiness {
    NotReady,
    Limited,
    Ready,
    Excellent,
}

struct ReadinessTier {
    readiness: Readiness,
    min_download_mbps: f64,
    min_upload_mbps: f64,
    max_latency_ms: f64,
}

/// Best tier first; every bound is strict
const READINESS_TIERS: &[ReadinessTier] = &[
    ReadinessTier {
        readiness: Readiness::Excellent,
        min_download_mbps: 25.0,
        min_upload_mbps: 10.0,
        max_latency_ms: 50.0,
    },
    ReadinessTier {
        readiness: Readiness::Ready,
        min_download_mbps: 10.0,
        min_upload_mbps: 5.0,
        max_latency_ms: 100.0,
    },
    ReadinessTier {
        readiness: Readiness::Limited,
        min_download_mbps: 5.0,
        min_upload_mbps: 2.0,
        max_latency_ms: 200.0,
    },
];

impl Readiness {
    pub fn classify(download_mbps: f64, upload_mbps: f64, latency_ms: f64) -> Self {
        READINESS_TIERS
            .iter()
            .find(|t| {
                download_mbps > t.min_download_mbps
                    && upload_mbps > t.min_upload_mbps
                    && latency_ms < t.max_latency_ms
            })
            .map(|t| t.readiness)
            .unwrap_or(Readiness::NotReady)
    }

    pub fn is_call_ready(&self) -> bool {
        *self >= Readiness::Ready
    }

    pub fn label(&self) -> &'static str {
        match self {
            Readiness::Excellent => "Ready for HD group video calls",
            Readiness::Ready => "Ready for HD video calls",
            Readiness::Limited => "Suitable for standard-definition calls",
            Readiness::NotReady => "Not ready for video calls",
        }
    }
}

/// Combined bandwidth score (0-100): download against 100 Mbps and upload
/// against 50 Mbps, each capped, then averaged
pub fn bandwidth_score(download_mbps: f64, upload_mbps: f64) -> f64 {
    let download = (download_mbps / 100.0 * 100.0).min(100.0);
    let upload = (upload_mbps / 50.0 * 100.0).min(100.0);
    ((download + upload) / 2.0).round()
}
