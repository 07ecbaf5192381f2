//! Statistics over a series of latency measurements

use serde::{Deserialize, Serialize};

/// Summary statistics of a latency series (all values in ms)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySeries {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Mean absolute deviation from the mean, reported as jitter
    pub jitter: f64,
    /// Sample standard deviation (n - 1)
    pub std_dev: f64,
}

impl LatencySeries {
    /// Compute statistics; returns `None` for an empty series
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let jitter = values.iter().map(|v| (v - mean).abs()).sum::<f64>() / n;
        let std_dev = if values.len() > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };

        Some(Self {
            count: values.len(),
            min,
            max,
            mean,
            jitter,
            std_dev,
        })
    }
}
