//! Bounded microphone activity history

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Samples kept by the activity buffer
pub const MIC_BUFFER_CAPACITY: usize = 100;

/// Volume below which a sample counts as silence (percent)
pub const SILENCE_THRESHOLD_PERCENT: f64 = 1.0;

/// A single microphone level reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicSample {
    /// Unix epoch milliseconds
    pub timestamp_ms: i64,
    /// 0-100
    pub volume_percent: f64,
}

impl MicSample {
    /// Build a sample from a 0-1 RMS level
    pub fn from_level(timestamp_ms: i64, rms: f32) -> Self {
        Self {
            timestamp_ms,
            volume_percent: (rms as f64 * 100.0).clamp(0.0, 100.0),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.volume_percent < SILENCE_THRESHOLD_PERCENT
    }
}

/// Ring buffer of the most recent samples, oldest evicted first
#[derive(Debug, Clone)]
pub struct MicBuffer {
    samples: VecDeque<MicSample>,
    capacity: usize,
}

impl Default for MicBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MicBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MIC_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    ///
    /// Timestamps never go backwards: a sample older than the newest held
    /// one is stamped with the newest timestamp.
    pub fn push(&mut self, mut sample: MicSample) {
        if self.capacity == 0 {
            return;
        }
        if let Some(last) = self.samples.back() {
            sample.timestamp_ms = sample.timestamp_ms.max(last.timestamp_ms);
        }
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&MicSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MicSample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Aggregate the current contents
    pub fn stats(&self) -> MicStats {
        MicStats::from_samples(self.samples.iter().copied().collect())
    }
}

/// Average and peak over a sample set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicStats {
    pub average_volume: f64,
    pub peak_volume: f64,
    #[serde(default)]
    pub samples: Vec<MicSample>,
}

impl MicStats {
    pub fn from_samples(samples: Vec<MicSample>) -> Self {
        let (average_volume, peak_volume) = if samples.is_empty() {
            (0.0, 0.0)
        } else {
            let sum: f64 = samples.iter().map(|s| s.volume_percent).sum();
            let peak = samples
                .iter()
                .map(|s| s.volume_percent)
                .fold(0.0f64, f64::max);
            (sum / samples.len() as f64, peak)
        };
        Self {
            average_volume,
            peak_volume,
            samples,
        }
    }

    /// Whether any sample rose above the silence threshold
    pub fn has_activity(&self) -> bool {
        self.samples.iter().any(|s| !s.is_silent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(ts: i64, volume: f64) -> MicSample {
        MicSample {
            timestamp_ms: ts,
            volume_percent: volume,
        }
    }

    #[test]
    fn test_buffer_keeps_most_recent_100() {
        let mut buffer = MicBuffer::new();
        for i in 0..150 {
            buffer.push(sample(i, (i % 100) as f64));
        }
        assert_eq!(buffer.len(), 100);
        let timestamps: Vec<i64> = buffer.iter().map(|s| s.timestamp_ms).collect();
        let expected: Vec<i64> = (50..150).collect();
        assert_eq!(timestamps, expected);
    }

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let mut buffer = MicBuffer::with_capacity(3);
        for i in 0..10 {
            buffer.push(sample(i, 1.0));
            assert!(buffer.len() <= 3);
        }
        assert_eq!(buffer.latest().map(|s| s.timestamp_ms), Some(9));
    }

    #[test]
    fn test_timestamps_monotonic() {
        let mut buffer = MicBuffer::new();
        buffer.push(sample(100, 1.0));
        buffer.push(sample(90, 2.0));
        assert_eq!(buffer.latest().map(|s| s.timestamp_ms), Some(100));
    }

    #[test]
    fn test_stats_average_and_peak() {
        let stats = MicStats::from_samples(vec![sample(1, 10.0), sample(2, 30.0), sample(3, 20.0)]);
        assert_relative_eq!(stats.average_volume, 20.0);
        assert_relative_eq!(stats.peak_volume, 30.0);
        assert!(stats.has_activity());
    }

    #[test]
    fn test_stats_empty() {
        let stats = MicBuffer::new().stats();
        assert_eq!(stats.average_volume, 0.0);
        assert_eq!(stats.peak_volume, 0.0);
        assert!(!stats.has_activity());
    }

    #[test]
    fn test_from_level_clamps() {
        assert_relative_eq!(MicSample::from_level(0, 0.25).volume_percent, 25.0);
        assert_relative_eq!(MicSample::from_level(0, 1.7).volume_percent, 100.0);
        assert!(MicSample::from_level(0, 0.005).is_silent());
    }
}
