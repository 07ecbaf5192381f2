//! Media capture module
//!
//! - Bounded microphone activity history ([`buffer`])
//! - Level metering over a lock-free PCM ring ([`meter`])
//! - Cancellable periodic sampler ([`sampler`])
//! - Remembered permission state ([`permissions`])
//! - cpal capture devices ([`device`], feature `device-capture`)

pub mod buffer;
pub mod meter;
pub mod permissions;
pub mod sampler;

#[cfg(feature = "device-capture")]
pub mod device;

pub use buffer::{MicBuffer, MicSample, MicStats, MIC_BUFFER_CAPACITY};
pub use meter::{ring_meter, AudioSource, LevelMeter, RingMeter};
pub use permissions::{FilePermissionStore, MemoryPermissionStore, PermissionState, PermissionStore};
pub use sampler::{measure_mic, start_sampling, SamplingHandle, DEFAULT_SAMPLE_PERIOD};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures opening or running a capture device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaAccessError {
    #[error("Permission to use the capture device was denied")]
    PermissionDenied,

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("No input device found")]
    NoInputDevice,

    #[error("Capture stream error: {0}")]
    Stream(String),
}

/// Capture devices selected for the media test
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDevices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microphone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    /// Every input device seen
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
}

/// Outcome of a media test; each part is present only if it was gathered
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<MediaDevices>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mic_stats: Option<MicStats>,
}

impl MediaSummary {
    pub fn is_empty(&self) -> bool {
        self.devices.is_none() && self.permissions.is_none() && self.mic_stats.is_none()
    }

    /// Short status for the quick-test summary
    pub fn status(&self) -> &'static str {
        match (&self.permissions, &self.mic_stats) {
            (Some(PermissionState::Denied), _) => "Permission denied",
            (_, Some(stats)) if stats.has_activity() => "Working",
            (_, Some(_)) => "No audio detected",
            (Some(PermissionState::Granted), None) => "Granted",
            _ => "Not tested",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_summary_status() {
        assert_eq!(MediaSummary::default().status(), "Not tested");

        let denied = MediaSummary {
            permissions: Some(PermissionState::Denied),
            ..Default::default()
        };
        assert_eq!(denied.status(), "Permission denied");

        let active = MediaSummary {
            mic_stats: Some(MicStats::from_samples(vec![MicSample {
                timestamp_ms: 1,
                volume_percent: 12.0,
            }])),
            ..Default::default()
        };
        assert_eq!(active.status(), "Working");

        let quiet = MediaSummary {
            mic_stats: Some(MicStats::from_samples(vec![])),
            ..Default::default()
        };
        assert_eq!(quiet.status(), "No audio detected");
    }

    #[test]
    fn test_media_summary_omits_absent_parts() {
        let summary = MediaSummary {
            permissions: Some(PermissionState::Granted),
            ..Default::default()
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert_eq!(json, r#"{"permissions":"granted"}"#);
    }
}
