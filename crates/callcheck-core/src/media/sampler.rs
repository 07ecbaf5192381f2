//! Periodic microphone activity sampler
//!
//! A tokio task ticks on a fixed period, asks the level meter for the audio
//! received since the last tick and appends one [`MicSample`] to the shared
//! [`MicBuffer`]. Ticks with no new audio append nothing. Stopping the
//! sampler always closes the meter, which releases the capture device.

use super::buffer::{MicBuffer, MicSample, MicStats};
use super::meter::{AudioSource, LevelMeter};
use super::permissions::{PermissionState, PermissionStore};
use super::{MediaAccessError, MediaDevices, MediaSummary};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default tick period (roughly 60 samples per second)
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(16);

/// Shared handle on the activity buffer
pub type SharedMicBuffer = Arc<Mutex<MicBuffer>>;

/// Running sampler; dropping it stops sampling
#[derive(Debug)]
pub struct SamplingHandle {
    buffer: SharedMicBuffer,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    device_label: String,
}

impl SamplingHandle {
    pub fn buffer(&self) -> SharedMicBuffer {
        Arc::clone(&self.buffer)
    }

    pub fn device_label(&self) -> &str {
        &self.device_label
    }

    /// Aggregate of the buffer as it is right now
    pub fn stats(&self) -> MicStats {
        snapshot(&self.buffer)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop sampling, wait for the task to release the device and return the
    /// final statistics
    pub async fn stop(mut self) -> MicStats {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "mic_sampler_join_failed");
            }
        }
        snapshot(&self.buffer)
    }
}

impl Drop for SamplingHandle {
    fn drop(&mut self) {
        // The task notices and closes the meter on its next poll
        let _ = self.stop_tx.send(true);
    }
}

fn snapshot(buffer: &SharedMicBuffer) -> MicStats {
    buffer
        .lock()
        .map(|b| b.stats())
        .unwrap_or_else(|poisoned| poisoned.into_inner().stats())
}

/// Open `source` and start sampling it every `period`
///
/// Device access failures are returned before any sample is taken; nothing
/// is written to the buffer in that case. Must be called inside a tokio
/// runtime.
pub fn start_sampling<S: AudioSource>(
    source: &mut S,
    period: Duration,
) -> Result<SamplingHandle, MediaAccessError> {
    start_sampling_into(source, period, Arc::new(Mutex::new(MicBuffer::new())))
}

/// Like [`start_sampling`], appending to an existing buffer
pub fn start_sampling_into<S: AudioSource>(
    source: &mut S,
    period: Duration,
    buffer: SharedMicBuffer,
) -> Result<SamplingHandle, MediaAccessError> {
    let device_label = source.label();
    let meter = source.open()?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(sample_loop(meter, period, Arc::clone(&buffer), stop_rx));
    tracing::info!(device = %device_label, period_ms = period.as_millis() as u64, "mic_sampling_started");

    Ok(SamplingHandle {
        buffer,
        stop_tx,
        task: Some(task),
        device_label,
    })
}

/// Start sampling and remember whether access was granted
pub fn start_sampling_with_store<S: AudioSource>(
    source: &mut S,
    period: Duration,
    store: &dyn PermissionStore,
) -> Result<SamplingHandle, MediaAccessError> {
    let result = start_sampling(source, period);
    let state = match &result {
        Ok(_) => Some(PermissionState::Granted),
        Err(MediaAccessError::PermissionDenied) => Some(PermissionState::Denied),
        Err(_) => None,
    };
    if let Some(state) = state {
        if let Err(e) = store.save(state) {
            tracing::warn!(error = %e, "permission_state_save_failed");
        }
    }
    result
}

/// Sample `source` for `duration` and summarise what was heard
///
/// Access failures are returned as-is so the caller can record the media
/// test as failed.
pub async fn measure_mic<S: AudioSource>(
    source: &mut S,
    period: Duration,
    duration: Duration,
    store: &dyn PermissionStore,
) -> Result<MediaSummary, MediaAccessError> {
    let handle = start_sampling_with_store(source, period, store)?;
    let microphone = handle.device_label().to_string();
    tokio::time::sleep(duration).await;
    let stats = handle.stop().await;

    tracing::info!(
        device = %microphone,
        samples = stats.samples.len(),
        average = stats.average_volume,
        peak = stats.peak_volume,
        "mic_measured"
    );
    Ok(MediaSummary {
        devices: Some(MediaDevices {
            microphone: Some(microphone),
            ..MediaDevices::default()
        }),
        permissions: Some(PermissionState::Granted),
        mic_stats: Some(stats),
    })
}

async fn sample_loop<M: LevelMeter>(
    mut meter: M,
    period: Duration,
    buffer: SharedMicBuffer,
    mut stop_rx: watch::Receiver<bool>,
) {
    let started = Instant::now();
    let started_epoch_ms = chrono::Utc::now().timestamp_millis();
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                // Either an explicit stop or the handle went away
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let Some(level) = meter.level() else {
                    continue;
                };
                let timestamp_ms = started_epoch_ms + started.elapsed().as_millis() as i64;
                let sample = MicSample::from_level(timestamp_ms, level);
                match buffer.lock() {
                    Ok(mut b) => b.push(sample),
                    Err(poisoned) => poisoned.into_inner().push(sample),
                }
            }
        }
    }

    meter.close();
    tracing::info!("mic_sampling_stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::meter::ring_meter;
    use crate::media::permissions::MemoryPermissionStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Meter returning a fixed level every tick
    struct ConstantMeter {
        level: f32,
        closed: Arc<AtomicBool>,
    }

    impl LevelMeter for ConstantMeter {
        fn level(&mut self) -> Option<f32> {
            Some(self.level)
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct ConstantSource {
        level: f32,
        closed: Arc<AtomicBool>,
    }

    impl AudioSource for ConstantSource {
        type Meter = ConstantMeter;

        fn label(&self) -> String {
            "constant".into()
        }

        fn open(&mut self) -> Result<ConstantMeter, MediaAccessError> {
            Ok(ConstantMeter {
                level: self.level,
                closed: Arc::clone(&self.closed),
            })
        }
    }

    struct DeniedSource;

    impl AudioSource for DeniedSource {
        type Meter = ConstantMeter;

        fn label(&self) -> String {
            "denied".into()
        }

        fn open(&mut self) -> Result<ConstantMeter, MediaAccessError> {
            Err(MediaAccessError::PermissionDenied)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampling_fills_buffer_and_stops() {
        let closed = Arc::new(AtomicBool::new(false));
        let mut source = ConstantSource {
            level: 0.4,
            closed: Arc::clone(&closed),
        };
        let handle = start_sampling(&mut source, Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(2_000)).await;

        let stats = handle.stop().await;
        assert_eq!(stats.samples.len(), 100);
        assert!((stats.average_volume - 40.0).abs() < 1e-3);
        assert!(closed.load(Ordering::SeqCst));

        let timestamps: Vec<i64> = stats.samples.iter().map(|s| s.timestamp_ms).collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_audio_no_samples() {
        struct SilentSource;
        impl AudioSource for SilentSource {
            type Meter = crate::media::meter::RingMeter;
            fn label(&self) -> String {
                "ring".into()
            }
            fn open(&mut self) -> Result<Self::Meter, MediaAccessError> {
                let (_producer, meter) = ring_meter(16);
                Ok(meter)
            }
        }

        let handle = start_sampling(&mut SilentSource, Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let stats = handle.stop().await;
        assert!(stats.samples.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_appends_after_stop() {
        let mut source = ConstantSource {
            level: 0.1,
            closed: Arc::new(AtomicBool::new(false)),
        };
        let handle = start_sampling(&mut source, Duration::from_millis(10)).unwrap();
        let buffer = handle.buffer();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stats = handle.stop().await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(buffer.lock().unwrap().len(), stats.samples.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_releases_device() {
        let closed = Arc::new(AtomicBool::new(false));
        let mut source = ConstantSource {
            level: 0.1,
            closed: Arc::clone(&closed),
        };
        let handle = start_sampling(&mut source, Duration::from_millis(10)).unwrap();
        drop(handle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_access_failure_reaches_caller_and_store() {
        let store = MemoryPermissionStore::new();
        let result =
            start_sampling_with_store(&mut DeniedSource, DEFAULT_SAMPLE_PERIOD, &store);
        assert!(matches!(result, Err(MediaAccessError::PermissionDenied)));
        assert_eq!(store.load(), PermissionState::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_mic_summary() {
        let store = MemoryPermissionStore::new();
        let closed = Arc::new(AtomicBool::new(false));
        let mut source = ConstantSource {
            level: 0.25,
            closed: Arc::clone(&closed),
        };
        let summary = measure_mic(
            &mut source,
            Duration::from_millis(10),
            Duration::from_millis(500),
            &store,
        )
        .await
        .unwrap();

        let stats = summary.mic_stats.as_ref().unwrap();
        assert!(!stats.samples.is_empty());
        assert!((stats.peak_volume - 25.0).abs() < 1e-3);
        assert_eq!(summary.permissions, Some(PermissionState::Granted));
        assert_eq!(
            summary.devices.as_ref().unwrap().microphone.as_deref(),
            Some("constant")
        );
        assert_eq!(summary.status(), "Working");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_measure_mic_denied() {
        let store = MemoryPermissionStore::new();
        let result = measure_mic(
            &mut DeniedSource,
            DEFAULT_SAMPLE_PERIOD,
            Duration::from_millis(10),
            &store,
        )
        .await;
        assert!(matches!(result, Err(MediaAccessError::PermissionDenied)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_granted_access_is_remembered() {
        let store = MemoryPermissionStore::new();
        let mut source = ConstantSource {
            level: 0.2,
            closed: Arc::new(AtomicBool::new(false)),
        };
        let handle =
            start_sampling_with_store(&mut source, DEFAULT_SAMPLE_PERIOD, &store).unwrap();
        assert_eq!(store.load(), PermissionState::Granted);
        handle.stop().await;
    }
}
