//! Capture devices through cpal
//!
//! A cpal `Stream` cannot leave the thread that built it, so each opened
//! source owns a dedicated capture thread. The thread builds the stream,
//! reports success or failure back, then parks until the meter is closed.

use super::meter::{
    push_first_channel, ring_meter, AudioSource, PcmSample, RingMeter, DEFAULT_PCM_RING_SIZE,
};
use super::{MediaAccessError, MediaDevices};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::HeapProd;
use std::sync::mpsc;

/// Names of the available input devices and the default one
pub fn list_devices() -> Result<MediaDevices, MediaAccessError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let inputs: Vec<String> = host
        .input_devices()
        .map_err(|e| MediaAccessError::DeviceUnavailable(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();

    tracing::debug!(count = inputs.len(), default = ?default_name, "input_devices_listed");

    Ok(MediaDevices {
        microphone: default_name.or_else(|| inputs.first().cloned()),
        camera: None,
        inputs,
    })
}

/// Microphone input opened through the default cpal host
#[derive(Debug, Clone, Default)]
pub struct CpalSource {
    /// Device to open; the host default when `None`
    pub device_name: Option<String>,
}

impl CpalSource {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn find_device(&self) -> Result<cpal::Device, MediaAccessError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_input_device()
                .ok_or(MediaAccessError::NoInputDevice),
            Some(name) => host
                .input_devices()
                .map_err(|e| MediaAccessError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| MediaAccessError::DeviceUnavailable(name.clone())),
        }
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> MediaAccessError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            MediaAccessError::DeviceUnavailable("device not available".to_string())
        }
        other => {
            let message = other.to_string();
            if message.to_lowercase().contains("permission") {
                MediaAccessError::PermissionDenied
            } else {
                MediaAccessError::Stream(message)
            }
        }
    }
}

/// Input stream feeding the first channel of each block into `producer`
fn build_capture_stream<S>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: HeapProd<f32>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    S: PcmSample + cpal::SizedSample,
{
    let channels = config.channels.max(1) as usize;
    device.build_input_stream(
        config,
        move |data: &[S], _: &cpal::InputCallbackInfo| {
            push_first_channel(&mut producer, data, channels);
        },
        move |err| {
            tracing::error!("Input stream error: {}", err);
        },
        None,
    )
}

impl AudioSource for CpalSource {
    type Meter = RingMeter;

    fn label(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| "default input".to_string())
    }

    fn open(&mut self) -> Result<RingMeter, MediaAccessError> {
        let device = self.find_device()?;
        let (producer, meter) = ring_meter(DEFAULT_PCM_RING_SIZE);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), MediaAccessError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let spawned = std::thread::Builder::new()
            .name("callcheck-capture".into())
            .spawn(move || {
                let config = match device.default_input_config() {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = ready_tx.send(Err(MediaAccessError::Stream(e.to_string())));
                        return;
                    }
                };
                let stream_config = config.config();
                let stream = match config.sample_format() {
                    cpal::SampleFormat::F32 => {
                        build_capture_stream::<f32>(&device, &stream_config, producer)
                    }
                    cpal::SampleFormat::I16 => {
                        build_capture_stream::<i16>(&device, &stream_config, producer)
                    }
                    cpal::SampleFormat::U16 => {
                        build_capture_stream::<u16>(&device, &stream_config, producer)
                    }
                    other => {
                        let _ = ready_tx.send(Err(MediaAccessError::Stream(format!(
                            "unsupported sample format {:?}",
                            other
                        ))));
                        return;
                    }
                };
                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(map_build_error(e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(MediaAccessError::Stream(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Blocks until the meter closes or is dropped
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("capture_stream_released");
            })
            .map_err(|e| MediaAccessError::Stream(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = spawned.join();
                return Err(e);
            }
            Err(_) => {
                return Err(MediaAccessError::Stream(
                    "capture thread exited before starting".to_string(),
                ))
            }
        }

        tracing::info!(device = %self.label(), "capture_stream_opened");
        Ok(meter.with_close_hook(move || {
            let _ = stop_tx.send(());
            let _ = spawned.join();
        }))
    }
}
