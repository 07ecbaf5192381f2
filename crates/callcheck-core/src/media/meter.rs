//! Audio level metering
//!
//! Capture callbacks push raw PCM into a lock-free `ringbuf` producer; the
//! sampler drains the consumer side on every tick and turns whatever arrived
//! into one RMS level.

use super::MediaAccessError;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Default PCM ring size (about one second at 48 kHz mono)
pub const DEFAULT_PCM_RING_SIZE: usize = 48_000;

/// Live analysis of an open audio stream
pub trait LevelMeter: Send + 'static {
    /// RMS (0-1) of audio received since the previous call, or `None` when
    /// nothing new arrived
    fn level(&mut self) -> Option<f32>;

    /// Release the underlying capture resources. Idempotent.
    fn close(&mut self);
}

/// Something that can be opened into a [`LevelMeter`]
pub trait AudioSource {
    type Meter: LevelMeter;

    /// Human-readable device label
    fn label(&self) -> String;

    fn open(&mut self) -> Result<Self::Meter, MediaAccessError>;
}

/// Root mean square of a PCM block
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// PCM sample format a capture device may deliver
pub trait PcmSample: Copy + Send + 'static {
    /// The sample scaled to -1..1
    fn to_unit(self) -> f32;
}

impl PcmSample for f32 {
    fn to_unit(self) -> f32 {
        self
    }
}

impl PcmSample for i16 {
    fn to_unit(self) -> f32 {
        self as f32 / 32_768.0
    }
}

impl PcmSample for u16 {
    fn to_unit(self) -> f32 {
        (self as f32 - 32_768.0) / 32_768.0
    }
}

/// Push the first channel of an interleaved block into the ring
///
/// Returns how many samples fit; a full ring drops the newest audio.
pub fn push_first_channel<S: PcmSample>(
    producer: &mut HeapProd<f32>,
    data: &[S],
    channels: usize,
) -> usize {
    data.chunks(channels.max(1))
        .filter_map(|frame| frame.first())
        .map(|sample| producer.try_push(sample.to_unit()).is_ok())
        .filter(|pushed| *pushed)
        .count()
}

/// Level meter reading from the consumer half of a PCM ring
pub struct RingMeter {
    consumer: HeapCons<f32>,
    scratch: Vec<f32>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for RingMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingMeter")
            .field("open", &self.on_close.is_some())
            .finish()
    }
}

impl RingMeter {
    /// Run `on_close` when the meter is closed (stops the capture stream)
    pub fn with_close_hook(mut self, on_close: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(on_close));
        self
    }
}

/// Create a PCM ring of `capacity` samples
///
/// The producer goes to the capture callback, the meter to the sampler.
pub fn ring_meter(capacity: usize) -> (HeapProd<f32>, RingMeter) {
    let ring = HeapRb::<f32>::new(capacity.max(1));
    let (producer, consumer) = ring.split();
    let meter = RingMeter {
        consumer,
        scratch: vec![0.0; capacity.max(1)],
        on_close: None,
    };
    (producer, meter)
}

impl LevelMeter for RingMeter {
    fn level(&mut self) -> Option<f32> {
        let mut total = 0usize;
        let mut sum_squares = 0.0f32;
        loop {
            let read = self.consumer.pop_slice(&mut self.scratch);
            if read == 0 {
                break;
            }
            sum_squares += self.scratch[..read].iter().map(|s| s * s).sum::<f32>();
            total += read;
        }
        if total == 0 {
            return None;
        }
        Some((sum_squares / total as f32).sqrt())
    }

    fn close(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl Drop for RingMeter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert_relative_eq!(rms(&[0.5, -0.5, 0.5, -0.5]), 0.5);
        assert_relative_eq!(rms(&[1.0, 0.0]), (0.5f32).sqrt());
    }

    #[test]
    fn test_ring_meter_drains_everything() {
        let (mut producer, mut meter) = ring_meter(8);
        assert_eq!(meter.level(), None);

        producer.push_slice(&[0.5, -0.5, 0.5, -0.5]);
        assert_relative_eq!(meter.level().unwrap(), 0.5);
        // Already consumed
        assert_eq!(meter.level(), None);
    }

    #[test]
    fn test_ring_meter_larger_than_scratch() {
        let (mut producer, mut meter) = ring_meter(4);
        producer.push_slice(&[0.2, 0.2, 0.2, 0.2]);
        assert_relative_eq!(meter.level().unwrap(), 0.2);
    }

    #[test]
    fn test_integer_samples_scale_to_unit_range() {
        assert_relative_eq!(i16::MIN.to_unit(), -1.0);
        assert_relative_eq!(0i16.to_unit(), 0.0);
        assert_relative_eq!(16_384i16.to_unit(), 0.5);
        assert_relative_eq!(0u16.to_unit(), -1.0);
        assert_relative_eq!(32_768u16.to_unit(), 0.0);
        assert_relative_eq!(49_152u16.to_unit(), 0.5);
    }

    #[test]
    fn test_first_channel_of_integer_block_is_metered() {
        let (mut producer, mut meter) = ring_meter(8);
        // Stereo i16: left at half scale, right silent
        let block: [i16; 8] = [16_384, 0, -16_384, 0, 16_384, 0, -16_384, 0];
        assert_eq!(push_first_channel(&mut producer, &block, 2), 4);
        assert_relative_eq!(meter.level().unwrap(), 0.5);

        let block: [u16; 4] = [49_152, 16_384, 49_152, 16_384];
        assert_eq!(push_first_channel(&mut producer, &block, 1), 4);
        assert_relative_eq!(meter.level().unwrap(), 0.5);
    }

    #[test]
    fn test_first_channel_stops_at_full_ring() {
        let (mut producer, _meter) = ring_meter(2);
        assert_eq!(push_first_channel(&mut producer, &[0.1f32, 0.2, 0.3], 1), 2);
    }

    #[test]
    fn test_close_hook_runs_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        let (_producer, meter) = ring_meter(4);
        let mut meter = meter.with_close_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        meter.close();
        meter.close();
        drop(meter);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
