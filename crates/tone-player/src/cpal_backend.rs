//! CPAL output backend.
//!
//! CPAL pulls audio through a real-time callback rather than accepting queued buffers, so
//! each submitted buffer is copied into a mutex-guarded FIFO that the callback drains. When
//! the callback writes the last sample of a buffer it marks that buffer's completion flag.
//! Gaps are filled with silence and counted as underruns once the first buffer arrived.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::backend::{AudioBackend, BackendError, CompletionHandle, OutputDevice};
use crate::config::{DeviceSelector, SampleEncoding, StreamFormat};
use crate::tone::{SampleBuffer, ToneSample};

/// Opens devices on the platform's default CPAL host.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    /// Output device names in host order; the position is the `--device` index.
    pub fn output_device_names(&self) -> Result<Vec<String>, BackendError> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| BackendError::Stream(e.to_string()))?;
        Ok(devices.map(|d| device_name(&d)).collect())
    }
}

fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.to_string())
        .unwrap_or_else(|_| "<unnamed>".to_string())
}

fn pick_device(host: &cpal::Host, selector: DeviceSelector) -> Result<cpal::Device, BackendError> {
    match selector {
        DeviceSelector::Default => host
            .default_output_device()
            .ok_or(BackendError::DeviceNotFound(selector)),
        DeviceSelector::Index(i) => nth_device(host.output_devices(), i),
    }
}

/// Enumeration failures surface as stream errors, not as a missing device.
fn nth_device<D, E: std::fmt::Display>(
    devices: Result<impl Iterator<Item = D>, E>,
    index: usize,
) -> Result<D, BackendError> {
    devices
        .map_err(|e| BackendError::Stream(e.to_string()))?
        .nth(index)
        .ok_or(BackendError::DeviceNotFound(DeviceSelector::Index(index)))
}

/// Latches the first stream error CPAL reports so the next submission fails.
#[derive(Clone, Debug, Default)]
struct StreamFailure {
    reason: Arc<Mutex<Option<String>>>,
}

impl StreamFailure {
    fn record(&self, reason: String) {
        if let Ok(mut r) = self.reason.lock() {
            r.get_or_insert(reason);
        }
    }

    fn check(&self) -> Result<(), BackendError> {
        match self.reason.lock().ok().and_then(|r| r.clone()) {
            Some(reason) => Err(BackendError::Stream(reason)),
            None => Ok(()),
        }
    }
}

/// A buffer must hold at least one frame and only whole frames.
fn check_whole_frames(slot: usize, samples: usize, channels: u16) -> Result<(), BackendError> {
    if samples == 0 || channels == 0 || samples % channels as usize != 0 {
        return Err(BackendError::Rejected {
            slot,
            reason: format!("{samples} samples is not a whole number of {channels}-channel frames"),
        });
    }
    Ok(())
}

/// Whether a supported config range covers `format` exactly.
fn range_accepts(
    sample_format: cpal::SampleFormat,
    channels: u16,
    min_rate: u32,
    max_rate: u32,
    format: &StreamFormat,
) -> bool {
    sample_format == format.encoding.as_cpal()
        && channels == format.channels
        && (min_rate..=max_rate).contains(&format.sample_rate)
}

impl AudioBackend for CpalBackend {
    type Device = CpalDevice;

    fn open(&self, selector: DeviceSelector, format: StreamFormat) -> Result<CpalDevice, BackendError> {
        let rejected = |reason: String| BackendError::FormatRejected { format, reason };

        let host = cpal::default_host();
        let device = pick_device(&host, selector)?;
        let name = device_name(&device);

        let supported = device
            .supported_output_configs()
            .map_err(|e| rejected(e.to_string()))?
            .any(|r| {
                range_accepts(
                    r.sample_format(),
                    r.channels(),
                    r.min_sample_rate(),
                    r.max_sample_rate(),
                    &format,
                )
            });
        if !supported {
            return Err(rejected(format!("{name} has no matching output config")));
        }

        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: format.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        let queue = Arc::new(Mutex::new(DeviceQueue::default()));
        let failure = StreamFailure::default();

        let stream = match format.encoding {
            SampleEncoding::I16 => build_stream::<i16>(&device, &config, &queue, &failure),
            SampleEncoding::I32 => build_stream::<i32>(&device, &config, &queue, &failure),
            SampleEncoding::F32 => build_stream::<f32>(&device, &config, &queue, &failure),
        }
        .map_err(|e| rejected(e.to_string()))?;
        stream.play().map_err(|e| rejected(e.to_string()))?;

        tracing::info!(device = %name, format = %format, "output stream started");
        Ok(CpalDevice {
            stream,
            format,
            queue,
            failure,
            prepared: BTreeSet::new(),
        })
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<Mutex<DeviceQueue>>,
    failure: &StreamFailure,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: ToneSample + cpal::SizedSample,
{
    let queue_cb = queue.clone();
    let failure_cb = failure.clone();
    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        failure_cb.record(err.to_string());
    };

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| match queue_cb.lock() {
            Ok(mut q) => q.play_into(data),
            Err(_) => data.fill(T::SILENCE),
        },
        err_fn,
        None,
    )
}

struct QueuedBuffer {
    samples: SampleBuffer,
    done: CompletionHandle,
}

/// FIFO shared with the CPAL callback.
#[derive(Default)]
struct DeviceQueue {
    pending: VecDeque<QueuedBuffer>,
    /// Read position (samples) in the front buffer.
    pos: usize,
    started: bool,
    underruns: u64,
}

impl DeviceQueue {
    fn push(&mut self, samples: SampleBuffer, done: CompletionHandle) {
        self.started = true;
        self.pending.push_back(QueuedBuffer { samples, done });
    }

    /// Copy queued samples into `out`, completing buffers as they run out.
    fn play_into<T: ToneSample>(&mut self, out: &mut [T]) {
        let mut written = 0;
        while written < out.len() {
            let Some(front) = self.pending.front() else {
                break;
            };
            let src = T::view(&front.samples).unwrap_or(&[]);
            let n = src.len().saturating_sub(self.pos).min(out.len() - written);
            out[written..written + n].copy_from_slice(&src[self.pos..self.pos + n]);
            written += n;
            self.pos += n;
            if self.pos >= src.len() {
                if let Some(finished) = self.pending.pop_front() {
                    finished.done.complete();
                }
                self.pos = 0;
            }
        }
        if written < out.len() {
            out[written..].fill(T::SILENCE);
            if self.started {
                self.underruns += 1;
            }
        }
    }

    /// Drop everything queued, marking each buffer complete.
    fn flush(&mut self) -> usize {
        let flushed = self.pending.len();
        for queued in self.pending.drain(..) {
            queued.done.complete();
        }
        self.pos = 0;
        flushed
    }
}

/// An open CPAL output stream fed from the pool's buffers.
pub struct CpalDevice {
    stream: cpal::Stream,
    format: StreamFormat,
    queue: Arc<Mutex<DeviceQueue>>,
    failure: StreamFailure,
    prepared: BTreeSet<usize>,
}

impl CpalDevice {
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Callbacks that ran out of queued audio after playback started.
    pub fn underruns(&self) -> u64 {
        self.queue.lock().map(|q| q.underruns).unwrap_or(0)
    }

    fn check_encoding(&self, slot: usize, buffer: &SampleBuffer) -> Result<(), BackendError> {
        if buffer.encoding() != self.format.encoding {
            return Err(BackendError::EncodingMismatch {
                slot,
                expected: self.format.encoding,
                found: buffer.encoding(),
            });
        }
        Ok(())
    }
}

impl OutputDevice for CpalDevice {
    fn prepare(&mut self, slot: usize, buffer: &SampleBuffer) -> Result<(), BackendError> {
        self.check_encoding(slot, buffer)?;
        check_whole_frames(slot, buffer.len(), self.format.channels)?;
        self.prepared.insert(slot);
        Ok(())
    }

    fn submit(
        &mut self,
        slot: usize,
        buffer: &SampleBuffer,
        done: CompletionHandle,
    ) -> Result<(), BackendError> {
        self.failure.check()?;
        if !self.prepared.contains(&slot) {
            return Err(BackendError::NotPrepared { slot });
        }
        self.check_encoding(slot, buffer)?;
        let mut q = self.queue.lock().map_err(|_| BackendError::Rejected {
            slot,
            reason: "device queue poisoned".to_string(),
        })?;
        q.push(buffer.clone(), done);
        Ok(())
    }

    fn unprepare(&mut self, slot: usize) {
        self.prepared.remove(&slot);
    }

    fn reset(&mut self) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!("pause on reset failed: {e}");
        }
        if let Ok(mut q) = self.queue.lock() {
            let flushed = q.flush();
            tracing::debug!(flushed, "device queue reset");
        }
    }

    fn close(self) {
        tracing::info!(underruns = self.underruns(), "output stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CompletionFlags;

    fn queue_with(flags: &CompletionFlags, buffers: &[Vec<i16>]) -> DeviceQueue {
        let mut q = DeviceQueue::default();
        for (slot, samples) in buffers.iter().enumerate() {
            q.push(SampleBuffer::I16(samples.clone()), flags.handle(slot));
        }
        q
    }

    #[test]
    fn callback_drains_buffers_across_calls_and_completes_them() {
        let flags = CompletionFlags::new(2);
        let mut q = queue_with(&flags, &[vec![1, 2, 3], vec![4, 5, 6]]);

        let mut out = [0i16; 4];
        q.play_into(&mut out);
        assert_eq!(out, [1, 2, 3, 4]);
        assert!(flags.is_done(0));
        assert!(!flags.is_done(1));

        q.play_into(&mut out);
        assert_eq!(out, [5, 6, 0, 0]);
        assert!(flags.is_done(1));
        assert_eq!(q.underruns, 1);
    }

    #[test]
    fn silence_before_first_buffer_is_not_an_underrun() {
        let mut q = DeviceQueue::default();
        let mut out = [1.0f32; 8];
        q.play_into(&mut out);
        assert_eq!(out, [0.0; 8]);
        assert_eq!(q.underruns, 0);
    }

    #[test]
    fn mismatched_buffer_is_skipped_and_completed() {
        let flags = CompletionFlags::new(2);
        let mut q = DeviceQueue::default();
        q.push(SampleBuffer::F32(vec![0.5; 4]), flags.handle(0));
        q.push(SampleBuffer::I16(vec![7; 2]), flags.handle(1));
        let mut out = [0i16; 2];
        q.play_into(&mut out);
        assert_eq!(out, [7, 7]);
        assert!(flags.is_done(0));
        assert!(flags.is_done(1));
    }

    #[test]
    fn flush_completes_everything_pending() {
        let flags = CompletionFlags::new(3);
        let mut q = queue_with(&flags, &[vec![1; 4], vec![2; 4], vec![3; 4]]);
        let mut out = [0i16; 2];
        q.play_into(&mut out);
        assert_eq!(q.flush(), 3);
        assert!((0..3).all(|slot| flags.is_done(slot)));
        assert_eq!(q.pos, 0);
    }

    #[test]
    fn recorded_stream_error_fails_later_checks() {
        let failure = StreamFailure::default();
        assert_eq!(failure.check(), Ok(()));

        let from_callback = failure.clone();
        std::thread::spawn(move || from_callback.record("device unplugged".to_string()))
            .join()
            .unwrap();
        failure.record("second error".to_string());

        assert_eq!(
            failure.check(),
            Err(BackendError::Stream("device unplugged".to_string()))
        );
        assert!(failure.check().is_err());
    }

    #[test]
    fn device_index_lookup_keeps_enumeration_errors() {
        let names = ["speakers", "headphones"];
        assert_eq!(nth_device(Ok::<_, String>(names.into_iter()), 1), Ok("headphones"));
        assert_eq!(
            nth_device(Ok::<_, String>(names.into_iter()), 2),
            Err(BackendError::DeviceNotFound(DeviceSelector::Index(2)))
        );
        assert_eq!(
            nth_device(Err::<std::iter::Empty<&str>, _>("backend went away"), 0),
            Err(BackendError::Stream("backend went away".to_string()))
        );
    }

    #[test]
    fn buffers_must_hold_whole_frames() {
        assert_eq!(check_whole_frames(0, 2048, 2), Ok(()));
        assert_eq!(check_whole_frames(0, 1024, 1), Ok(()));
        assert!(matches!(
            check_whole_frames(3, 1023, 2),
            Err(BackendError::Rejected { slot: 3, .. })
        ));
        assert!(check_whole_frames(1, 0, 1).is_err());
    }

    #[test]
    fn range_must_match_format_exactly() {
        let format = StreamFormat {
            encoding: SampleEncoding::F32,
            channels: 2,
            sample_rate: 48_000,
        };
        assert!(range_accepts(cpal::SampleFormat::F32, 2, 44_100, 96_000, &format));
        assert!(!range_accepts(cpal::SampleFormat::I16, 2, 44_100, 96_000, &format));
        assert!(!range_accepts(cpal::SampleFormat::F32, 1, 44_100, 96_000, &format));
        assert!(!range_accepts(cpal::SampleFormat::F32, 2, 8_000, 44_100, &format));
    }
}
