//! Buffer pool and play queue.
//!
//! A fixed arena of `buffer_count` sample buffers addressed by slot index, with a parallel
//! array of completion flags the device sets. Every buffer cycles through
//! fill -> submit -> (device completes) -> refill -> resubmit until the session stops, then
//! the pool resets the device and waits, bounded, for each queued buffer before releasing it.

use std::thread;
use std::time::Duration;

use crate::amplitude::{SampleDomain, to_linear_amplitude};
use crate::backend::{CompletionFlags, OutputDevice};
use crate::config::{PlaybackConfig, StreamFormat};
use crate::error::{EngineError, Stage};
use crate::events::{EventSink, SessionEvent};
use crate::session::RunState;
use crate::tone::{Oscillator, SampleBuffer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    /// Allocated, not registered with the device.
    Idle,
    /// Registered but not in the device queue.
    Prepared,
    /// Handed to the device queue; its completion flag is live.
    Submitted,
}

struct Slot {
    buffer: SampleBuffer,
    state: SlotState,
}

/// Result of [`BufferPool::drain_and_release`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub released: usize,
    /// Slots that never reported completion and were released anyway.
    pub timed_out: Vec<usize>,
}

pub struct BufferPool<D: OutputDevice> {
    device: D,
    format: StreamFormat,
    slots: Vec<Slot>,
    flags: CompletionFlags,
    osc: Oscillator,
    amplitude: f64,
    drain_attempts: u32,
    drain_interval: Duration,
    submitted: u64,
    refills: u64,
}

impl<D: OutputDevice> BufferPool<D> {
    /// Allocate, fill, prepare and submit every buffer in slot order.
    ///
    /// On failure the partially primed buffers are flushed, unprepared and freed and the
    /// device is closed before the error is returned.
    pub fn prime(
        device: D,
        format: StreamFormat,
        config: &PlaybackConfig,
        sink: &dyn EventSink,
    ) -> Result<Self, EngineError> {
        let mut pool = Self {
            device,
            format,
            slots: Vec::with_capacity(config.buffer_count),
            flags: CompletionFlags::new(config.buffer_count),
            osc: Oscillator::new(config.phase_increment()),
            amplitude: to_linear_amplitude(
                config.level_dbfs,
                SampleDomain::for_encoding(format.encoding),
            ),
            drain_attempts: config.drain_attempts,
            drain_interval: config.drain_interval,
            submitted: 0,
            refills: 0,
        };

        let samples = config
            .frames_per_buffer
            .checked_mul(format.channels as usize);
        for slot in 0..config.buffer_count {
            let primed = match samples {
                Some(samples) => pool.prime_slot(slot, samples),
                None => Err(EngineError::ResourceExhausted {
                    slot,
                    bytes: usize::MAX,
                }),
            };
            if let Err(err) = primed {
                let (device, _) = pool.drain_and_release(sink);
                device.close();
                return Err(err);
            }
        }

        sink.notify(&SessionEvent::Primed {
            buffers: pool.slots.len(),
            frames_per_buffer: config.frames_per_buffer,
        });
        Ok(pool)
    }

    fn prime_slot(&mut self, slot: usize, samples: usize) -> Result<(), EngineError> {
        let mut buffer = SampleBuffer::try_zeroed(self.format.encoding, samples).map_err(|_| {
            EngineError::ResourceExhausted {
                slot,
                bytes: samples.saturating_mul(self.format.encoding.bytes_per_sample()),
            }
        })?;
        buffer.fill(self.format.channels, &mut self.osc, self.amplitude);
        self.slots.push(Slot {
            buffer,
            state: SlotState::Idle,
        });

        let entry = &mut self.slots[slot];
        self.device
            .prepare(slot, &entry.buffer)
            .map_err(|source| EngineError::QueueSubmissionFailed {
                stage: Stage::Priming,
                slot,
                source,
            })?;
        entry.state = SlotState::Prepared;

        self.flags.clear(slot);
        self.device
            .submit(slot, &entry.buffer, self.flags.handle(slot))
            .map_err(|source| EngineError::QueueSubmissionFailed {
                stage: Stage::Priming,
                slot,
                source,
            })?;
        entry.state = SlotState::Submitted;
        self.submitted += 1;
        Ok(())
    }

    /// Refill and resubmit every buffer whose completion flag is set, in slot order.
    ///
    /// Returns the number of buffers resubmitted. A submission failure stops `run` and
    /// ends the scan.
    pub fn refill_completed(
        &mut self,
        run: &RunState,
        sink: &dyn EventSink,
    ) -> Result<usize, EngineError> {
        let channels = self.format.channels;
        let mut refilled = 0;
        for slot in 0..self.slots.len() {
            if self.slots[slot].state != SlotState::Submitted || !self.flags.is_done(slot) {
                continue;
            }
            if !run.is_running() {
                break;
            }

            self.flags.clear(slot);
            let entry = &mut self.slots[slot];
            entry.buffer.fill(channels, &mut self.osc, self.amplitude);
            if let Err(source) = self
                .device
                .submit(slot, &entry.buffer, self.flags.handle(slot))
            {
                entry.state = SlotState::Prepared;
                run.stop();
                sink.notify(&SessionEvent::RefillFailed {
                    slot,
                    error: source.clone(),
                });
                return Err(EngineError::QueueSubmissionFailed {
                    stage: Stage::SteadyState,
                    slot,
                    source,
                });
            }
            refilled += 1;
            self.submitted += 1;
            self.refills += 1;
        }
        Ok(refilled)
    }

    /// Flush the device, wait (bounded) for each queued buffer, unprepare and free all
    /// buffers. Hands the device back for closing.
    pub fn drain_and_release(mut self, sink: &dyn EventSink) -> (D, DrainReport) {
        self.device.reset();

        let mut report = DrainReport::default();
        for slot in 0..self.slots.len() {
            let state = self.slots[slot].state;
            if state == SlotState::Submitted && !self.wait_for_completion(slot) {
                sink.notify(&SessionEvent::DrainTimeout { slot });
                report.timed_out.push(slot);
            }
            if state != SlotState::Idle {
                self.device.unprepare(slot);
            }
            report.released += 1;
        }

        let Self { device, slots, .. } = self;
        drop(slots);
        (device, report)
    }

    fn wait_for_completion(&self, slot: usize) -> bool {
        for _ in 0..self.drain_attempts {
            if self.flags.is_done(slot) {
                return true;
            }
            thread::sleep(self.drain_interval);
        }
        self.flags.is_done(slot)
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Peak sample value in the negotiated encoding's units.
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn oscillator(&self) -> &Oscillator {
        &self.osc
    }

    /// Total submissions, priming included.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn refills(&self) -> u64 {
        self.refills
    }
}
