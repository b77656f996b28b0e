//! Phase-accumulating sine oscillator and the typed sample buffers it renders into.
//!
//! The oscillator is shared by every buffer of a session. It is never reset between
//! buffers, so the waveform stays continuous across buffer boundaries.

use std::collections::TryReserveError;
use std::f64::consts::TAU;

use crate::config::SampleEncoding;

/// Oscillator phase state.
#[derive(Clone, Debug, PartialEq)]
pub struct Oscillator {
    /// Radians, kept in `[0, TAU)`.
    phase: f64,
    /// Radians per frame.
    increment: f64,
}

impl Oscillator {
    pub fn new(increment: f64) -> Self {
        Self {
            phase: 0.0,
            increment,
        }
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn increment(&self) -> f64 {
        self.increment
    }

    /// Current value and advance by one frame.
    fn next_value(&mut self) -> f64 {
        let value = self.phase.sin();
        self.phase += self.increment;
        if self.phase >= TAU {
            self.phase -= TAU;
        }
        value
    }
}

/// A sample type the generator can write.
pub trait ToneSample: Copy + Send + 'static {
    const SILENCE: Self;

    /// Convert an already amplitude-scaled value into this sample type.
    fn from_scaled(value: f64) -> Self;

    /// Borrow the samples of `buffer` if it holds this type.
    fn view(buffer: &SampleBuffer) -> Option<&[Self]>;
}

impl ToneSample for i16 {
    const SILENCE: Self = 0;

    fn from_scaled(value: f64) -> Self {
        value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }

    fn view(buffer: &SampleBuffer) -> Option<&[Self]> {
        match buffer {
            SampleBuffer::I16(v) => Some(v),
            _ => None,
        }
    }
}

impl ToneSample for i32 {
    const SILENCE: Self = 0;

    fn from_scaled(value: f64) -> Self {
        value.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
    }

    fn view(buffer: &SampleBuffer) -> Option<&[Self]> {
        match buffer {
            SampleBuffer::I32(v) => Some(v),
            _ => None,
        }
    }
}

impl ToneSample for f32 {
    const SILENCE: Self = 0.0;

    fn from_scaled(value: f64) -> Self {
        value as f32
    }

    fn view(buffer: &SampleBuffer) -> Option<&[Self]> {
        match buffer {
            SampleBuffer::F32(v) => Some(v),
            _ => None,
        }
    }
}

/// Interleaved samples in one concrete encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleBuffer {
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
}

impl SampleBuffer {
    /// Allocate a zeroed buffer of `samples` samples.
    ///
    /// Allocation failure is reported instead of aborting.
    pub fn try_zeroed(encoding: SampleEncoding, samples: usize) -> Result<Self, TryReserveError> {
        fn zeroed<T: Copy + Default>(len: usize) -> Result<Vec<T>, TryReserveError> {
            let mut v = Vec::new();
            v.try_reserve_exact(len)?;
            v.resize(len, T::default());
            Ok(v)
        }
        Ok(match encoding {
            SampleEncoding::I16 => SampleBuffer::I16(zeroed(samples)?),
            SampleEncoding::I32 => SampleBuffer::I32(zeroed(samples)?),
            SampleEncoding::F32 => SampleBuffer::F32(zeroed(samples)?),
        })
    }

    pub fn encoding(&self) -> SampleEncoding {
        match self {
            SampleBuffer::I16(_) => SampleEncoding::I16,
            SampleBuffer::I32(_) => SampleEncoding::I32,
            SampleBuffer::F32(_) => SampleEncoding::F32,
        }
    }

    /// Number of samples (not frames).
    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::I16(v) => v.len(),
            SampleBuffer::I32(v) => v.len(),
            SampleBuffer::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.encoding().bytes_per_sample()
    }

    /// Render `len / channels` frames of tone, continuing `osc`.
    pub fn fill(&mut self, channels: u16, osc: &mut Oscillator, amplitude: f64) {
        match self {
            SampleBuffer::I16(v) => generate(v, channels, osc, amplitude),
            SampleBuffer::I32(v) => generate(v, channels, osc, amplitude),
            SampleBuffer::F32(v) => generate(v, channels, osc, amplitude),
        }
    }
}

/// Write one mono tone sample per frame, duplicated across `channels` slots.
pub fn generate<T: ToneSample>(out: &mut [T], channels: u16, osc: &mut Oscillator, amplitude: f64) {
    let channels = channels.max(1) as usize;
    for frame in out.chunks_exact_mut(channels) {
        let sample = T::from_scaled(osc.next_value() * amplitude);
        frame.fill(sample);
    }
}
