//! Session configuration.
//!
//! The command-line layer clamps every numeric field before a [`PlaybackConfig`] reaches the
//! engine; nothing in this crate re-validates it.

use std::fmt;
use std::time::Duration;

/// Concrete PCM sample encoding handed to the output device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    /// Signed 16-bit integer PCM.
    I16,
    /// Signed 32-bit integer PCM.
    I32,
    /// 32-bit IEEE float, nominal range [-1, 1].
    F32,
}

impl SampleEncoding {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleEncoding::I16 => 2,
            SampleEncoding::I32 => 4,
            SampleEncoding::F32 => 4,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, SampleEncoding::F32)
    }

    /// The matching encoding from the other numeric family (integer <-> float).
    pub fn counterpart(self) -> SampleEncoding {
        match self {
            SampleEncoding::I16 | SampleEncoding::I32 => SampleEncoding::F32,
            SampleEncoding::F32 => SampleEncoding::I16,
        }
    }

    pub fn as_cpal(self) -> cpal::SampleFormat {
        match self {
            SampleEncoding::I16 => cpal::SampleFormat::I16,
            SampleEncoding::I32 => cpal::SampleFormat::I32,
            SampleEncoding::F32 => cpal::SampleFormat::F32,
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleEncoding::I16 => "i16",
            SampleEncoding::I32 => "i32",
            SampleEncoding::F32 => "f32",
        };
        f.write_str(name)
    }
}

/// Encoding requested by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RequestedEncoding {
    /// Let the negotiator pick, falling back across integer/float.
    #[default]
    Auto,
    /// Use exactly this encoding or fail.
    Fixed(SampleEncoding),
}

/// Which output device to open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// The host's default output device.
    #[default]
    Default,
    /// Position in the host's output device list.
    Index(usize),
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Default => f.write_str("default"),
            DeviceSelector::Index(i) => write!(f, "#{i}"),
        }
    }
}

/// Parameters for one keep-alive playback session.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Tone frequency in Hz.
    pub frequency_hz: f64,
    /// Tone level in dBFS (negative).
    pub level_dbfs: f64,
    pub sample_rate: u32,
    /// 1 (mono) or 2 (interleaved stereo).
    pub channels: u16,
    pub frames_per_buffer: usize,
    pub buffer_count: usize,
    pub encoding: RequestedEncoding,
    pub device: DeviceSelector,
    /// Levels at or below this prefer float output when the encoding is `Auto`.
    pub auto_float_threshold_dbfs: f64,
    /// Delay between completion scans while running.
    pub poll_interval: Duration,
    /// Per-buffer completion checks during drain before the buffer is released anyway.
    pub drain_attempts: u32,
    /// Delay between completion checks during drain.
    pub drain_interval: Duration,
}

/// Roughly one LSB of 16-bit PCM (20 * log10(1 / 32767)).
pub const DEFAULT_AUTO_FLOAT_THRESHOLD_DBFS: f64 = -90.0;

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 1.0,
            level_dbfs: -100.0,
            sample_rate: 48_000,
            channels: 1,
            frames_per_buffer: 1024,
            buffer_count: 8,
            encoding: RequestedEncoding::Auto,
            device: DeviceSelector::Default,
            auto_float_threshold_dbfs: DEFAULT_AUTO_FLOAT_THRESHOLD_DBFS,
            poll_interval: Duration::from_millis(5),
            drain_attempts: 200,
            drain_interval: Duration::from_millis(5),
        }
    }
}

impl PlaybackConfig {
    /// Radians advanced per frame.
    pub fn phase_increment(&self) -> f64 {
        std::f64::consts::TAU * self.frequency_hz / self.sample_rate as f64
    }

    /// Playback duration of one buffer.
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_buffer as f64 / self.sample_rate as f64)
    }

    /// Whether a single buffer outlasts the poll interval by a comfortable margin.
    pub fn has_refill_headroom(&self) -> bool {
        self.buffer_duration() >= self.poll_interval * 4
    }
}

/// Stream format a device is asked to accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub encoding: SampleEncoding,
    pub channels: u16,
    pub sample_rate: u32,
}

impl StreamFormat {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.encoding.bytes_per_sample()
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}ch @ {}Hz",
            self.encoding, self.channels, self.sample_rate
        )
    }
}
