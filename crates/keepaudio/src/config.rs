//! Command-line options to a validated [`PlaybackConfig`].
//!
//! Every numeric option is clamped here; the engine assumes it receives sane values.

use tone_player::{DeviceSelector, PlaybackConfig, RequestedEncoding, SampleEncoding};

use crate::cli::{Args, FormatArg};

pub const FREQ_RANGE_HZ: (f64, f64) = (1.0, 2000.0);
pub const LEVEL_RANGE_DBFS: (f64, f64) = (-120.0, -10.0);
pub const RATE_RANGE_HZ: (u32, u32) = (8_000, 192_000);
pub const FRAMES_RANGE: (usize, usize) = (128, 8192);
pub const BUFFERS_RANGE: (usize, usize) = (2, 32);

/// Build the session config from parsed arguments, clamping out-of-range values.
pub fn playback_config(args: &Args) -> PlaybackConfig {
    let freq = if args.freq.is_nan() {
        FREQ_RANGE_HZ.0
    } else {
        args.freq.clamp(FREQ_RANGE_HZ.0, FREQ_RANGE_HZ.1)
    };
    let db = if args.db.is_nan() {
        -100.0
    } else {
        args.db.clamp(LEVEL_RANGE_DBFS.0, LEVEL_RANGE_DBFS.1)
    };
    let channels = match args.channels {
        1 | 2 => args.channels,
        _ => 1,
    };

    PlaybackConfig {
        frequency_hz: freq,
        level_dbfs: db,
        sample_rate: args.rate.clamp(RATE_RANGE_HZ.0, RATE_RANGE_HZ.1),
        channels,
        frames_per_buffer: args.frames.clamp(FRAMES_RANGE.0, FRAMES_RANGE.1),
        buffer_count: args.buffers.clamp(BUFFERS_RANGE.0, BUFFERS_RANGE.1),
        encoding: requested_encoding(args.format),
        device: args
            .device
            .map(DeviceSelector::Index)
            .unwrap_or(DeviceSelector::Default),
        ..PlaybackConfig::default()
    }
}

fn requested_encoding(format: FormatArg) -> RequestedEncoding {
    match format {
        FormatArg::Auto => RequestedEncoding::Auto,
        FormatArg::I16 => RequestedEncoding::Fixed(SampleEncoding::I16),
        FormatArg::I32 => RequestedEncoding::Fixed(SampleEncoding::I32),
        FormatArg::F32 => RequestedEncoding::Fixed(SampleEncoding::F32),
    }
}
