use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "keepaudio",
    version,
    about = "Keep a USB audio interface awake by playing a very low-level tone",
    after_help = "If your device still powers down, try a slightly higher level (e.g. --db -65).\n\
                  Use --list-devices to see indices, then --device N to pick one.\n\
                  Press Ctrl+C to stop."
)]
pub struct Args {
    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Tone frequency in Hz (clamped to 1..2000)
    #[arg(long, default_value_t = 1.0)]
    pub freq: f64,

    /// Tone level in dBFS (clamped to -120..-10)
    #[arg(long, default_value_t = -100.0, allow_negative_numbers = true)]
    pub db: f64,

    /// Sample rate in Hz (clamped to 8000..192000)
    #[arg(long, default_value_t = 48_000)]
    pub rate: u32,

    /// Output device index from --list-devices; the system default when omitted
    #[arg(long)]
    pub device: Option<usize>,

    /// 1 (mono) or 2 (stereo); anything else falls back to mono
    #[arg(long, default_value_t = 1)]
    pub channels: u16,

    /// Frames per buffer (clamped to 128..8192)
    #[arg(long, default_value_t = 1024)]
    pub frames: usize,

    /// Number of queued buffers (clamped to 2..32)
    #[arg(long, default_value_t = 8)]
    pub buffers: usize,

    /// Sample format; `auto` picks float for very quiet levels and falls back if rejected
    #[arg(long, value_enum, default_value_t = FormatArg::Auto)]
    pub format: FormatArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Auto,
    I16,
    I32,
    F32,
}
