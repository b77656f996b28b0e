//! keepaudio: keep a USB audio interface awake by playing a very low-level tone.
//!
//! Parses and clamps the command line, then runs a `tone-player` session on the selected
//! output device until Ctrl+C (or a termination request) stops it.

use anyhow::Result;
use clap::Parser;
use keepaudio::{cli, config, runtime};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,keepaudio=info,tone_player=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    runtime::run(config::playback_config(&args))
}
