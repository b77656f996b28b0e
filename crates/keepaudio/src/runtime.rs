//! Keepaudio runtime helpers.
//!
//! Device listing and the foreground keep-alive session with Ctrl+C handling.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tone_player::cpal_backend::CpalBackend;
use tone_player::events::TracingSink;
use tone_player::{DeviceSelector, EngineError, PlaybackConfig, Stage, StreamFormat};

/// Print indexed output devices to stdout.
pub fn list_devices() -> Result<()> {
    let names = CpalBackend::new()
        .output_device_names()
        .context("enumerate output devices")?;
    println!("Playback devices:");
    if names.is_empty() {
        println!("  (No output devices found)");
    }
    for (i, name) in names.iter().enumerate() {
        println!("  [{i}] {name}");
    }
    Ok(())
}

/// Play the keep-alive tone until Ctrl+C or a termination request.
pub fn run(playback: PlaybackConfig) -> Result<()> {
    let session = tone_player::start(CpalBackend::new(), playback.clone(), Arc::new(TracingSink))
        .map_err(|err| failure(&err))?;

    let stop = session.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || stop.stop()) {
        tracing::warn!("failed to install Ctrl+C handler: {e}");
    }

    println!("{}", summary(&playback, session.format()));
    println!("Press Ctrl+C to stop...");

    let report = session.join().map_err(|err| failure(&err))?;
    if !report.drain.timed_out.is_empty() {
        tracing::warn!(
            buffers = report.drain.timed_out.len(),
            "some buffers were released without completing"
        );
    }
    println!("Stopped.");
    Ok(())
}

fn summary(playback: &PlaybackConfig, format: StreamFormat) -> String {
    format!(
        "Playing {:.2} Hz at {:.1} dBFS, {} Hz, {}, device={}, format={}",
        playback.frequency_hz,
        playback.level_dbfs,
        format.sample_rate,
        if format.channels == 1 { "mono" } else { "stereo" },
        match playback.device {
            DeviceSelector::Default => "default".to_string(),
            DeviceSelector::Index(i) => format!("selected (#{i})"),
        },
        format.encoding,
    )
}

/// Turn an engine failure into a user-facing error naming the failed stage.
fn failure(err: &EngineError) -> anyhow::Error {
    let stage = match err.stage() {
        Stage::Negotiation => "opening the output device",
        Stage::Priming => "priming the play queue",
        Stage::SteadyState => "playback",
    };
    let mut msg = format!("{stage} failed: {err}");
    if err.is_device_error() {
        msg.push_str(
            "\nTip: try a different --rate/--channels/--format/--device \
             (run with --list-devices to see available outputs).",
        );
    }
    anyhow!(msg)
}
