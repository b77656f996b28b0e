//! Session lifecycle events.
//!
//! The engine reports what happened through an [`EventSink`]; it never formats user-facing
//! messages itself. [`TracingSink`] is the default and forwards to `tracing`.

#[cfg(test)]
use std::sync::Mutex;

use crate::backend::BackendError;
use crate::config::{SampleEncoding, StreamFormat};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A negotiation candidate was rejected by the device.
    FormatRejected {
        encoding: SampleEncoding,
        error: BackendError,
    },
    /// Device opened. `fallback` is set when the first candidate was rejected.
    Opened { format: StreamFormat, fallback: bool },
    /// One buffer plays for less than a few poll intervals; underruns are likely.
    LowHeadroom {
        buffer_ms: f64,
        poll_ms: f64,
    },
    Primed {
        buffers: usize,
        frames_per_buffer: usize,
    },
    RefillFailed { slot: usize, error: BackendError },
    /// Stop observed; draining begins.
    Stopped,
    /// A buffer never reported completion during drain and was released anyway.
    DrainTimeout { slot: usize },
    Closed { released: usize, timed_out: usize },
}

/// Receives lifecycle events. Called from the playback thread.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: &SessionEvent);
}

/// Logs events with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn notify(&self, event: &SessionEvent) {
        match event {
            SessionEvent::FormatRejected { encoding, error } => {
                tracing::info!(encoding = %encoding, "format rejected: {error}")
            }
            SessionEvent::Opened { format, fallback } => {
                tracing::info!(format = %format, fallback = *fallback, "output device opened")
            }
            SessionEvent::LowHeadroom { buffer_ms, poll_ms } => tracing::warn!(
                buffer_ms = *buffer_ms,
                poll_ms = *poll_ms,
                "buffer duration is close to the poll interval; expect underruns"
            ),
            SessionEvent::Primed {
                buffers,
                frames_per_buffer,
            } => tracing::info!(
                buffers = *buffers,
                frames_per_buffer = *frames_per_buffer,
                "play queue primed"
            ),
            SessionEvent::RefillFailed { slot, error } => {
                tracing::error!(slot = *slot, "refill failed: {error}")
            }
            SessionEvent::Stopped => tracing::info!("session stopping"),
            SessionEvent::DrainTimeout { slot } => {
                tracing::warn!(slot = *slot, "buffer did not complete during drain; releasing")
            }
            SessionEvent::Closed {
                released,
                timed_out,
            } => tracing::info!(
                released = *released,
                timed_out = *timed_out,
                "session closed"
            ),
        }
    }
}

/// Keeps every event in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<SessionEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn notify(&self, event: &SessionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
