//! Keep-alive tone playback engine.
//!
//! Streams a very quiet, phase-continuous sine tone to an output device through a rotating
//! pool of queued buffers so that auto-suspending audio hardware never sees silence.
//!
//! ## Pipeline
//! 1. **Negotiate**: open the device in the requested encoding, or try float/integer
//!    candidates in order when the encoding is automatic ([`negotiate`]).
//! 2. **Prime**: fill every buffer from one shared oscillator and queue it ([`pool`]).
//! 3. **Run**: poll completion flags, refill and requeue finished buffers until stopped
//!    ([`session`]).
//! 4. **Drain**: reset the device, wait (bounded) for queued buffers, release and close.

pub mod amplitude;
pub mod backend;
pub mod config;
pub mod cpal_backend;
pub mod error;
pub mod events;
pub mod negotiate;
pub mod pool;
pub mod session;
pub mod tone;

#[cfg(test)]
mod mock;

pub use config::{DeviceSelector, PlaybackConfig, RequestedEncoding, SampleEncoding, StreamFormat};
pub use error::{EngineError, Stage};
pub use session::{SessionHandle, SessionPhase, SessionReport, StopHandle, start};
