//! Output device seam.
//!
//! The engine drives any device that can accept queued buffers and report, per buffer, when
//! playback of that buffer has finished. [`crate::cpal_backend`] implements it on top of CPAL.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{DeviceSelector, SampleEncoding, StreamFormat};
use crate::tone::SampleBuffer;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("no output device at {0}")]
    DeviceNotFound(DeviceSelector),
    #[error("device rejected format {format}: {reason}")]
    FormatRejected { format: StreamFormat, reason: String },
    #[error("buffer {slot} was not prepared")]
    NotPrepared { slot: usize },
    #[error("buffer {slot} holds {found} samples, device expects {expected}")]
    EncodingMismatch {
        slot: usize,
        expected: SampleEncoding,
        found: SampleEncoding,
    },
    #[error("device queue rejected buffer {slot}: {reason}")]
    Rejected { slot: usize, reason: String },
    #[error("output stream failed: {0}")]
    Stream(String),
}

/// Opens output devices in a concrete stream format.
pub trait AudioBackend {
    type Device: OutputDevice;

    /// Open `selector` with exactly `format`, or reject it.
    fn open(&self, selector: DeviceSelector, format: StreamFormat)
    -> Result<Self::Device, BackendError>;
}

/// An open output device with a play queue.
pub trait OutputDevice {
    /// Register a buffer before its first submission.
    fn prepare(&mut self, slot: usize, buffer: &SampleBuffer) -> Result<(), BackendError>;

    /// Queue a prepared buffer. The device calls [`CompletionHandle::complete`] once it has
    /// finished with the contents.
    fn submit(
        &mut self,
        slot: usize,
        buffer: &SampleBuffer,
        done: CompletionHandle,
    ) -> Result<(), BackendError>;

    /// Undo [`OutputDevice::prepare`].
    fn unprepare(&mut self, slot: usize);

    /// Stop playback and mark every queued buffer complete.
    fn reset(&mut self);

    fn close(self)
    where
        Self: Sized;
}

/// Completion flags for every slot of a pool, indexed by slot.
#[derive(Clone, Debug)]
pub struct CompletionFlags {
    flags: Arc<[AtomicBool]>,
}

impl CompletionFlags {
    pub fn new(slots: usize) -> Self {
        Self {
            flags: (0..slots).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn is_done(&self, slot: usize) -> bool {
        self.flags[slot].load(Ordering::Acquire)
    }

    pub fn clear(&self, slot: usize) {
        self.flags[slot].store(false, Ordering::Release);
    }

    /// Handle the device uses to flag `slot` complete.
    pub fn handle(&self, slot: usize) -> CompletionHandle {
        CompletionHandle {
            flags: self.flags.clone(),
            slot,
        }
    }
}

/// Write access to a single slot's completion flag, granted to the device while queued.
#[derive(Clone, Debug)]
pub struct CompletionHandle {
    flags: Arc<[AtomicBool]>,
    slot: usize,
}

impl CompletionHandle {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn complete(&self) {
        self.flags[self.slot].store(true, Ordering::Release);
    }
}
