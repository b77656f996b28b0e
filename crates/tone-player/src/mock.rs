//! In-memory output backend for tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::{AudioBackend, BackendError, CompletionHandle, OutputDevice};
use crate::config::{DeviceSelector, SampleEncoding, StreamFormat};
use crate::tone::SampleBuffer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Buffers complete when the test says so (or on reset).
    Manual,
    /// Buffers complete as soon as they are queued.
    Immediate,
    /// Buffers never complete, not even on reset.
    Never,
}

#[derive(Clone, Debug)]
pub(crate) struct MockBehavior {
    pub completion: Completion,
    pub fail_prepare_at: Option<usize>,
    /// Number of successful submissions before every further one fails.
    pub fail_submit_after: Option<usize>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            completion: Completion::Manual,
            fail_prepare_at: None,
            fail_submit_after: None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub open_attempts: Vec<StreamFormat>,
    pub prepared: BTreeSet<usize>,
    pub unprepared: Vec<usize>,
    pub submissions: Vec<(usize, SampleBuffer)>,
    pub pending: Vec<CompletionHandle>,
    pub resets: usize,
    pub closed: bool,
}

#[derive(Clone)]
pub(crate) struct MockBackend {
    accepts: Vec<SampleEncoding>,
    device_count: usize,
    behavior: MockBehavior,
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn accepting(accepts: &[SampleEncoding]) -> Self {
        Self {
            accepts: accepts.to_vec(),
            device_count: 2,
            behavior: MockBehavior::default(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Complete every buffer currently queued.
    pub fn complete_pending(&self) -> usize {
        let mut st = self.state();
        let pending = std::mem::take(&mut st.pending);
        for handle in &pending {
            handle.complete();
        }
        pending.len()
    }
}

impl AudioBackend for MockBackend {
    type Device = MockDevice;

    fn open(
        &self,
        selector: DeviceSelector,
        format: StreamFormat,
    ) -> Result<MockDevice, BackendError> {
        self.state().open_attempts.push(format);
        if let DeviceSelector::Index(i) = selector {
            if i >= self.device_count {
                return Err(BackendError::DeviceNotFound(selector));
            }
        }
        if !self.accepts.contains(&format.encoding) {
            return Err(BackendError::FormatRejected {
                format,
                reason: "unsupported sample format".to_string(),
            });
        }
        Ok(MockDevice {
            format,
            behavior: self.behavior.clone(),
            state: self.state.clone(),
        })
    }
}

pub(crate) struct MockDevice {
    format: StreamFormat,
    behavior: MockBehavior,
    state: Arc<Mutex<MockState>>,
}

impl OutputDevice for MockDevice {
    fn prepare(&mut self, slot: usize, buffer: &SampleBuffer) -> Result<(), BackendError> {
        if buffer.encoding() != self.format.encoding {
            return Err(BackendError::EncodingMismatch {
                slot,
                expected: self.format.encoding,
                found: buffer.encoding(),
            });
        }
        let mut st = self.state.lock().unwrap();
        if self.behavior.fail_prepare_at == Some(slot) {
            return Err(BackendError::Rejected {
                slot,
                reason: "prepare refused".to_string(),
            });
        }
        st.prepared.insert(slot);
        Ok(())
    }

    fn submit(
        &mut self,
        slot: usize,
        buffer: &SampleBuffer,
        done: CompletionHandle,
    ) -> Result<(), BackendError> {
        let mut st = self.state.lock().unwrap();
        if !st.prepared.contains(&slot) {
            return Err(BackendError::NotPrepared { slot });
        }
        if let Some(limit) = self.behavior.fail_submit_after {
            if st.submissions.len() >= limit {
                return Err(BackendError::Rejected {
                    slot,
                    reason: "queue refused".to_string(),
                });
            }
        }
        st.submissions.push((slot, buffer.clone()));
        match self.behavior.completion {
            Completion::Immediate => done.complete(),
            Completion::Manual => st.pending.push(done),
            Completion::Never => {}
        }
        Ok(())
    }

    fn unprepare(&mut self, slot: usize) {
        let mut st = self.state.lock().unwrap();
        st.prepared.remove(&slot);
        st.unprepared.push(slot);
    }

    fn reset(&mut self) {
        let mut st = self.state.lock().unwrap();
        st.resets += 1;
        if self.behavior.completion != Completion::Never {
            for handle in st.pending.drain(..) {
                handle.complete();
            }
        }
    }

    fn close(self) {
        self.state.lock().unwrap().closed = true;
    }
}
