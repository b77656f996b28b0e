use std::fmt;

use crate::backend::BackendError;
use crate::config::SampleEncoding;

/// Session stage in which a fatal error occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Negotiation,
    Priming,
    SteadyState,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Negotiation => "negotiation",
            Stage::Priming => "priming",
            Stage::SteadyState => "steady-state",
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Every candidate encoding was rejected.
    #[error("no usable output format ({})", summarize(.attempts))]
    DeviceUnavailable {
        attempts: Vec<(SampleEncoding, BackendError)>,
    },
    #[error("could not allocate {bytes} bytes for buffer {slot}")]
    ResourceExhausted { slot: usize, bytes: usize },
    #[error("queue submission failed during {stage} (buffer {slot}): {source}")]
    QueueSubmissionFailed {
        stage: Stage,
        slot: usize,
        #[source]
        source: BackendError,
    },
    #[error("playback thread failed: {0}")]
    Thread(String),
}

impl EngineError {
    pub fn stage(&self) -> Stage {
        match self {
            EngineError::DeviceUnavailable { .. } => Stage::Negotiation,
            EngineError::ResourceExhausted { .. } => Stage::Priming,
            EngineError::QueueSubmissionFailed { stage, .. } => *stage,
            EngineError::Thread(_) => Stage::SteadyState,
        }
    }

    /// Whether the device itself refused something (as opposed to a local failure).
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            EngineError::DeviceUnavailable { .. } | EngineError::QueueSubmissionFailed { .. }
        )
    }
}

fn summarize(attempts: &[(SampleEncoding, BackendError)]) -> String {
    if attempts.is_empty() {
        return "nothing attempted".to_string();
    }
    attempts
        .iter()
        .map(|(encoding, err)| format!("{encoding}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}
