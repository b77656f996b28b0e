//! Output format negotiation.
//!
//! An explicit encoding is tried exactly once. `Auto` builds an ordered candidate list
//! (preferred encoding first, then its integer/float counterpart) and returns the first one
//! the device accepts.

use crate::backend::AudioBackend;
use crate::config::{PlaybackConfig, RequestedEncoding, SampleEncoding, StreamFormat};
use crate::error::EngineError;
use crate::events::{EventSink, SessionEvent};

/// An opened device together with the format it accepted.
pub struct Negotiated<D> {
    pub device: D,
    pub format: StreamFormat,
    /// `true` when an earlier candidate was rejected.
    pub fallback: bool,
}

/// Encodings to try, in priority order.
pub fn candidate_encodings(config: &PlaybackConfig) -> Vec<SampleEncoding> {
    match config.encoding {
        RequestedEncoding::Fixed(encoding) => vec![encoding],
        RequestedEncoding::Auto => {
            let preferred = if config.level_dbfs <= config.auto_float_threshold_dbfs {
                SampleEncoding::F32
            } else {
                SampleEncoding::I16
            };
            vec![preferred, preferred.counterpart()]
        }
    }
}

/// Open the configured device in the first candidate format it accepts.
pub fn open<B: AudioBackend>(
    backend: &B,
    config: &PlaybackConfig,
    sink: &dyn EventSink,
) -> Result<Negotiated<B::Device>, EngineError> {
    let mut attempts = Vec::new();
    for encoding in candidate_encodings(config) {
        let format = StreamFormat {
            encoding,
            channels: config.channels,
            sample_rate: config.sample_rate,
        };
        match backend.open(config.device, format) {
            Ok(device) => {
                let fallback = !attempts.is_empty();
                sink.notify(&SessionEvent::Opened { format, fallback });
                return Ok(Negotiated {
                    device,
                    format,
                    fallback,
                });
            }
            Err(error) => {
                sink.notify(&SessionEvent::FormatRejected {
                    encoding,
                    error: error.clone(),
                });
                attempts.push((encoding, error));
            }
        }
    }
    Err(EngineError::DeviceUnavailable { attempts })
}
