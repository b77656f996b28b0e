//! Playback session: the driver loop and the handle used to stop and join it.
//!
//! ## Lifecycle
//! Priming -> Running -> Draining -> Closed, on a dedicated thread that owns the device,
//! the buffer pool and the oscillator. The only state shared with other threads is the
//! [`RunState`] stop flag plus read-only phase/stat counters.
//!
//! The device is opened on the playback thread (some OS audio handles cannot move between
//! threads); [`start`] blocks until that thread reports that priming succeeded or failed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

use crate::backend::{AudioBackend, OutputDevice};
use crate::config::{PlaybackConfig, StreamFormat};
use crate::error::EngineError;
use crate::events::{EventSink, SessionEvent};
use crate::negotiate;
use crate::pool::{BufferPool, DrainReport};

/// Cooperative stop flag. Only ever goes from running to stopped.
#[derive(Debug)]
pub struct RunState {
    running: AtomicBool,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns `true` if this call performed the transition.
    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable stop trigger, safe to move into signal handlers.
#[derive(Clone, Debug)]
pub struct StopHandle {
    run: Arc<RunState>,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.run.stop() {
            tracing::debug!("stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        !self.run.is_running()
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Priming = 0,
    Running = 1,
    Draining = 2,
    Closed = 3,
}

impl SessionPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionPhase::Priming,
            1 => SessionPhase::Running,
            2 => SessionPhase::Draining,
            _ => SessionPhase::Closed,
        }
    }
}

#[derive(Debug)]
struct SessionShared {
    phase: AtomicU8,
    submitted: AtomicU64,
    refills: AtomicU64,
}

impl SessionShared {
    fn set_phase(&self, phase: SessionPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

/// Counter snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Buffers handed to the device, priming included.
    pub submitted: u64,
    pub refills: u64,
}

/// Outcome of a session that closed without a fatal error.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionReport {
    pub format: StreamFormat,
    pub fallback: bool,
    pub stats: SessionStats,
    pub drain: DrainReport,
}

/// A running playback session.
pub struct SessionHandle {
    run: Arc<RunState>,
    shared: Arc<SessionShared>,
    format: StreamFormat,
    fallback: bool,
    thread: JoinHandle<Result<SessionReport, EngineError>>,
}

impl SessionHandle {
    /// Ask the session to drain and close. Idempotent; harmless after close.
    pub fn request_stop(&self) {
        self.stop_handle().stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            run: self.run.clone(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.shared.phase.load(Ordering::Acquire))
    }

    /// Format the device accepted.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn fallback(&self) -> bool {
        self.fallback
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            refills: self.shared.refills.load(Ordering::Relaxed),
        }
    }

    /// Block until the session is closed.
    pub fn join(self) -> Result<SessionReport, EngineError> {
        self.thread
            .join()
            .map_err(|_| EngineError::Thread("playback thread panicked".to_string()))?
    }
}

/// Open the device, prime the queue and start the driver loop on its own thread.
pub fn start<B>(
    backend: B,
    config: PlaybackConfig,
    sink: Arc<dyn EventSink>,
) -> Result<SessionHandle, EngineError>
where
    B: AudioBackend + Send + 'static,
{
    let run = Arc::new(RunState::new());
    let shared = Arc::new(SessionShared {
        phase: AtomicU8::new(SessionPhase::Priming as u8),
        submitted: AtomicU64::new(0),
        refills: AtomicU64::new(0),
    });
    let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

    let thread = {
        let run = run.clone();
        let shared = shared.clone();
        thread::Builder::new()
            .name("tone-player".to_string())
            .spawn(move || drive(backend, config, sink, run, shared, ready_tx))
            .map_err(|e| EngineError::Thread(e.to_string()))?
    };

    match ready_rx.recv() {
        Ok(Ok((format, fallback))) => Ok(SessionHandle {
            run,
            shared,
            format,
            fallback,
            thread,
        }),
        Ok(Err(err)) => {
            let _ = thread.join();
            Err(err)
        }
        Err(_) => match thread.join() {
            Ok(Err(err)) => Err(err),
            _ => Err(EngineError::Thread(
                "playback thread exited during startup".to_string(),
            )),
        },
    }
}

type Ready = Result<(StreamFormat, bool), EngineError>;

fn drive<B: AudioBackend>(
    backend: B,
    config: PlaybackConfig,
    sink: Arc<dyn EventSink>,
    run: Arc<RunState>,
    shared: Arc<SessionShared>,
    ready: Sender<Ready>,
) -> Result<SessionReport, EngineError> {
    let sink = &*sink;
    let fail_startup = |err: EngineError| {
        run.stop();
        shared.set_phase(SessionPhase::Closed);
        let _ = ready.send(Err(err.clone()));
        err
    };

    if !config.has_refill_headroom() {
        sink.notify(&SessionEvent::LowHeadroom {
            buffer_ms: config.buffer_duration().as_secs_f64() * 1000.0,
            poll_ms: config.poll_interval.as_secs_f64() * 1000.0,
        });
    }

    let negotiated = negotiate::open(&backend, &config, sink).map_err(fail_startup)?;
    let format = negotiated.format;
    let fallback = negotiated.fallback;
    let mut pool =
        BufferPool::prime(negotiated.device, format, &config, sink).map_err(fail_startup)?;

    shared.submitted.store(pool.submitted(), Ordering::Relaxed);
    shared.set_phase(SessionPhase::Running);
    let _ = ready.send(Ok((format, fallback)));

    let mut failure = None;
    while run.is_running() {
        if let Err(err) = pool.refill_completed(&run, sink) {
            failure = Some(err);
            break;
        }
        shared.submitted.store(pool.submitted(), Ordering::Relaxed);
        shared.refills.store(pool.refills(), Ordering::Relaxed);
        thread::sleep(config.poll_interval);
    }

    shared.set_phase(SessionPhase::Draining);
    sink.notify(&SessionEvent::Stopped);
    let stats = SessionStats {
        submitted: pool.submitted(),
        refills: pool.refills(),
    };
    let (device, drain) = pool.drain_and_release(sink);
    device.close();
    shared.set_phase(SessionPhase::Closed);
    sink.notify(&SessionEvent::Closed {
        released: drain.released,
        timed_out: drain.timed_out.len(),
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(SessionReport {
            format,
            fallback,
            stats,
            drain,
        }),
    }
}
