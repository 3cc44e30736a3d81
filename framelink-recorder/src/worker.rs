//! Recorder running on its own I/O thread
//!
//! [`RecorderHandle`] owns a [`FrameRecorder`] on a dedicated OS thread so disk
//! writes and syncs never stall the capture loop. Commands go through one
//! bounded queue, which keeps start, writes, and stop in submission order.

use crate::recorder::{FrameRecorder, RecorderConfig, RecordingSummary};
use bytes::Bytes;
use framelink_core::FrameLinkError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

type Reply<T> = oneshot::Sender<Result<T, FrameLinkError>>;

enum Command {
    Start(Reply<String>),
    Write(Bytes),
    Stop(Reply<Option<RecordingSummary>>),
}

/// Recording that ended because of an I/O error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingFailure {
    /// Identifier of the aborted session
    pub session_id: String,
    /// File holding the frames written before the failure
    pub path: PathBuf,
    /// Complete frames in the file
    pub frames_written: u64,
    /// Description of the I/O error
    pub reason: String,
}

#[derive(Debug, Default)]
struct SharedState {
    recording: AtomicBool,
    frames_written: AtomicU64,
    frames_dropped: AtomicU64,
    failure: Mutex<Option<RecordingFailure>>,
}

/// Handle to a recorder running on a dedicated thread
#[derive(Debug, Clone)]
pub struct RecorderHandle {
    commands: mpsc::Sender<Command>,
    state: Arc<SharedState>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Start(_) => write!(f, "Start"),
            Command::Write(bytes) => write!(f, "Write({} bytes)", bytes.len()),
            Command::Stop(_) => write!(f, "Stop"),
        }
    }
}

impl RecorderHandle {
    /// Spawn the I/O thread
    ///
    /// The thread exits once every handle is dropped, closing any open
    /// recording cleanly.
    pub fn spawn(config: RecorderConfig) -> Result<Self, FrameLinkError> {
        Self::from_recorder(FrameRecorder::new(config))
    }

    /// Move an existing recorder, and any recording it has open, onto the I/O thread
    pub fn from_recorder(recorder: FrameRecorder) -> Result<Self, FrameLinkError> {
        let (commands, queue) = mpsc::channel(recorder.config().queue_capacity.max(1));
        let state = Arc::new(SharedState {
            recording: AtomicBool::new(recorder.is_recording()),
            ..SharedState::default()
        });

        let worker_state = Arc::clone(&state);
        thread::Builder::new()
            .name("framelink-recorder".to_string())
            .spawn(move || run_worker(recorder, queue, worker_state))
            .map_err(|e| FrameLinkError::Io {
                operation: "spawn recorder thread".to_string(),
                source: e,
            })?;

        Ok(Self { commands, state })
    }

    /// Start a new recording
    pub async fn start(&self) -> Result<String, FrameLinkError> {
        let (reply, response) = oneshot::channel();
        self.submit(Command::Start(reply)).await?;
        response.await.map_err(|_| unavailable())?
    }

    /// Queue an encoded frame; never blocks
    ///
    /// Returns `false` when no recording is active or the queue is full; the
    /// latter counts as a dropped frame.
    pub fn write(&self, encoded: Bytes) -> bool {
        if !self.is_recording() {
            return false;
        }
        match self.commands.try_send(Command::Write(encoded)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!("Recorder queue full, dropping frame");
                self.state.frames_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.state.frames_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Stop the active recording after all queued frames are written
    pub async fn stop(&self) -> Result<Option<RecordingSummary>, FrameLinkError> {
        let (reply, response) = oneshot::channel();
        self.submit(Command::Stop(reply)).await?;
        response.await.map_err(|_| unavailable())?
    }

    /// Whether a recording is active
    pub fn is_recording(&self) -> bool {
        self.state.recording.load(Ordering::SeqCst)
    }

    /// Frames written across all recordings
    pub fn frames_written(&self) -> u64 {
        self.state.frames_written.load(Ordering::Relaxed)
    }

    /// Frames dropped because the queue was full
    pub fn frames_dropped(&self) -> u64 {
        self.state.frames_dropped.load(Ordering::Relaxed)
    }

    /// Take the last I/O failure that ended a recording, if any
    pub fn take_failure(&self) -> Option<RecordingFailure> {
        self.state.failure.lock().take()
    }

    async fn submit(&self, command: Command) -> Result<(), FrameLinkError> {
        self.commands.send(command).await.map_err(|_| unavailable())
    }
}

fn unavailable() -> FrameLinkError {
    FrameLinkError::RecorderUnavailable {
        reason: "recorder thread has stopped".to_string(),
    }
}

fn run_worker(
    mut recorder: FrameRecorder,
    mut queue: mpsc::Receiver<Command>,
    state: Arc<SharedState>,
) {
    debug!("Recorder thread started");

    while let Some(command) = queue.blocking_recv() {
        match command {
            Command::Start(reply) => {
                let result = recorder.start_recording();
                if result.is_ok() {
                    state.recording.store(true, Ordering::SeqCst);
                }
                let _ = reply.send(result);
            }
            Command::Write(encoded) => match recorder.write_encoded(&encoded) {
                Ok(true) => {
                    state.frames_written.fetch_add(1, Ordering::Relaxed);
                }
                Ok(false) => trace!("Frame arrived after recording stopped"),
                Err(e) if recorder.is_recording() => {
                    warn!(error = %e, "Skipping frame that could not be recorded");
                }
                Err(e) => {
                    state.recording.store(false, Ordering::SeqCst);
                    record_failure(&state, e);
                }
            },
            Command::Stop(reply) => {
                state.recording.store(false, Ordering::SeqCst);
                let _ = reply.send(recorder.stop_recording());
            }
        }
    }

    if let Err(e) = recorder.stop_recording() {
        warn!(error = %e, "Failed to close recording on shutdown");
    }
    debug!("Recorder thread stopped");
}

fn record_failure(state: &SharedState, error: FrameLinkError) {
    let failure = match error {
        FrameLinkError::RecordingAborted {
            session_id,
            path,
            frames_written,
            source,
        } => RecordingFailure {
            session_id,
            path,
            frames_written,
            reason: source.to_string(),
        },
        other => RecordingFailure {
            session_id: String::new(),
            path: PathBuf::new(),
            frames_written: 0,
            reason: other.to_string(),
        },
    };
    *state.failure.lock() = Some(failure);
}
