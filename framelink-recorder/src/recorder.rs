//! Crash-safe frame recording
//!
//! A recording is a flat sequence of length-prefixed frame records (see
//! [`framelink_core::codec::record`]). The recorder tracks `last_good`, the
//! file offset up to which every record is known to be complete. Before each
//! write, and again on stop, anything past that offset is cut off, so the file
//! on disk only ever ends in a whole record or in a trailing fragment the
//! reader ignores.

use chrono::Utc;
use framelink_core::codec::record::{encode_frame_record, encode_record};
use framelink_core::{Frame, FrameLinkError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// File extension of recordings
pub const RECORDING_EXTENSION: &str = "flrec";

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Directory recordings are written to; created on demand
    pub directory: PathBuf,
    /// Force a data sync after this many frames (0 disables periodic sync)
    pub sync_every_frames: u32,
    /// Capacity of the command queue in front of the I/O thread
    pub queue_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("recordings"),
            sync_every_frames: 30,
            queue_capacity: 64,
        }
    }
}

impl RecorderConfig {
    /// Configuration writing into `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }
}

/// Result of a finished recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSummary {
    /// Session identifier, also the file stem
    pub session_id: String,
    /// Path of the recording file
    pub path: PathBuf,
    /// Complete frames in the file
    pub frame_count: u64,
    /// File size in bytes
    pub bytes_written: u64,
}

/// Open recording
#[derive(Debug)]
struct RecordingSession {
    session_id: String,
    path: PathBuf,
    file: File,
    last_good: u64,
    frame_count: u64,
}

impl RecordingSession {
    fn summary(&self) -> RecordingSummary {
        RecordingSummary {
            session_id: self.session_id.clone(),
            path: self.path.clone(),
            frame_count: self.frame_count,
            bytes_written: self.last_good,
        }
    }

    /// Cut anything past `last_good` and put the cursor there
    fn heal(&mut self) -> io::Result<()> {
        let position = self.file.metadata()?.len();
        if position != self.last_good {
            warn!(
                session_id = %self.session_id,
                position,
                last_good = self.last_good,
                "Truncating partial record"
            );
            self.file.set_len(self.last_good)?;
        }
        self.file.seek(SeekFrom::Start(self.last_good))?;
        Ok(())
    }

    fn append(&mut self, record: &[u8]) -> io::Result<()> {
        self.heal()?;
        self.file.write_all(record)?;
        self.last_good += record.len() as u64;
        self.frame_count += 1;
        Ok(())
    }
}

/// Append-only recorder for encoded frames
///
/// All I/O is blocking; run it on a dedicated thread (see
/// [`RecorderHandle`](crate::RecorderHandle)) when used from a capture loop.
#[derive(Debug)]
pub struct FrameRecorder {
    config: RecorderConfig,
    session: Option<RecordingSession>,
}

impl FrameRecorder {
    /// Create an idle recorder
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Open a new recording file
    ///
    /// Fails if a recording is already active or the directory cannot be
    /// created or written to.
    pub fn start_recording(&mut self) -> Result<String, FrameLinkError> {
        if let Some(session) = &self.session {
            return Err(FrameLinkError::AlreadyRecording {
                session_id: session.session_id.clone(),
            });
        }

        let directory = &self.config.directory;
        fs::create_dir_all(directory).map_err(|e| FrameLinkError::RecordingDirectory {
            path: directory.clone(),
            reason: e.to_string(),
        })?;

        let (session_id, path, file) = create_session_file(directory)?;
        info!(session_id = %session_id, path = %path.display(), "Recording started");

        self.session = Some(RecordingSession {
            session_id: session_id.clone(),
            path,
            file,
            last_good: 0,
            frame_count: 0,
        });
        Ok(session_id)
    }

    /// Append a frame; returns `Ok(false)` when not recording
    pub fn write_frame(&mut self, frame: &Frame) -> Result<bool, FrameLinkError> {
        if self.session.is_none() {
            return Ok(false);
        }
        let record = encode_frame_record(frame)?;
        self.append_record(&record)
    }

    /// Append an already encoded frame; returns `Ok(false)` when not recording
    pub fn write_encoded(&mut self, encoded: &[u8]) -> Result<bool, FrameLinkError> {
        if self.session.is_none() {
            return Ok(false);
        }
        let record = encode_record(encoded)?;
        self.append_record(&record)
    }

    fn append_record(&mut self, record: &[u8]) -> Result<bool, FrameLinkError> {
        let sync_every = u64::from(self.config.sync_every_frames);
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };

        let result = session.append(record).and_then(|()| {
            if sync_every > 0 && session.frame_count % sync_every == 0 {
                debug!(frames = session.frame_count, "Syncing recording data");
                session.file.sync_data()?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(true),
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Close the recording, leaving only whole records on disk
    ///
    /// Returns `Ok(None)` when no recording was active.
    pub fn stop_recording(&mut self) -> Result<Option<RecordingSummary>, FrameLinkError> {
        let Some(mut session) = self.session.take() else {
            return Ok(None);
        };

        let finished = session.heal().and_then(|()| session.file.sync_all());
        if let Err(e) = finished {
            self.session = Some(session);
            return Err(self.abort(e));
        }

        let summary = session.summary();
        info!(
            session_id = %summary.session_id,
            frames = summary.frame_count,
            bytes = summary.bytes_written,
            "Recording stopped"
        );
        Ok(Some(summary))
    }

    /// End the session after an I/O failure, keeping whole records
    fn abort(&mut self, source: io::Error) -> FrameLinkError {
        let Some(mut session) = self.session.take() else {
            return FrameLinkError::Io {
                operation: "write recording".to_string(),
                source,
            };
        };

        // The session handle may be the thing that failed; trim through a new one.
        let trimmed = OpenOptions::new()
            .write(true)
            .open(&session.path)
            .and_then(|file| {
                file.set_len(session.last_good)?;
                file.sync_all()
            });
        if let Err(e) = trimmed {
            debug!(error = %e, "Could not trim aborted recording");
        }
        error!(
            session_id = %session.session_id,
            frames = session.frame_count,
            error = %source,
            "Recording aborted"
        );

        FrameLinkError::RecordingAborted {
            session_id: session.session_id,
            path: session.path,
            frames_written: session.frame_count,
            source,
        }
    }

    /// Whether a recording is active
    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Identifier of the active recording
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    /// Path of the active recording
    pub fn current_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    /// Frames written in the active recording
    pub fn frame_count(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.frame_count)
    }

    /// Offset up to which the active recording holds only whole records
    pub fn last_good_position(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.last_good)
    }

    /// Recorder configuration
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Swap the session's handle for a read-only one so every write fails
    #[cfg(test)]
    pub(crate) fn reopen_read_only(&mut self) -> io::Result<()> {
        if let Some(session) = self.session.as_mut() {
            session.file = File::open(&session.path)?;
        }
        Ok(())
    }
}

impl Drop for FrameRecorder {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.stop_recording() {
                warn!(error = %e, "Failed to close recording on drop");
            }
        }
    }
}

/// Create a fresh, uniquely named recording file
fn create_session_file(directory: &Path) -> Result<(String, PathBuf, File), FrameLinkError> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();

    for suffix in 0..100u32 {
        let session_id = if suffix == 0 {
            stamp.clone()
        } else {
            format!("{}_{}", stamp, suffix)
        };
        let path = directory.join(format!("{}.{}", session_id, RECORDING_EXTENSION));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((session_id, path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(FrameLinkError::RecordingDirectory {
                    path: directory.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        }
    }

    Err(FrameLinkError::RecordingDirectory {
        path: directory.to_path_buf(),
        reason: format!("no free file name for session {}", stamp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_without_session_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = FrameRecorder::new(RecorderConfig::new(dir.path()));

        assert!(!recorder.write_encoded(&[1, 2, 3]).unwrap());
        assert!(recorder.stop_recording().unwrap().is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn session_files_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let (first, first_path, _f1) = create_session_file(dir.path()).unwrap();
        let (second, second_path, _f2) = create_session_file(dir.path()).unwrap();

        assert_ne!(first, second);
        assert_ne!(first_path, second_path);
        assert_eq!(
            first_path.extension().and_then(|e| e.to_str()),
            Some(RECORDING_EXTENSION)
        );
    }

    #[test]
    fn write_failure_aborts_and_keeps_whole_records() {
        use framelink_core::RecordReader;

        let dir = tempfile::tempdir().unwrap();
        let mut recorder = FrameRecorder::new(RecorderConfig::new(dir.path()));
        let session_id = recorder.start_recording().unwrap();
        assert!(recorder.write_encoded(b"first").unwrap());
        assert!(recorder.write_encoded(b"second").unwrap());

        let path = recorder.current_path().unwrap().to_path_buf();
        let good = recorder.last_good_position();
        assert_eq!(good, 19);

        // Torn record from the write that hit the failing device.
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&[0, 0, 0, 9, 0xAB])
            .unwrap();
        recorder.reopen_read_only().unwrap();

        let err = recorder.write_encoded(b"third").unwrap_err();
        assert_eq!(err.error_code(), "RECORDING_ABORTED");
        match &err {
            FrameLinkError::RecordingAborted {
                session_id: aborted,
                path: aborted_path,
                frames_written,
                ..
            } => {
                assert_eq!(aborted, &session_id);
                assert_eq!(aborted_path, &path);
                assert_eq!(*frames_written, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!recorder.is_recording());
        assert!(!recorder.write_encoded(b"fourth").unwrap());

        assert_eq!(fs::metadata(&path).unwrap().len(), good);
        let mut reader = RecordReader::new(File::open(&path).unwrap());
        let records: Vec<Vec<u8>> = reader.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(reader.trailing_bytes(), 0);
    }
}
