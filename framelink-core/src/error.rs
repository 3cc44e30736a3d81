//! Error types for framelink

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::status::FailureKind;

/// Main error type for framelink operations
#[derive(Error, Debug)]
pub enum FrameLinkError {
    /// Invalid configuration value
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// Configuration field that failed validation
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Connection error
    #[error("Connection to {address} failed ({kind}): {reason}")]
    Connection {
        /// Server address the connection was made to
        address: String,
        /// Diagnostic category of the failure
        kind: FailureKind,
        /// Reason for connection failure
        reason: String,
        /// Delay before the next scheduled attempt, if any
        retry_in: Option<Duration>,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Encoding operation failed
    #[error("Encoding failed: {reason}")]
    EncodingFailed {
        /// Reason for failure
        reason: String,
    },

    /// Decoding operation failed
    #[error("Decoding failed: {reason}")]
    DecodingFailed {
        /// Reason for failure
        reason: String,
    },

    /// A recording session is already active
    #[error("Recording already active: {session_id}")]
    AlreadyRecording {
        /// Identifier of the active session
        session_id: String,
    },

    /// The recordings directory cannot be created or written
    #[error("Recording directory {path:?} unusable: {reason}")]
    RecordingDirectory {
        /// Directory that was rejected
        path: PathBuf,
        /// Reason for rejection
        reason: String,
    },

    /// A recording session was stopped by an I/O failure
    #[error("Recording {session_id} aborted after {frames_written} frames: {source}")]
    RecordingAborted {
        /// Identifier of the aborted session
        session_id: String,
        /// File holding the frames written before the failure
        path: PathBuf,
        /// Frames durably appended before the failure
        frames_written: u64,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The recorder worker is no longer running
    #[error("Recorder unavailable: {reason}")]
    RecorderUnavailable {
        /// Reason the worker could not be reached
        reason: String,
    },

    /// An uploaded recording was rejected
    #[error("Upload rejected: {reason}")]
    UploadRejected {
        /// Reason for rejection
        reason: String,
    },

    /// Plain I/O failure outside an active recording session
    #[error("I/O error during {operation}: {source}")]
    Io {
        /// Operation that failed
        operation: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

impl FrameLinkError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            FrameLinkError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            FrameLinkError::Connection { .. } => "CONNECTION_FAILED".to_string(),
            FrameLinkError::InvalidState { .. } => "INVALID_STATE".to_string(),
            FrameLinkError::EncodingFailed { .. } => "ENCODING_FAILED".to_string(),
            FrameLinkError::DecodingFailed { .. } => "DECODING_FAILED".to_string(),
            FrameLinkError::AlreadyRecording { .. } => "ALREADY_RECORDING".to_string(),
            FrameLinkError::RecordingDirectory { .. } => "RECORDING_DIRECTORY".to_string(),
            FrameLinkError::RecordingAborted { .. } => "RECORDING_ABORTED".to_string(),
            FrameLinkError::RecorderUnavailable { .. } => "RECORDER_UNAVAILABLE".to_string(),
            FrameLinkError::UploadRejected { .. } => "UPLOAD_REJECTED".to_string(),
            FrameLinkError::Io { .. } => "IO_ERROR".to_string(),
        }
    }

    /// Whether the failure is transient and will be retried automatically
    pub fn is_transient(&self) -> bool {
        matches!(self, FrameLinkError::Connection { .. })
    }
}
