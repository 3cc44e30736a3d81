//! # framelink recorder
//!
//! Durable local recording of frames. [`FrameRecorder`] appends
//! length-prefixed records with crash-safe truncation, [`RecorderHandle`]
//! runs it on a dedicated I/O thread, and [`UploadValidator`] checks
//! recordings handed back in for replay.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod recorder;
pub mod upload;
pub mod worker;

// Re-export main types
pub use recorder::{FrameRecorder, RecorderConfig, RecordingSummary, RECORDING_EXTENSION};
pub use upload::{StoredUpload, UploadResponse, UploadValidator};
pub use worker::{RecorderHandle, RecordingFailure};
