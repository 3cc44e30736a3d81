//! Validation of uploaded recordings
//!
//! Dashboards hand over a recording file by name and content; the validator
//! checks the extension, scans the records, stores the file, and answers with
//! a small JSON document.

use crate::recorder::RECORDING_EXTENSION;
use framelink_core::codec::record::RecordReader;
use framelink_core::FrameLinkError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// JSON answer to an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Whether the upload was accepted
    pub success: bool,
    /// Human readable outcome
    pub message: String,
    /// Complete frames found in the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<u64>,
}

impl UploadResponse {
    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, FrameLinkError> {
        serde_json::to_string(self).map_err(|e| FrameLinkError::EncodingFailed {
            reason: e.to_string(),
        })
    }
}

/// Stored upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Where the file was written
    pub path: PathBuf,
    /// Complete frames in the file
    pub frames: u64,
    /// Bytes of an incomplete trailing record that were ignored
    pub trailing_bytes: u64,
}

/// Accepts recording uploads into a directory
#[derive(Debug, Clone)]
pub struct UploadValidator {
    upload_dir: PathBuf,
}

impl UploadValidator {
    /// Validator storing accepted files in `upload_dir`
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    /// Validate and store an upload, answering with a response either way
    pub fn accept(&self, file_name: &str, data: &[u8]) -> UploadResponse {
        match self.store(file_name, data) {
            Ok(stored) => UploadResponse {
                success: true,
                message: format!("stored {} frames", stored.frames),
                frames: Some(stored.frames),
            },
            Err(e) => {
                warn!(file_name, error = %e, "Upload rejected");
                UploadResponse {
                    success: false,
                    message: e.to_string(),
                    frames: None,
                }
            }
        }
    }

    /// Validate and store an upload
    pub fn store(&self, file_name: &str, data: &[u8]) -> Result<StoredUpload, FrameLinkError> {
        let name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| FrameLinkError::UploadRejected {
                reason: format!("invalid file name {:?}", file_name),
            })?;

        let has_extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(RECORDING_EXTENSION));
        if !has_extension {
            return Err(FrameLinkError::UploadRejected {
                reason: format!("expected a .{} file, got {:?}", RECORDING_EXTENSION, name),
            });
        }

        let mut reader = RecordReader::new(data);
        let mut frames = 0;
        for record in reader.by_ref() {
            record?;
            frames += 1;
        }
        if frames == 0 {
            return Err(FrameLinkError::UploadRejected {
                reason: "recording contains no complete frames".to_string(),
            });
        }

        fs::create_dir_all(&self.upload_dir).map_err(|e| FrameLinkError::Io {
            operation: format!("create {}", self.upload_dir.display()),
            source: e,
        })?;
        let path = self.upload_dir.join(name);
        fs::write(&path, data).map_err(|e| FrameLinkError::Io {
            operation: format!("write {}", path.display()),
            source: e,
        })?;

        info!(
            path = %path.display(),
            frames,
            trailing_bytes = reader.trailing_bytes(),
            "Upload stored"
        );
        Ok(StoredUpload {
            path,
            frames,
            trailing_bytes: reader.trailing_bytes(),
        })
    }

    /// Directory accepted uploads are written to
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }
}
