//! Length-prefixed record envelope used by recordings
//!
//! ```text
//! repeated {
//!   u32   length       (big-endian)
//!   bytes frame_data   (length bytes)
//! }
//! ```
//!
//! There is no header, footer, or checksum. A reader stops at EOF or at the
//! first record whose declared length runs past EOF; both are a clean end.

use super::FrameCodec;
use crate::error::FrameLinkError;
use crate::frame::Frame;
use bytes::{BufMut, BytesMut};
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;

/// Size of the length prefix in bytes
pub const RECORD_HEADER_LEN: usize = 4;

/// Build one contiguous record: length prefix followed by the payload
///
/// Keeping prefix and payload in a single buffer means a write can never be
/// split inside the length field.
pub fn encode_record(payload: &[u8]) -> Result<BytesMut, FrameLinkError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameLinkError::EncodingFailed {
        reason: format!("Record of {} bytes exceeds the u32 length prefix", payload.len()),
    })?;

    let mut buf = BytesMut::with_capacity(RECORD_HEADER_LEN + payload.len());
    buf.put_u32(len);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Encode a frame straight into a record
pub fn encode_frame_record(frame: &Frame) -> Result<BytesMut, FrameLinkError> {
    let mut buf = BytesMut::with_capacity(RECORD_HEADER_LEN + FrameCodec::frame_length(frame));
    buf.put_u32(0);
    FrameCodec::encode_into(frame, &mut buf)?;

    let len = u32::try_from(buf.len() - RECORD_HEADER_LEN).map_err(|_| {
        FrameLinkError::EncodingFailed {
            reason: format!("Record of {} bytes exceeds the u32 length prefix", buf.len()),
        }
    })?;
    buf[..RECORD_HEADER_LEN].copy_from_slice(&len.to_be_bytes());
    Ok(buf)
}

/// Iterator over the raw records of a recording
#[derive(Debug)]
pub struct RecordReader<R> {
    inner: R,
    records_read: u64,
    bytes_consumed: u64,
    trailing_bytes: u64,
    finished: bool,
}

impl<R: Read> RecordReader<R> {
    /// Wrap a byte source
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            records_read: 0,
            bytes_consumed: 0,
            trailing_bytes: 0,
            finished: false,
        }
    }

    /// Complete records returned so far
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Bytes belonging to complete records
    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    /// Bytes of an incomplete trailing record that were ignored
    pub fn trailing_bytes(&self) -> u64 {
        self.trailing_bytes
    }

    fn read_record(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        let got = read_fully(&mut self.inner, &mut header)?;
        if got < RECORD_HEADER_LEN {
            self.trailing_bytes = got as u64;
            return Ok(None);
        }

        let len = u32::from_be_bytes(header) as usize;
        let mut payload = Vec::new();
        let got = (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut payload)?;
        if got < len {
            self.trailing_bytes = (RECORD_HEADER_LEN + got) as u64;
            return Ok(None);
        }

        self.records_read += 1;
        self.bytes_consumed += (RECORD_HEADER_LEN + len) as u64;
        Ok(Some(payload))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Vec<u8>, FrameLinkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(FrameLinkError::Io {
                    operation: "read recording".to_string(),
                    source: e,
                }))
            }
        }
    }
}

/// Decode every complete frame of the recording at `path`
pub fn read_recording(path: impl AsRef<Path>) -> Result<Vec<Frame>, FrameLinkError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| FrameLinkError::Io {
        operation: format!("open {}", path.display()),
        source: e,
    })?;

    RecordReader::new(BufReader::new(file))
        .map(|record| record.and_then(|bytes| FrameCodec::decode(&bytes)))
        .collect()
}

fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
