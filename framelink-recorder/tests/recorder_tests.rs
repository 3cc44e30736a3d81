//! Tests for the frame recorder, its I/O thread, and upload validation

use bytes::Bytes;
use framelink_core::codec::record::RecordReader;
use framelink_core::*;
use framelink_recorder::*;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

fn pose_frame(sequence: u64) -> Frame {
    Frame::builder(FrameId::new(sequence, "recorder-test", sequence * 33_000_000))
        .pose(Pose {
            position: [sequence as f32, 1.0, 2.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
        })
        .build()
}

fn record_lengths(data: &[u8]) -> Vec<usize> {
    RecordReader::new(data).map(|r| r.unwrap().len()).collect()
}

fn append_junk(path: &Path, junk: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(junk).unwrap();
}

// ============================================================================
// FRAME RECORDER
// ============================================================================

#[test]
fn test_three_frames_produce_462_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = FrameRecorder::new(RecorderConfig::new(dir.path()));

    let session_id = recorder.start_recording().unwrap();
    assert!(recorder.is_recording());
    assert_eq!(recorder.session_id(), Some(session_id.as_str()));

    for size in [100usize, 200, 150] {
        assert!(recorder.write_encoded(&vec![0x5A; size]).unwrap());
    }
    let summary = recorder.stop_recording().unwrap().unwrap();

    assert_eq!(summary.session_id, session_id);
    assert_eq!(summary.frame_count, 3);
    assert_eq!(summary.bytes_written, 462);
    assert!(!recorder.is_recording());

    let data = fs::read(&summary.path).unwrap();
    assert_eq!(data.len(), 462);
    assert_eq!(record_lengths(&data), vec![100, 200, 150]);
}

#[test]
fn test_recorded_frames_decode_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = FrameRecorder::new(RecorderConfig::new(dir.path()));

    recorder.start_recording().unwrap();
    for sequence in 0..10 {
        assert!(recorder.write_frame(&pose_frame(sequence)).unwrap());
    }
    let summary = recorder.stop_recording().unwrap().unwrap();

    let frames = read_recording(&summary.path).unwrap();
    let expected: Vec<Frame> = (0..10).map(pose_frame).collect();
    assert_eq!(frames, expected);
}

#[test]
fn test_crash_at_any_offset_leaves_clean_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = FrameRecorder::new(RecorderConfig::new(dir.path()));

    recorder.start_recording().unwrap();
    let mut boundaries = vec![0u64];
    for sequence in 0..6 {
        recorder.write_frame(&pose_frame(sequence)).unwrap();
        boundaries.push(recorder.last_good_position());
    }
    let summary = recorder.stop_recording().unwrap().unwrap();
    let data = fs::read(&summary.path).unwrap();

    // A crash persists some prefix of the bytes written.
    for cut in 0..=data.len() {
        let mut reader = RecordReader::new(&data[..cut]);
        let frames: Vec<Frame> = reader
            .by_ref()
            .map(|r| FrameCodec::decode(&r.unwrap()).unwrap())
            .collect();

        let complete = boundaries.iter().filter(|b| **b <= cut as u64).count() - 1;
        assert_eq!(frames.len(), complete, "cut at {}", cut);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.sequence(), i as u64);
        }
        assert_eq!(
            reader.bytes_consumed(),
            boundaries[complete],
            "cut at {}",
            cut
        );
    }
}

#[test]
fn test_stop_truncates_partial_write() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = FrameRecorder::new(RecorderConfig::new(dir.path()));

    recorder.start_recording().unwrap();
    for sequence in 0..4 {
        recorder.write_frame(&pose_frame(sequence)).unwrap();
    }
    let good = recorder.last_good_position();
    let path = recorder.current_path().unwrap().to_path_buf();

    // Half a record: a length prefix promising more than follows.
    append_junk(&path, &[0, 0, 1, 0, 0xDE, 0xAD]);
    assert_eq!(fs::metadata(&path).unwrap().len(), good + 6);

    let summary = recorder.stop_recording().unwrap().unwrap();
    assert_eq!(summary.frame_count, 4);
    assert_eq!(fs::metadata(&path).unwrap().len(), good);
    assert_eq!(read_recording(&path).unwrap().len(), 4);
}

#[test]
fn test_next_write_heals_partial_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = FrameRecorder::new(RecorderConfig::new(dir.path()));

    recorder.start_recording().unwrap();
    recorder.write_frame(&pose_frame(0)).unwrap();
    let path = recorder.current_path().unwrap().to_path_buf();
    append_junk(&path, &[0, 0]);

    recorder.write_frame(&pose_frame(1)).unwrap();
    recorder.stop_recording().unwrap();

    let frames = read_recording(&path).unwrap();
    assert_eq!(frames, vec![pose_frame(0), pose_frame(1)]);
}

#[test]
fn test_double_start_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = FrameRecorder::new(RecorderConfig::new(dir.path()));

    let session_id = recorder.start_recording().unwrap();
    match recorder.start_recording() {
        Err(FrameLinkError::AlreadyRecording { session_id: active }) => {
            assert_eq!(active, session_id)
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(recorder.session_id(), Some(session_id.as_str()));
}

#[test]
fn test_unusable_directory_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-directory");
    fs::write(&blocker, b"x").unwrap();

    let mut recorder = FrameRecorder::new(RecorderConfig::new(blocker.join("recordings")));
    let err = recorder.start_recording().unwrap_err();
    assert_eq!(err.error_code(), "RECORDING_DIRECTORY");
    assert!(!recorder.is_recording());
}

#[test]
fn test_directory_is_created_on_demand() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let mut recorder = FrameRecorder::new(RecorderConfig::new(&nested));

    recorder.start_recording().unwrap();
    assert!(nested.is_dir());
    recorder.stop_recording().unwrap();
}

#[test]
fn test_restart_opens_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = FrameRecorder::new(RecorderConfig::new(dir.path()));

    recorder.start_recording().unwrap();
    recorder.write_frame(&pose_frame(0)).unwrap();
    let first = recorder.stop_recording().unwrap().unwrap();

    recorder.start_recording().unwrap();
    assert_eq!(recorder.frame_count(), 0);
    assert_eq!(recorder.last_good_position(), 0);
    let second = recorder.stop_recording().unwrap().unwrap();

    assert_ne!(first.path, second.path);
    assert_eq!(second.bytes_written, 0);
}

#[test]
fn test_drop_closes_recording_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = {
        let mut recorder = FrameRecorder::new(RecorderConfig::new(dir.path()));
        recorder.start_recording().unwrap();
        recorder.write_frame(&pose_frame(0)).unwrap();
        let path = recorder.current_path().unwrap().to_path_buf();
        append_junk(&path, &[9, 9, 9]);
        path
    };

    assert_eq!(read_recording(&path).unwrap(), vec![pose_frame(0)]);
    let record_len = encode_frame_record(&pose_frame(0)).unwrap().len() as u64;
    assert_eq!(fs::metadata(&path).unwrap().len(), record_len);
}

// ============================================================================
// RECORDER THREAD
// ============================================================================

#[tokio::test]
async fn test_handle_records_queued_frames() {
    let dir = tempfile::tempdir().unwrap();
    let handle = RecorderHandle::spawn(RecorderConfig::new(dir.path())).unwrap();

    assert!(!handle.write(Bytes::from_static(b"ignored")));
    handle.start().await.unwrap();
    assert!(handle.is_recording());

    let mut accepted = 0;
    for sequence in 0..20 {
        if handle.write(FrameCodec::encode(&pose_frame(sequence)).unwrap()) {
            accepted += 1;
        }
    }
    let summary = handle.stop().await.unwrap().unwrap();

    assert!(!handle.is_recording());
    assert_eq!(summary.frame_count, accepted);
    assert_eq!(accepted + handle.frames_dropped(), 20);
    assert_eq!(handle.frames_written(), accepted);
    assert!(handle.take_failure().is_none());

    let frames = read_recording(&summary.path).unwrap();
    assert_eq!(frames.len() as u64, accepted);
    for pair in frames.windows(2) {
        assert!(pair[0].sequence() < pair[1].sequence());
    }
}

#[tokio::test]
async fn test_handle_rejects_second_start() {
    let dir = tempfile::tempdir().unwrap();
    let handle = RecorderHandle::spawn(RecorderConfig::new(dir.path())).unwrap();

    handle.start().await.unwrap();
    let err = handle.start().await.unwrap_err();
    assert_eq!(err.error_code(), "ALREADY_RECORDING");
    assert!(handle.is_recording());

    handle.stop().await.unwrap();
    assert!(handle.stop().await.unwrap().is_none());
}

#[tokio::test]
async fn test_handle_reports_directory_failure() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    fs::write(&blocker, b"x").unwrap();

    let handle = RecorderHandle::spawn(RecorderConfig::new(blocker.join("sub"))).unwrap();
    assert!(handle.start().await.is_err());
    assert!(!handle.is_recording());
}

// ============================================================================
// UPLOAD VALIDATION
// ============================================================================

fn recording_bytes(frames: u64) -> Vec<u8> {
    let mut data = Vec::new();
    for sequence in 0..frames {
        data.extend_from_slice(&encode_frame_record(&pose_frame(sequence)).unwrap());
    }
    data
}

#[test]
fn test_upload_accepts_recording() {
    let dir = tempfile::tempdir().unwrap();
    let validator = UploadValidator::new(dir.path().join("uploads"));

    let response = validator.accept("session.flrec", &recording_bytes(3));
    assert!(response.success);
    assert_eq!(response.frames, Some(3));
    assert!(validator.upload_dir().join("session.flrec").is_file());

    let json: serde_json::Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["frames"], 3);
}

#[test]
fn test_upload_rejects_wrong_extension() {
    let dir = tempfile::tempdir().unwrap();
    let validator = UploadValidator::new(dir.path());

    let response = validator.accept("session.mp4", &recording_bytes(1));
    assert!(!response.success);
    assert!(response.frames.is_none());
    assert!(response.message.contains(".flrec"));

    let json = response.to_json().unwrap();
    assert!(!json.contains("frames"));
}

#[test]
fn test_upload_rejects_empty_recording() {
    let dir = tempfile::tempdir().unwrap();
    let validator = UploadValidator::new(dir.path());

    let err = validator.store("empty.flrec", &[0, 0]).unwrap_err();
    assert_eq!(err.error_code(), "UPLOAD_REJECTED");
}

#[test]
fn test_upload_strips_directories_from_name() {
    let dir = tempfile::tempdir().unwrap();
    let uploads = dir.path().join("uploads");
    let validator = UploadValidator::new(&uploads);

    let mut data = recording_bytes(2);
    data.extend_from_slice(&[0, 0, 0, 50, 1]);
    let stored = validator.store("../../escape.FLREC", &data).unwrap();

    assert_eq!(stored.path, uploads.join("escape.FLREC"));
    assert_eq!(stored.frames, 2);
    assert_eq!(stored.trailing_bytes, 5);
}
