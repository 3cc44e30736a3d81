//! Capture coordinator tests with an in-memory sink and a scripted source

use bytes::Bytes;
use framelink::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sink that accepts frames only while "connected"
#[derive(Default)]
struct MemorySink {
    connected: AtomicBool,
    accepted: Mutex<Vec<Bytes>>,
    rejected: Mutex<u64>,
}

impl MemorySink {
    fn connected() -> Arc<Self> {
        let sink = Arc::new(Self::default());
        sink.set_connected(true);
        sink
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl FrameSink for MemorySink {
    fn send_encoded(&self, frame: Bytes) -> bool {
        if self.is_connected() {
            self.accepted.lock().push(frame);
            true
        } else {
            *self.rejected.lock() += 1;
            false
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Source with every modality; image size follows the requested resolution
struct TestSource;

impl SampleSource for TestSource {
    fn current_image(&self, request: &ImageRequest) -> Option<ImagePayload> {
        let len = (request.width * request.height / 10) as usize;
        Some(ImagePayload {
            data: Bytes::from(vec![0xFF; len]),
            format: ImageFormat::Jpeg,
            quality: request.quality,
            width: request.width,
            height: request.height,
        })
    }

    fn current_depth(&self) -> Option<DepthPayload> {
        Some(DepthPayload {
            data: Bytes::from(vec![0x01; 256 * 192 * 2]),
            format: DepthFormat::Uint16Millimeters,
            width: 256,
            height: 192,
        })
    }

    fn current_pose(&self) -> Option<Pose> {
        Some(Pose {
            position: [0.0, 1.5, 0.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
        })
    }

    fn current_imu_sample(&self) -> Option<ImuSample> {
        Some(ImuSample {
            timestamp_ns: 1,
            acceleration: [0.0, 0.0, 9.81],
            angular_velocity: [0.0; 3],
            gravity: [0.0, 0.0, -9.81],
        })
    }

    fn camera_intrinsics(&self) -> Option<CameraIntrinsics> {
        Some(CameraIntrinsics {
            fx: 1400.0,
            fy: 1400.0,
            cx: 960.0,
            cy: 720.0,
            width: 1920,
            height: 1440,
        })
    }
}

fn fixed_config(level: QualityLevel) -> StreamConfig {
    StreamConfig {
        adaptive_quality: false,
        fixed_quality: level,
        ..StreamConfig::default()
    }
}

fn produced(outcome: TickOutcome) -> TickReport {
    match outcome {
        TickOutcome::Produced(report) => report,
        TickOutcome::Skipped => panic!("tick was skipped"),
    }
}

fn coordinator(
    config: StreamConfig,
    sink: Arc<MemorySink>,
    recorder: Option<RecorderHandle>,
) -> CaptureCoordinator {
    CaptureCoordinator::new(config, Arc::new(TestSource), sink, recorder).unwrap()
}

// ============================================================================
// TICKS
// ============================================================================

#[test]
fn test_sequence_increments_once_per_produced_tick() {
    let sink = MemorySink::connected();
    let mut coordinator = coordinator(fixed_config(QualityLevel::Low), sink.clone(), None);
    let t0 = Instant::now();
    let interval = Duration::from_secs(1) / 30;

    let mut sequences = Vec::new();
    for i in 0..12u32 {
        // Alternate link state; sequence numbers must not care.
        sink.set_connected(i % 3 != 0);
        let report = produced(coordinator.tick_at(t0 + interval * i).unwrap());
        assert_eq!(report.sent, i % 3 != 0);
        sequences.push(report.sequence);
    }

    assert_eq!(sequences, (0..12).collect::<Vec<u64>>());
    assert_eq!(coordinator.next_sequence(), 12);
    assert_eq!(sink.accepted.lock().len(), 8);
    assert_eq!(*sink.rejected.lock(), 4);
}

#[test]
fn test_ticks_under_interval_are_skipped() {
    let sink = MemorySink::connected();
    let config = StreamConfig {
        target_fps: 10,
        ..fixed_config(QualityLevel::Full)
    };
    let mut coordinator = coordinator(config, sink, None);
    let t0 = Instant::now();

    assert!(matches!(coordinator.tick_at(t0).unwrap(), TickOutcome::Produced(_)));
    assert_eq!(
        coordinator.tick_at(t0 + Duration::from_millis(50)).unwrap(),
        TickOutcome::Skipped
    );
    assert_eq!(
        coordinator.tick_at(t0 + Duration::from_millis(99)).unwrap(),
        TickOutcome::Skipped
    );
    let report = produced(coordinator.tick_at(t0 + Duration::from_millis(100)).unwrap());
    assert_eq!(report.sequence, 1);
}

#[test]
fn test_disconnected_adaptive_session_drops_to_minimal() {
    let sink = Arc::new(MemorySink::default());
    let mut coordinator = coordinator(StreamConfig::default(), sink, None);

    let report = produced(coordinator.tick_at(Instant::now()).unwrap());
    assert_eq!(report.level, QualityLevel::Minimal);
    assert!(!report.sent);
    assert!(report.frame.depth.is_none());

    let image = report.frame.image.as_ref().unwrap();
    assert_eq!((image.width, image.height), (480, 360));
    assert_eq!(image.quality, 50);
    assert!(report.frame.pose.is_some());
    assert!(report.frame.imu.is_some());
}

#[test]
fn test_quality_follows_sent_bandwidth() {
    let sink = MemorySink::connected();
    let mut coordinator = coordinator(StreamConfig::default(), sink.clone(), None);
    let t0 = Instant::now();

    // Large frames at a steady rate push the estimate past every threshold.
    let mut now = t0;
    let mut last = None;
    for _ in 0..30 {
        if let TickOutcome::Produced(report) = coordinator.tick_at(now).unwrap() {
            last = Some(report);
        }
        now += Duration::from_millis(50);
    }
    let report = last.unwrap();
    assert_eq!(report.level, QualityLevel::Full);
    assert!(report.frame.depth.is_some());

    // Link drops; once the window empties the next frame omits depth.
    sink.set_connected(false);
    let report = produced(coordinator.tick_at(now + Duration::from_secs(6)).unwrap());
    assert_eq!(report.level, QualityLevel::Minimal);
    assert!(report.frame.depth.is_none());
    assert!(!report.sent);
}

#[test]
fn test_feature_flags_gate_payloads() {
    let sink = MemorySink::connected();
    let config = StreamConfig {
        send_image: false,
        send_imu: false,
        ..fixed_config(QualityLevel::High)
    };
    let mut coordinator = coordinator(config, sink, None);

    let frame = produced(coordinator.tick_at(Instant::now()).unwrap()).frame;
    assert!(frame.image.is_none());
    assert!(frame.imu.is_none());
    assert!(frame.depth.is_some());
    assert!(frame.pose.is_some());
}

#[test]
fn test_encoded_bytes_match_frame() {
    let sink = MemorySink::connected();
    let mut coordinator = coordinator(fixed_config(QualityLevel::Medium), sink.clone(), None);

    let report = produced(coordinator.tick_at(Instant::now()).unwrap());
    let sent = sink.accepted.lock()[0].clone();
    assert_eq!(sent.len(), report.encoded_len);
    assert_eq!(FrameCodec::decode(&sent).unwrap(), report.frame);
}

#[test]
fn test_intrinsics_sent_once_per_session() {
    let sink = MemorySink::connected();
    let mut coordinator = coordinator(fixed_config(QualityLevel::Full), sink, None);
    let t0 = Instant::now();

    let first = produced(coordinator.tick_at(t0).unwrap());
    assert!(first.frame.intrinsics.is_some());

    for i in 1..5 {
        let report = produced(coordinator.tick_at(t0 + Duration::from_millis(40 * i)).unwrap());
        assert!(report.frame.intrinsics.is_none());
    }
}

// ============================================================================
// RECORDING
// ============================================================================

#[tokio::test]
async fn test_recording_continues_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecorderHandle::spawn(RecorderConfig::new(dir.path())).unwrap();
    let sink = Arc::new(MemorySink::default());
    let mut coordinator = coordinator(fixed_config(QualityLevel::Low), sink.clone(), Some(recorder));
    let t0 = Instant::now();

    coordinator.start_recording().await.unwrap();
    assert!(coordinator.is_recording());

    for i in 0..5u32 {
        let report = produced(coordinator.tick_at(t0 + Duration::from_millis(40) * i).unwrap());
        assert!(!report.sent);
        assert!(report.recorded);
    }
    let summary = coordinator.stop_recording().await.unwrap().unwrap();

    assert_eq!(summary.frame_count, 5);
    assert_eq!(*sink.rejected.lock(), 5);
    let frames = read_recording(&summary.path).unwrap();
    let sequences: Vec<u64> = frames.iter().map(|f| f.sequence()).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_recording_start_resends_intrinsics() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecorderHandle::spawn(RecorderConfig::new(dir.path())).unwrap();
    let sink = MemorySink::connected();
    let mut coordinator = coordinator(fixed_config(QualityLevel::Full), sink, Some(recorder));
    let t0 = Instant::now();

    assert!(produced(coordinator.tick_at(t0).unwrap()).frame.intrinsics.is_some());
    let second = produced(coordinator.tick_at(t0 + Duration::from_millis(40)).unwrap());
    assert!(second.frame.intrinsics.is_none());
    assert!(!second.recorded);

    coordinator.start_recording().await.unwrap();
    let third = produced(coordinator.tick_at(t0 + Duration::from_millis(80)).unwrap());
    assert!(third.frame.intrinsics.is_some());
    assert!(third.recorded);

    let summary = coordinator.stop_recording().await.unwrap().unwrap();
    let frames = read_recording(&summary.path).unwrap();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].intrinsics.is_some());
}

#[tokio::test]
async fn test_recording_without_recorder_is_an_error() {
    let mut coordinator = coordinator(StreamConfig::default(), MemorySink::connected(), None);
    let err = coordinator.start_recording().await.unwrap_err();
    assert_eq!(err.error_code(), "RECORDER_UNAVAILABLE");
}

// ============================================================================
// RUN LOOP
// ============================================================================

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let sink = MemorySink::connected();
    let config = StreamConfig {
        max_fps: 50,
        target_fps: 50,
        ..fixed_config(QualityLevel::Full)
    };
    let mut coordinator = coordinator(config, sink.clone(), None);

    let produced = coordinator
        .run(tokio::time::sleep(Duration::from_millis(200)))
        .await;

    assert!(produced > 0);
    assert_eq!(coordinator.next_sequence(), produced);
    assert_eq!(sink.accepted.lock().len() as u64, produced);
}
