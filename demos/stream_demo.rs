//! Stream and record synthetic frames
//!
//! ```text
//! cargo run --example stream_demo -- ws://127.0.0.1:8765/stream
//! ```
//!
//! Without a reachable server the transport keeps retrying in the background
//! while every frame is still recorded.

use anyhow::Context;
use bytes::Bytes;
use framelink::{
    init_logging, read_recording, CameraIntrinsics, CaptureCoordinator, ConnectionAnalyzer,
    DepthFormat, DepthPayload, ImageFormat, ImagePayload, ImageRequest, ImuSample, Pose,
    SampleSource, StreamConfig,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sensor source producing noise images and a device walking in a circle
struct SyntheticSource {
    started: Instant,
    rng: Mutex<StdRng>,
}

impl SyntheticSource {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    fn noise(&self, len: usize) -> Bytes {
        let mut data = vec![0u8; len];
        self.rng.lock().fill(&mut data[..]);
        Bytes::from(data)
    }
}

impl SampleSource for SyntheticSource {
    fn current_image(&self, request: &ImageRequest) -> Option<ImagePayload> {
        // Roughly what a JPEG of this size and quality weighs.
        let len = (request.width * request.height) as usize * request.quality as usize / 1000;
        Some(ImagePayload {
            data: self.noise(len),
            format: ImageFormat::Jpeg,
            quality: request.quality,
            width: request.width,
            height: request.height,
        })
    }

    fn current_depth(&self) -> Option<DepthPayload> {
        Some(DepthPayload {
            data: self.noise(256 * 192 * 2),
            format: DepthFormat::Uint16Millimeters,
            width: 256,
            height: 192,
        })
    }

    fn current_pose(&self) -> Option<Pose> {
        let t = self.started.elapsed().as_secs_f32();
        let (sin, cos) = (t * 0.5).sin_cos();
        Some(Pose {
            position: [cos * 2.0, 1.5, sin * 2.0],
            rotation: [0.0, (t * 0.25).sin(), 0.0, (t * 0.25).cos()],
        })
    }

    fn current_imu_sample(&self) -> Option<ImuSample> {
        let jitter: f32 = self.rng.lock().gen_range(-0.05..0.05);
        Some(ImuSample {
            timestamp_ns: self.started.elapsed().as_nanos() as u64,
            acceleration: [jitter, 9.81 + jitter, jitter],
            angular_velocity: [0.0, 0.5, 0.0],
            gravity: [0.0, -9.81, 0.0],
        })
    }

    fn camera_intrinsics(&self) -> Option<CameraIntrinsics> {
        Some(CameraIntrinsics {
            fx: 1450.0,
            fy: 1450.0,
            cx: 960.0,
            cy: 720.0,
            width: 1920,
            height: 1440,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(None)?;

    let mut config = StreamConfig::default();
    if let Some(url) = std::env::args().nth(1) {
        config.server_url = url;
    }
    config.recordings_dir = std::env::temp_dir().join("framelink-demo");
    config.validate()?;

    let source = Arc::new(SyntheticSource::new());
    let (mut coordinator, transport) = CaptureCoordinator::from_config(config, source)?;
    let (analyzer, _observer) = ConnectionAnalyzer::attach(&transport, 128);

    if let Err(e) = transport.connect().await {
        println!("Initial connection failed, retrying in background: {}", e);
    }

    let session_id = coordinator.start_recording().await?;
    println!("Recording session {}", session_id);

    let frames = coordinator
        .run(tokio::time::sleep(Duration::from_secs(5)))
        .await;

    let summary = coordinator
        .stop_recording()
        .await?
        .context("recording was not active")?;
    transport.disconnect().await;

    let replayed = read_recording(&summary.path)?;
    println!(
        "Produced {} frames, recorded {} ({} bytes) to {}",
        frames,
        summary.frame_count,
        summary.bytes_written,
        summary.path.display()
    );
    println!("Replayed {} frames from disk", replayed.len());
    println!("Transport: {:?}", transport.stats());
    println!("{}", analyzer.lock().report().to_json_pretty()?);

    Ok(())
}
