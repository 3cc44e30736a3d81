//! # framelink - multi-modal sensor frame streaming
//!
//! framelink streams synchronized sensor frames (image, depth, pose, IMU,
//! inferred geometry) from a capture device to a remote consumer over a
//! persistent WebSocket, while recording the same frames to a crash-safe
//! local log for replay.
//!
//! ## Key Features
//!
//! - **Self-healing transport**: capped exponential backoff reconnects and
//!   observable connection status
//! - **Adaptive quality**: bandwidth-driven quality tiers
//! - **Crash-safe recording**: length-prefixed records that never leave a
//!   corrupt tail
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use framelink::{CachedSampleSource, CaptureCoordinator, StreamConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), framelink::FrameLinkError> {
//!     let config = StreamConfig::from_json(r#"{ "server_url": "ws://10.0.0.2:8765/stream" }"#)?;
//!     let source = Arc::new(CachedSampleSource::new());
//!
//!     let (mut coordinator, transport) = CaptureCoordinator::from_config(config, source)?;
//!     let _ = transport.connect().await;
//!     coordinator.start_recording().await?;
//!
//!     coordinator.run(tokio::time::sleep(std::time::Duration::from_secs(10))).await;
//!     coordinator.stop_recording().await?;
//!     transport.disconnect().await;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use framelink_core::{
    codec, encode_frame_record, read_recording, CameraIntrinsics, ConnectionStatus, DepthFormat,
    DepthPayload, FailureKind, Frame, FrameBuilder, FrameCodec, FrameId, FrameLinkError,
    FrameSink, Geometry, ImageFormat, ImagePayload, ImuSample, ObserverId, Plane, PlaneAlignment,
    Pose, RecordReader, ReconnectBackoff, StreamTransport, TransportConfig, TransportState,
    TransportStats,
};

pub use framelink_media::{
    BandwidthMonitor, CachedSampleSource, CapturedImage, ImageRequest, LatestSample,
    QualityControlConfig, QualityController, QualityLevel, QualityMode, QualitySettings,
    SampleSource,
};

pub use framelink_recorder::{
    FrameRecorder, RecorderConfig, RecorderHandle, RecordingFailure, RecordingSummary,
    UploadResponse, UploadValidator, RECORDING_EXTENSION,
};

#[cfg(feature = "diagnostics")]
pub use framelink_diagnostics::{init_logging, ConnectionAnalyzer, ConnectionReport};

// Public API modules
pub mod config;
pub mod coordinator;

// Re-export main API types
pub use config::StreamConfig;
pub use coordinator::{CaptureCoordinator, TickOutcome, TickReport};
