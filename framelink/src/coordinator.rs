//! Per-tick frame assembly
//!
//! Each capture tick the coordinator decides whether a frame is due, picks
//! the quality tier, pulls the latest samples, encodes the frame once, and
//! hands the same bytes to the recorder and the transport. The two consumers
//! are independent: a dropped network frame is still recorded.

use crate::config::StreamConfig;
use crate::{
    BandwidthMonitor, Frame, FrameCodec, FrameId, FrameLinkError, FrameSink, ImageRequest,
    QualityController, QualityLevel, RecorderHandle, RecordingSummary, SampleSource,
    StreamTransport,
};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// What a produced tick did
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Sequence number of the frame
    pub sequence: u64,
    /// Quality tier the frame was built with
    pub level: QualityLevel,
    /// The frame
    pub frame: Frame,
    /// Encoded size in bytes
    pub encoded_len: usize,
    /// Whether the transport accepted the frame
    pub sent: bool,
    /// Whether the recorder accepted the frame
    pub recorded: bool,
}

/// Result of one capture tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Too early for the current tier's frame rate
    Skipped,
    /// A frame was built and handed off
    Produced(TickReport),
}

/// Orchestrates frame assembly, streaming, and recording
pub struct CaptureCoordinator {
    config: StreamConfig,
    source: Arc<dyn SampleSource>,
    sink: Arc<dyn FrameSink>,
    recorder: Option<RecorderHandle>,
    quality: QualityController,
    bandwidth: BandwidthMonitor,
    next_sequence: u64,
    last_frame_at: Option<Instant>,
    intrinsics_pending: bool,
    was_recording: bool,
}

impl std::fmt::Debug for CaptureCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureCoordinator")
            .field("device_id", &self.config.device_id)
            .field("level", &self.quality.current())
            .field("next_sequence", &self.next_sequence)
            .field("recording", &self.was_recording)
            .finish()
    }
}

impl CaptureCoordinator {
    /// Create a coordinator from its collaborators
    pub fn new(
        config: StreamConfig,
        source: Arc<dyn SampleSource>,
        sink: Arc<dyn FrameSink>,
        recorder: Option<RecorderHandle>,
    ) -> Result<Self, FrameLinkError> {
        config.validate()?;
        let quality = QualityController::new(config.quality_config());

        Ok(Self {
            config,
            source,
            sink,
            recorder,
            quality,
            bandwidth: BandwidthMonitor::default(),
            next_sequence: 0,
            last_frame_at: None,
            intrinsics_pending: true,
            was_recording: false,
        })
    }

    /// Build a transport, a recorder thread, and a coordinator wired to both
    ///
    /// The transport is returned unconnected.
    pub fn from_config(
        config: StreamConfig,
        source: Arc<dyn SampleSource>,
    ) -> Result<(Self, StreamTransport), FrameLinkError> {
        let transport = StreamTransport::new(config.transport_config())?;
        let recorder = RecorderHandle::spawn(config.recorder_config())?;
        let coordinator =
            Self::new(config, source, Arc::new(transport.clone()), Some(recorder))?;
        Ok((coordinator, transport))
    }

    /// Run one capture tick now
    pub fn tick(&mut self) -> Result<TickOutcome, FrameLinkError> {
        self.tick_at(Instant::now())
    }

    /// Run one capture tick at `now`
    pub fn tick_at(&mut self, now: Instant) -> Result<TickOutcome, FrameLinkError> {
        if let Some(last) = self.last_frame_at {
            let interval = self.quality.settings().frame_interval();
            if now.saturating_duration_since(last) < interval {
                return Ok(TickOutcome::Skipped);
            }
        }

        if self.quality.is_adaptive() {
            let mbps = self.bandwidth.current_bandwidth_mbps_at(now);
            self.quality.update(mbps);
        }

        let recording = self.recorder.as_ref().is_some_and(|r| r.is_recording());
        if recording && !self.was_recording {
            self.intrinsics_pending = true;
        }
        self.was_recording = recording;

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.last_frame_at = Some(now);

        let frame = self.assemble(sequence);
        let level = self.quality.current();
        let encoded = FrameCodec::encode(&frame)?;
        let encoded_len = encoded.len();

        let recorded = match &self.recorder {
            Some(recorder) if recording => recorder.write(encoded.clone()),
            _ => false,
        };
        let sent = self.sink.send_encoded(encoded);
        if sent {
            self.bandwidth.record_sent_at(now, encoded_len);
        }

        trace!(sequence, level = %level, bytes = encoded_len, sent, recorded, "Frame produced");
        Ok(TickOutcome::Produced(TickReport {
            sequence,
            level,
            frame,
            encoded_len,
            sent,
            recorded,
        }))
    }

    fn assemble(&mut self, sequence: u64) -> Frame {
        let settings = self.quality.settings();
        let timestamp_ns = Utc::now()
            .timestamp_nanos_opt()
            .and_then(|ns| u64::try_from(ns).ok())
            .unwrap_or(0);
        let mut builder = Frame::builder(FrameId::new(
            sequence,
            self.config.device_id.clone(),
            timestamp_ns,
        ));

        if self.config.send_image && settings.include_image {
            let request = ImageRequest {
                width: settings.width,
                height: settings.height,
                quality: settings.compression_quality,
            };
            if let Some(image) = self.source.current_image(&request) {
                builder = builder.image(image);
            }
        }
        if self.config.send_depth && settings.include_depth {
            if let Some(depth) = self.source.current_depth() {
                builder = builder.depth(depth);
            }
        }
        if self.config.send_pose {
            if let Some(pose) = self.source.current_pose() {
                builder = builder.pose(pose);
            }
        }
        if self.config.send_imu {
            if let Some(imu) = self.source.current_imu_sample() {
                builder = builder.imu(imu);
            }
        }
        if self.config.send_geometry {
            if let Some(geometry) = self.source.current_geometry() {
                builder = builder.geometry(geometry);
            }
        }
        if self.intrinsics_pending {
            if let Some(intrinsics) = self.source.camera_intrinsics() {
                builder = builder.intrinsics(intrinsics);
                self.intrinsics_pending = false;
            }
        }

        builder.build()
    }

    /// Tick at `max_fps` until `shutdown` resolves; returns frames produced
    pub async fn run<F>(&mut self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let period = Duration::from_secs(1) / self.config.max_fps.max(1);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            device_id = %self.config.device_id,
            tick = ?period,
            "Capture loop started"
        );
        let mut produced = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => match self.tick() {
                    Ok(TickOutcome::Produced(_)) => produced += 1,
                    Ok(TickOutcome::Skipped) => {}
                    Err(e) => warn!(error = %e, "Capture tick failed"),
                },
            }
        }
        info!(frames = produced, "Capture loop stopped");
        produced
    }

    /// Start recording; the next frame carries camera intrinsics again
    pub async fn start_recording(&mut self) -> Result<String, FrameLinkError> {
        let recorder = self.recorder()?;
        let session_id = recorder.start().await?;
        self.intrinsics_pending = true;
        self.was_recording = true;
        debug!(session_id = %session_id, "Recording attached to capture loop");
        Ok(session_id)
    }

    /// Stop recording after all queued frames are written
    pub async fn stop_recording(&mut self) -> Result<Option<RecordingSummary>, FrameLinkError> {
        let recorder = self.recorder()?;
        let summary = recorder.stop().await?;
        self.was_recording = false;
        Ok(summary)
    }

    fn recorder(&self) -> Result<RecorderHandle, FrameLinkError> {
        self.recorder
            .clone()
            .ok_or_else(|| FrameLinkError::RecorderUnavailable {
                reason: "coordinator has no recorder".to_string(),
            })
    }

    /// Whether frames are currently recorded
    pub fn is_recording(&self) -> bool {
        self.recorder.as_ref().is_some_and(|r| r.is_recording())
    }

    /// Sequence number of the next frame
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Current quality tier
    pub fn quality_level(&self) -> QualityLevel {
        self.quality.current()
    }

    /// Bandwidth estimate as of `now`
    pub fn bandwidth_mbps_at(&mut self, now: Instant) -> f64 {
        self.bandwidth.current_bandwidth_mbps_at(now)
    }

    /// Session configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}
