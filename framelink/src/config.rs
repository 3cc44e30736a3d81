//! Configuration types and defaults

use crate::{
    FrameLinkError, QualityControlConfig, QualityLevel, QualityMode, RecorderConfig,
    TransportConfig,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Session configuration for streaming and recording
///
/// Every field has a default, so a JSON document only needs the values it
/// changes. The configuration is read once when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// WebSocket URL of the consumer
    pub server_url: String,
    /// Identifier stamped on every frame
    pub device_id: String,
    /// Frame rate used when adaptive quality is off
    pub target_fps: u32,
    /// Lower frame rate bound
    pub min_fps: u32,
    /// Upper frame rate bound, also the capture tick rate
    pub max_fps: u32,
    /// Select the quality tier from measured bandwidth
    pub adaptive_quality: bool,
    /// Tier used when adaptive quality is off
    pub fixed_quality: QualityLevel,
    /// Compression quality used when adaptive quality is off (1-100)
    pub compression_quality: u8,
    /// Include camera images
    pub send_image: bool,
    /// Include depth maps
    pub send_depth: bool,
    /// Include inferred geometry
    pub send_geometry: bool,
    /// Include device pose
    pub send_pose: bool,
    /// Include motion samples
    pub send_imu: bool,
    /// Reconnect automatically after failures
    pub auto_reconnect: bool,
    /// Upper bound on one connection attempt in milliseconds
    pub connect_timeout_ms: u64,
    /// Keepalive ping interval in milliseconds
    pub keepalive_interval_ms: u64,
    /// Outbound frames buffered before new frames are dropped
    pub send_queue_capacity: usize,
    /// Directory recordings are written to
    pub recordings_dir: PathBuf,
    /// Force a data sync after this many recorded frames
    pub sync_every_frames: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8765/stream".to_string(),
            device_id: "framelink-device".to_string(),
            target_fps: 30,
            min_fps: 1,
            max_fps: 30,
            adaptive_quality: true,
            fixed_quality: QualityLevel::Full,
            compression_quality: 80,
            send_image: true,
            send_depth: true,
            send_geometry: true,
            send_pose: true,
            send_imu: true,
            auto_reconnect: true,
            connect_timeout_ms: 5000,
            keepalive_interval_ms: 10_000,
            send_queue_capacity: 4,
            recordings_dir: PathBuf::from("recordings"),
            sync_every_frames: 30,
        }
    }
}

impl StreamConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, FrameLinkError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| FrameLinkError::InvalidConfiguration {
                field: "json".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values and their relations
    pub fn validate(&self) -> Result<(), FrameLinkError> {
        let invalid = |field: &str, reason: String| FrameLinkError::InvalidConfiguration {
            field: field.to_string(),
            reason,
        };

        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(invalid(
                "server_url",
                format!("expected a ws:// or wss:// URL, got {:?}", self.server_url),
            ));
        }
        if self.device_id.is_empty() {
            return Err(invalid("device_id", "must not be empty".to_string()));
        }
        if self.min_fps == 0 {
            return Err(invalid("min_fps", "must be at least 1".to_string()));
        }
        if !(self.min_fps <= self.target_fps && self.target_fps <= self.max_fps) {
            return Err(invalid(
                "target_fps",
                format!(
                    "expected min_fps <= target_fps <= max_fps, got {} <= {} <= {}",
                    self.min_fps, self.target_fps, self.max_fps
                ),
            ));
        }
        if !(1..=100).contains(&self.compression_quality) {
            return Err(invalid(
                "compression_quality",
                format!("expected 1..=100, got {}", self.compression_quality),
            ));
        }
        if self.send_queue_capacity == 0 {
            return Err(invalid("send_queue_capacity", "must be at least 1".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(invalid("connect_timeout_ms", "must be greater than zero".to_string()));
        }
        if self.keepalive_interval_ms == 0 {
            return Err(invalid(
                "keepalive_interval_ms",
                "must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Transport settings
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            server_url: self.server_url.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            keepalive_interval: Duration::from_millis(self.keepalive_interval_ms),
            auto_reconnect: self.auto_reconnect,
            send_queue_capacity: self.send_queue_capacity,
            ..TransportConfig::default()
        }
    }

    /// Recorder settings
    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            directory: self.recordings_dir.clone(),
            sync_every_frames: self.sync_every_frames,
            ..RecorderConfig::default()
        }
    }

    /// Quality control settings
    pub fn quality_config(&self) -> QualityControlConfig {
        QualityControlConfig {
            mode: if self.adaptive_quality {
                QualityMode::Adaptive
            } else {
                QualityMode::Fixed(self.fixed_quality)
            },
            target_fps: self.target_fps,
            min_fps: self.min_fps,
            max_fps: self.max_fps,
            compression_quality: self.compression_quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_fps, 30);
        assert_eq!(config.sync_every_frames, 30);
        assert!(config.adaptive_quality);
    }

    #[test]
    fn json_overrides_only_given_fields() {
        let config = StreamConfig::from_json(
            r#"{ "server_url": "wss://example.com/ingest", "adaptive_quality": false,
                 "fixed_quality": "low", "target_fps": 10 }"#,
        )
        .unwrap();

        assert_eq!(config.server_url, "wss://example.com/ingest");
        assert_eq!(config.fixed_quality, QualityLevel::Low);
        assert_eq!(config.target_fps, 10);
        assert_eq!(config.max_fps, 30);
        assert!(config.send_depth);
        assert_eq!(
            config.quality_config().mode,
            QualityMode::Fixed(QualityLevel::Low)
        );
    }

    #[test]
    fn rejects_inconsistent_values() {
        let bad = [
            StreamConfig {
                server_url: "http://example.com".to_string(),
                ..StreamConfig::default()
            },
            StreamConfig {
                min_fps: 10,
                target_fps: 5,
                ..StreamConfig::default()
            },
            StreamConfig {
                target_fps: 60,
                ..StreamConfig::default()
            },
            StreamConfig {
                compression_quality: 0,
                ..StreamConfig::default()
            },
            StreamConfig {
                send_queue_capacity: 0,
                ..StreamConfig::default()
            },
        ];
        for config in bad {
            let err = config.validate().unwrap_err();
            assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
        }
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        let err = StreamConfig::from_json("{ not json").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    }

    #[test]
    fn derived_configs_carry_values() {
        let config = StreamConfig {
            keepalive_interval_ms: 2500,
            recordings_dir: PathBuf::from("/tmp/rec"),
            ..StreamConfig::default()
        };
        assert_eq!(
            config.transport_config().keepalive_interval,
            Duration::from_millis(2500)
        );
        assert!(config.transport_config().validate().is_ok());
        assert_eq!(
            config.recorder_config().directory,
            PathBuf::from("/tmp/rec")
        );
    }
}
