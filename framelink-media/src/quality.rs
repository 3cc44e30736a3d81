//! Quality tiers and bandwidth-driven tier selection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Discrete streaming quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    /// Lowest tier: no depth, small images
    Minimal,
    /// Constrained link
    Low,
    /// Typical mobile link
    Medium,
    /// Good link
    High,
    /// Everything at full rate
    Full,
}

/// Fixed parameters of a quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    /// Frames per second
    pub target_fps: u32,
    /// Output image width
    pub width: u32,
    /// Output image height
    pub height: u32,
    /// JPEG-equivalent compression quality (1-100)
    pub compression_quality: u8,
    /// Whether image payloads are sent
    pub include_image: bool,
    /// Whether depth payloads are sent
    pub include_depth: bool,
}

impl QualityLevel {
    /// All tiers, best first
    pub const ALL: [QualityLevel; 5] = [
        QualityLevel::Full,
        QualityLevel::High,
        QualityLevel::Medium,
        QualityLevel::Low,
        QualityLevel::Minimal,
    ];

    /// Tier for a measured bandwidth in Mbps
    ///
    /// | Mbps   | tier    |
    /// |--------|---------|
    /// | > 3.0  | Full    |
    /// | > 1.5  | High    |
    /// | > 0.8  | Medium  |
    /// | > 0.4  | Low     |
    /// | else   | Minimal |
    pub fn for_bandwidth(mbps: f64) -> Self {
        if mbps > 3.0 {
            QualityLevel::Full
        } else if mbps > 1.5 {
            QualityLevel::High
        } else if mbps > 0.8 {
            QualityLevel::Medium
        } else if mbps > 0.4 {
            QualityLevel::Low
        } else {
            QualityLevel::Minimal
        }
    }

    /// Parameters of this tier
    pub fn profile(self) -> QualityProfile {
        match self {
            QualityLevel::Full => QualityProfile {
                target_fps: 30,
                width: 1920,
                height: 1440,
                compression_quality: 90,
                include_image: true,
                include_depth: true,
            },
            QualityLevel::High => QualityProfile {
                target_fps: 24,
                width: 1280,
                height: 960,
                compression_quality: 80,
                include_image: true,
                include_depth: true,
            },
            QualityLevel::Medium => QualityProfile {
                target_fps: 15,
                width: 960,
                height: 720,
                compression_quality: 70,
                include_image: true,
                include_depth: true,
            },
            QualityLevel::Low => QualityProfile {
                target_fps: 10,
                width: 640,
                height: 480,
                compression_quality: 60,
                include_image: true,
                include_depth: true,
            },
            QualityLevel::Minimal => QualityProfile {
                target_fps: 5,
                width: 480,
                height: 360,
                compression_quality: 50,
                include_image: true,
                include_depth: false,
            },
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityLevel::Full => write!(f, "FULL"),
            QualityLevel::High => write!(f, "HIGH"),
            QualityLevel::Medium => write!(f, "MEDIUM"),
            QualityLevel::Low => write!(f, "LOW"),
            QualityLevel::Minimal => write!(f, "MINIMAL"),
        }
    }
}

/// How the controller picks a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityMode {
    /// Follow measured bandwidth
    Adaptive,
    /// Always use the given tier
    Fixed(QualityLevel),
}

/// Quality control configuration
#[derive(Debug, Clone)]
pub struct QualityControlConfig {
    /// Tier selection mode
    pub mode: QualityMode,
    /// Frame rate used in fixed mode
    pub target_fps: u32,
    /// Lower frame rate bound
    pub min_fps: u32,
    /// Upper frame rate bound
    pub max_fps: u32,
    /// Compression quality used in fixed mode
    pub compression_quality: u8,
}

impl Default for QualityControlConfig {
    fn default() -> Self {
        Self {
            mode: QualityMode::Adaptive,
            target_fps: 30,
            min_fps: 1,
            max_fps: 30,
            compression_quality: 80,
        }
    }
}

/// Effective settings for the next frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualitySettings {
    /// Selected tier
    pub level: QualityLevel,
    /// Frame rate after applying the configured bounds
    pub fps: u32,
    /// Output image width
    pub width: u32,
    /// Output image height
    pub height: u32,
    /// Compression quality
    pub compression_quality: u8,
    /// Whether image payloads are sent
    pub include_image: bool,
    /// Whether depth payloads are sent
    pub include_depth: bool,
}

impl QualitySettings {
    /// Minimum time between two frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// Maps bandwidth measurements to quality tiers
#[derive(Debug)]
pub struct QualityController {
    config: QualityControlConfig,
    current: QualityLevel,
}

impl QualityController {
    /// Create a controller
    ///
    /// An adaptive controller reports the best tier only until its first
    /// [`update`](Self::update). A session with fewer than two bandwidth
    /// samples measures 0 Mbps, so its first frame is built at `Minimal`.
    pub fn new(config: QualityControlConfig) -> Self {
        let current = match config.mode {
            QualityMode::Adaptive => QualityLevel::Full,
            QualityMode::Fixed(level) => level,
        };
        Self { config, current }
    }

    /// Adaptive controller with default bounds
    pub fn adaptive() -> Self {
        Self::new(QualityControlConfig::default())
    }

    /// Controller pinned to `level`
    pub fn fixed(level: QualityLevel) -> Self {
        Self::new(QualityControlConfig {
            mode: QualityMode::Fixed(level),
            ..QualityControlConfig::default()
        })
    }

    /// Tier this controller would pick for `mbps`; does not change state
    pub fn level_for(&self, mbps: f64) -> QualityLevel {
        match self.config.mode {
            QualityMode::Adaptive => QualityLevel::for_bandwidth(mbps),
            QualityMode::Fixed(level) => level,
        }
    }

    /// Select the tier for a new measurement
    pub fn update(&mut self, mbps: f64) -> QualityLevel {
        let next = self.level_for(mbps);
        if next != self.current {
            info!(
                from = %self.current,
                to = %next,
                bandwidth_mbps = mbps,
                "Quality level changed"
            );
            self.current = next;
        }
        next
    }

    /// Currently selected tier
    pub fn current(&self) -> QualityLevel {
        self.current
    }

    /// Whether tiers follow measured bandwidth
    pub fn is_adaptive(&self) -> bool {
        self.config.mode == QualityMode::Adaptive
    }

    /// Effective settings for the current tier
    pub fn settings(&self) -> QualitySettings {
        let profile = self.current.profile();
        let (fps, compression_quality) = match self.config.mode {
            QualityMode::Adaptive => (profile.target_fps, profile.compression_quality),
            QualityMode::Fixed(_) => (self.config.target_fps, self.config.compression_quality),
        };
        let min_fps = self.config.min_fps.max(1);
        let max_fps = self.config.max_fps.max(min_fps);

        QualitySettings {
            level: self.current,
            fps: fps.clamp(min_fps, max_fps),
            width: profile.width,
            height: profile.height,
            compression_quality,
            include_image: profile.include_image,
            include_depth: profile.include_depth,
        }
    }
}
