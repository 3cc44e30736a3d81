//! # framelink media
//!
//! Quality control for the capture loop: discrete quality tiers, the
//! bandwidth monitor that drives tier selection, and the sample-source
//! capability interface the capture loop pulls sensor data through.

#![warn(clippy::all)]

pub mod bandwidth;
pub mod quality;
pub mod source;

// Re-export main types
pub use bandwidth::BandwidthMonitor;
pub use quality::{
    QualityControlConfig, QualityController, QualityLevel, QualityMode, QualityProfile,
    QualitySettings,
};
pub use source::{CachedSampleSource, CapturedImage, ImageRequest, LatestSample, SampleSource};
