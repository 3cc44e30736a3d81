//! Sample sources the capture loop pulls from
//!
//! Platform sensor and camera layers push their latest readings into
//! [`LatestSample`] cells; the capture loop reads whole snapshots through the
//! [`SampleSource`] trait once per tick.

use bytes::Bytes;
use framelink_core::{
    CameraIntrinsics, DepthPayload, Geometry, ImageFormat, ImagePayload, ImuSample, Pose,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// Image parameters selected by the current quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRequest {
    /// Requested width in pixels
    pub width: u32,
    /// Requested height in pixels
    pub height: u32,
    /// Requested compression quality (1-100)
    pub quality: u8,
}

/// Capability interface over the device's sensors
///
/// Every method defaults to `None` so a source only implements what it can
/// provide.
pub trait SampleSource: Send + Sync {
    /// Latest camera image encoded for `request`
    fn current_image(&self, _request: &ImageRequest) -> Option<ImagePayload> {
        None
    }

    /// Latest depth map
    fn current_depth(&self) -> Option<DepthPayload> {
        None
    }

    /// Latest device pose
    fn current_pose(&self) -> Option<Pose> {
        None
    }

    /// Latest motion sample
    fn current_imu_sample(&self) -> Option<ImuSample> {
        None
    }

    /// Latest inferred geometry
    fn current_geometry(&self) -> Option<Geometry> {
        None
    }

    /// Camera intrinsics of the active sensor
    fn camera_intrinsics(&self) -> Option<CameraIntrinsics> {
        None
    }
}

/// Latest value of one sensor stream
///
/// One writer replaces the whole value; readers get an `Arc` to a complete
/// snapshot and never observe a partial update.
#[derive(Debug)]
pub struct LatestSample<T> {
    value: RwLock<Option<Arc<T>>>,
}

impl<T> Default for LatestSample<T> {
    fn default() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }
}

impl<T> LatestSample<T> {
    /// Empty cell
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored value
    pub fn store(&self, value: T) {
        *self.value.write() = Some(Arc::new(value));
    }

    /// Current snapshot
    pub fn load(&self) -> Option<Arc<T>> {
        self.value.read().clone()
    }

    /// Forget the stored value
    pub fn clear(&self) {
        *self.value.write() = None;
    }
}

impl<T: Clone> LatestSample<T> {
    /// Copy of the current value
    pub fn get(&self) -> Option<T> {
        self.value.read().as_deref().cloned()
    }
}

/// Encoded image as delivered by the camera layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    /// Encoded bytes
    pub data: Bytes,
    /// Encoding
    pub format: ImageFormat,
    /// Compression quality the bytes were encoded at (1-100)
    pub quality: u8,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// [`SampleSource`] backed by latest-value cells
///
/// Platform callbacks call the `push_*` methods from their own threads.
/// Images are passed through exactly as captured, including their encoded
/// quality. The tier's request is not applied to cached images.
#[derive(Debug, Default)]
pub struct CachedSampleSource {
    image: LatestSample<CapturedImage>,
    depth: LatestSample<DepthPayload>,
    pose: LatestSample<Pose>,
    imu: LatestSample<ImuSample>,
    geometry: LatestSample<Geometry>,
    intrinsics: LatestSample<CameraIntrinsics>,
}

impl CachedSampleSource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest camera image
    pub fn push_image(&self, image: CapturedImage) {
        self.image.store(image);
    }

    /// Store the latest depth map
    pub fn push_depth(&self, depth: DepthPayload) {
        self.depth.store(depth);
    }

    /// Store the latest pose
    pub fn push_pose(&self, pose: Pose) {
        self.pose.store(pose);
    }

    /// Store the latest motion sample
    pub fn push_imu(&self, sample: ImuSample) {
        self.imu.store(sample);
    }

    /// Store the latest inferred geometry
    pub fn push_geometry(&self, geometry: Geometry) {
        self.geometry.store(geometry);
    }

    /// Store the camera intrinsics
    pub fn set_intrinsics(&self, intrinsics: CameraIntrinsics) {
        self.intrinsics.store(intrinsics);
    }
}

impl SampleSource for CachedSampleSource {
    fn current_image(&self, _request: &ImageRequest) -> Option<ImagePayload> {
        let image = self.image.load()?;
        Some(ImagePayload {
            data: image.data.clone(),
            format: image.format,
            quality: image.quality,
            width: image.width,
            height: image.height,
        })
    }

    fn current_depth(&self) -> Option<DepthPayload> {
        self.depth.get()
    }

    fn current_pose(&self) -> Option<Pose> {
        self.pose.get()
    }

    fn current_imu_sample(&self) -> Option<ImuSample> {
        self.imu.get()
    }

    fn current_geometry(&self) -> Option<Geometry> {
        self.geometry.get()
    }

    fn camera_intrinsics(&self) -> Option<CameraIntrinsics> {
        self.intrinsics.get()
    }
}
