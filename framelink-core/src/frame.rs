//! Frame data model
//!
//! A [`Frame`] is the payload of one capture tick. The identifier is always
//! present; every sensor payload is independently optional, so a frame with
//! no payload at all is a valid heartbeat.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identity of a frame within a capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameId {
    /// Monotonic sequence number, incremented once per capture tick
    pub sequence: u64,
    /// Identifier of the capturing device
    pub device_id: String,
    /// Capture timestamp in nanoseconds since the Unix epoch
    pub timestamp_ns: u64,
}

impl FrameId {
    /// Create a new frame identifier
    pub fn new(sequence: u64, device_id: impl Into<String>, timestamp_ns: u64) -> Self {
        Self {
            sequence,
            device_id: device_id.into(),
            timestamp_ns,
        }
    }
}

/// Encoding of an image payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    /// JPEG compressed
    Jpeg,
    /// PNG compressed
    Png,
    /// Raw YUV 4:2:0 planes
    Yuv420,
}

impl ImageFormat {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            ImageFormat::Jpeg => 0,
            ImageFormat::Png => 1,
            ImageFormat::Yuv420 => 2,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(ImageFormat::Jpeg),
            1 => Some(ImageFormat::Png),
            2 => Some(ImageFormat::Yuv420),
            _ => None,
        }
    }
}

/// Encoded camera image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Encoded image bytes
    pub data: Bytes,
    /// Encoding of `data`
    pub format: ImageFormat,
    /// Compression quality used by the encoder (1-100)
    pub quality: u8,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

/// Encoding of a depth payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthFormat {
    /// 32-bit float meters, row major
    Float32,
    /// 16-bit unsigned millimeters, row major
    Uint16Millimeters,
    /// 16-bit millimeters packed into a PNG
    Png16,
}

impl DepthFormat {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            DepthFormat::Float32 => 0,
            DepthFormat::Uint16Millimeters => 1,
            DepthFormat::Png16 => 2,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(DepthFormat::Float32),
            1 => Some(DepthFormat::Uint16Millimeters),
            2 => Some(DepthFormat::Png16),
            _ => None,
        }
    }
}

/// Encoded depth map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthPayload {
    /// Encoded depth bytes
    pub data: Bytes,
    /// Encoding of `data`
    pub format: DepthFormat,
    /// Depth map width in pixels
    pub width: u32,
    /// Depth map height in pixels
    pub height: u32,
}

/// Device pose in world coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position in meters (x, y, z)
    pub position: [f32; 3],
    /// Rotation quaternion (x, y, z, w)
    pub rotation: [f32; 4],
}

/// Pinhole camera intrinsics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length x in pixels
    pub fx: f32,
    /// Focal length y in pixels
    pub fy: f32,
    /// Principal point x in pixels
    pub cx: f32,
    /// Principal point y in pixels
    pub cy: f32,
    /// Sensor width the intrinsics refer to
    pub width: u32,
    /// Sensor height the intrinsics refer to
    pub height: u32,
}

/// One motion sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Sample timestamp in nanoseconds
    pub timestamp_ns: u64,
    /// Linear acceleration in m/s^2
    pub acceleration: [f32; 3],
    /// Angular velocity in rad/s
    pub angular_velocity: [f32; 3],
    /// Gravity vector in m/s^2
    pub gravity: [f32; 3],
}

/// Orientation of a detected plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaneAlignment {
    /// Floors, tables
    Horizontal,
    /// Walls
    Vertical,
}

/// Detected planar surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Tracker-assigned plane identifier
    pub id: u64,
    /// Plane alignment
    pub alignment: PlaneAlignment,
    /// Plane center in world coordinates
    pub center: [f32; 3],
    /// Plane extent (width, length) in meters
    pub extent: [f32; 2],
}

/// Inferred scene geometry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    /// Detected planes
    pub planes: Vec<Plane>,
    /// Sparse feature points in world coordinates
    pub points: Vec<[f32; 3]>,
}

/// One capture tick's bundled sensor payload
///
/// Built once per tick and never mutated afterwards; the transport and the
/// recorder both consume the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame identity, always present
    pub id: FrameId,
    /// Camera image
    pub image: Option<ImagePayload>,
    /// Depth map
    pub depth: Option<DepthPayload>,
    /// Device pose
    pub pose: Option<Pose>,
    /// Camera intrinsics, sent once per session
    pub intrinsics: Option<CameraIntrinsics>,
    /// Motion sample
    pub imu: Option<ImuSample>,
    /// Inferred geometry
    pub geometry: Option<Geometry>,
}

impl Frame {
    /// Start building a frame with the given identity
    pub fn builder(id: FrameId) -> FrameBuilder {
        FrameBuilder {
            frame: Frame {
                id,
                image: None,
                depth: None,
                pose: None,
                intrinsics: None,
                imu: None,
                geometry: None,
            },
        }
    }

    /// Whether the frame carries no sensor payload at all
    pub fn is_heartbeat(&self) -> bool {
        self.image.is_none()
            && self.depth.is_none()
            && self.pose.is_none()
            && self.intrinsics.is_none()
            && self.imu.is_none()
            && self.geometry.is_none()
    }

    /// Sequence number shortcut
    pub fn sequence(&self) -> u64 {
        self.id.sequence
    }
}

/// Builder for [`Frame`]
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    frame: Frame,
}

impl FrameBuilder {
    /// Attach an image payload
    pub fn image(mut self, image: ImagePayload) -> Self {
        self.frame.image = Some(image);
        self
    }

    /// Attach a depth payload
    pub fn depth(mut self, depth: DepthPayload) -> Self {
        self.frame.depth = Some(depth);
        self
    }

    /// Attach a pose
    pub fn pose(mut self, pose: Pose) -> Self {
        self.frame.pose = Some(pose);
        self
    }

    /// Attach camera intrinsics
    pub fn intrinsics(mut self, intrinsics: CameraIntrinsics) -> Self {
        self.frame.intrinsics = Some(intrinsics);
        self
    }

    /// Attach a motion sample
    pub fn imu(mut self, imu: ImuSample) -> Self {
        self.frame.imu = Some(imu);
        self
    }

    /// Attach inferred geometry
    pub fn geometry(mut self, geometry: Geometry) -> Self {
        self.frame.geometry = Some(geometry);
        self
    }

    /// Finish the frame
    pub fn build(self) -> Frame {
        self.frame
    }
}
