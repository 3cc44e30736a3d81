//! # framelink core
//!
//! Frame data model, the compact binary frame codec, the length-prefixed
//! record envelope used by recordings, and the reconnecting WebSocket
//! transport that streams frames to a consumer.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod frame;
pub mod status;
pub mod transport;

// Re-export main types
pub use codec::record::{encode_frame_record, encode_record, read_recording, RecordReader};
pub use codec::FrameCodec;
pub use error::FrameLinkError;
pub use frame::{
    CameraIntrinsics, DepthFormat, DepthPayload, Frame, FrameBuilder, FrameId, Geometry,
    ImageFormat, ImagePayload, ImuSample, Plane, PlaneAlignment, Pose,
};
pub use status::{ConnectionStatus, FailureKind, TransportState};
pub use transport::{
    FrameSink, ObserverId, ReconnectBackoff, StreamTransport, TransportConfig, TransportStats,
};
