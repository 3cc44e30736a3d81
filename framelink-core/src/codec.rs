//! Binary frame codec
//!
//! Frames are serialized into a compact, deterministic binary message. The
//! same bytes travel over the network (one WebSocket message per frame) and
//! into recordings, where [`record`] wraps them in an explicit length prefix.
//!
//! Layout of an encoded frame:
//!
//! ```text
//! u8      format version
//! varint  sequence
//! bytes   device id (varint length + UTF-8)
//! u64     capture timestamp, ns (big-endian)
//! u8      payload presence bits
//! ...     present payloads, in bit order
//! ```

pub mod record;

use crate::error::FrameLinkError;
use crate::frame::{
    CameraIntrinsics, DepthFormat, DepthPayload, Frame, FrameId, Geometry, ImageFormat,
    ImagePayload, ImuSample, Plane, PlaneAlignment, Pose,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

/// Current frame format version
pub const FRAME_FORMAT_VERSION: u8 = 1;

/// Largest value representable as a varint
pub const MAX_VARINT: u64 = 0x3FFF_FFFF_FFFF_FFFF;

const HAS_IMAGE: u8 = 1 << 0;
const HAS_DEPTH: u8 = 1 << 1;
const HAS_POSE: u8 = 1 << 2;
const HAS_INTRINSICS: u8 = 1 << 3;
const HAS_IMU: u8 = 1 << 4;
const HAS_GEOMETRY: u8 = 1 << 5;

const PLANE_FIXED_LEN: usize = 1 + 5 * 4;
const POINT_LEN: usize = 3 * 4;

/// Frame encoder/decoder
#[derive(Debug)]
pub struct FrameCodec;

/// Variable-length integers, QUIC style (RFC 9000, Section 16)
impl FrameCodec {
    /// Encode a variable-length integer
    pub fn encode_varint(value: u64, buf: &mut BytesMut) -> Result<(), FrameLinkError> {
        if value < 0x40 {
            buf.put_u8(value as u8);
        } else if value < 0x4000 {
            buf.put_u16((0x4000 | value) as u16);
        } else if value < 0x4000_0000 {
            buf.put_u32((0x8000_0000 | value) as u32);
        } else if value <= MAX_VARINT {
            buf.put_u64(0xC000_0000_0000_0000 | value);
        } else {
            return Err(FrameLinkError::EncodingFailed {
                reason: format!("Value too large for varint encoding: {}", value),
            });
        }
        Ok(())
    }

    /// Number of bytes `value` occupies as a varint
    pub fn varint_len(value: u64) -> usize {
        if value < 0x40 {
            1
        } else if value < 0x4000 {
            2
        } else if value < 0x4000_0000 {
            4
        } else {
            8
        }
    }

    /// Decode a variable-length integer
    pub fn decode_varint(buf: &mut Cursor<&[u8]>) -> Result<u64, FrameLinkError> {
        if !buf.has_remaining() {
            return Err(FrameLinkError::DecodingFailed {
                reason: "No data available for varint".to_string(),
            });
        }

        let first_byte = buf.get_u8();
        let extra = match first_byte >> 6 {
            0 => 0,
            1 => 1,
            2 => 3,
            _ => 7,
        };

        if buf.remaining() < extra {
            return Err(FrameLinkError::DecodingFailed {
                reason: format!("Insufficient data for {}-byte varint", extra + 1),
            });
        }

        let high = (first_byte & 0x3F) as u64;
        if extra == 0 {
            return Ok(high);
        }
        Ok((high << (extra * 8)) | buf.get_uint(extra))
    }

    /// Encode a length-prefixed byte string
    pub fn encode_bytes(data: &[u8], buf: &mut BytesMut) -> Result<(), FrameLinkError> {
        Self::encode_varint(data.len() as u64, buf)?;
        buf.extend_from_slice(data);
        Ok(())
    }

    /// Decode a length-prefixed byte string
    pub fn decode_bytes(buf: &mut Cursor<&[u8]>) -> Result<Bytes, FrameLinkError> {
        let length = Self::decode_varint(buf)? as usize;

        if buf.remaining() < length {
            return Err(FrameLinkError::DecodingFailed {
                reason: format!(
                    "Insufficient data: need {} bytes, have {}",
                    length,
                    buf.remaining()
                ),
            });
        }

        Ok(buf.copy_to_bytes(length))
    }

    fn bytes_len(data: &[u8]) -> usize {
        Self::varint_len(data.len() as u64) + data.len()
    }
}

/// Frame encoding
impl FrameCodec {
    /// Serialize a frame into a freshly allocated buffer
    pub fn encode(frame: &Frame) -> Result<Bytes, FrameLinkError> {
        let mut buf = BytesMut::with_capacity(Self::frame_length(frame));
        Self::encode_into(frame, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Serialize a frame, appending to `buf`
    pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), FrameLinkError> {
        buf.put_u8(FRAME_FORMAT_VERSION);
        Self::encode_varint(frame.id.sequence, buf)?;
        Self::encode_bytes(frame.id.device_id.as_bytes(), buf)?;
        buf.put_u64(frame.id.timestamp_ns);
        buf.put_u8(Self::presence_bits(frame));

        if let Some(image) = &frame.image {
            buf.put_u8(image.format.to_wire());
            buf.put_u8(image.quality);
            Self::encode_varint(image.width as u64, buf)?;
            Self::encode_varint(image.height as u64, buf)?;
            Self::encode_bytes(&image.data, buf)?;
        }

        if let Some(depth) = &frame.depth {
            buf.put_u8(depth.format.to_wire());
            Self::encode_varint(depth.width as u64, buf)?;
            Self::encode_varint(depth.height as u64, buf)?;
            Self::encode_bytes(&depth.data, buf)?;
        }

        if let Some(pose) = &frame.pose {
            put_f32s(buf, &pose.position);
            put_f32s(buf, &pose.rotation);
        }

        if let Some(intrinsics) = &frame.intrinsics {
            put_f32s(
                buf,
                &[intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy],
            );
            Self::encode_varint(intrinsics.width as u64, buf)?;
            Self::encode_varint(intrinsics.height as u64, buf)?;
        }

        if let Some(imu) = &frame.imu {
            buf.put_u64(imu.timestamp_ns);
            put_f32s(buf, &imu.acceleration);
            put_f32s(buf, &imu.angular_velocity);
            put_f32s(buf, &imu.gravity);
        }

        if let Some(geometry) = &frame.geometry {
            Self::encode_varint(geometry.planes.len() as u64, buf)?;
            for plane in &geometry.planes {
                Self::encode_varint(plane.id, buf)?;
                buf.put_u8(match plane.alignment {
                    PlaneAlignment::Horizontal => 0,
                    PlaneAlignment::Vertical => 1,
                });
                put_f32s(buf, &plane.center);
                put_f32s(buf, &plane.extent);
            }
            Self::encode_varint(geometry.points.len() as u64, buf)?;
            for point in &geometry.points {
                put_f32s(buf, point);
            }
        }

        Ok(())
    }

    /// Exact number of bytes [`FrameCodec::encode`] will produce for `frame`
    pub fn frame_length(frame: &Frame) -> usize {
        let mut len = 1
            + Self::varint_len(frame.id.sequence)
            + Self::bytes_len(frame.id.device_id.as_bytes())
            + 8
            + 1;

        if let Some(image) = &frame.image {
            len += 2
                + Self::varint_len(image.width as u64)
                + Self::varint_len(image.height as u64)
                + Self::bytes_len(&image.data);
        }
        if let Some(depth) = &frame.depth {
            len += 1
                + Self::varint_len(depth.width as u64)
                + Self::varint_len(depth.height as u64)
                + Self::bytes_len(&depth.data);
        }
        if frame.pose.is_some() {
            len += 7 * 4;
        }
        if let Some(intrinsics) = &frame.intrinsics {
            len += 4 * 4
                + Self::varint_len(intrinsics.width as u64)
                + Self::varint_len(intrinsics.height as u64);
        }
        if frame.imu.is_some() {
            len += 8 + 9 * 4;
        }
        if let Some(geometry) = &frame.geometry {
            len += Self::varint_len(geometry.planes.len() as u64);
            for plane in &geometry.planes {
                len += Self::varint_len(plane.id) + PLANE_FIXED_LEN;
            }
            len += Self::varint_len(geometry.points.len() as u64);
            len += geometry.points.len() * POINT_LEN;
        }

        len
    }

    fn presence_bits(frame: &Frame) -> u8 {
        let mut bits = 0;
        if frame.image.is_some() {
            bits |= HAS_IMAGE;
        }
        if frame.depth.is_some() {
            bits |= HAS_DEPTH;
        }
        if frame.pose.is_some() {
            bits |= HAS_POSE;
        }
        if frame.intrinsics.is_some() {
            bits |= HAS_INTRINSICS;
        }
        if frame.imu.is_some() {
            bits |= HAS_IMU;
        }
        if frame.geometry.is_some() {
            bits |= HAS_GEOMETRY;
        }
        bits
    }
}

/// Frame decoding
impl FrameCodec {
    /// Parse a frame previously produced by [`FrameCodec::encode`]
    pub fn decode(data: &[u8]) -> Result<Frame, FrameLinkError> {
        let mut buf = Cursor::new(data);

        let version = get_u8(&mut buf, "format version")?;
        if version != FRAME_FORMAT_VERSION {
            return Err(FrameLinkError::DecodingFailed {
                reason: format!("Unsupported frame format version: {}", version),
            });
        }

        let sequence = Self::decode_varint(&mut buf)?;
        let device_id = String::from_utf8(Self::decode_bytes(&mut buf)?.to_vec()).map_err(|_| {
            FrameLinkError::DecodingFailed {
                reason: "Invalid UTF-8 in device id".to_string(),
            }
        })?;
        let timestamp_ns = get_u64(&mut buf, "timestamp")?;
        let bits = get_u8(&mut buf, "presence bits")?;

        let mut builder = Frame::builder(FrameId {
            sequence,
            device_id,
            timestamp_ns,
        });

        if bits & HAS_IMAGE != 0 {
            let format_tag = get_u8(&mut buf, "image format")?;
            let format =
                ImageFormat::from_wire(format_tag).ok_or_else(|| FrameLinkError::DecodingFailed {
                    reason: format!("Unknown image format: {}", format_tag),
                })?;
            let quality = get_u8(&mut buf, "image quality")?;
            let width = decode_dimension(&mut buf)?;
            let height = decode_dimension(&mut buf)?;
            let data = Self::decode_bytes(&mut buf)?;
            builder = builder.image(ImagePayload {
                data,
                format,
                quality,
                width,
                height,
            });
        }

        if bits & HAS_DEPTH != 0 {
            let format_tag = get_u8(&mut buf, "depth format")?;
            let format =
                DepthFormat::from_wire(format_tag).ok_or_else(|| FrameLinkError::DecodingFailed {
                    reason: format!("Unknown depth format: {}", format_tag),
                })?;
            let width = decode_dimension(&mut buf)?;
            let height = decode_dimension(&mut buf)?;
            let data = Self::decode_bytes(&mut buf)?;
            builder = builder.depth(DepthPayload {
                data,
                format,
                width,
                height,
            });
        }

        if bits & HAS_POSE != 0 {
            builder = builder.pose(Pose {
                position: get_f32s(&mut buf)?,
                rotation: get_f32s(&mut buf)?,
            });
        }

        if bits & HAS_INTRINSICS != 0 {
            let [fx, fy, cx, cy] = get_f32s(&mut buf)?;
            builder = builder.intrinsics(CameraIntrinsics {
                fx,
                fy,
                cx,
                cy,
                width: decode_dimension(&mut buf)?,
                height: decode_dimension(&mut buf)?,
            });
        }

        if bits & HAS_IMU != 0 {
            builder = builder.imu(ImuSample {
                timestamp_ns: get_u64(&mut buf, "imu timestamp")?,
                acceleration: get_f32s(&mut buf)?,
                angular_velocity: get_f32s(&mut buf)?,
                gravity: get_f32s(&mut buf)?,
            });
        }

        if bits & HAS_GEOMETRY != 0 {
            builder = builder.geometry(Self::decode_geometry(&mut buf)?);
        }

        if buf.has_remaining() {
            return Err(FrameLinkError::DecodingFailed {
                reason: format!("{} unexpected trailing bytes", buf.remaining()),
            });
        }

        Ok(builder.build())
    }

    fn decode_geometry(buf: &mut Cursor<&[u8]>) -> Result<Geometry, FrameLinkError> {
        let plane_count = Self::decode_varint(buf)? as usize;
        // Each plane needs at least one id byte plus its fixed part.
        if plane_count.saturating_mul(PLANE_FIXED_LEN + 1) > buf.remaining() {
            return Err(FrameLinkError::DecodingFailed {
                reason: format!("Plane count {} exceeds available data", plane_count),
            });
        }

        let mut planes = Vec::with_capacity(plane_count);
        for _ in 0..plane_count {
            let id = Self::decode_varint(buf)?;
            let alignment = match get_u8(buf, "plane alignment")? {
                0 => PlaneAlignment::Horizontal,
                1 => PlaneAlignment::Vertical,
                other => {
                    return Err(FrameLinkError::DecodingFailed {
                        reason: format!("Unknown plane alignment: {}", other),
                    })
                }
            };
            planes.push(Plane {
                id,
                alignment,
                center: get_f32s(buf)?,
                extent: get_f32s(buf)?,
            });
        }

        let point_count = Self::decode_varint(buf)? as usize;
        if point_count.saturating_mul(POINT_LEN) > buf.remaining() {
            return Err(FrameLinkError::DecodingFailed {
                reason: format!("Point count {} exceeds available data", point_count),
            });
        }

        let mut points = Vec::with_capacity(point_count);
        for _ in 0..point_count {
            points.push(get_f32s(buf)?);
        }

        Ok(Geometry { planes, points })
    }
}

fn put_f32s(buf: &mut BytesMut, values: &[f32]) {
    for value in values {
        buf.put_f32(*value);
    }
}

fn get_u8(buf: &mut Cursor<&[u8]>, field: &str) -> Result<u8, FrameLinkError> {
    if !buf.has_remaining() {
        return Err(FrameLinkError::DecodingFailed {
            reason: format!("Missing {}", field),
        });
    }
    Ok(buf.get_u8())
}

fn get_u64(buf: &mut Cursor<&[u8]>, field: &str) -> Result<u64, FrameLinkError> {
    if buf.remaining() < 8 {
        return Err(FrameLinkError::DecodingFailed {
            reason: format!("Missing {}", field),
        });
    }
    Ok(buf.get_u64())
}

fn get_f32s<const N: usize>(buf: &mut Cursor<&[u8]>) -> Result<[f32; N], FrameLinkError> {
    if buf.remaining() < N * 4 {
        return Err(FrameLinkError::DecodingFailed {
            reason: format!("Need {} float bytes, have {}", N * 4, buf.remaining()),
        });
    }
    let mut values = [0f32; N];
    for value in values.iter_mut() {
        *value = buf.get_f32();
    }
    Ok(values)
}

fn decode_dimension(buf: &mut Cursor<&[u8]>) -> Result<u32, FrameLinkError> {
    let value = FrameCodec::decode_varint(buf)?;
    u32::try_from(value).map_err(|_| FrameLinkError::DecodingFailed {
        reason: format!("Dimension out of range: {}", value),
    })
}
