//! ANM header structures
//!
//! Both families start with an 8-byte magic and a `u32` version. Offsets
//! stored in the headers are relative to byte 12, where the resource size
//! field starts.

use glam::Vec3;

use crate::error::FormatError;
use crate::stream::{BinaryReader, BinaryWriter};

/// Magic of the uncompressed family ("anmd")
pub const ANM_MAGIC: &[u8; 8] = b"r3d2anmd";

/// Magic of the compressed family ("canm")
pub const ANM_COMPRESSED_MAGIC: &[u8; 8] = b"r3d2canm";

/// Format token written after the resource size
pub const ANM_FORMAT_TOKEN: u32 = 0xBE07_94D3;

/// Base that header offsets are relative to
pub const OFFSET_BASE: usize = 12;

/// Size of the magic + version prefix
pub const PREFIX_SIZE: usize = 12;

/// Convert a stored relative offset to an absolute one
pub fn absolute_offset(relative: i32, r: &BinaryReader) -> Result<usize, FormatError> {
    let absolute = relative as i64 + OFFSET_BASE as i64;
    if relative <= 0 || absolute > r.len() as i64 {
        return Err(FormatError::Truncated {
            offset: absolute.max(0) as usize,
            needed: 0,
            available: r.len(),
        });
    }
    Ok(absolute as usize)
}

/// Header of versions 4 and 5 (64 bytes after the prefix).
///
/// ```text
/// 0x0C: resource_size u32
/// 0x10: format_token u32
/// 0x14: version u32            - repeated in v5, 0 in v4
/// 0x18: flags u32
/// 0x1C: track_count u32
/// 0x20: frame_count u32
/// 0x24: frame_duration f32     - seconds per frame
/// 0x28: joint_hashes_offset i32 (v5, 0 in v4)
/// 0x2C: asset_name_offset i32  - 0
/// 0x30: time_offset i32        - 0
/// 0x34: vectors_offset i32
/// 0x38: quaternions_offset i32
/// 0x3C: frames_offset i32
/// 0x40: reserved [u8; 12]
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnmdHeader {
    pub resource_size: u32,
    pub version: u32,
    pub flags: u32,
    pub track_count: u32,
    pub frame_count: u32,
    pub frame_duration: f32,
    pub joint_hashes_offset: i32,
    pub vectors_offset: i32,
    pub quaternions_offset: i32,
    pub frames_offset: i32,
}

impl AnmdHeader {
    pub const SIZE: usize = 64;

    /// Offset of the data following the header, relative to [`OFFSET_BASE`]
    pub const DATA_OFFSET: i32 = Self::SIZE as i32;

    pub fn read(r: &mut BinaryReader) -> Result<Self, FormatError> {
        r.ensure(Self::SIZE)?;
        let resource_size = r.read_u32()?;
        let _token = r.read_u32()?;
        let version = r.read_u32()?;
        let flags = r.read_u32()?;
        let track_count = r.read_u32()?;
        let frame_count = r.read_u32()?;
        let frame_duration = r.read_f32()?;
        let joint_hashes_offset = r.read_i32()?;
        // asset name, time
        r.skip(8)?;
        let vectors_offset = r.read_i32()?;
        let quaternions_offset = r.read_i32()?;
        let frames_offset = r.read_i32()?;
        r.skip(12)?;
        Ok(Self {
            resource_size,
            version,
            flags,
            track_count,
            frame_count,
            frame_duration,
            joint_hashes_offset,
            vectors_offset,
            quaternions_offset,
            frames_offset,
        })
    }

    pub fn write(&self, w: &mut BinaryWriter) {
        w.write_u32(self.resource_size);
        w.write_u32(ANM_FORMAT_TOKEN);
        w.write_u32(self.version);
        w.write_u32(self.flags);
        w.write_u32(self.track_count);
        w.write_u32(self.frame_count);
        w.write_f32(self.frame_duration);
        w.write_i32(self.joint_hashes_offset);
        w.write_i32(0);
        w.write_i32(0);
        w.write_i32(self.vectors_offset);
        w.write_i32(self.quaternions_offset);
        w.write_i32(self.frames_offset);
        w.write_bytes(&[0u8; 12]);
    }
}

/// Per-channel error metric stored in the compressed header
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ErrorMetric {
    pub margin: f32,
    pub discontinuity_threshold: f32,
}

/// Header of the compressed family (116 bytes after the prefix).
///
/// ```text
/// 0x0C: resource_size u32
/// 0x10: format_token u32
/// 0x14: flags u32
/// 0x18: joint_count u32
/// 0x1C: frame_count u32        - number of frame entries
/// 0x20: jump_cache_count u32
/// 0x24: max_time f32           - seconds
/// 0x28: fps f32
/// 0x2C: rotation, translation, scale error metrics (2 × f32 each)
/// 0x44: translation_min vec3, translation_max vec3
/// 0x5C: scale_min vec3, scale_max vec3
/// 0x74: frames_offset i32
/// 0x78: jump_caches_offset i32
/// 0x7C: joint_hashes_offset i32
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressedHeader {
    pub resource_size: u32,
    pub flags: u32,
    pub joint_count: u32,
    pub frame_count: u32,
    pub jump_cache_count: u32,
    pub max_time: f32,
    pub fps: f32,
    pub rotation_error: ErrorMetric,
    pub translation_error: ErrorMetric,
    pub scale_error: ErrorMetric,
    pub translation_min: Vec3,
    pub translation_max: Vec3,
    pub scale_min: Vec3,
    pub scale_max: Vec3,
    pub frames_offset: i32,
    pub jump_caches_offset: i32,
    pub joint_hashes_offset: i32,
}

impl CompressedHeader {
    pub const SIZE: usize = 116;

    pub fn read(r: &mut BinaryReader) -> Result<Self, FormatError> {
        r.ensure(Self::SIZE)?;
        let resource_size = r.read_u32()?;
        let _token = r.read_u32()?;
        let flags = r.read_u32()?;
        let joint_count = r.read_u32()?;
        let frame_count = r.read_u32()?;
        let jump_cache_count = r.read_u32()?;
        let max_time = r.read_f32()?;
        let fps = r.read_f32()?;
        let mut metric = || -> Result<ErrorMetric, FormatError> {
            Ok(ErrorMetric {
                margin: r.read_f32()?,
                discontinuity_threshold: r.read_f32()?,
            })
        };
        let rotation_error = metric()?;
        let translation_error = metric()?;
        let scale_error = metric()?;
        Ok(Self {
            resource_size,
            flags,
            joint_count,
            frame_count,
            jump_cache_count,
            max_time,
            fps,
            rotation_error,
            translation_error,
            scale_error,
            translation_min: r.read_vec3()?,
            translation_max: r.read_vec3()?,
            scale_min: r.read_vec3()?,
            scale_max: r.read_vec3()?,
            frames_offset: r.read_i32()?,
            jump_caches_offset: r.read_i32()?,
            joint_hashes_offset: r.read_i32()?,
        })
    }

    pub fn write(&self, w: &mut BinaryWriter) {
        w.write_u32(self.resource_size);
        w.write_u32(ANM_FORMAT_TOKEN);
        w.write_u32(self.flags);
        w.write_u32(self.joint_count);
        w.write_u32(self.frame_count);
        w.write_u32(self.jump_cache_count);
        w.write_f32(self.max_time);
        w.write_f32(self.fps);
        for metric in [self.rotation_error, self.translation_error, self.scale_error] {
            w.write_f32(metric.margin);
            w.write_f32(metric.discontinuity_threshold);
        }
        w.write_vec3(self.translation_min);
        w.write_vec3(self.translation_max);
        w.write_vec3(self.scale_min);
        w.write_vec3(self.scale_max);
        w.write_i32(self.frames_offset);
        w.write_i32(self.jump_caches_offset);
        w.write_i32(self.joint_hashes_offset);
    }
}
