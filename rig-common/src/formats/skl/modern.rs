//! Modern SKL generation (version 0)
//!
//! # Layout
//! ```text
//! Header (64 bytes):
//! 0x00: file_size u32
//! 0x04: magic u32                 - 0x22FD4FC3
//! 0x08: version u32               - 0
//! 0x0C: flags u16
//! 0x0E: joint_count u16
//! 0x10: influence_count u32
//! 0x14: joints_offset i32         - always 64
//! 0x18: joint_indices_offset i32
//! 0x1C: influences_offset i32
//! 0x20: name_offset i32           - 0 (unused)
//! 0x24: asset_name_offset i32     - 0 (unused)
//! 0x28: joint_names_offset i32
//! 0x2C: reserved [u32; 5]         - 0xFFFFFFFF
//!
//! Joint (100 bytes):
//! 0x00: flags u16, id u16, parent i16 (-1 = root), pad u16
//! 0x08: hash u32, radius f32
//! 0x10: local translation vec3, local scale vec3, local rotation quat (xyzw)
//! 0x38: inverse world translation vec3, scale vec3, rotation quat
//! 0x60: name_offset i32           - relative to this field
//!
//! Joint index (8 bytes, sorted by hash): id u16, pad u16, hash u32
//! Influences: [u16; influence_count]
//! Joint names: null-terminated strings
//! ```

use crate::error::FormatError;
use crate::model::{Joint, Skeleton, Transform};
use crate::stream::{BinaryReader, BinaryWriter};

use super::SKL_MODERN_MAGIC;

/// Size of one joint record
pub const JOINT_RECORD_SIZE: usize = 100;

/// Size of one joint index entry
pub const JOINT_INDEX_SIZE: usize = 8;

/// Joint count limit (parents are stored as `i16`)
pub const MAX_JOINTS: usize = i16::MAX as usize;

/// Fixed 64-byte header of the modern generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SklHeader {
    pub file_size: u32,
    pub flags: u16,
    pub joint_count: u16,
    pub influence_count: u32,
    pub joints_offset: i32,
    pub joint_indices_offset: i32,
    pub influences_offset: i32,
    pub joint_names_offset: i32,
}

impl SklHeader {
    pub const SIZE: usize = 64;

    /// Header for a file holding `joint_count` joints and `influence_count` influences
    pub fn new(joint_count: u16, influence_count: u32) -> Self {
        let joints_offset = Self::SIZE;
        let joint_indices_offset = joints_offset + joint_count as usize * JOINT_RECORD_SIZE;
        let influences_offset = joint_indices_offset + joint_count as usize * JOINT_INDEX_SIZE;
        let joint_names_offset = influences_offset + influence_count as usize * 2;
        Self {
            file_size: 0,
            flags: 0,
            joint_count,
            influence_count,
            joints_offset: joints_offset as i32,
            joint_indices_offset: joint_indices_offset as i32,
            influences_offset: influences_offset as i32,
            joint_names_offset: joint_names_offset as i32,
        }
    }

    pub fn read(r: &mut BinaryReader) -> Result<Self, FormatError> {
        r.ensure(Self::SIZE)?;
        let file_size = r.read_u32()?;
        if r.read_u32()? != SKL_MODERN_MAGIC {
            return Err(FormatError::BadMagic { format: "SKL" });
        }
        let version = r.read_u32()?;
        if version != 0 {
            return Err(FormatError::UnsupportedVersion {
                format: "SKL",
                version,
            });
        }
        let flags = r.read_u16()?;
        let joint_count = r.read_u16()?;
        let influence_count = r.read_u32()?;
        let joints_offset = r.read_i32()?;
        let joint_indices_offset = r.read_i32()?;
        let influences_offset = r.read_i32()?;
        // name and asset name offsets, reserved block
        r.skip(8)?;
        let joint_names_offset = r.read_i32()?;
        r.skip(20)?;
        Ok(Self {
            file_size,
            flags,
            joint_count,
            influence_count,
            joints_offset,
            joint_indices_offset,
            influences_offset,
            joint_names_offset,
        })
    }

    pub fn write(&self, w: &mut BinaryWriter) {
        w.write_u32(self.file_size);
        w.write_u32(SKL_MODERN_MAGIC);
        w.write_u32(0);
        w.write_u16(self.flags);
        w.write_u16(self.joint_count);
        w.write_u32(self.influence_count);
        w.write_i32(self.joints_offset);
        w.write_i32(self.joint_indices_offset);
        w.write_i32(self.influences_offset);
        w.write_i32(0);
        w.write_i32(0);
        w.write_i32(self.joint_names_offset);
        for _ in 0..5 {
            w.write_u32(0xFFFF_FFFF);
        }
    }
}

/// Seek to a header offset, treating negative values as out of bounds
fn seek_offset(r: &mut BinaryReader, offset: i32) -> Result<(), FormatError> {
    let offset = usize::try_from(offset).map_err(|_| FormatError::Truncated {
        offset: r.position(),
        needed: 0,
        available: r.remaining(),
    })?;
    r.seek(offset)
}

pub(super) fn decode(bytes: &[u8]) -> Result<Skeleton, FormatError> {
    let mut r = BinaryReader::new(bytes);
    let header = SklHeader::read(&mut r)?;
    let joint_count = header.joint_count as usize;

    seek_offset(&mut r, header.joints_offset)?;
    r.ensure_array(joint_count, JOINT_RECORD_SIZE)?;

    let mut joints = Vec::with_capacity(joint_count);
    for index in 0..joint_count {
        let flags = r.read_u16()?;
        let id = r.read_u16()?;
        if id as usize != index {
            return Err(FormatError::InvalidJointId { index, id });
        }
        let parent = r.read_i16()?;
        r.skip(2)?;
        let hash = r.read_u32()?;
        let radius = r.read_f32()?;
        let translation = r.read_vec3()?;
        let scale = r.read_vec3()?;
        let rotation = r.read_quat()?;
        // Inverse world bind is derived from the locals
        r.skip(40)?;
        let field = r.position();
        let name_offset = r.read_i32()?;
        let name_at = usize::try_from(field as i64 + name_offset as i64).map_err(|_| {
            FormatError::Truncated {
                offset: field,
                needed: 1,
                available: 0,
            }
        })?;
        let mut name = r.read_cstring_at(name_at)?;
        // The first name may be preceded by padding
        let mut next = name_at + 1;
        while index == 0 && name.is_empty() {
            name = r.read_cstring_at(next)?;
            next += 1;
        }

        joints.push(Joint {
            name,
            hash,
            parent: (parent >= 0).then_some(parent as usize),
            flags,
            radius,
            local: Transform::new(translation, rotation, scale),
            world: glam::Mat4::IDENTITY,
        });
    }

    let influences = if header.influence_count > 0 {
        seek_offset(&mut r, header.influences_offset)?;
        r.read_u16_array(header.influence_count as usize)?
    } else {
        Vec::new()
    };

    Skeleton::new(joints, influences)
}

pub(super) fn encode(skeleton: &Skeleton) -> Result<Vec<u8>, FormatError> {
    let joints = skeleton.joints();
    if joints.len() > MAX_JOINTS {
        return Err(FormatError::CountOverflow {
            what: "joints",
            count: joints.len(),
            max: MAX_JOINTS,
        });
    }
    let influences = skeleton.influences();
    if influences.len() > u32::MAX as usize {
        return Err(FormatError::CountOverflow {
            what: "influences",
            count: influences.len(),
            max: u32::MAX as usize,
        });
    }

    let header = SklHeader::new(joints.len() as u16, influences.len() as u32);

    // Name positions are known up front: names follow the influences in joint order
    let mut name_positions = Vec::with_capacity(joints.len());
    let mut cursor = header.joint_names_offset as usize;
    for joint in joints {
        name_positions.push(cursor);
        cursor += joint.name.len() + 1;
    }

    let mut w = BinaryWriter::with_capacity(cursor);
    header.write(&mut w);

    for (index, joint) in joints.iter().enumerate() {
        let inverse = Transform::from_mat4(&joint.inverse_bind());
        w.write_u16(joint.flags);
        w.write_u16(index as u16);
        w.write_i16(joint.parent.map_or(-1, |p| p as i16));
        w.write_u16(0);
        w.write_u32(joint.hash);
        w.write_f32(joint.radius);
        w.write_vec3(joint.local.translation);
        w.write_vec3(joint.local.scale);
        w.write_quat(joint.local.rotation);
        w.write_vec3(inverse.translation);
        w.write_vec3(inverse.scale);
        w.write_quat(inverse.rotation);
        let field = w.position();
        w.write_i32((name_positions[index] as i64 - field as i64) as i32);
    }

    let mut by_hash: Vec<(u32, usize)> = joints
        .iter()
        .enumerate()
        .map(|(i, j)| (j.hash, i))
        .collect();
    by_hash.sort_unstable();
    for (hash, index) in by_hash {
        w.write_u16(index as u16);
        w.write_u16(0);
        w.write_u32(hash);
    }

    for &influence in influences {
        w.write_u16(influence);
    }

    for joint in joints {
        w.write_cstring(&joint.name);
    }

    let size = w.position() as u32;
    w.patch_u32(0, size);
    Ok(w.into_inner())
}
